//! Signal-processing primitives shared by every demodulator: FIR design and
//! filtering, resampling, averaging, de-emphasis, the FM/AM/SSB primitives,
//! and stereo pilot tracking.

pub mod am;
pub mod deemph;
pub mod downsample;
pub mod expavg;
pub mod fir;
pub mod fm;
pub mod ssb;
pub mod stereo;

pub use am::AmDemodulator;
pub use deemph::Deemphasis;
pub use downsample::{Downsampler, IqDownsampler};
pub use expavg::{ExpAverager, ExpVarianceAverager};
pub use fir::{hilbert_fir_coeffs, lowpass_fir_coeffs, FirFilter};
pub use fm::FmDemodulator;
pub use ssb::{Sideband, SsbDemodulator};
pub use stereo::StereoSeparator;

//! Modulation demodulators: WBFM (with stereo and de-emphasis), NBFM, AM,
//! and SSB. Each wraps the [`crate::dsp`] primitives into a complete
//! `IN_RATE -> OUT_RATE` chain and exposes the common [`Demodulator`] trait
//! so the decoder can swap modes without caring which one is installed.

pub mod am;
pub mod nbfm;
pub mod ssb;
pub mod wbfm;

use crate::dsp::Sideband;

/// Sample rate fed in from the RTL2832U bulk pump.
pub const IN_RATE: u32 = 1_024_000;
/// Sample rate every demodulator produces.
pub const OUT_RATE: u32 = 48_000;

/// Tagged mode descriptor, installed by `setMode` on the controller and
/// carried in `DecoderMessage::SetMode`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Wbfm,
    Nbfm { max_f: f32 },
    Am { bandwidth: f32 },
    Ssb { bandwidth: f32, upper: bool },
}

/// Result of demodulating one block.
pub struct DemodOutput {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub stereo: bool,
    pub signal_level: f32,
}

/// Common interface every demodulator instance implements.
pub trait Demodulator: Send {
    fn demodulate(&mut self, i: &[f32], q: &[f32], in_stereo: bool) -> DemodOutput;
}

/// Constructs a fresh demodulator instance sized to `IN_RATE`/`OUT_RATE` for
/// the given mode, matching `DecoderMessage::SetMode`'s contract.
pub fn build(mode: Mode) -> Box<dyn Demodulator> {
    match mode {
        Mode::Wbfm => Box::new(wbfm::Wbfm::new()),
        Mode::Nbfm { max_f } => Box::new(nbfm::Nbfm::new(max_f)),
        Mode::Am { bandwidth } => Box::new(am::Am::new(bandwidth)),
        Mode::Ssb { bandwidth, upper } => {
            let sideband = if upper { Sideband::Upper } else { Sideband::Lower };
            Box::new(ssb::Ssb::new(bandwidth, sideband))
        }
    }
}

/// `signalLevel = 3.5 * sqrt(relPower)`, shared by every demodulator that
/// reports a level derived from mean IQ power of the block it was given.
pub(crate) fn signal_level_from_power(i: &[f32], q: &[f32]) -> f32 {
    if i.is_empty() {
        return 0.0;
    }
    let power: f32 = i
        .iter()
        .zip(q.iter())
        .map(|(ci, cq)| ci * ci + cq * cq)
        .sum::<f32>()
        / i.len() as f32;
    3.5 * power.max(0.0).sqrt()
}

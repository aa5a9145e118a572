//! Driver and playback engine for RTL2832U/R820T USB dongles: register-level
//! USB control of the tuner and demodulator chips, a software FM/AM/SSB
//! demodulation chain, and a [`controller::RadioController`] that sequences
//! device open/close, retuning, and scanning on a background thread.

pub mod controller;
pub mod decoder;
pub mod demod;
pub mod device;
pub mod dsp;
pub mod error;
pub mod rtlsdr;
pub mod tuners;

pub use controller::{AudioSink, NullAudioSink, Recorder, RadioController};
pub use demod::Mode;
pub use device::{Device, DeviceDescriptor, DeviceDescriptors, DeviceId};
pub use error::{Result, RtlsdrError};
pub use rtlsdr::RtlSdr;
pub use tuners::TunerGain;

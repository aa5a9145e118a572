//! SSB phasing-method demodulation.

use super::{signal_level_from_power, DemodOutput, Demodulator, IN_RATE, OUT_RATE};
use crate::dsp::{IqDownsampler, Sideband, SsbDemodulator};

pub struct Ssb {
    iq_down: IqDownsampler,
    ssb: SsbDemodulator,
}

impl Ssb {
    pub fn new(bandwidth: f32, sideband: Sideband) -> Self {
        Ssb {
            iq_down: IqDownsampler::new(IN_RATE, OUT_RATE, 161),
            ssb: SsbDemodulator::new(OUT_RATE, bandwidth, sideband),
        }
    }
}

impl Demodulator for Ssb {
    fn demodulate(&mut self, i: &[f32], q: &[f32], _in_stereo: bool) -> DemodOutput {
        let signal_level = signal_level_from_power(i, q);
        let interleaved: Vec<f32> = i.iter().zip(q.iter()).flat_map(|(&a, &b)| [a, b]).collect();
        let (di, dq) = self.iq_down.downsample(&interleaved);
        let (mono, _carrier) = self.ssb.demod(&di, &dq);
        let right = mono.clone();

        DemodOutput {
            left: mono,
            right,
            stereo: false,
            signal_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demodulates_a_block_without_panicking() {
        let n = (IN_RATE / 5) as usize;
        let rate = IN_RATE as f32;
        let i: Vec<f32> = (0..n)
            .map(|k| (2.0 * std::f32::consts::PI * 1000.0 * k as f32 / rate).cos())
            .collect();
        let q: Vec<f32> = (0..n)
            .map(|k| (2.0 * std::f32::consts::PI * 1000.0 * k as f32 / rate).sin())
            .collect();
        let mut ssb = Ssb::new(3_000.0, Sideband::Upper);
        let out = ssb.demodulate(&i, &q, false);
        assert!(!out.left.is_empty());
    }
}

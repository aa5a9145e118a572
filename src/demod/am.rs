//! AM envelope demodulation.

use super::{signal_level_from_power, DemodOutput, Demodulator, IN_RATE, OUT_RATE};
use crate::dsp::{lowpass_fir_coeffs, AmDemodulator, FirFilter, IqDownsampler};

pub struct Am {
    iq_down: IqDownsampler,
    am: AmDemodulator,
    audio_filter: FirFilter,
}

impl Am {
    pub fn new(bandwidth: f32) -> Self {
        let coeffs = lowpass_fir_coeffs(OUT_RATE as f64, (bandwidth / 2.0) as f64, 351);
        Am {
            iq_down: IqDownsampler::new(IN_RATE, OUT_RATE, 161),
            am: AmDemodulator::new(),
            audio_filter: FirFilter::new(&coeffs, 1),
        }
    }
}

impl Demodulator for Am {
    fn demodulate(&mut self, i: &[f32], q: &[f32], _in_stereo: bool) -> DemodOutput {
        let signal_level = signal_level_from_power(i, q);
        let interleaved: Vec<f32> = i.iter().zip(q.iter()).flat_map(|(&a, &b)| [a, b]).collect();
        let (di, dq) = self.iq_down.downsample(&interleaved);
        let (envelope, _carrier) = self.am.demod(&di, &dq);

        self.audio_filter.load(&envelope);
        let mono: Vec<f32> = (0..self.audio_filter.input_len())
            .map(|k| self.audio_filter.get(k))
            .collect();
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
        let tone_hz = 400.0f32;
        let i: Vec<f32> = (0..n)
            .map(|k| 1.0 + 0.5 * (2.0 * std::f32::consts::PI * tone_hz * k as f32 / rate).sin())
            .collect();
        let q = vec![0.0f32; n];
        let mut am = Am::new(5_000.0);
        let out = am.demodulate(&i, &q, false);
        assert!(!out.left.is_empty());
        assert_eq!(out.left.len(), out.right.len());
    }
}

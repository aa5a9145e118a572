//! Wideband FM with stereo pilot recovery and de-emphasis.

use super::{signal_level_from_power, DemodOutput, Demodulator, IN_RATE, OUT_RATE};
use crate::dsp::{Deemphasis, Downsampler, FirFilter, FmDemodulator, IqDownsampler, StereoSeparator};

const INTER_RATE: u32 = 336_000;
const MAX_F: f32 = 75_000.0;
const DEEMPH_TAU_US: f32 = 50.0;

pub struct Wbfm {
    iq_down: IqDownsampler,
    fm: FmDemodulator,
    noise_filter: FirFilter,
    stereo: StereoSeparator,
    mono_down: Downsampler,
    side_down: Downsampler,
    deemph_l: Deemphasis,
    deemph_r: Deemphasis,
}

impl Wbfm {
    pub fn new() -> Self {
        let noise_coeffs =
            crate::dsp::lowpass_fir_coeffs(INTER_RATE as f64, (0.9 * MAX_F) as f64, 101);
        Wbfm {
            iq_down: IqDownsampler::new(IN_RATE, INTER_RATE, 161),
            fm: FmDemodulator::new(INTER_RATE, MAX_F),
            noise_filter: FirFilter::new(&noise_coeffs, 1),
            stereo: StereoSeparator::new(INTER_RATE),
            mono_down: Downsampler::new(INTER_RATE, OUT_RATE, 41),
            side_down: Downsampler::new(INTER_RATE, OUT_RATE, 41),
            deemph_l: Deemphasis::new(OUT_RATE as f32, DEEMPH_TAU_US),
            deemph_r: Deemphasis::new(OUT_RATE as f32, DEEMPH_TAU_US),
        }
    }
}

impl Default for Wbfm {
    fn default() -> Self {
        Self::new()
    }
}

impl Demodulator for Wbfm {
    fn demodulate(&mut self, i: &[f32], q: &[f32], in_stereo: bool) -> DemodOutput {
        let signal_level = signal_level_from_power(i, q);
        let (di, dq) = self.iq_down.downsample(
            &i.iter().zip(q.iter()).flat_map(|(&a, &b)| [a, b]).collect::<Vec<f32>>(),
        );
        let (composite, _carrier) = self.fm.demod(&di, &dq);

        self.noise_filter.load(&composite);
        let filtered: Vec<f32> = (0..self.noise_filter.input_len())
            .map(|k| self.noise_filter.get(k))
            .collect();

        let side = if in_stereo {
            Some(self.stereo.process(&filtered))
        } else {
            None
        };

        let mut mono_out = self.mono_down.downsample(&filtered);
        let found = self.stereo.locked();

        let (mut left, mut right, stereo) = if let (true, Some(side)) = (in_stereo && found, side)
        {
            let side_out = self.side_down.downsample(&side);
            let len = mono_out.len().min(side_out.len());
            let left: Vec<f32> = (0..len).map(|k| mono_out[k] + side_out[k]).collect();
            let right: Vec<f32> = (0..len).map(|k| mono_out[k] - side_out[k]).collect();
            (left, right, true)
        } else {
            let right = mono_out.clone();
            (std::mem::take(&mut mono_out), right, false)
        };

        self.deemph_l.process_block(&mut left);
        self.deemph_r.process_block(&mut right);

        DemodOutput {
            left,
            right,
            stereo,
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
        let mut phase = 0.0f64;
        let mut i = Vec::with_capacity(n);
        let mut q = Vec::with_capacity(n);
        for k in 0..n {
            let t = k as f64 / IN_RATE as f64;
            let tone = (2.0 * std::f64::consts::PI * 1000.0 * t).sin();
            phase += 2.0 * std::f64::consts::PI * 30_000.0 * tone / IN_RATE as f64;
            i.push(phase.cos() as f32);
            q.push(phase.sin() as f32);
        }
        let mut wbfm = Wbfm::new();
        let out = wbfm.demodulate(&i, &q, false);
        assert!(!out.left.is_empty());
        assert_eq!(out.left.len(), out.right.len());
    }
}

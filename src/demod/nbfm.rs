//! Narrowband FM: no stereo, no de-emphasis, intermediate rate scaled to the
//! requested deviation.

use super::{signal_level_from_power, DemodOutput, Demodulator, IN_RATE, OUT_RATE};
use crate::dsp::{lowpass_fir_coeffs, Downsampler, FirFilter, FmDemodulator, IqDownsampler};

pub struct Nbfm {
    iq_down: IqDownsampler,
    fm: FmDemodulator,
    bandpass: FirFilter,
    final_down: Downsampler,
}

fn inter_rate(max_f: f32) -> u32 {
    let multiple = 1 + (((max_f - 1.0) * 7.0) / 75_000.0).floor() as u32;
    OUT_RATE * multiple
}

impl Nbfm {
    pub fn new(max_f: f32) -> Self {
        let inter = inter_rate(max_f);
        let bandpass_coeffs = lowpass_fir_coeffs(inter as f64, (0.8 * max_f) as f64, 101);
        let final_coeffs = lowpass_fir_coeffs(inter as f64, 8_000.0, 41);
        Nbfm {
            iq_down: IqDownsampler::new(IN_RATE, inter, 161),
            fm: FmDemodulator::new(inter, max_f),
            bandpass: FirFilter::new(&bandpass_coeffs, 1),
            final_down: Downsampler::with_coeffs(inter, OUT_RATE, &final_coeffs),
        }
    }
}

impl Demodulator for Nbfm {
    fn demodulate(&mut self, i: &[f32], q: &[f32], _in_stereo: bool) -> DemodOutput {
        let signal_level = signal_level_from_power(i, q);
        let interleaved: Vec<f32> = i.iter().zip(q.iter()).flat_map(|(&a, &b)| [a, b]).collect();
        let (di, dq) = self.iq_down.downsample(&interleaved);
        let (composite, _carrier) = self.fm.demod(&di, &dq);

        self.bandpass.load(&composite);
        let filtered: Vec<f32> = (0..self.bandpass.input_len())
            .map(|k| self.bandpass.get(k))
            .collect();

        let mono = self.final_down.downsample(&filtered);
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
    fn inter_rate_matches_wbfm_at_max_deviation() {
        assert_eq!(inter_rate(75_000.0), 336_000);
    }

    #[test]
    fn inter_rate_is_out_rate_for_narrow_deviation() {
        assert_eq!(inter_rate(2_500.0), OUT_RATE);
    }

    #[test]
    fn demodulates_a_block_without_panicking() {
        let n = (IN_RATE / 5) as usize;
        let mut phase = 0.0f64;
        let mut i = Vec::with_capacity(n);
        let mut q = Vec::with_capacity(n);
        for k in 0..n {
            let t = k as f64 / IN_RATE as f64;
            let tone = (2.0 * std::f64::consts::PI * 1000.0 * t).sin();
            phase += 2.0 * std::f64::consts::PI * 2_000.0 * tone / IN_RATE as f64;
            i.push(phase.cos() as f32);
            q.push(phase.sin() as f32);
        }
        let mut nbfm = Nbfm::new(5_000.0);
        let out = nbfm.demodulate(&i, &q, false);
        assert!(!out.left.is_empty());
    }
}

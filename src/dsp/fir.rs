//! Windowed-sinc FIR design and the filtering primitive every downsampler
//! and demodulator in this crate is built from.

use std::f64::consts::PI;

/// Design a lowpass FIR with cutoff `cutoff_hz` at sample rate `rate_hz`,
/// forcing an odd tap count and a Blackman-Harris-like window. Coefficients
/// are normalized to unity DC gain.
pub fn lowpass_fir_coeffs(rate_hz: f64, cutoff_hz: f64, len: usize) -> Vec<f32> {
    let len = if len % 2 == 0 { len + 1 } else { len };
    let m = (len - 1) as f64;
    let fc = cutoff_hz / rate_hz;
    let mut coeffs = vec![0.0f64; len];
    for (n, c) in coeffs.iter_mut().enumerate() {
        let k = n as f64 - m / 2.0;
        let sinc = if k == 0.0 {
            2.0 * fc
        } else {
            (2.0 * PI * fc * k).sin() / (PI * k)
        };
        let theta = 2.0 * PI * n as f64 / m;
        let window = 0.42 - 0.5 * theta.cos() + 0.08 * (2.0 * theta).cos();
        *c = sinc * window;
    }
    let sum: f64 = coeffs.iter().sum();
    coeffs.iter().map(|c| (c / sum) as f32).collect()
}

/// Odd-index-only windowed-sinc Hilbert transformer: even taps are zero by
/// construction, odd taps alternate sign as `2/(pi*k)`.
pub fn hilbert_fir_coeffs(len: usize) -> Vec<f32> {
    let len = if len % 2 == 0 { len + 1 } else { len };
    let m = (len as i64 - 1) / 2;
    let mut coeffs = vec![0.0f64; len];
    for k in -m..=m {
        if k % 2 == 0 {
            continue;
        }
        let idx = (k + m) as usize;
        let ideal = 2.0 / (PI * k as f64);
        let theta = 2.0 * PI * idx as f64 / (len as f64 - 1.0);
        let window = 0.42 - 0.5 * theta.cos() + 0.08 * (2.0 * theta).cos();
        coeffs[idx] = ideal * window;
    }
    coeffs.iter().map(|c| *c as f32).collect()
}

/// A FIR filter over a stream processed in blocks. Coefficients are reversed
/// once at construction; the only mutable state is a history ring of
/// `(len-1)*step` previous samples from the last `load`.
///
/// `get` is the single hottest loop in the whole pipeline (every demodulator
/// calls it once per output sample); keep it branch-free and allocation-free.
pub struct FirFilter {
    coeffs_rev: Vec<f32>,
    step: usize,
    history: Vec<f32>,
    buffer: Vec<f32>,
}

impl FirFilter {
    pub fn new(coeffs: &[f32], step: usize) -> Self {
        let mut coeffs_rev = coeffs.to_vec();
        coeffs_rev.reverse();
        let hist_len = (coeffs_rev.len() - 1) * step;
        FirFilter {
            coeffs_rev,
            step,
            history: vec![0.0; hist_len],
            buffer: Vec::new(),
        }
    }

    /// Loads a new block of samples behind the retained history; subsequent
    /// `get` calls index into `history ++ samples`.
    pub fn load(&mut self, samples: &[f32]) {
        self.buffer.clear();
        self.buffer.extend_from_slice(&self.history);
        self.buffer.extend_from_slice(samples);
        let hist_len = self.history.len();
        let total = self.buffer.len();
        if total >= hist_len {
            self.history.copy_from_slice(&self.buffer[total - hist_len..]);
        }
    }

    /// Number of samples in the last `load`'s block (excluding history).
    pub fn input_len(&self) -> usize {
        self.buffer.len() - self.history.len()
    }

    #[inline]
    pub fn get(&self, i: usize) -> f32 {
        let mut acc = 0.0f32;
        for (k, c) in self.coeffs_rev.iter().enumerate() {
            acc += c * self.buffer[i + k * self.step];
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_unity_dc_gain() {
        let coeffs = lowpass_fir_coeffs(1_024_000.0, 10_000.0, 61);
        let sum: f32 = coeffs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "sum was {}", sum);
    }

    #[test]
    fn lowpass_forces_odd_length_and_symmetry() {
        let coeffs = lowpass_fir_coeffs(1_024_000.0, 10_000.0, 60);
        assert_eq!(coeffs.len(), 61);
        let n = coeffs.len();
        for i in 0..n / 2 {
            assert!(
                (coeffs[i] - coeffs[n - 1 - i]).abs() < 1e-5,
                "not symmetric at {}",
                i
            );
        }
    }

    #[test]
    fn lowpass_attenuates_above_cutoff() {
        let rate = 1_024_000.0;
        let coeffs = lowpass_fir_coeffs(rate, 10_000.0, 61);
        let mut filter = FirFilter::new(&coeffs, 1);
        let gain_at = |filter: &mut FirFilter, freq: f64| -> f32 {
            let n = 4096;
            let samples: Vec<f32> = (0..n)
                .map(|i| (2.0 * PI * freq * i as f64 / rate).sin() as f32)
                .collect();
            filter.load(&samples);
            let mut peak = 0.0f32;
            for i in 200..filter.input_len() {
                peak = peak.max(filter.get(i).abs());
            }
            peak
        };
        let pass = gain_at(&mut filter, 1_000.0);
        let stop = gain_at(&mut filter, 50_000.0);
        assert!(pass > 0.85, "passband gain too low: {}", pass);
        // -40dB = factor of 0.01
        assert!(stop < pass * 0.02, "stopband not attenuated: {} vs {}", stop, pass);
    }

    #[test]
    fn downsampler_linearity() {
        use super::super::downsample::Downsampler;
        let n = 2048;
        let a: Vec<f32> = (0..n).map(|i| (i as f32 * 0.01).sin()).collect();
        let b: Vec<f32> = (0..n).map(|i| (i as f32 * 0.03).cos()).collect();
        let (alpha, beta) = (0.7f32, -1.3f32);
        let combo: Vec<f32> = a.iter().zip(&b).map(|(x, y)| alpha * x + beta * y).collect();

        let mut d1 = Downsampler::new(48_000, 8_000, 41);
        let mut d2 = Downsampler::new(48_000, 8_000, 41);
        let mut d3 = Downsampler::new(48_000, 8_000, 41);
        let out_a = d1.downsample(&a);
        let out_b = d2.downsample(&b);
        let out_combo = d3.downsample(&combo);

        let edge = (41 - 1) / 2 + 2;
        for i in edge..out_combo.len().saturating_sub(edge) {
            let expected = alpha * out_a[i] + beta * out_b[i];
            assert!(
                (out_combo[i] - expected).abs() < 1e-4,
                "index {}: {} vs {}",
                i,
                out_combo[i],
                expected
            );
        }
    }
}

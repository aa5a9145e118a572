//! Single-channel and IQ polyphase-style downsampling.

use super::fir::{lowpass_fir_coeffs, FirFilter};

/// Lowpass-filters and decimates a single real-valued stream from `in_rate`
/// to `out_rate`. The stride is fractional; each output index reads the
/// filter at the nearest preceding integer tap rather than interpolating.
pub struct Downsampler {
    filter: FirFilter,
    stride: f64,
}

impl Downsampler {
    pub fn new(in_rate: u32, out_rate: u32, fir_len: usize) -> Self {
        let coeffs = lowpass_fir_coeffs(in_rate as f64, out_rate as f64 / 2.0, fir_len);
        Downsampler {
            filter: FirFilter::new(&coeffs, 1),
            stride: in_rate as f64 / out_rate as f64,
        }
    }

    pub fn with_coeffs(in_rate: u32, out_rate: u32, coeffs: &[f32]) -> Self {
        Downsampler {
            filter: FirFilter::new(coeffs, 1),
            stride: in_rate as f64 / out_rate as f64,
        }
    }

    pub fn downsample(&mut self, samples: &[f32]) -> Vec<f32> {
        self.filter.load(samples);
        let available = self.filter.input_len();
        let count = (available as f64 / self.stride).floor() as usize;
        (0..count)
            .map(|j| {
                let idx = (j as f64 * self.stride).floor() as usize;
                self.filter.get(idx.min(available - 1))
            })
            .collect()
    }
}

/// Downsamples an interleaved IQ stream, sharing a single FIR (stepping by 2
/// through the interleaved buffer) so I and Q are filtered in one pass.
pub struct IqDownsampler {
    filter: FirFilter,
    stride: f64,
}

impl IqDownsampler {
    pub fn new(in_rate: u32, out_rate: u32, fir_len: usize) -> Self {
        let coeffs = lowpass_fir_coeffs(in_rate as f64, out_rate as f64 / 2.0, fir_len);
        IqDownsampler {
            filter: FirFilter::new(&coeffs, 2),
            stride: in_rate as f64 / out_rate as f64,
        }
    }

    /// `iq` is interleaved I0,Q0,I1,Q1,...; returns separate I and Q vectors.
    pub fn downsample(&mut self, iq: &[f32]) -> (Vec<f32>, Vec<f32>) {
        self.filter.load(iq);
        let pairs = self.filter.input_len() / 2;
        let count = (pairs as f64 / self.stride).floor() as usize;
        let mut i_out = Vec::with_capacity(count);
        let mut q_out = Vec::with_capacity(count);
        for j in 0..count {
            let pair_idx = ((j as f64 * self.stride).floor() as usize).min(pairs - 1);
            let idx = pair_idx * 2;
            i_out.push(self.filter.get(idx));
            q_out.push(self.filter.get(idx + 1));
        }
        (i_out, q_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iq_downsample_produces_matched_lengths() {
        let n = 4096;
        let iq: Vec<f32> = (0..n * 2).map(|i| (i as f32 * 0.01).sin()).collect();
        let mut ds = IqDownsampler::new(1_024_000, 170_000, 41);
        let (i, q) = ds.downsample(&iq);
        assert_eq!(i.len(), q.len());
        assert!(i.len() > 0);
    }
}

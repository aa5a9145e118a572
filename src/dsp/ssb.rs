//! SSB phasing-method demodulator.

use super::expavg::ExpAverager;
use super::fir::{hilbert_fir_coeffs, lowpass_fir_coeffs, FirFilter};

/// Selects which sideband `SsbDemodulator` recovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sideband {
    Upper,
    Lower,
}

/// Hilbert transform on Q, a matched delay on I, sideband combine, a bandpass
/// smoothing FIR, and a slow/fast envelope pair driving an AGC gain.
pub struct SsbDemodulator {
    hilbert: FirFilter,
    delay: Vec<f32>,
    bandpass: FirFilter,
    sideband: Sideband,
    slow: ExpAverager,
    fast: ExpAverager,
}

const HILBERT_TAPS: usize = 31;

impl SsbDemodulator {
    pub fn new(rate_hz: u32, filter_freq: f32, sideband: Sideband) -> Self {
        let hilbert_coeffs = hilbert_fir_coeffs(HILBERT_TAPS);
        let bandpass_coeffs = lowpass_fir_coeffs(rate_hz as f64, filter_freq as f64, 151);
        SsbDemodulator {
            hilbert: FirFilter::new(&hilbert_coeffs, 1),
            delay: vec![0.0; (HILBERT_TAPS - 1) / 2],
            bandpass: FirFilter::new(&bandpass_coeffs, 1),
            sideband,
            slow: ExpAverager::new(800.0),
            fast: ExpAverager::new(40.0),
        }
    }

    pub fn demod(&mut self, i: &[f32], q: &[f32]) -> (Vec<f32>, bool) {
        assert_eq!(i.len(), q.len());
        self.hilbert.load(q);
        let q_hilbert: Vec<f32> = (0..self.hilbert.input_len())
            .map(|k| self.hilbert.get(k))
            .collect();

        // Delay I to match the Hilbert transformer's group delay.
        let half = self.delay.len();
        let mut i_delayed = Vec::with_capacity(i.len());
        i_delayed.extend_from_slice(&self.delay);
        i_delayed.extend_from_slice(i);
        if i.len() >= half {
            self.delay.copy_from_slice(&i[i.len() - half..]);
        } else {
            self.delay.rotate_left(i.len());
            let tail = self.delay.len() - i.len();
            self.delay[tail..].copy_from_slice(i);
        }

        let combined: Vec<f32> = (0..q_hilbert.len())
            .map(|k| match self.sideband {
                Sideband::Upper => i_delayed[k] - q_hilbert[k],
                Sideband::Lower => i_delayed[k] + q_hilbert[k],
            })
            .collect();

        self.bandpass.load(&combined);
        let mut out = Vec::with_capacity(self.bandpass.input_len());
        let mut energy = 0.0f32;
        for k in 0..self.bandpass.input_len() {
            let sample = self.bandpass.get(k);
            let mag = sample.abs();
            let slow = self.slow.add(mag);
            let fast = self.fast.add(mag);
            energy += mag;
            let gain = if slow > 1e-6 { fast / slow } else { 1.0 };
            out.push(sample * gain);
        }
        let mean = if out.is_empty() {
            0.0
        } else {
            energy / out.len() as f32
        };
        (out, mean > 0.01)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_without_panicking() {
        let rate = 48_000u32;
        let n = 4096;
        let i: Vec<f32> = (0..n)
            .map(|k| (2.0 * std::f32::consts::PI * 1000.0 * k as f32 / rate as f32).cos())
            .collect();
        let q: Vec<f32> = (0..n)
            .map(|k| (2.0 * std::f32::consts::PI * 1000.0 * k as f32 / rate as f32).sin())
            .collect();
        let mut demod = SsbDemodulator::new(rate, 3000.0, Sideband::Upper);
        let (out, carrier) = demod.demod(&i, &q);
        assert_eq!(out.len(), n);
        assert!(carrier);
    }

    #[test]
    fn lower_and_upper_sidebands_differ() {
        let rate = 48_000u32;
        let n = 2048;
        let i: Vec<f32> = (0..n)
            .map(|k| (2.0 * std::f32::consts::PI * 1000.0 * k as f32 / rate as f32).cos())
            .collect();
        let q: Vec<f32> = (0..n)
            .map(|k| (2.0 * std::f32::consts::PI * 1000.0 * k as f32 / rate as f32).sin())
            .collect();
        let mut upper = SsbDemodulator::new(rate, 3000.0, Sideband::Upper);
        let mut lower = SsbDemodulator::new(rate, 3000.0, Sideband::Lower);
        let (out_u, _) = upper.demod(&i, &q);
        let (out_l, _) = lower.demod(&i, &q);
        let diff: f32 = out_u
            .iter()
            .zip(out_l.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(diff > 1e-3);
    }
}

//! FM frequency discriminator.

use std::f32::consts::PI;

/// Minimum per-block mean squared amplitude (I^2+Q^2 averaged over the
/// block) above which a carrier is considered present.
const CARRIER_THRESHOLD: f32 = 0.002;

/// Quadrature FM demodulator: `delta_phi = atan2(cross, dot)` of each sample
/// against the previous one, scaled so a `maxF` Hz deviation maps to +/-1.
pub struct FmDemodulator {
    gain: f32,
    prev_i: f32,
    prev_q: f32,
}

impl FmDemodulator {
    pub fn new(out_rate: u32, max_f: f32) -> Self {
        FmDemodulator {
            gain: out_rate as f32 / (2.0 * PI * max_f),
            prev_i: 1.0,
            prev_q: 0.0,
        }
    }

    /// Returns the demodulated block and whether a carrier was present.
    pub fn demod(&mut self, i: &[f32], q: &[f32]) -> (Vec<f32>, bool) {
        assert_eq!(i.len(), q.len());
        let len = i.len();
        let mut out = Vec::with_capacity(len);
        let mut energy = 0.0f32;
        let (mut prev_i, mut prev_q) = (self.prev_i, self.prev_q);
        for k in 0..len {
            let (ci, cq) = (i[k], q[k]);
            let cross = cq * prev_i - ci * prev_q;
            let dot = ci * prev_i + cq * prev_q;
            out.push(cross.atan2(dot) * self.gain);
            energy += ci * ci + cq * cq;
            prev_i = ci;
            prev_q = cq;
        }
        self.prev_i = prev_i;
        self.prev_q = prev_q;
        let carrier = energy > CARRIER_THRESHOLD * len as f32;
        (out, carrier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthesize `cos(2*pi*int(m)), sin(2*pi*int(m))` and check the
    /// discriminator reconstructs `m` up to scale and a DC offset.
    #[test]
    fn recovers_audio_tone() {
        let rate = 240_000u32;
        let max_f = 75_000.0f32;
        let tone_hz = 1_000.0f32;
        let dev = 50_000.0f32;
        let n = 4800;
        let mut phase = 0.0f64;
        let mut i = Vec::with_capacity(n);
        let mut q = Vec::with_capacity(n);
        let mut m = Vec::with_capacity(n);
        for k in 0..n {
            let t = k as f64 / rate as f64;
            let tone = (2.0 * std::f64::consts::PI * tone_hz as f64 * t).sin() as f32;
            m.push(tone);
            phase += 2.0 * std::f64::consts::PI * (dev * tone) as f64 / rate as f64;
            i.push(phase.cos() as f32);
            q.push(phase.sin() as f32);
        }
        let mut demod = FmDemodulator::new(rate, max_f);
        let (out, carrier) = demod.demod(&i, &q);
        assert!(carrier);

        // Pearson correlation between input tone and recovered signal.
        let mean_m: f32 = m.iter().sum::<f32>() / n as f32;
        let mean_o: f32 = out.iter().sum::<f32>() / n as f32;
        let mut num = 0.0f64;
        let mut den_m = 0.0f64;
        let mut den_o = 0.0f64;
        for k in 0..n {
            let dm = (m[k] - mean_m) as f64;
            let do_ = (out[k] - mean_o) as f64;
            num += dm * do_;
            den_m += dm * dm;
            den_o += do_ * do_;
        }
        let corr = num / (den_m.sqrt() * den_o.sqrt());
        assert!(corr > 0.99, "correlation was {}", corr);
    }

    #[test]
    fn silence_has_no_carrier() {
        let mut demod = FmDemodulator::new(48_000, 75_000.0);
        let i = vec![0.0f32; 1000];
        let q = vec![0.0f32; 1000];
        let (_out, carrier) = demod.demod(&i, &q);
        assert!(!carrier);
    }
}

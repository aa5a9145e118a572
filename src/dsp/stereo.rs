//! 19 kHz pilot tracking and L-R side-band recovery for WBFM stereo.

use super::expavg::ExpAverager;

const PILOT_FREQ: f32 = 19_000.0;
/// 8001 bins covering a +/-40 Hz range around the pilot at 0.01 Hz resolution.
const TABLE_BINS: usize = 8001;
const TABLE_CENTER: usize = (TABLE_BINS - 1) / 2;
const TABLE_STEP_HZ: f32 = 0.01;
/// Lock quality threshold: mean squared discriminator error below this
/// is considered locked.
const LOCK_THRESHOLD: f32 = 4.0;

/// Tracks the 19 kHz stereo pilot with a table-driven local oscillator and
/// recovers the L-R side-band, modulated on the doubled pilot at 38 kHz.
pub struct StereoSeparator {
    phase_inc_table: Vec<f32>,
    bin_index: usize,
    phase: f32,
    i_avg: ExpAverager,
    q_avg: ExpAverager,
    corr2_avg: ExpAverager,
    found: bool,
}

impl StereoSeparator {
    pub fn new(rate_hz: u32) -> Self {
        let rate = rate_hz as f32;
        let phase_inc_table: Vec<f32> = (0..TABLE_BINS)
            .map(|bin| {
                let offset_hz = (bin as f32 - TABLE_CENTER as f32) * TABLE_STEP_HZ;
                2.0 * std::f32::consts::PI * (PILOT_FREQ + offset_hz) / rate
            })
            .collect();
        StereoSeparator {
            phase_inc_table,
            bin_index: TABLE_CENTER,
            phase: 0.0,
            i_avg: ExpAverager::new(1000.0),
            q_avg: ExpAverager::new(1000.0),
            corr2_avg: ExpAverager::new(1000.0),
            found: false,
        }
    }

    pub fn locked(&self) -> bool {
        self.found
    }

    /// Processes one block of the composite (pre-de-emphasis) baseband and
    /// returns the recovered L-R side-band, still centered on 38 kHz.
    pub fn process(&mut self, composite: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(composite.len());
        for &x in composite {
            let sin_c = self.phase.sin();
            let cos_c = self.phase.cos();

            let i_val = self.i_avg.add(x * cos_c);
            let q_val = self.q_avg.add(x * sin_c);
            let ratio = if i_val.abs() > 1e-6 {
                q_val / i_val
            } else {
                0.0
            };
            let clamped = ratio.clamp(-4.0, 4.0);
            self.corr2_avg.add(ratio * ratio);
            self.found = self.corr2_avg.value() < LOCK_THRESHOLD;

            let offset_hz = clamped * 10.0;
            let idx = ((offset_hz + TABLE_CENTER as f32 * TABLE_STEP_HZ) / TABLE_STEP_HZ).round();
            self.bin_index = (idx as isize).clamp(0, TABLE_BINS as isize - 1) as usize;

            out.push(x * sin_c * cos_c * 2.0);

            self.phase += self.phase_inc_table[self.bin_index];
            if self.phase > std::f32::consts::PI {
                self.phase -= 2.0 * std::f32::consts::PI;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composite(n: usize, rate: f32, pilot_amp: f32) -> Vec<f32> {
        (0..n)
            .map(|k| {
                let t = k as f32 / rate;
                let l = (2.0 * std::f32::consts::PI * 400.0 * t).sin();
                let r = (2.0 * std::f32::consts::PI * 600.0 * t).sin();
                let pilot = pilot_amp * (2.0 * std::f32::consts::PI * PILOT_FREQ * t).cos();
                let side = 0.45 * (l - r) * (2.0 * std::f32::consts::PI * 2.0 * PILOT_FREQ * t).cos();
                0.45 * (l + r) + pilot + side
            })
            .collect()
    }

    #[test]
    fn locks_when_pilot_present() {
        let rate = 336_000.0;
        let samples = composite(20_000, rate, 0.1);
        let mut sep = StereoSeparator::new(rate as u32);
        let out = sep.process(&samples);
        assert_eq!(out.len(), samples.len());
        assert!(sep.locked(), "expected pilot lock");
    }

    #[test]
    fn no_lock_without_pilot() {
        let rate = 336_000.0;
        let samples = composite(20_000, rate, 0.0);
        let mut sep = StereoSeparator::new(rate as u32);
        sep.process(&samples);
        assert!(!sep.locked());
    }
}

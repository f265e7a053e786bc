use crate::engine::dsp::gain_curve::{amplitude_to_db, SILENCE_DB};

/// Length of one metering window.
pub const METER_WINDOW_SECS: f32 = 0.016;

/// Peak levels over one metering window, in dBFS floored at -100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelReport {
    pub in_l: f32,
    pub in_r: f32,
    pub out_l: f32,
    pub out_r: f32,
}

impl LevelReport {
    pub const SILENT: Self = Self {
        in_l: SILENCE_DB,
        in_r: SILENCE_DB,
        out_l: SILENCE_DB,
        out_r: SILENCE_DB,
    };

    /// Loudest of each field across two reports.
    pub fn max(self, other: Self) -> Self {
        Self {
            in_l: self.in_l.max(other.in_l),
            in_r: self.in_r.max(other.in_r),
            out_l: self.out_l.max(other.out_l),
            out_r: self.out_r.max(other.out_r),
        }
    }
}

impl Default for LevelReport {
    fn default() -> Self {
        Self::SILENT
    }
}

/// Collects input/output peaks per channel and closes a window every
/// `window` samples, whatever the host block size is.
#[derive(Debug, Clone)]
pub struct MeterAggregator {
    window: u32,
    elapsed: u32,
    in_peak: [f32; 2],
    out_peak: [f32; 2],
}

impl MeterAggregator {
    pub fn new(sample_rate: f32) -> Self {
        Self::with_window((METER_WINDOW_SECS * sample_rate).round() as u32)
    }

    pub fn with_window(window: u32) -> Self {
        Self {
            window: window.max(1),
            elapsed: 0,
            in_peak: [0.0; 2],
            out_peak: [0.0; 2],
        }
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Records one frame. Returns a report when this frame closes a window.
    #[inline]
    pub fn record(&mut self, input: (f32, f32), output: (f32, f32)) -> Option<LevelReport> {
        self.in_peak[0] = self.in_peak[0].max(input.0.abs());
        self.in_peak[1] = self.in_peak[1].max(input.1.abs());
        self.out_peak[0] = self.out_peak[0].max(output.0.abs());
        self.out_peak[1] = self.out_peak[1].max(output.1.abs());

        self.elapsed += 1;
        if self.elapsed < self.window {
            return None;
        }

        let report = LevelReport {
            in_l: amplitude_to_db(self.in_peak[0]),
            in_r: amplitude_to_db(self.in_peak[1]),
            out_l: amplitude_to_db(self.out_peak[0]),
            out_r: amplitude_to_db(self.out_peak[1]),
        };
        self.reset();
        Some(report)
    }

    pub fn reset(&mut self) {
        self.elapsed = 0;
        self.in_peak = [0.0; 2];
        self.out_peak = [0.0; 2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_sixteen_ms() {
        assert_eq!(MeterAggregator::new(48_000.0).window(), 768);
        assert_eq!(MeterAggregator::new(44_100.0).window(), 706);
    }

    #[test]
    fn reports_once_per_window_regardless_of_chunking() {
        for &block in &[1usize, 7, 128, 500, 2048] {
            let mut meter = MeterAggregator::with_window(768);
            let mut reports = 0;
            let mut processed = 0;
            while processed < 768 * 10 {
                let n = block.min(768 * 10 - processed);
                for _ in 0..n {
                    if meter.record((0.5, 0.25), (0.1, 0.1)).is_some() {
                        reports += 1;
                    }
                }
                processed += n;
            }
            assert_eq!(reports, 10, "block size {}", block);
        }
    }

    #[test]
    fn report_carries_window_peaks_then_resets() {
        let mut meter = MeterAggregator::with_window(4);
        meter.record((0.5, -1.0), (0.25, 0.0));
        meter.record((0.1, 0.1), (0.1, 0.1));
        meter.record((0.1, 0.1), (0.1, 0.1));
        let report = meter.record((0.0, 0.0), (0.0, 0.0)).unwrap();

        assert!((report.in_l + 6.0206).abs() < 1e-3);
        assert!(report.in_r.abs() < 1e-6);
        assert!((report.out_l + 12.0412).abs() < 1e-3);
        assert!((report.out_r + 20.0).abs() < 1e-3);

        for _ in 0..3 {
            assert!(meter.record((0.0, 0.0), (0.0, 0.0)).is_none());
        }
        assert_eq!(meter.record((0.0, 0.0), (0.0, 0.0)), Some(LevelReport::SILENT));
    }
}

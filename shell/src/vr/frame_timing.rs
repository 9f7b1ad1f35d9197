//! Frame timing for the shell's host loop.
//!
//! Tracks the interval between frame ticks and the time spent updating
//! the components, with rolling percentiles for IPC reporting.

/// Rolling frame timing statistics over a window of samples.
#[derive(Debug)]
pub struct FrameTiming {
    /// Time between consecutive frame ticks.
    pub interval_times: Vec<f64>,
    /// Time spent in component updates per tick.
    pub update_times: Vec<f64>,
    /// Maximum number of samples to keep.
    pub window_size: usize,
    pub total_frames: u64,
    /// Ticks whose interval exceeded the frame budget.
    pub missed_frames: u64,
    /// Frame budget in milliseconds (e.g. 11.1 for 90Hz).
    pub budget_ms: f64,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new(1000, 11.1)
    }
}

impl FrameTiming {
    pub fn new(window_size: usize, budget_ms: f64) -> Self {
        Self {
            interval_times: Vec::with_capacity(window_size),
            update_times: Vec::with_capacity(window_size),
            window_size,
            total_frames: 0,
            missed_frames: 0,
            budget_ms,
        }
    }

    /// Budget for a given frame rate.
    pub fn for_rate(frame_rate_hz: u32) -> Self {
        Self::new(1000, 1000.0 / frame_rate_hz.max(1) as f64)
    }

    pub fn record_frame(&mut self, interval_ms: f64, update_ms: f64) {
        Self::push_sample(&mut self.interval_times, interval_ms, self.window_size);
        Self::push_sample(&mut self.update_times, update_ms, self.window_size);

        self.total_frames += 1;
        if interval_ms > self.budget_ms {
            self.missed_frames += 1;
        }
    }

    fn push_sample(samples: &mut Vec<f64>, value: f64, window_size: usize) {
        samples.push(value);
        if samples.len() > window_size {
            samples.remove(0);
        }
    }

    /// Percentile from a sorted slice.
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let idx = ((sorted.len() as f64 - 1.0) * p / 100.0).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    fn sorted(samples: &[f64]) -> Vec<f64> {
        let mut v = samples.to_vec();
        v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        v
    }

    pub fn stats(&self) -> FrameTimingStats {
        let interval = Self::sorted(&self.interval_times);
        let update = Self::sorted(&self.update_times);
        let interval_p50 = Self::percentile(&interval, 50.0);

        FrameTimingStats {
            interval_p50,
            interval_p99: Self::percentile(&interval, 99.0),
            update_p50: Self::percentile(&update, 50.0),
            update_p99: Self::percentile(&update, 99.0),
            fps: if interval_p50 > 0.0 {
                1000.0 / interval_p50
            } else {
                0.0
            },
            missed_pct: if self.total_frames > 0 {
                (self.missed_frames as f64 / self.total_frames as f64) * 100.0
            } else {
                0.0
            },
            total_frames: self.total_frames,
            missed_frames: self.missed_frames,
        }
    }

    pub fn stats_sexp(&self) -> String {
        let s = self.stats();
        format!(
            "(:interval-p50 {:.1} :interval-p99 {:.1} :update-p50 {:.2} :update-p99 {:.2} :missed-pct {:.1} :fps {:.0} :total-frames {} :missed-frames {})",
            s.interval_p50, s.interval_p99, s.update_p50, s.update_p99,
            s.missed_pct, s.fps, s.total_frames, s.missed_frames,
        )
    }
}

/// Computed frame timing statistics.
#[derive(Debug, Clone)]
pub struct FrameTimingStats {
    pub interval_p50: f64,
    pub interval_p99: f64,
    pub update_p50: f64,
    pub update_p99: f64,
    pub fps: f64,
    pub missed_pct: f64,
    pub total_frames: u64,
    pub missed_frames: u64,
}

// src/clock.rs
//
// Deterministic sampling clock.
//
// A clock fires at `time_start + k * period` for k = 0, 1, 2, ...
// Boundaries that were skipped over (because the caller jumped forward by
// more than one period) are not replayed: the next boundary is always the
// first one strictly after the time of the last firing.

/// Relative slack used when comparing a time against a boundary, so that
/// `10 * 0.01` still counts as having reached `0.1`.
const BOUNDARY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct Clock {
    period: f64,
    time_start: f64,
    next_index: u64,
}

impl Clock {
    pub fn new(period: f64, time_start: f64) -> Self {
        Self {
            period,
            time_start,
            next_index: 0,
        }
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn time_start(&self) -> f64 {
        self.time_start
    }

    /// Time of the next sampling boundary.
    pub fn next_boundary(&self) -> f64 {
        self.time_start + self.next_index as f64 * self.period
    }

    /// True exactly when `time` has reached a boundary that has not fired yet.
    pub fn check_time(&mut self, time: f64) -> bool {
        let slack = self.period.abs() * BOUNDARY_TOLERANCE;
        if time + slack < self.next_boundary() {
            return false;
        }
        let elapsed = (time - self.time_start + slack) / self.period;
        let crossed = if elapsed.is_finite() && elapsed > 0.0 {
            elapsed.floor() as u64
        } else {
            0
        };
        self.next_index = crossed.max(self.next_index) + 1;
        true
    }

    /// Rewind to the construction-time origin; the period is kept.
    pub fn reset(&mut self) {
        self.next_index = 0;
    }
}

// src/metrics.rs
//
// Aggregates over many episodes for the Monte Carlo harness.
// - RunningStats: Welford mean/variance with min/max
// - BatchStats:   per-run summaries folded into a few headline numbers

use serde::Serialize;

use crate::sim::RunSummary;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl RunningStats {
    /// Non-finite samples are skipped.
    pub fn push(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }
        self.count += 1;
        self.min = self.min.min(x);
        self.max = self.max.max(x);
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Sample standard deviation; NaN below two samples.
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            f64::NAN
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.max
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub runs: u64,
    /// Runs whose planar distance ended within the tolerance.
    pub converged_runs: u64,
    pub planar_distance: RunningStats,
    pub final_certificate: RunningStats,
    /// Fraction of samples that fell back to the safe controller.
    pub fallback_rate: RunningStats,
    pub certificate_increases: u64,
}

impl BatchStats {
    pub fn add(&mut self, summary: &RunSummary, tolerance: f64) {
        self.runs += 1;
        if summary.planar_distance <= tolerance {
            self.converged_runs += 1;
        }
        self.planar_distance.push(summary.planar_distance);
        self.final_certificate.push(summary.final_certificate);
        if let Some(c) = &summary.counters {
            if c.samples > 0 {
                self.fallback_rate
                    .push(c.fallbacks as f64 / c.samples as f64);
            }
        }
        self.certificate_increases += summary.certificate_increases as u64;
    }
}

// src/types.rs
//
// Shared value types: acceptance status, action bounds and small vector
// helpers used across actor, critic and the orchestrator.

use serde::{Deserialize, Serialize};

/// Per-sample verdict on freshly optimized weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl AcceptanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceptanceStatus::Pending => "pending",
            AcceptanceStatus::Accepted => "accepted",
            AcceptanceStatus::Rejected => "rejected",
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptanceStatus::Accepted)
    }
}

/// Which weight slot a model evaluation should read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightChoice {
    /// Committed weights (the last known-good snapshot).
    Stored,
    /// Working weights, which may hold a staged candidate.
    Working,
}

/// Static per-channel `[low, high]` bounds on the action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBounds {
    low: Vec<f64>,
    high: Vec<f64>,
}

impl ActionBounds {
    /// Build from `(low, high)` pairs. Returns None if any pair is inverted
    /// or non-finite.
    pub fn new(pairs: &[(f64, f64)]) -> Option<Self> {
        let mut low = Vec::with_capacity(pairs.len());
        let mut high = Vec::with_capacity(pairs.len());
        for &(lo, hi) in pairs {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return None;
            }
            low.push(lo);
            high.push(hi);
        }
        Some(Self { low, high })
    }

    /// Symmetric bounds `[-limit_i, limit_i]`.
    pub fn symmetric(limits: &[f64]) -> Option<Self> {
        let pairs: Vec<(f64, f64)> = limits.iter().map(|&l| (-l.abs(), l.abs())).collect();
        Self::new(&pairs)
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    /// Clip in place. Infinities saturate at the matching bound; NaN entries
    /// collapse to the channel midpoint.
    pub fn clip(&self, action: &mut [f64]) {
        for (i, a) in action.iter_mut().enumerate().take(self.low.len()) {
            if a.is_nan() {
                *a = 0.5 * (self.low[i] + self.high[i]);
                continue;
            }
            *a = a.clamp(self.low[i], self.high[i]);
        }
    }

    pub fn contains(&self, action: &[f64]) -> bool {
        action
            .iter()
            .zip(self.low.iter().zip(self.high.iter()))
            .all(|(a, (lo, hi))| *a >= *lo && *a <= *hi)
    }
}

/// Clip with optional bounds.
pub fn apply_bounds(bounds: Option<&ActionBounds>, action: &mut [f64]) {
    if let Some(b) = bounds {
        b.clip(action);
    }
}

/// `a - b` element-wise; `b` shorter than `a` is treated as zero-padded.
pub fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter()
        .enumerate()
        .map(|(i, x)| x - b.get(i).copied().unwrap_or(0.0))
        .collect()
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn norm_sq(a: &[f64]) -> f64 {
    dot(a, a)
}

pub fn norm(a: &[f64]) -> f64 {
    norm_sq(a).sqrt()
}

pub fn all_finite(a: &[f64]) -> bool {
    a.iter().all(|x| x.is_finite())
}

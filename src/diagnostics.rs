// src/diagnostics.rs
//
// Append-only diagnostic logs owned by controllers.
//
// Nothing in here feeds back into control decisions except the most recent
// certificate value, which the Predictive variant backfills in place.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default cap on retained entries per log.
pub const DEFAULT_LOG_CAPACITY: usize = 100_000;

/// Bounded append-only log. When full, the oldest entry is dropped.
#[derive(Debug, Clone)]
pub struct DiagnosticLog<T> {
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T: Clone> DiagnosticLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Overwrite the most recent entry. Returns false if the log is empty.
    pub fn replace_last(&mut self, entry: T) -> bool {
        match self.entries.back_mut() {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Clone> Default for DiagnosticLog<T> {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

/// Constraint that caused a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotConverged,
    Decrease,
    LowerBound,
    UpperBound,
    NonFinite,
}

/// Events raised while running the control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    CriticRejected {
        time: f64,
        reason: RejectReason,
        violation: f64,
    },
    ActorRejected {
        time: f64,
        reason: RejectReason,
        violation: f64,
    },
    FallbackEngaged {
        time: f64,
    },
    ThetaMinimizerNotConverged {
        evaluations: usize,
    },
    CertificateIncreased {
        time: f64,
        previous: f64,
        current: f64,
    },
}

impl DiagnosticEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DiagnosticEvent::CriticRejected { .. } => "critic_rejected",
            DiagnosticEvent::ActorRejected { .. } => "actor_rejected",
            DiagnosticEvent::FallbackEngaged { .. } => "fallback_engaged",
            DiagnosticEvent::ThetaMinimizerNotConverged { .. } => "theta_minimizer_not_converged",
            DiagnosticEvent::CertificateIncreased { .. } => "certificate_increased",
        }
    }
}

/// Per-sample critic statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticStats {
    pub time: f64,
    /// Safe-controller certificate at the current observation.
    pub safe_certificate: f64,
    /// Learned certificate at the last good observation (stored weights).
    pub calf: f64,
    /// Critic value at the current observation (working weights).
    pub value: f64,
    /// `‖stored − candidate‖₂` for the critic weights.
    pub weights_displacement: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_log_drops_oldest() {
        let mut log = DiagnosticLog::new(2);
        log.push(1.0);
        log.push(2.0);
        log.push(3.0);
        assert_eq!(log.to_vec(), vec![2.0, 3.0]);
    }

    #[test]
    fn replace_last_backfills() {
        let mut log: DiagnosticLog<f64> = DiagnosticLog::default();
        assert!(!log.replace_last(1.0));
        log.push(5.0);
        assert!(log.replace_last(4.0));
        assert_eq!(log.last(), Some(&4.0));
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let ev = DiagnosticEvent::FallbackEngaged { time: 0.5 };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["kind"], "fallback_engaged");
        assert_eq!(ev.kind(), "fallback_engaged");
    }
}

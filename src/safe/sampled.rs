// src/safe/sampled.rs
//
// Sampled wrapper around a safe controller: the pure-safe strategy used
// when learning is bypassed.

use super::SafeController;
use crate::clock::Clock;
use crate::controller::{resolve_target, Certified, ControllerError, Resettable, Sampled};
use crate::diagnostics::{DiagnosticEvent, DiagnosticLog};
use crate::types::{apply_bounds, sub, ActionBounds};

pub struct SampledController {
    safe: Box<dyn SafeController>,
    clock: Clock,
    action_init: Vec<f64>,
    action: Vec<f64>,
    bounds: Option<ActionBounds>,
    target: Option<Vec<f64>>,
    record_certificate: bool,
    certificates: DiagnosticLog<f64>,
    times: DiagnosticLog<f64>,
    events: DiagnosticLog<DiagnosticEvent>,
}

impl SampledController {
    pub fn new(
        safe: Box<dyn SafeController>,
        sampling_time: f64,
        time_start: f64,
        action_init: Vec<f64>,
        bounds: Option<ActionBounds>,
        target: Option<Vec<f64>>,
        record_certificate: bool,
    ) -> Self {
        Self {
            safe,
            clock: Clock::new(sampling_time, time_start),
            action: action_init.clone(),
            action_init,
            bounds,
            target,
            record_certificate,
            certificates: DiagnosticLog::default(),
            times: DiagnosticLog::default(),
            events: DiagnosticLog::default(),
        }
    }

    pub fn safe_controller(&self) -> &dyn SafeController {
        self.safe.as_ref()
    }

    /// Certificate values logged at each sampling instant.
    pub fn certificates(&self) -> &DiagnosticLog<f64> {
        &self.certificates
    }

    pub fn times(&self) -> &DiagnosticLog<f64> {
        &self.times
    }

    pub fn events(&self) -> &DiagnosticLog<DiagnosticEvent> {
        &self.events
    }
}

impl Sampled for SampledController {
    fn compute_action_sampled(
        &mut self,
        time: f64,
        observation: &[f64],
        target: Option<&[f64]>,
    ) -> Result<Vec<f64>, ControllerError> {
        let target = resolve_target(
            &mut self.target,
            target,
            observation,
            self.safe.observation_dim(),
        )?;

        if self.clock.check_time(time) {
            let relative = sub(observation, &target);
            let mut action = self.safe.compute_action(&relative);
            apply_bounds(self.bounds.as_ref(), &mut action);
            self.action = action;

            for ev in self.safe.drain_diagnostics() {
                self.events.push(ev);
            }
            if self.record_certificate {
                self.certificates.push(self.safe.compute_lf(&relative));
                self.times.push(time);
            }
        }

        Ok(self.action.clone())
    }

    fn action(&self) -> &[f64] {
        &self.action
    }
}

impl Certified for SampledController {
    fn compute_lf(&self, observation: &[f64]) -> f64 {
        self.safe.compute_lf(observation)
    }
}

impl Resettable for SampledController {
    fn reset(&mut self) {
        self.clock.reset();
        self.action = self.action_init.clone();
        self.safe.reset();
        self.certificates.clear();
        self.times.clear();
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safe::KinPointController;

    fn make(bounds: Option<ActionBounds>) -> SampledController {
        SampledController::new(
            Box::new(KinPointController::new(1.0, 2)),
            0.1,
            0.0,
            vec![0.0, 0.0],
            bounds,
            Some(vec![0.0, 0.0]),
            true,
        )
    }

    #[test]
    fn holds_between_samples() {
        let mut ctrl = make(None);
        let a0 = ctrl.compute_action_sampled(0.0, &[1.0, 2.0], None).unwrap();
        assert_eq!(a0, vec![-1.0, -2.0]);
        let a1 = ctrl.compute_action_sampled(0.05, &[5.0, 5.0], None).unwrap();
        assert_eq!(a1, a0);
        let a2 = ctrl.compute_action_sampled(0.1, &[5.0, 5.0], None).unwrap();
        assert_eq!(a2, vec![-5.0, -5.0]);
        assert_eq!(ctrl.certificates().len(), 2);
        assert_eq!(ctrl.times().to_vec(), vec![0.0, 0.1]);
    }

    #[test]
    fn clips_and_tracks_target() {
        let mut ctrl = make(ActionBounds::symmetric(&[0.5, 0.5]));
        let a = ctrl
            .compute_action_sampled(0.0, &[1.0, 0.0], Some(&[0.0, 1.0]))
            .unwrap();
        assert_eq!(a, vec![-0.5, 0.5]);
    }

    #[test]
    fn reset_restores_initial_action_and_clock() {
        let mut ctrl = make(None);
        ctrl.compute_action_sampled(0.0, &[1.0, 1.0], None).unwrap();
        ctrl.reset();
        assert_eq!(ctrl.action(), &[0.0, 0.0]);
        assert!(ctrl.certificates().is_empty());
        let a = ctrl.compute_action_sampled(0.0, &[2.0, 0.0], None).unwrap();
        assert_eq!(a, vec![-2.0, 0.0]);
    }
}

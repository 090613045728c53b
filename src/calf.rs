// src/calf.rs
//
// CALF orchestrator: per-sample state machine gating actor/critic updates.
//
// Per sampling instant:
//   buffers -> critic optimize -> critic acceptance
//           -> [actor optimize -> actor acceptance]
//           -> emit learned action or fall back to the safe controller
//           -> certificate bookkeeping
//
// No learned weights reach the emitted action unless both acceptance tests
// passed in this sample. Every rejection goes through `invoke_safe_action`,
// which assigns (never accumulates) the running-cost baseline, so it is
// safe to call more than once per sample.

use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::clock::Clock;
use crate::config::{CalfVariant, ControllerConfig};
use crate::controller::{resolve_target, Certified, ControllerError, Resettable, Sampled};
use crate::critic::Critic;
use crate::diagnostics::{CriticStats, DiagnosticEvent, DiagnosticLog, RejectReason};
use crate::safe::SafeController;
use crate::types::{apply_bounds, sub, AcceptanceStatus, ActionBounds, WeightChoice};

/// Running totals over the current episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCounters {
    pub samples: u64,
    pub critic_accepted: u64,
    pub critic_rejected: u64,
    pub actor_accepted: u64,
    pub actor_rejected: u64,
    pub fallbacks: u64,
}

pub struct CalfController {
    variant: CalfVariant,
    sampling_clock: Clock,
    critic_clock: Clock,
    dt: f64,
    safe_decay_rate: f64,
    fixed_critic_weights: bool,
    observation_dim: usize,
    actor: Actor,
    critic: Critic,
    safe: Box<dyn SafeController>,
    bounds: Option<ActionBounds>,
    target: Option<Vec<f64>>,
    stats: DiagnosticLog<CriticStats>,
    events: DiagnosticLog<DiagnosticEvent>,
    counters: SampleCounters,
}

impl CalfController {
    pub fn new(
        cfg: &ControllerConfig,
        actor: Actor,
        critic: Critic,
        safe: Box<dyn SafeController>,
    ) -> Self {
        Self {
            variant: cfg.variant,
            sampling_clock: Clock::new(cfg.sampling_time, cfg.time_start),
            critic_clock: Clock::new(cfg.critic_period, cfg.time_start),
            dt: cfg.sampling_time,
            safe_decay_rate: cfg.critic.safe_decay_rate,
            fixed_critic_weights: cfg.fixed_critic_weights,
            observation_dim: cfg.observation_dim(),
            actor,
            critic,
            safe,
            bounds: cfg.action_bounds.clone(),
            target: cfg.observation_target.clone(),
            stats: DiagnosticLog::default(),
            events: DiagnosticLog::default(),
            counters: SampleCounters::default(),
        }
    }

    pub fn variant(&self) -> CalfVariant {
        self.variant
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn critic(&self) -> &Critic {
        &self.critic
    }

    pub fn safe_controller(&self) -> &dyn SafeController {
        self.safe.as_ref()
    }

    /// Certificate history: one entry per rejection or acceptance.
    pub fn calf_log(&self) -> &DiagnosticLog<f64> {
        self.critic.calf_log()
    }

    pub fn critic_stats(&self) -> &DiagnosticLog<CriticStats> {
        &self.stats
    }

    pub fn events(&self) -> &DiagnosticLog<DiagnosticEvent> {
        &self.events
    }

    pub fn counters(&self) -> SampleCounters {
        self.counters
    }

    pub fn critic_status(&self) -> AcceptanceStatus {
        self.critic.weights_acceptance_status()
    }

    pub fn actor_status(&self) -> AcceptanceStatus {
        self.actor.weights_acceptance_status()
    }

    fn push_event(&mut self, event: DiagnosticEvent) {
        self.events.push(event);
    }

    fn drain_safe_diagnostics(&mut self) {
        for ev in self.safe.drain_diagnostics() {
            self.events.push(ev);
        }
    }

    /// Append to the certificate history, flagging any increase.
    fn log_certificate(&mut self, time: f64, value: f64) {
        if let Some(&previous) = self.critic.calf_log().last() {
            if value > previous {
                self.push_event(DiagnosticEvent::CertificateIncreased {
                    time,
                    previous,
                    current: value,
                });
            }
        }
        self.critic.log_certificate(value);
    }

    fn log_last_good_certificate(&mut self, time: f64) {
        if let Some(v) = self.critic.last_good_certificate() {
            self.log_certificate(time, v);
        }
    }

    /// Safe action at `observation`, clipped, written into the actor, with
    /// the running-cost baseline reassigned from it. Critic weights are left
    /// as they are.
    fn apply_safe_action(&mut self, observation: &[f64], target: &[f64]) {
        let mut action = self.safe.compute_action(&sub(observation, target));
        apply_bounds(self.bounds.as_ref(), &mut action);
        let r = self.actor.running_cost(observation, &action);
        self.actor.set_action(action);
        self.critic.set_r_prev(r);
    }

    /// Fallback: revert critic working weights, act safely, reset baseline.
    pub fn invoke_safe_action(&mut self, time: f64, observation: &[f64], target: &[f64]) {
        self.critic.restore_weights();
        self.apply_safe_action(observation, target);
        self.counters.fallbacks += 1;
        self.push_event(DiagnosticEvent::FallbackEngaged { time });
    }

    fn reject_critic(&mut self, time: f64, reason: RejectReason, violation: f64) {
        self.critic
            .set_weights_acceptance_status(AcceptanceStatus::Rejected);
        self.counters.critic_rejected += 1;
        self.push_event(DiagnosticEvent::CriticRejected {
            time,
            reason,
            violation,
        });
    }

    fn reject_actor(&mut self, time: f64, reason: RejectReason, violation: f64) {
        self.actor
            .set_weights_acceptance_status(AcceptanceStatus::Rejected);
        self.counters.actor_rejected += 1;
        self.push_event(DiagnosticEvent::ActorRejected {
            time,
            reason,
            violation,
        });
    }

    /// Decrease test for the actor candidate under the critic's working
    /// weights. Returns the predicted next observation on success.
    fn actor_acceptance_test(
        &self,
        converged: bool,
        observation: &[f64],
    ) -> Result<Vec<f64>, (RejectReason, f64)> {
        if !converged {
            return Err((RejectReason::NotConverged, 0.0));
        }
        let action = self.actor.candidate_action(observation);
        let next = self.actor.predict(observation, &action);
        let v_next = self.critic.value(&next, WeightChoice::Working);
        let v_now = self.critic.value(observation, WeightChoice::Working);
        if !v_next.is_finite() || !v_now.is_finite() {
            return Err((RejectReason::NonFinite, f64::NAN));
        }
        let decrease = v_next - v_now
            + self.safe_decay_rate * self.dt * self.actor.running_cost(observation, &action);
        if decrease > 0.0 {
            return Err((RejectReason::Decrease, decrease));
        }
        Ok(next)
    }

    /// Critic accepted and staged: try the actor. Returns the predicted next
    /// observation when the learned action was emitted.
    fn try_actor(&mut self, time: f64, observation: &[f64], target: &[f64]) -> Option<Vec<f64>> {
        self.critic
            .set_weights_acceptance_status(AcceptanceStatus::Accepted);
        self.counters.critic_accepted += 1;
        self.critic.update_weights();

        // Provisional safe action: reference action and baseline while the
        // actor is optimized. The staged critic stays in place.
        self.apply_safe_action(observation, target);

        let converged = self.actor.optimize_weights(&self.critic);
        match self.actor_acceptance_test(converged, observation) {
            Ok(next) => {
                self.actor
                    .set_weights_acceptance_status(AcceptanceStatus::Accepted);
                self.counters.actor_accepted += 1;
                self.actor.update_and_cache_weights();
                self.actor.update_action();
                self.critic.cache_weights();
                let r = self.actor.running_cost(observation, self.actor.action());
                self.critic.set_r_prev(r);
                Some(next)
            }
            Err((reason, violation)) => {
                self.reject_actor(time, reason, violation);
                self.invoke_safe_action(time, observation, target);
                None
            }
        }
    }

    /// The critic is optimized on every sample; the critic clock and
    /// `fixed_critic_weights` only gate the uncertified variant.
    fn step_ex_post(&mut self, time: f64, observation: &[f64], target: &[f64]) {
        self.critic
            .set_weights_acceptance_status(AcceptanceStatus::Pending);
        self.actor
            .set_weights_acceptance_status(AcceptanceStatus::Pending);

        self.critic.optimize_weights();

        match self.critic.acceptance_test(observation) {
            Ok(()) => {
                if self.try_actor(time, observation, target).is_some() {
                    self.critic.set_observation_last_good(observation);
                    let v = self.critic.value(observation, WeightChoice::Stored);
                    self.log_certificate(time, v);
                } else {
                    self.log_last_good_certificate(time);
                }
            }
            Err((reason, violation)) => {
                self.reject_critic(time, reason, violation);
                self.invoke_safe_action(time, observation, target);
                self.log_last_good_certificate(time);
            }
        }
    }

    fn step_predictive(&mut self, time: f64, observation: &[f64], target: &[f64]) {
        // Previous sample was accepted: the observation it led to is the new
        // anchor, and the predicted certificate gets replaced by the real one.
        if self.actor.weights_acceptance_status() == AcceptanceStatus::Accepted {
            self.critic.set_observation_last_good(observation);
            self.critic
                .set_weights_acceptance_status(AcceptanceStatus::Rejected);
            self.actor
                .set_weights_acceptance_status(AcceptanceStatus::Rejected);
            let v = self.critic.value(observation, WeightChoice::Stored);
            self.critic.backfill_certificate(v);
        }

        self.critic.optimize_weights();

        match self.critic.acceptance_test(observation) {
            Ok(()) => match self.try_actor(time, observation, target) {
                Some(next) => {
                    let v = self.critic.value(&next, WeightChoice::Stored);
                    self.log_certificate(time, v);
                }
                None => self.log_last_good_certificate(time),
            },
            Err((reason, violation)) => {
                self.reject_critic(time, reason, violation);
                self.invoke_safe_action(time, observation, target);
                self.log_last_good_certificate(time);
            }
        }
    }

    /// Uncertified actor-critic: commit whatever converged.
    fn step_plain(&mut self, observation: &[f64], critic_due: bool) {
        if critic_due && !self.fixed_critic_weights {
            if self.critic.optimize_weights() {
                self.critic.update_weights();
                self.critic.cache_weights();
                self.critic
                    .set_weights_acceptance_status(AcceptanceStatus::Accepted);
                self.counters.critic_accepted += 1;
            } else {
                self.critic
                    .set_weights_acceptance_status(AcceptanceStatus::Rejected);
                self.counters.critic_rejected += 1;
            }
        }

        if self.actor.optimize_weights(&self.critic) {
            self.actor.update_and_cache_weights();
            self.actor
                .set_weights_acceptance_status(AcceptanceStatus::Accepted);
            self.counters.actor_accepted += 1;
        } else {
            self.actor
                .set_weights_acceptance_status(AcceptanceStatus::Rejected);
            self.counters.actor_rejected += 1;
        }
        self.actor.update_action();
        let r = self.actor.running_cost(observation, self.actor.action());
        self.critic.set_r_prev(r);
    }

    /// Per-sample monitoring record.
    pub fn collect_critic_stats(&mut self, time: f64, observation: &[f64], target: &[f64]) {
        let safe_certificate = self.safe.compute_lf(&sub(observation, target));
        let calf = self.critic.last_good_certificate().unwrap_or(f64::NAN);
        let value = self.critic.value(observation, WeightChoice::Working);
        self.stats.push(CriticStats {
            time,
            safe_certificate,
            calf,
            value,
            weights_displacement: self.critic.weights_displacement(),
        });
    }

    fn step(&mut self, time: f64, observation: &[f64], target: &[f64], critic_due: bool) {
        self.actor.update_target(target);
        self.critic.update_target(target);

        let previous_action = self.actor.action().to_vec();
        self.critic.update_buffers(observation, &previous_action);
        self.actor.update_buffers(observation, &previous_action);
        self.actor.receive_observation(observation);
        self.counters.samples += 1;

        match self.variant {
            CalfVariant::ExPost => self.step_ex_post(time, observation, target),
            CalfVariant::Predictive => self.step_predictive(time, observation, target),
            CalfVariant::Plain => self.step_plain(observation, critic_due),
        }

        // Learned actions are clipped in the actor; clip again so every path
        // leaves a bounded action behind.
        let mut action = self.actor.action().to_vec();
        apply_bounds(self.bounds.as_ref(), &mut action);
        self.actor.set_action(action);

        self.collect_critic_stats(time, observation, target);
        self.drain_safe_diagnostics();
    }
}

impl Sampled for CalfController {
    fn compute_action_sampled(
        &mut self,
        time: f64,
        observation: &[f64],
        target: Option<&[f64]>,
    ) -> Result<Vec<f64>, ControllerError> {
        let target = resolve_target(&mut self.target, target, observation, self.observation_dim)?;

        let critic_due = self.critic_clock.check_time(time);
        if self.sampling_clock.check_time(time) {
            self.step(time, observation, &target, critic_due);
        }

        Ok(self.actor.action().to_vec())
    }

    fn action(&self) -> &[f64] {
        self.actor.action()
    }
}

impl Certified for CalfController {
    fn compute_lf(&self, observation: &[f64]) -> f64 {
        self.safe.compute_lf(observation)
    }
}

impl Resettable for CalfController {
    /// Rewind clocks and episode state. Cached weights persist.
    fn reset(&mut self) {
        self.sampling_clock.reset();
        self.critic_clock.reset();
        self.actor.reset();
        self.critic.reset();
        self.safe.reset();
        self.stats.clear();
        self.events.clear();
        self.counters = SampleCounters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemKind;
    use crate::controller::{build_controller_with, Controller};
    use crate::optimizer::{OptimizeResult, Optimizer};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns the starting point as a converged solution.
    struct Hold;

    impl Optimizer for Hold {
        fn minimize(
            &self,
            objective: &dyn Fn(&[f64]) -> f64,
            x0: &[f64],
            _bounds: &[(f64, f64)],
        ) -> OptimizeResult {
            OptimizeResult {
                x: x0.to_vec(),
                value: objective(x0),
                iterations: 0,
                converged: true,
            }
        }
    }

    /// Converges to the all-zero weight vector.
    struct Zeros;

    impl Optimizer for Zeros {
        fn minimize(
            &self,
            objective: &dyn Fn(&[f64]) -> f64,
            x0: &[f64],
            _bounds: &[(f64, f64)],
        ) -> OptimizeResult {
            let x = vec![0.0; x0.len()];
            let value = objective(&x);
            OptimizeResult {
                x,
                value,
                iterations: 0,
                converged: true,
            }
        }
    }

    /// `Hold` that counts its calls.
    struct Counting(Arc<AtomicUsize>);

    impl Optimizer for Counting {
        fn minimize(
            &self,
            objective: &dyn Fn(&[f64]) -> f64,
            x0: &[f64],
            bounds: &[(f64, f64)],
        ) -> OptimizeResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            Hold.minimize(objective, x0, bounds)
        }
    }

    fn calf_with(
        cfg: &ControllerConfig,
        actor: Box<dyn Optimizer>,
        critic: Box<dyn Optimizer>,
    ) -> CalfController {
        match build_controller_with(cfg, actor, critic).unwrap() {
            Controller::Calf(c) => *c,
            Controller::SafeOnly(_) => panic!("expected a CALF controller"),
        }
    }

    fn kin_point(variant: CalfVariant) -> CalfController {
        let mut cfg = ControllerConfig::for_system(SystemKind::KinPoint);
        cfg.variant = variant;
        calf_with(&cfg, Box::new(Hold), Box::new(Hold))
    }

    fn scaled(o: &[f64], k: f64) -> Vec<f64> {
        o.iter().map(|x| x * k).collect()
    }

    #[test]
    fn proportional_actor_is_accepted_every_sample() {
        // Actor -I, identity critic: V(0.9 o) - V(o) + nu dt r = -0.08 |o|^2.
        let mut ctrl = kin_point(CalfVariant::ExPost);
        let mut obs = vec![1.0, -1.0];
        for k in 0..20 {
            let action = ctrl
                .compute_action_sampled(k as f64 * 0.1, &obs, None)
                .unwrap();
            assert_eq!(ctrl.critic_status(), AcceptanceStatus::Accepted);
            assert_eq!(ctrl.actor_status(), AcceptanceStatus::Accepted);
            assert_eq!(action, scaled(&obs, -1.0));
            obs = obs.iter().zip(&action).map(|(o, a)| o + 0.1 * a).collect();
        }

        let counters = ctrl.counters();
        assert_eq!(counters.samples, 20);
        assert_eq!(counters.actor_accepted, 20);
        assert_eq!(counters.fallbacks, 0);

        let log = ctrl.calf_log().to_vec();
        assert_eq!(log.len(), 20);
        assert!(log.windows(2).all(|w| w[1] < w[0]));
        assert!(ctrl.events().is_empty());
        assert_eq!(ctrl.critic_stats().len(), 20);
    }

    #[test]
    fn stalled_plant_trips_the_decrease_test() {
        let mut ctrl = kin_point(CalfVariant::ExPost);
        let obs = [1.0, 0.0];
        ctrl.compute_action_sampled(0.0, &obs, None).unwrap();
        // Same observation again: the critic cannot show any decrease.
        let action = ctrl.compute_action_sampled(0.1, &obs, None).unwrap();

        assert_eq!(ctrl.critic_status(), AcceptanceStatus::Rejected);
        assert_eq!(action, vec![-1.0, 0.0]);
        assert_eq!(ctrl.counters().fallbacks, 1);
        let kinds: Vec<_> = ctrl.events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["critic_rejected", "fallback_engaged"]);
        // Rejection repeats the last good certificate.
        let log = ctrl.calf_log().to_vec();
        assert_eq!(log, vec![1.0, 1.0]);
    }

    #[test]
    fn rejected_actor_assigns_baseline_once() {
        // Critic holds the identity; the actor proposes zero gain, which
        // shows no decrease and is rejected after the provisional safe call.
        let cfg = ControllerConfig::for_system(SystemKind::KinPoint);
        let mut ctrl = calf_with(&cfg, Box::new(Zeros), Box::new(Hold));
        let obs = [1.0, 0.0];
        let action = ctrl.compute_action_sampled(0.0, &obs, None).unwrap();

        assert_eq!(ctrl.critic_status(), AcceptanceStatus::Accepted);
        assert_eq!(ctrl.actor_status(), AcceptanceStatus::Rejected);
        assert_eq!(action, vec![-1.0, 0.0]);

        // r = |o|^2 + 0.1 |a|^2 for the safe action, assigned not summed.
        let r = ctrl.actor().running_cost(&obs, &action);
        assert!((r - 1.1).abs() < 1e-12);
        assert_eq!(ctrl.critic().r_prev(), r);

        assert_eq!(ctrl.counters().fallbacks, 1);
        let kinds: Vec<_> = ctrl.events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["actor_rejected", "fallback_engaged"]);
        assert!(ctrl.calf_log().is_empty());
    }

    #[test]
    fn ex_post_optimizes_critic_every_sample() {
        let mut cfg = ControllerConfig::for_system(SystemKind::KinPoint);
        cfg.critic_period = 10.0 * cfg.sampling_time;
        cfg.fixed_critic_weights = true;
        let calls = Arc::new(AtomicUsize::new(0));
        let mut ctrl = calf_with(&cfg, Box::new(Hold), Box::new(Counting(calls.clone())));

        let mut obs = vec![1.0, -1.0];
        for k in 0..5 {
            let action = ctrl
                .compute_action_sampled(k as f64 * 0.1, &obs, None)
                .unwrap();
            obs = obs.iter().zip(&action).map(|(o, a)| o + 0.1 * a).collect();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(ctrl.counters().critic_accepted, 5);
    }

    #[test]
    fn learned_action_is_clipped_to_bounds() {
        // Proportional actor asks for -8; the channel saturates at -5 and
        // the clipped action still shows a decrease.
        let mut ctrl = kin_point(CalfVariant::ExPost);
        let action = ctrl.compute_action_sampled(0.0, &[8.0, 0.0], None).unwrap();
        assert_eq!(ctrl.actor_status(), AcceptanceStatus::Accepted);
        assert_eq!(action, vec![-5.0, 0.0]);
        assert_eq!(ctrl.counters().fallbacks, 0);
    }

    #[test]
    fn holds_action_between_samples() {
        let mut ctrl = kin_point(CalfVariant::ExPost);
        let first = ctrl.compute_action_sampled(0.0, &[1.0, 1.0], None).unwrap();
        let held = ctrl.compute_action_sampled(0.05, &[3.0, 3.0], None).unwrap();
        assert_eq!(first, held);
        assert_eq!(ctrl.counters().samples, 1);
    }

    #[test]
    fn predictive_backfills_with_the_reached_observation() {
        let mut ctrl = kin_point(CalfVariant::Predictive);
        ctrl.compute_action_sampled(0.0, &[1.0, 0.0], None).unwrap();
        assert_eq!(ctrl.actor_status(), AcceptanceStatus::Accepted);
        // Predicted next observation is (0.9, 0).
        let predicted = ctrl.calf_log().to_vec();
        assert!((predicted[0] - 0.81).abs() < 1e-12);

        // The plant actually went further than predicted.
        ctrl.compute_action_sampled(0.1, &[0.8, 0.0], None).unwrap();
        let log = ctrl.calf_log().to_vec();
        assert!((log[0] - 0.64).abs() < 1e-12);
        assert_eq!(ctrl.critic().observation_last_good(), Some(&[0.8, 0.0][..]));
    }

    #[test]
    fn plain_variant_commits_without_fallback() {
        let mut ctrl = kin_point(CalfVariant::Plain);
        let obs = [1.0, 0.0];
        for k in 0..3 {
            ctrl.compute_action_sampled(k as f64 * 0.1, &obs, None).unwrap();
        }
        assert_eq!(ctrl.counters().fallbacks, 0);
        assert_eq!(ctrl.counters().actor_accepted, 3);
        assert!(ctrl.calf_log().is_empty());
    }

    #[test]
    fn reset_rewinds_episode_state() {
        let mut ctrl = kin_point(CalfVariant::ExPost);
        ctrl.compute_action_sampled(0.0, &[1.0, 0.0], None).unwrap();
        ctrl.compute_action_sampled(0.1, &[1.0, 0.0], None).unwrap();
        let cached = ctrl.critic().cached_weights().to_vec();

        ctrl.reset();
        assert_eq!(ctrl.counters(), SampleCounters::default());
        assert!(ctrl.calf_log().is_empty());
        assert!(ctrl.events().is_empty());
        assert_eq!(ctrl.action(), &[0.0, 0.0]);
        assert_eq!(ctrl.critic().cached_weights(), cached.as_slice());
        assert!(ctrl.critic().observation_last_good().is_none());

        // Clock rewound: time 0 is a sampling instant again.
        ctrl.compute_action_sampled(0.0, &[1.0, 0.0], None).unwrap();
        assert_eq!(ctrl.counters().samples, 1);
    }
}

// src/safe/endi.rs
//
// Disassembled CLF backstepping controller for the ENDI robot
// (three-wheel robot with dynamical pushing force and steering torque).
//
// Observation: (x, y, angle, v, omega), relative to target.
// Action:      (force, torque).
//
// Per call:
//   1. map the pose to chained coordinates xNI and the velocities to eta,
//   2. pick the auxiliary angle theta* minimizing the marginal cost Fc on
//      [-pi, pi] with Brent's bounded method,
//   3. apply the disassembled feedback at theta* and map the resulting
//      chained-form control back to force/torque.
//
// If the angle search does not converge the previous action is held and a
// diagnostic is queued.

use std::f64::consts::PI;

use super::{cartesian_to_nh, neg_signed_cbrt, sgn, SafeController, SINGULARITY_EPS};
use crate::controller::{Certified, Resettable};
use crate::diagnostics::DiagnosticEvent;
use crate::optimizer::minimize_scalar_bounded;

pub const DEFAULT_THETA_XTOL: f64 = 1e-4;
pub const DEFAULT_THETA_MAX_EVALS: usize = 50;

#[derive(Debug, Clone)]
pub struct EndiBacksteppingController {
    gain: f64,
    mass: f64,
    inertia: f64,
    theta_xtol: f64,
    theta_max_evals: usize,
    action_old: [f64; 2],
    pending: Vec<DiagnosticEvent>,
}

fn guard(s: f64) -> f64 {
    if s.abs() < SINGULARITY_EPS {
        if s >= 0.0 {
            SINGULARITY_EPS
        } else {
            -SINGULARITY_EPS
        }
    } else {
        s
    }
}

/// Chained coordinates and their "velocities" for an ENDI observation.
/// None unless the observation has exactly five entries.
fn nh_state(observation: &[f64]) -> Option<([f64; 3], [f64; 2])> {
    let &[x, y, angle, v, omega] = observation else {
        return None;
    };
    let (sa, ca) = angle.sin_cos();
    let xni = cartesian_to_nh(x, y, angle);
    let eta = [omega, (y * ca - x * sa) * omega + v];
    Some((xni, eta))
}

fn sigma_tilde(xni: &[f64; 3], theta: f64) -> f64 {
    let (s, c) = theta.sin_cos();
    guard(xni[0] * c + xni[1] * s + xni[2].abs().sqrt())
}

/// Gradient of `F = x0^4 + x1^4 + |x2|^3 / sigma_tilde^2` at fixed theta.
fn zeta(xni: &[f64; 3], theta: f64) -> [f64; 3] {
    let (s, c) = theta.sin_cos();
    let st = sigma_tilde(xni, theta);
    let st3 = st * st * st;
    let a3 = xni[2].abs().powi(3);
    [
        4.0 * xni[0].powi(3) - 2.0 * a3 * c / st3,
        4.0 * xni[1].powi(3) - 2.0 * a3 * s / st3,
        (3.0 * xni[0] * c + 3.0 * xni[1] * s + 2.0 * xni[2].abs().sqrt())
            * xni[2]
            * xni[2]
            * sgn(xni[2])
            / st3,
    ]
}

fn kappa(xni: &[f64; 3], z: &[f64; 3]) -> [f64; 2] {
    let g0 = z[0] + z[2] * xni[1];
    let g1 = z[1] - z[2] * xni[0];
    [neg_signed_cbrt(g0), neg_signed_cbrt(g1)]
}

fn potential(xni: &[f64; 3], theta: f64) -> f64 {
    let st = sigma_tilde(xni, theta);
    xni[0].powi(4) + xni[1].powi(4) + xni[2].abs().powi(3) / (st * st)
}

/// Marginal cost `Fc = F + |eta - kappa|^2 / 2`.
fn marginal_cost(xni: &[f64; 3], eta: &[f64; 2], theta: f64) -> f64 {
    let k = kappa(xni, &zeta(xni, theta));
    let z0 = eta[0] - k[0];
    let z1 = eta[1] - k[1];
    potential(xni, theta) + 0.5 * (z0 * z0 + z1 * z1)
}

impl EndiBacksteppingController {
    pub fn new(gain: f64, mass: f64, inertia: f64) -> Self {
        Self {
            gain,
            mass,
            inertia,
            theta_xtol: DEFAULT_THETA_XTOL,
            theta_max_evals: DEFAULT_THETA_MAX_EVALS,
            action_old: [0.0; 2],
            pending: Vec::new(),
        }
    }

    pub fn with_theta_search(mut self, xtol: f64, max_evals: usize) -> Self {
        self.theta_xtol = xtol;
        self.theta_max_evals = max_evals.max(1);
        self
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Returns `(theta*, Fc(theta*), converged, evaluations)`.
    fn minimize_theta(&self, xni: &[f64; 3], eta: &[f64; 2]) -> (f64, f64, bool, usize) {
        let res = minimize_scalar_bounded(
            |theta| marginal_cost(xni, eta, theta),
            -PI,
            PI,
            self.theta_xtol,
            self.theta_max_evals,
        );
        (res.x, res.value, res.converged, res.evaluations)
    }

    fn nh_to_actuation(&self, xni: &[f64; 3], eta: &[f64; 2], u: &[f64; 2]) -> [f64; 2] {
        [
            self.mass
                * (u[1]
                    + xni[1] * eta[0] * eta[0]
                    + 0.5 * (xni[0] * xni[1] * u[0] + u[0] * xni[2])),
            self.inertia * u[0],
        ]
    }
}

impl Certified for EndiBacksteppingController {
    fn compute_lf(&self, observation: &[f64]) -> f64 {
        let Some((xni, eta)) = nh_state(observation) else {
            return f64::NAN;
        };
        let (_, value, _, _) = self.minimize_theta(&xni, &eta);
        value
    }
}

impl Resettable for EndiBacksteppingController {
    fn reset(&mut self) {
        self.action_old = [0.0; 2];
        self.pending.clear();
    }
}

impl SafeController for EndiBacksteppingController {
    fn name(&self) -> &'static str {
        "endi_backstepping"
    }

    fn observation_dim(&self) -> usize {
        5
    }

    fn action_dim(&self) -> usize {
        2
    }

    fn compute_action(&mut self, observation: &[f64]) -> Vec<f64> {
        let Some((xni, eta)) = nh_state(observation) else {
            return self.action_old.to_vec();
        };
        let (theta, _, converged, evaluations) = self.minimize_theta(&xni, &eta);
        if !converged {
            self.pending
                .push(DiagnosticEvent::ThetaMinimizerNotConverged { evaluations });
            return self.action_old.to_vec();
        }

        let k = kappa(&xni, &zeta(&xni, theta));
        let u = [
            -self.gain * (eta[0] - k[0]),
            -self.gain * (eta[1] - k[1]),
        ];
        let action = self.nh_to_actuation(&xni, &eta, &u);
        if action.iter().all(|a| a.is_finite()) {
            self.action_old = action;
        }
        self.action_old.to_vec()
    }

    fn drain_diagnostics(&mut self) -> Vec<DiagnosticEvent> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_observation_has_no_certificate() {
        let mut ctrl = EndiBacksteppingController::new(10.0, 10.0, 1.0);
        assert!(ctrl.compute_lf(&[1.0, 1.0]).is_nan());
        assert_eq!(ctrl.compute_action(&[1.0, 1.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn origin_is_equilibrium() {
        let mut ctrl = EndiBacksteppingController::new(10.0, 10.0, 1.0);
        let a = ctrl.compute_action(&[0.0; 5]);
        assert_eq!(a, vec![0.0, 0.0]);
        assert_eq!(ctrl.compute_lf(&[0.0; 5]), 0.0);
    }

    #[test]
    fn pure_heading_error_steers_back() {
        let mut ctrl = EndiBacksteppingController::new(10.0, 10.0, 1.0);
        let a = ctrl.compute_action(&[0.0, 0.0, 0.3, 0.0, 0.0]);
        assert!(a.iter().all(|v| v.is_finite()));
        assert!(a[1] < 0.0);
    }

    #[test]
    fn starved_angle_search_holds_previous_action() {
        let mut ctrl = EndiBacksteppingController::new(10.0, 10.0, 1.0);
        let first = ctrl.compute_action(&[1.0, 1.0, 0.0, 0.0, 0.0]);
        let mut starved = ctrl.clone().with_theta_search(1e-12, 2);
        let held = starved.compute_action(&[0.5, -0.5, 0.2, 0.1, 0.0]);
        assert_eq!(held, first);
        let events = starved.drain_diagnostics();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "theta_minimizer_not_converged");
        assert!(starved.drain_diagnostics().is_empty());
    }

    #[test]
    fn certificate_is_positive_away_from_origin() {
        let ctrl = EndiBacksteppingController::new(10.0, 10.0, 1.0);
        let lf = ctrl.compute_lf(&[1.0, 1.0, 0.0, 0.0, 0.0]);
        assert!(lf > 1.0);
    }
}

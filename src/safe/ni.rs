// src/safe/ni.rs
//
// Backstepping controller for the kinematic three-wheel robot.
//
// This is the optimization-free variant: the auxiliary angle is replaced by
// the exact gradient of
//
//     L = x0^4 + x1^4 + |x2|^3 / sigma^2,   sigma = |(x0, x1)| + sqrt|x2|
//
// in chained coordinates, with the theta = 0 limit used when the planar
// part (x0, x1) is at the origin. Deterministic and cheap enough to be
// called from inside acceptance tests.

use super::{cartesian_to_nh, neg_signed_cbrt, sgn, SafeController, SINGULARITY_EPS};
use crate::controller::{Certified, Resettable};

#[derive(Debug, Clone)]
pub struct NiBacksteppingController {
    gain: f64,
}

impl NiBacksteppingController {
    pub fn new(gain: f64) -> Self {
        Self { gain }
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }
}

fn nh_state(observation: &[f64]) -> Option<[f64; 3]> {
    match *observation {
        [x, y, angle] => Some(cartesian_to_nh(x, y, angle)),
        _ => None,
    }
}

/// Gradient of `L` in chained coordinates.
fn zeta(x: &[f64; 3]) -> [f64; 3] {
    let r = x[0].hypot(x[1]);
    let s2 = x[2].abs().sqrt();
    let a3 = x[2].abs().powi(3);

    if r < SINGULARITY_EPS {
        // theta = 0 branch: sigma_tilde = x0 + sqrt|x2|.
        let st = x[0] + s2;
        if st.abs() < SINGULARITY_EPS {
            return [4.0 * x[0].powi(3), 4.0 * x[1].powi(3), 0.0];
        }
        let st3 = st * st * st;
        return [
            4.0 * x[0].powi(3) - 2.0 * a3 / st3,
            4.0 * x[1].powi(3),
            (3.0 * x[0] + 2.0 * s2) * x[2] * x[2] * sgn(x[2]) / st3,
        ];
    }

    let sigma = r + s2;
    let sigma2 = sigma * sigma;
    let sigma3 = sigma2 * sigma;
    let c = 2.0 * a3 / sigma3 / r;
    let g2 = if s2 > 0.0 {
        sgn(x[2]) * (3.0 * x[2] * x[2] / sigma2 - x[2].abs().powf(2.5) / sigma3)
    } else {
        0.0
    };
    [
        4.0 * x[0].powi(3) - c * x[0],
        4.0 * x[1].powi(3) - c * x[1],
        g2,
    ]
}

fn kappa(x: &[f64; 3]) -> [f64; 2] {
    let z = zeta(x);
    let g0 = z[0] + z[2] * x[1];
    let g1 = z[1] - z[2] * x[0];
    [neg_signed_cbrt(g0), neg_signed_cbrt(g1)]
}

impl Certified for NiBacksteppingController {
    fn compute_lf(&self, observation: &[f64]) -> f64 {
        let Some(x) = nh_state(observation) else {
            return f64::NAN;
        };
        let sigma = x[0].hypot(x[1]) + x[2].abs().sqrt();
        if sigma < SINGULARITY_EPS {
            return 0.0;
        }
        x[0].powi(4) + x[1].powi(4) + x[2].abs().powi(3) / (sigma * sigma)
    }
}

impl Resettable for NiBacksteppingController {
    fn reset(&mut self) {}
}

impl SafeController for NiBacksteppingController {
    fn name(&self) -> &'static str {
        "ni_backstepping"
    }

    fn observation_dim(&self) -> usize {
        3
    }

    fn action_dim(&self) -> usize {
        2
    }

    fn compute_action(&mut self, observation: &[f64]) -> Vec<f64> {
        let Some(x) = nh_state(observation) else {
            return vec![0.0; 2];
        };
        let k = kappa(&x);
        let u = [self.gain * k[0], self.gain * k[1]];
        vec![u[1] + 0.5 * u[0] * (x[2] + x[0] * x[1]), u[0]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_matches_finite_differences() {
        let lf = |x: &[f64; 3]| {
            let sigma = x[0].hypot(x[1]) + x[2].abs().sqrt();
            x[0].powi(4) + x[1].powi(4) + x[2].abs().powi(3) / (sigma * sigma)
        };
        let x = [0.4, -0.7, 1.3];
        let g = zeta(&x);
        let h = 1e-6;
        for i in 0..3 {
            let mut xp = x;
            let mut xm = x;
            xp[i] += h;
            xm[i] -= h;
            let fd = (lf(&xp) - lf(&xm)) / (2.0 * h);
            assert!((g[i] - fd).abs() < 1e-5, "component {i}: {} vs {}", g[i], fd);
        }
    }

    #[test]
    fn planar_origin_uses_limit_branch() {
        let z = zeta(&[0.0, 0.0, 0.7]);
        assert!(z.iter().all(|v| v.is_finite()));
        assert!(z[0] < 0.0);
    }

    #[test]
    fn wrong_size_observation_is_not_certified() {
        let mut ctrl = NiBacksteppingController::new(10.0);
        assert!(ctrl.compute_lf(&[1.0, 1.0]).is_nan());
        assert!(ctrl.compute_lf(&[1.0, 1.0, 0.0, 0.0]).is_nan());
        assert_eq!(ctrl.compute_action(&[1.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn action_is_zero_at_origin() {
        let mut ctrl = NiBacksteppingController::new(1.0);
        assert_eq!(ctrl.compute_action(&[0.0, 0.0, 0.0]), vec![0.0, 0.0]);
        assert_eq!(ctrl.compute_lf(&[0.0, 0.0, 0.0]), 0.0);
    }
}

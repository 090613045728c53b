// src/safe/mod.rs
//
// Stabilizing fallback controllers.
//
// Every safe controller maps an observation (already expressed relative to
// the target) to an action and reports a Lyapunov-like certificate for any
// state. The CALF orchestrator falls back to one of these whenever learned
// weights fail their acceptance test.

pub mod endi;
pub mod kin_point;
pub mod ni;
pub mod sampled;

pub use endi::EndiBacksteppingController;
pub use kin_point::KinPointController;
pub use ni::NiBacksteppingController;
pub use sampled::SampledController;

use crate::controller::{Certified, Resettable};
use crate::diagnostics::DiagnosticEvent;

/// Guard applied to chained-coordinate denominators.
pub(crate) const SINGULARITY_EPS: f64 = 1e-9;

pub trait SafeController: Certified + Resettable + Send {
    fn name(&self) -> &'static str;

    fn observation_dim(&self) -> usize;

    fn action_dim(&self) -> usize;

    /// Unclipped fallback action for `observation` (relative to target).
    fn compute_action(&mut self, observation: &[f64]) -> Vec<f64>;

    /// Take events raised since the last call.
    fn drain_diagnostics(&mut self) -> Vec<DiagnosticEvent> {
        Vec::new()
    }
}

/// `-sgn(v) |v|^(1/3)`
pub(crate) fn neg_signed_cbrt(v: f64) -> f64 {
    -v.cbrt()
}

pub(crate) fn sgn(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Cartesian pose `(x, y, angle)` to non-holonomic chained coordinates.
pub(crate) fn cartesian_to_nh(x: f64, y: f64, angle: f64) -> [f64; 3] {
    let (sa, ca) = angle.sin_cos();
    let along = x * ca + y * sa;
    let across = y * ca - x * sa;
    [angle, along, -2.0 * across - angle * along]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_cbrt_flips_sign() {
        assert!((neg_signed_cbrt(8.0) + 2.0).abs() < 1e-12);
        assert!((neg_signed_cbrt(-27.0) - 3.0).abs() < 1e-12);
        assert_eq!(neg_signed_cbrt(0.0), 0.0);
    }

    #[test]
    fn nh_transform_at_zero_heading() {
        let x = cartesian_to_nh(1.0, 2.0, 0.0);
        assert_eq!(x, [0.0, 1.0, -4.0]);
    }
}

// src/plant.rs
//
// Nominal plant models and a fixed-step RK4 integrator.
//
// The controller never integrates anything itself; these are used by the
// simulator and by the one-step predictor the actor relies on.

/// Right-hand side of `ẋ = f(x, u)`.
pub trait Dynamics: Send + Sync {
    fn state_dim(&self) -> usize;

    fn action_dim(&self) -> usize;

    fn rhs(&self, state: &[f64], action: &[f64]) -> Vec<f64>;
}

/// Single-integrator point: `ẋ = u`.
#[derive(Debug, Clone)]
pub struct KinematicPoint {
    pub dim: usize,
}

impl Dynamics for KinematicPoint {
    fn state_dim(&self) -> usize {
        self.dim
    }

    fn action_dim(&self) -> usize {
        self.dim
    }

    fn rhs(&self, _state: &[f64], action: &[f64]) -> Vec<f64> {
        (0..self.dim)
            .map(|i| action.get(i).copied().unwrap_or(0.0))
            .collect()
    }
}

/// Kinematic three-wheel robot. State `(x, y, angle)`, action `(v, omega)`.
#[derive(Debug, Clone, Default)]
pub struct ThreeWheelRobotNi;

impl Dynamics for ThreeWheelRobotNi {
    fn state_dim(&self) -> usize {
        3
    }

    fn action_dim(&self) -> usize {
        2
    }

    fn rhs(&self, state: &[f64], action: &[f64]) -> Vec<f64> {
        let angle = state[2];
        let (v, omega) = (action[0], action[1]);
        vec![v * angle.cos(), v * angle.sin(), omega]
    }
}

/// Three-wheel robot with dynamical pushing force and steering torque.
/// State `(x, y, angle, v, omega)`, action `(force, torque)`.
#[derive(Debug, Clone)]
pub struct ThreeWheelRobotEndi {
    pub mass: f64,
    pub inertia: f64,
}

impl Default for ThreeWheelRobotEndi {
    fn default() -> Self {
        Self {
            mass: 10.0,
            inertia: 1.0,
        }
    }
}

impl Dynamics for ThreeWheelRobotEndi {
    fn state_dim(&self) -> usize {
        5
    }

    fn action_dim(&self) -> usize {
        2
    }

    fn rhs(&self, state: &[f64], action: &[f64]) -> Vec<f64> {
        let (angle, v, omega) = (state[2], state[3], state[4]);
        vec![
            v * angle.cos(),
            v * angle.sin(),
            omega,
            action[0] / self.mass,
            action[1] / self.inertia,
        ]
    }
}

fn axpy(x: &[f64], k: &[f64], h: f64) -> Vec<f64> {
    x.iter().zip(k.iter()).map(|(a, b)| a + h * b).collect()
}

/// One classical RK4 step of size `h` with the action held constant.
pub fn rk4_step(dynamics: &dyn Dynamics, state: &[f64], action: &[f64], h: f64) -> Vec<f64> {
    let k1 = dynamics.rhs(state, action);
    let k2 = dynamics.rhs(&axpy(state, &k1, 0.5 * h), action);
    let k3 = dynamics.rhs(&axpy(state, &k2, 0.5 * h), action);
    let k4 = dynamics.rhs(&axpy(state, &k3, h), action);
    state
        .iter()
        .enumerate()
        .map(|(i, x)| x + h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]))
        .collect()
}

/// Integrate over `dt` using `substeps` equal RK4 steps.
pub fn integrate(
    dynamics: &dyn Dynamics,
    state: &[f64],
    action: &[f64],
    dt: f64,
    substeps: usize,
) -> Vec<f64> {
    let n = substeps.max(1);
    let h = dt / n as f64;
    let mut x = state.to_vec();
    for _ in 0..n {
        x = rk4_step(dynamics, &x, action, h);
    }
    x
}

// src/model.rs
//
// Parametrized function approximators for the critic and the actor.
//
// Models are stateless with respect to weights: every evaluation receives
// the weight vector explicitly, so the caller owns the weight slots and
// decides which snapshot is in effect.

/// Scalar certificate/value model `V(w, o)`.
pub trait CriticModel: Send {
    fn num_weights(&self) -> usize;

    /// Per-weight `(low, high)` box used by the optimizer.
    fn weight_bounds(&self) -> Vec<(f64, f64)>;

    fn evaluate(&self, weights: &[f64], observation: &[f64]) -> f64;
}

/// Vector-valued policy `π(w, o)`.
pub trait ActorModel: Send {
    fn num_weights(&self) -> usize;

    fn action_dim(&self) -> usize;

    fn weight_bounds(&self) -> Vec<(f64, f64)>;

    fn evaluate(&self, weights: &[f64], observation: &[f64]) -> Vec<f64>;
}

/// Quadratic form over all monomials `o_i * o_j`, `i <= j`.
///
/// Diagonal weights are kept non-negative so that the default initial
/// weights (identity) describe a positive definite form.
#[derive(Debug, Clone)]
pub struct QuadraticCritic {
    dim: usize,
    weight_max: f64,
}

impl QuadraticCritic {
    pub fn new(dim: usize, weight_max: f64) -> Self {
        Self {
            dim,
            weight_max: weight_max.abs(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of features for an observation of dimension `dim`.
    pub fn feature_count(dim: usize) -> usize {
        dim * (dim + 1) / 2
    }

    /// Weights describing `‖o‖²`.
    pub fn identity_weights(dim: usize) -> Vec<f64> {
        let mut w = Vec::with_capacity(Self::feature_count(dim));
        for i in 0..dim {
            for j in i..dim {
                w.push(if i == j { 1.0 } else { 0.0 });
            }
        }
        w
    }
}

impl CriticModel for QuadraticCritic {
    fn num_weights(&self) -> usize {
        Self::feature_count(self.dim)
    }

    fn weight_bounds(&self) -> Vec<(f64, f64)> {
        let mut b = Vec::with_capacity(self.num_weights());
        for i in 0..self.dim {
            for j in i..self.dim {
                if i == j {
                    b.push((0.0, self.weight_max));
                } else {
                    b.push((-self.weight_max, self.weight_max));
                }
            }
        }
        b
    }

    fn evaluate(&self, weights: &[f64], observation: &[f64]) -> f64 {
        let mut k = 0;
        let mut v = 0.0;
        for i in 0..self.dim {
            let oi = observation.get(i).copied().unwrap_or(0.0);
            for j in i..self.dim {
                let oj = observation.get(j).copied().unwrap_or(0.0);
                v += weights.get(k).copied().unwrap_or(0.0) * oi * oj;
                k += 1;
            }
        }
        v
    }
}

/// Linear state feedback `a = W o`, weights stored row-major.
#[derive(Debug, Clone)]
pub struct LinearPolicy {
    observation_dim: usize,
    action_dim: usize,
    weight_max: f64,
}

impl LinearPolicy {
    pub fn new(observation_dim: usize, action_dim: usize, weight_max: f64) -> Self {
        Self {
            observation_dim,
            action_dim,
            weight_max: weight_max.abs(),
        }
    }

    /// `W = -gain * I` on the leading square block.
    pub fn proportional_weights(observation_dim: usize, action_dim: usize, gain: f64) -> Vec<f64> {
        let mut w = vec![0.0; observation_dim * action_dim];
        for r in 0..action_dim.min(observation_dim) {
            w[r * observation_dim + r] = -gain;
        }
        w
    }
}

impl ActorModel for LinearPolicy {
    fn num_weights(&self) -> usize {
        self.observation_dim * self.action_dim
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }

    fn weight_bounds(&self) -> Vec<(f64, f64)> {
        vec![(-self.weight_max, self.weight_max); self.num_weights()]
    }

    fn evaluate(&self, weights: &[f64], observation: &[f64]) -> Vec<f64> {
        (0..self.action_dim)
            .map(|r| {
                (0..self.observation_dim)
                    .map(|c| {
                        weights.get(r * self.observation_dim + c).copied().unwrap_or(0.0)
                            * observation.get(c).copied().unwrap_or(0.0)
                    })
                    .sum()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_critic_is_squared_norm() {
        let critic = QuadraticCritic::new(3, 10.0);
        let w = QuadraticCritic::identity_weights(3);
        assert_eq!(w.len(), 6);
        let v = critic.evaluate(&w, &[1.0, -2.0, 3.0]);
        assert!((v - 14.0).abs() < 1e-12);
    }

    #[test]
    fn critic_cross_terms_use_upper_triangle() {
        let critic = QuadraticCritic::new(2, 10.0);
        // features: o0^2, o0*o1, o1^2
        let v = critic.evaluate(&[0.0, 1.0, 0.0], &[2.0, 3.0]);
        assert!((v - 6.0).abs() < 1e-12);
        let b = critic.weight_bounds();
        assert_eq!(b[0], (0.0, 10.0));
        assert_eq!(b[1], (-10.0, 10.0));
    }

    #[test]
    fn linear_policy_is_row_major() {
        let policy = LinearPolicy::new(3, 2, 5.0);
        let w = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(policy.evaluate(&w, &[1.0, 0.0, -1.0]), vec![-2.0, -2.0]);
    }

    #[test]
    fn proportional_weights_fill_diagonal() {
        let w = LinearPolicy::proportional_weights(3, 2, 2.0);
        assert_eq!(w, vec![-2.0, 0.0, 0.0, 0.0, -2.0, 0.0]);
    }
}

// src/optimizer.rs
//
// Black-box numerical solvers.
//
// - `Optimizer`: bounded multivariate minimization used for actor/critic
//   weights. The controller only sees a candidate vector and a converged
//   flag; it never inspects solver internals.
// - `NelderMead`: derivative-free simplex solver with box projection.
// - `minimize_scalar_bounded`: Brent's bounded scalar method, used by the
//   CLF backstepping controller to pick the auxiliary angle.

/// Outcome of a solver run.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeResult {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

pub trait Optimizer: Send {
    /// Minimize `objective` starting at `x0`, keeping every iterate inside
    /// `bounds` (one `(low, high)` pair per coordinate).
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        x0: &[f64],
        bounds: &[(f64, f64)],
    ) -> OptimizeResult;
}

/// Nelder–Mead simplex search (standard coefficients).
///
/// The iteration budget scales with the problem: `iters_per_dim * n` for
/// `n` coordinates. Convergence needs both the simplex extent and the
/// spread of objective values within the absolute tolerances.
#[derive(Debug, Clone)]
pub struct NelderMead {
    pub iters_per_dim: usize,
    pub xtol: f64,
    pub ftol: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            iters_per_dim: 200,
            xtol: 1e-4,
            ftol: 1e-4,
        }
    }
}

impl NelderMead {
    pub fn budget(&self, n: usize) -> usize {
        self.iters_per_dim.saturating_mul(n.max(1))
    }
}

const NM_REFLECT: f64 = 1.0;
const NM_EXPAND: f64 = 2.0;
const NM_CONTRACT: f64 = 0.5;
const NM_SHRINK: f64 = 0.5;

fn project(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (xi, (lo, hi)) in x.iter_mut().zip(bounds.iter()) {
        *xi = xi.clamp(*lo, *hi);
    }
}

fn eval(objective: &dyn Fn(&[f64]) -> f64, x: &[f64]) -> f64 {
    let v = objective(x);
    if v.is_nan() {
        f64::INFINITY
    } else {
        v
    }
}

impl Optimizer for NelderMead {
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        x0: &[f64],
        bounds: &[(f64, f64)],
    ) -> OptimizeResult {
        let n = x0.len();
        let mut start = x0.to_vec();
        project(&mut start, bounds);

        if n == 0 {
            let value = eval(objective, &start);
            return OptimizeResult {
                x: start,
                value,
                iterations: 0,
                converged: true,
            };
        }

        // Initial simplex: 5% perturbation per coordinate, small absolute
        // step for zero entries.
        let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
        simplex.push(start.clone());
        for i in 0..n {
            let mut p = start.clone();
            let step = if p[i].abs() > 1e-12 { 0.05 * p[i] } else { 2.5e-4 };
            p[i] += step;
            project(&mut p, bounds);
            if (p[i] - start[i]).abs() < 1e-15 {
                // Pinned against a bound: step inward instead.
                p[i] = start[i] - step;
                project(&mut p, bounds);
            }
            simplex.push(p);
        }
        let mut values: Vec<f64> = simplex.iter().map(|p| eval(objective, p)).collect();

        let budget = self.budget(n);
        let mut iterations = 0;
        let mut converged = false;

        while iterations < budget {
            // Order vertices by objective value; ties keep insertion order.
            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&a, &b| {
                values[a]
                    .partial_cmp(&values[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            let x_spread = simplex[1..]
                .iter()
                .flat_map(|p| p.iter().zip(simplex[0].iter()).map(|(a, b)| (a - b).abs()))
                .fold(0.0_f64, f64::max);
            let f_spread = values[1..]
                .iter()
                .map(|v| (v - values[0]).abs())
                .fold(0.0_f64, f64::max);
            if x_spread <= self.xtol && f_spread <= self.ftol {
                converged = true;
                break;
            }

            iterations += 1;

            let mut centroid = vec![0.0; n];
            for p in &simplex[..n] {
                for (c, v) in centroid.iter_mut().zip(p.iter()) {
                    *c += v / n as f64;
                }
            }

            let worst = simplex[n].clone();
            let along = |coef: f64| -> Vec<f64> {
                let mut p: Vec<f64> = centroid
                    .iter()
                    .zip(worst.iter())
                    .map(|(c, w)| c + coef * (c - w))
                    .collect();
                project(&mut p, bounds);
                p
            };

            let reflected = along(NM_REFLECT);
            let f_reflected = eval(objective, &reflected);

            if f_reflected < values[0] {
                let expanded = along(NM_EXPAND);
                let f_expanded = eval(objective, &expanded);
                if f_expanded < f_reflected {
                    simplex[n] = expanded;
                    values[n] = f_expanded;
                } else {
                    simplex[n] = reflected;
                    values[n] = f_reflected;
                }
                continue;
            }

            if f_reflected < values[n - 1] {
                simplex[n] = reflected;
                values[n] = f_reflected;
                continue;
            }

            let (contracted, f_contracted) = if f_reflected < values[n] {
                let p = along(NM_CONTRACT);
                let f = eval(objective, &p);
                (p, f)
            } else {
                let p = along(-NM_CONTRACT);
                let f = eval(objective, &p);
                (p, f)
            };

            if f_contracted < values[n].min(f_reflected) {
                simplex[n] = contracted;
                values[n] = f_contracted;
                continue;
            }

            let best = simplex[0].clone();
            for i in 1..=n {
                let mut p: Vec<f64> = best
                    .iter()
                    .zip(simplex[i].iter())
                    .map(|(b, v)| b + NM_SHRINK * (v - b))
                    .collect();
                project(&mut p, bounds);
                values[i] = eval(objective, &p);
                simplex[i] = p;
            }
        }

        let best = (0..=n)
            .min_by(|&a, &b| {
                values[a]
                    .partial_cmp(&values[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(0);

        OptimizeResult {
            x: simplex[best].clone(),
            value: values[best],
            iterations,
            converged,
        }
    }
}

/// Outcome of a scalar bounded minimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarResult {
    pub x: f64,
    pub value: f64,
    pub evaluations: usize,
    pub converged: bool,
}

const GOLDEN_MEAN: f64 = 0.381_966_011_250_105_1; // (3 - sqrt(5)) / 2

fn sign_or_one(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Brent's method on `[lo, hi]` with absolute tolerance `xtol` and at most
/// `max_evals` objective evaluations. On exhausting the budget the best
/// point found so far is returned with `converged = false`.
pub fn minimize_scalar_bounded(
    f: impl Fn(f64) -> f64,
    lo: f64,
    hi: f64,
    xtol: f64,
    max_evals: usize,
) -> ScalarResult {
    let sqrt_eps = f64::EPSILON.sqrt();
    let f = |x: f64| {
        let v = f(x);
        if v.is_nan() {
            f64::INFINITY
        } else {
            v
        }
    };

    let (mut a, mut b) = (lo, hi);
    let mut fulc = a + GOLDEN_MEAN * (b - a);
    let mut nfc = fulc;
    let mut xf = fulc;
    let mut rat = 0.0_f64;
    let mut e = 0.0_f64;
    let mut fx = f(xf);
    let mut evaluations = 1;
    let mut ffulc = fx;
    let mut fnfc = fx;
    let mut xm = 0.5 * (a + b);
    let mut tol1 = sqrt_eps * xf.abs() + xtol / 3.0;
    let mut tol2 = 2.0 * tol1;
    let mut converged = true;

    while (xf - xm).abs() > tol2 - 0.5 * (b - a) {
        let mut golden = true;

        if e.abs() > tol1 {
            golden = false;
            let mut r = (xf - nfc) * (fx - ffulc);
            let mut q = (xf - fulc) * (fx - fnfc);
            let mut p = (xf - fulc) * q - (xf - nfc) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            r = e;
            e = rat;

            if p.abs() < (0.5 * q * r).abs() && p > q * (a - xf) && p < q * (b - xf) {
                // Parabolic step.
                rat = p / q;
                let x = xf + rat;
                if (x - a) < tol2 || (b - x) < tol2 {
                    rat = tol1 * sign_or_one(xm - xf);
                }
            } else {
                golden = true;
            }
        }

        if golden {
            e = if xf >= xm { a - xf } else { b - xf };
            rat = GOLDEN_MEAN * e;
        }

        let x = xf + sign_or_one(rat) * rat.abs().max(tol1);
        let fu = f(x);
        evaluations += 1;

        if fu <= fx {
            if x >= xf {
                a = xf;
            } else {
                b = xf;
            }
            fulc = nfc;
            ffulc = fnfc;
            nfc = xf;
            fnfc = fx;
            xf = x;
            fx = fu;
        } else {
            if x < xf {
                a = x;
            } else {
                b = x;
            }
            if fu <= fnfc || nfc == xf {
                fulc = nfc;
                ffulc = fnfc;
                nfc = x;
                fnfc = fu;
            } else if fu <= ffulc || fulc == xf || fulc == nfc {
                fulc = x;
                ffulc = fu;
            }
        }

        xm = 0.5 * (a + b);
        tol1 = sqrt_eps * xf.abs() + xtol / 3.0;
        tol2 = 2.0 * tol1;

        if evaluations >= max_evals {
            converged = false;
            break;
        }
    }

    ScalarResult {
        x: xf,
        value: fx,
        evaluations,
        converged,
    }
}

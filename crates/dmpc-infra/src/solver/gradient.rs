// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Gradient descent with discrete adjoints on an explicit-Euler single
//! shooting discretization.
//!
//! With `x_{k+1} = x_k + dt f(t_k, x_k, u_k)` the solver minimizes
//!
//! `J = Σ_{k=0}^{N-1} dt (l_k + c/2 (|g_k|² + |max(0, h_k)|²)) + V(t_{N-1}, x_{N-1})`
//!
//! over the control samples. Constraints enter as a quadratic penalty with
//! weight `c = constraint_penalty`. The step length comes from a
//! Barzilai-Borwein estimate safeguarded by Armijo backtracking.

use dmpc_core::config::OptimizationInfo;
use dmpc_core::error::SolveError;
use dmpc_core::math::{dot, norm_inf, uniform_grid};
use dmpc_core::problem::{OcpDimensions, ProblemDescription};
use dmpc_core::solver::{InitialGuess, LocalSolution, LocalSolver};

/// Sufficient-decrease constant of the Armijo condition.
const ARMIJO: f64 = 1e-4;

/// Largest step the Barzilai-Borwein estimate may propose.
const MAX_STEP: f64 = 1e6;

/// Gradient-based single-shooting solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientSolver {
    strict: bool,
}

impl GradientSolver {
    /// A solver that reports hitting its iteration cap as a regular result.
    pub fn new() -> Self {
        Self::default()
    }

    /// A solver that reports hitting its iteration cap as
    /// [`SolveError::NotConverged`].
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

/// One discretized problem instance.
struct Shooting<'a> {
    problem: &'a dyn ProblemDescription,
    dims: OcpDimensions,
    t: Vec<f64>,
    dt: f64,
    penalty: f64,
}

impl Shooting<'_> {
    fn samples(&self) -> usize {
        self.t.len()
    }

    fn simulate(&self, x0: &[f64], u: &[f64]) -> Result<Vec<f64>, SolveError> {
        let (nx, nu) = (self.dims.nx, self.dims.nu);
        let mut x = vec![0.0; self.samples() * nx];
        x[..nx].copy_from_slice(x0);
        let mut f = vec![0.0; nx];

        for k in 0..self.samples() - 1 {
            let (head, tail) = x.split_at_mut((k + 1) * nx);
            let xk = &head[k * nx..];
            self.problem.ffct(&mut f, self.t[k], xk, &u[k * nu..(k + 1) * nu]);
            for ((next, cur), fi) in tail[..nx].iter_mut().zip(xk).zip(&f) {
                *next = cur + self.dt * fi;
            }
            if tail[..nx].iter().any(|v| !v.is_finite()) {
                return Err(SolveError::NumericalFailure(format!(
                    "state trajectory diverged at sample {}",
                    k + 1
                )));
            }
        }
        Ok(x)
    }

    /// Penalized constraint values at one sample: `g` and `max(0, h)`.
    fn constraint_residuals(&self, t: f64, x: &[f64], u: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut g = vec![0.0; self.dims.ng];
        let mut h = vec![0.0; self.dims.nh];
        if self.penalty > 0.0 {
            if !g.is_empty() {
                self.problem.gfct(&mut g, t, x, u);
            }
            if !h.is_empty() {
                self.problem.hfct(&mut h, t, x, u);
                h.iter_mut().for_each(|v| *v = v.max(0.0));
            }
        }
        (g, h)
    }

    fn cost(&self, x: &[f64], u: &[f64]) -> Result<f64, SolveError> {
        let (nx, nu) = (self.dims.nx, self.dims.nu);
        let mut cost = 0.0;
        for (k, &t) in self.t.iter().enumerate() {
            let (xk, uk) = (&x[k * nx..(k + 1) * nx], &u[k * nu..(k + 1) * nu]);
            let (g, h) = self.constraint_residuals(t, xk, uk);
            let stage = self.problem.lfct(t, xk, uk) + 0.5 * self.penalty * (dot(&g, &g) + dot(&h, &h));
            cost += self.dt * stage;
        }
        let last = self.samples() - 1;
        cost += self.problem.vfct(self.t[last], &x[last * nx..]);

        if cost.is_finite() {
            Ok(cost)
        } else {
            Err(SolveError::NumericalFailure("cost is not finite".to_string()))
        }
    }

    /// `∂(stage)/∂x` and `∂(stage)/∂u` at one sample, penalty included.
    fn stage_gradient(&self, t: f64, xk: &[f64], uk: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let (nx, nu) = (self.dims.nx, self.dims.nu);
        let mut lx = vec![0.0; nx];
        let mut lu = vec![0.0; nu];
        self.problem.dldx(&mut lx, t, xk, uk);
        self.problem.dldu(&mut lu, t, xk, uk);

        let (g, h) = self.constraint_residuals(t, xk, uk);
        let mut tmp_x = vec![0.0; nx];
        let mut tmp_u = vec![0.0; nu];
        if g.iter().any(|v| *v != 0.0) {
            self.problem.dgdx_vec(&mut tmp_x, t, xk, uk, &g);
            self.problem.dgdu_vec(&mut tmp_u, t, xk, uk, &g);
            accumulate(&mut lx, &tmp_x, self.penalty);
            accumulate(&mut lu, &tmp_u, self.penalty);
        }
        if h.iter().any(|v| *v != 0.0) {
            self.problem.dhdx_vec(&mut tmp_x, t, xk, uk, &h);
            self.problem.dhdu_vec(&mut tmp_u, t, xk, uk, &h);
            accumulate(&mut lx, &tmp_x, self.penalty);
            accumulate(&mut lu, &tmp_u, self.penalty);
        }
        (lx, lu)
    }

    /// Gradient of the cost with respect to every control sample.
    fn gradient(&self, x: &[f64], u: &[f64]) -> Result<Vec<f64>, SolveError> {
        let (nx, nu) = (self.dims.nx, self.dims.nu);
        let n = self.samples();
        let mut grad = vec![0.0; n * nu];
        let mut fx = vec![0.0; nx];
        let mut fu = vec![0.0; nu];

        // Adjoint of the last sample.
        let last = n - 1;
        let (xl, ul) = (&x[last * nx..], &u[last * nu..]);
        let (lx, lu) = self.stage_gradient(self.t[last], xl, ul);
        let mut lambda = vec![0.0; nx];
        self.problem.dvdx(&mut lambda, self.t[last], xl);
        accumulate(&mut lambda, &lx, self.dt);
        accumulate(&mut grad[last * nu..], &lu, self.dt);

        for k in (0..last).rev() {
            let t = self.t[k];
            let (xk, uk) = (&x[k * nx..(k + 1) * nx], &u[k * nu..(k + 1) * nu]);
            let (lx, lu) = self.stage_gradient(t, xk, uk);

            self.problem.dfdu_vec(&mut fu, t, xk, &lambda, uk);
            let gk = &mut grad[k * nu..(k + 1) * nu];
            accumulate(gk, &lu, self.dt);
            accumulate(gk, &fu, self.dt);

            self.problem.dfdx_vec(&mut fx, t, xk, &lambda, uk);
            accumulate(&mut lambda, &fx, self.dt);
            accumulate(&mut lambda, &lx, self.dt);
        }

        if grad.iter().all(|v| v.is_finite()) {
            Ok(grad)
        } else {
            Err(SolveError::NumericalFailure("gradient is not finite".to_string()))
        }
    }
}

fn accumulate(out: &mut [f64], src: &[f64], scale: f64) {
    for (o, s) in out.iter_mut().zip(src) {
        *o += scale * s;
    }
}

fn check_len(what: &'static str, actual: usize, expected: usize) -> Result<(), SolveError> {
    if actual == expected {
        Ok(())
    } else {
        Err(SolveError::DimensionMismatch { what, expected, actual })
    }
}

impl LocalSolver for GradientSolver {
    fn solve(
        &self,
        problem: &dyn ProblemDescription,
        guess: &InitialGuess,
        info: &OptimizationInfo,
    ) -> Result<LocalSolution, SolveError> {
        let dims = problem.ocp_dim();
        let n = info.horizon_steps.max(2);
        check_len("initial state", guess.x0.len(), dims.nx)?;
        check_len("control trajectory", guess.u.len(), n * dims.nu)?;

        let dt = info.step_size();
        let shooting = Shooting {
            problem,
            dims,
            t: uniform_grid(guess.t0, dt, n),
            dt,
            penalty: info.constraint_penalty,
        };

        let mut u = guess.u.clone();
        let mut x = shooting.simulate(&guess.x0, &u)?;
        let mut cost = shooting.cost(&x, &u)?;
        let mut grad = shooting.gradient(&x, &u)?;
        let mut step = info.line_search_init;
        let mut previous: Option<(Vec<f64>, Vec<f64>)> = None;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < info.max_gradient_iterations {
            if norm_inf(&grad) <= info.gradient_tolerance {
                converged = true;
                break;
            }

            if let Some((u_prev, grad_prev)) = &previous {
                let s: Vec<f64> = u.iter().zip(u_prev).map(|(a, b)| a - b).collect();
                let y: Vec<f64> = grad.iter().zip(grad_prev).map(|(a, b)| a - b).collect();
                let sy = dot(&s, &y);
                step = if sy > 0.0 { dot(&s, &s) / sy } else { 2.0 * step };
            }
            step = step.clamp(info.line_search_min, MAX_STEP);

            let slope = dot(&grad, &grad);
            let mut accepted = None;
            while step >= info.line_search_min {
                let u_trial: Vec<f64> = u.iter().zip(&grad).map(|(ui, gi)| ui - step * gi).collect();
                // A diverging trial is just a step that is too long.
                if let Ok(x_trial) = shooting.simulate(&guess.x0, &u_trial) {
                    if let Ok(c_trial) = shooting.cost(&x_trial, &u_trial) {
                        if c_trial <= cost - ARMIJO * step * slope {
                            accepted = Some((u_trial, x_trial, c_trial));
                            break;
                        }
                    }
                }
                step *= 0.5;
            }
            iterations += 1;

            let Some((u_new, x_new, c_new)) = accepted else {
                log::trace!(
                    "GradientSolver: line search stalled after {} iterations (|grad| = {:.3e})",
                    iterations,
                    norm_inf(&grad)
                );
                break;
            };

            let u_prev = std::mem::replace(&mut u, u_new);
            x = x_new;
            cost = c_new;
            let grad_prev = std::mem::replace(&mut grad, shooting.gradient(&x, &u)?);
            previous = Some((u_prev, grad_prev));
        }

        if !converged && norm_inf(&grad) <= info.gradient_tolerance {
            converged = true;
        }
        if !converged && self.strict {
            return Err(SolveError::NotConverged { iterations });
        }

        Ok(LocalSolution {
            t: shooting.t,
            x,
            u,
            cost,
            iterations,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// `ẋ = u`, `l = x² + u²`, `V = x²`.
    struct Integrator;

    impl ProblemDescription for Integrator {
        fn ocp_dim(&self) -> OcpDimensions {
            OcpDimensions { nx: 1, nu: 1, ..Default::default() }
        }
        fn ffct(&self, out: &mut [f64], _t: f64, _x: &[f64], u: &[f64]) {
            out[0] = u[0];
        }
        fn dfdx_vec(&self, out: &mut [f64], _t: f64, _x: &[f64], _vec: &[f64], _u: &[f64]) {
            out[0] = 0.0;
        }
        fn dfdu_vec(&self, out: &mut [f64], _t: f64, _x: &[f64], vec: &[f64], _u: &[f64]) {
            out[0] = vec[0];
        }
        fn lfct(&self, _t: f64, x: &[f64], u: &[f64]) -> f64 {
            x[0] * x[0] + u[0] * u[0]
        }
        fn dldx(&self, out: &mut [f64], _t: f64, x: &[f64], _u: &[f64]) {
            out[0] = 2.0 * x[0];
        }
        fn dldu(&self, out: &mut [f64], _t: f64, _x: &[f64], u: &[f64]) {
            out[0] = 2.0 * u[0];
        }
        fn vfct(&self, _t: f64, x: &[f64]) -> f64 {
            x[0] * x[0]
        }
        fn dvdx(&self, out: &mut [f64], _t: f64, x: &[f64]) {
            out[0] = 2.0 * x[0];
        }
        fn gfct(&self, _: &mut [f64], _: f64, _: &[f64], _: &[f64]) {}
        fn dgdx_vec(&self, _: &mut [f64], _: f64, _: &[f64], _: &[f64], _: &[f64]) {}
        fn dgdu_vec(&self, _: &mut [f64], _: f64, _: &[f64], _: &[f64], _: &[f64]) {}
        fn hfct(&self, _: &mut [f64], _: f64, _: &[f64], _: &[f64]) {}
        fn dhdx_vec(&self, _: &mut [f64], _: f64, _: &[f64], _: &[f64], _: &[f64]) {}
        fn dhdu_vec(&self, _: &mut [f64], _: f64, _: &[f64], _: &[f64], _: &[f64]) {}
    }

    fn info() -> OptimizationInfo {
        OptimizationInfo {
            horizon: 1.0,
            horizon_steps: 11,
            ..Default::default()
        }
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let info = info();
        let shooting = Shooting {
            problem: &Integrator,
            dims: Integrator.ocp_dim(),
            t: uniform_grid(0.0, info.step_size(), info.horizon_steps),
            dt: info.step_size(),
            penalty: 0.0,
        };
        let x0 = [1.0];
        let u: Vec<f64> = (0..11).map(|k| 0.1 * k as f64 - 0.3).collect();
        let x = shooting.simulate(&x0, &u).unwrap();
        let grad = shooting.gradient(&x, &u).unwrap();

        let h = 1e-6;
        for k in 0..u.len() {
            let mut up = u.clone();
            let mut um = u.clone();
            up[k] += h;
            um[k] -= h;
            let cp = shooting.cost(&shooting.simulate(&x0, &up).unwrap(), &up).unwrap();
            let cm = shooting.cost(&shooting.simulate(&x0, &um).unwrap(), &um).unwrap();
            assert_relative_eq!(grad[k], (cp - cm) / (2.0 * h), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_solve_drives_state_towards_origin() {
        let info = info();
        let guess = InitialGuess { t0: 0.0, x0: vec![1.0], u: vec![0.0; 11] };
        let solution = GradientSolver::new().solve(&Integrator, &guess, &info).unwrap();

        assert!(solution.converged);
        assert!(solution.u[0] < 0.0);
        assert!(solution.x[10].abs() < 1.0);
        assert_eq!(solution.t.len(), 11);
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let guess = InitialGuess { t0: 0.0, x0: vec![1.0, 2.0], u: vec![0.0; 11] };
        let err = GradientSolver::new().solve(&Integrator, &guess, &info()).unwrap_err();
        assert!(matches!(err, SolveError::DimensionMismatch { what: "initial state", .. }));
    }

    #[test]
    fn test_strict_solver_reports_iteration_cap() {
        let info = OptimizationInfo {
            max_gradient_iterations: 1,
            gradient_tolerance: 1e-14,
            ..info()
        };
        let guess = InitialGuess { t0: 0.0, x0: vec![1.0], u: vec![0.0; 11] };
        let err = GradientSolver::strict().solve(&Integrator, &guess, &info).unwrap_err();
        assert_eq!(err, SolveError::NotConverged { iterations: 1 });
    }
}

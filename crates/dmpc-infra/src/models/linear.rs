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

//! Linear time-invariant agents with quadratic cost and linear couplings.

use dmpc_core::model::{AgentModel, CouplingModel};

use super::{add_mat_t_vec, add_mat_vec, add_weighted_distance_grad, weighted_distance};

/// `ẋ = A x + B u` with cost `Σ q (x - x_des)² + Σ r (u - u_des)²` and
/// terminal cost `Σ p (x - x_des)²`.
///
/// Optional box bounds on the control become `2 nu` inequality constraints
/// `[u - u_max; u_min - u] <= 0`.
#[derive(Debug, Clone)]
pub struct LinearAgentModel {
    name: String,
    nx: usize,
    nu: usize,
    a: Vec<f64>,
    b: Vec<f64>,
    q: Vec<f64>,
    r: Vec<f64>,
    p: Vec<f64>,
    bounds: Option<(Vec<f64>, Vec<f64>)>,
}

impl LinearAgentModel {
    /// Builds the model from row-major `A` (`nx × nx`) and `B` (`nx × nu`)
    /// with unit weights.
    ///
    /// # Panics
    /// If the matrix sizes do not match the dimensions.
    pub fn new(a: Vec<f64>, b: Vec<f64>, nx: usize, nu: usize) -> Self {
        assert_eq!(a.len(), nx * nx, "A must be nx × nx");
        assert_eq!(b.len(), nx * nu, "B must be nx × nu");
        Self {
            name: "linear".to_string(),
            nx,
            nu,
            a,
            b,
            q: vec![1.0; nx],
            r: vec![1.0; nu],
            p: vec![1.0; nx],
            bounds: None,
        }
    }

    /// Scalar system `ẋ = a x + b u`.
    pub fn scalar(a: f64, b: f64) -> Self {
        Self::new(vec![a], vec![b], 1, 1)
    }

    /// Sets the diagonal state, control and terminal weights.
    pub fn with_weights(mut self, q: Vec<f64>, r: Vec<f64>, p: Vec<f64>) -> Self {
        assert_eq!(q.len(), self.nx);
        assert_eq!(r.len(), self.nu);
        assert_eq!(p.len(), self.nx);
        self.q = q;
        self.r = r;
        self.p = p;
        self
    }

    /// Adds the box constraint `lower <= u <= upper`.
    pub fn with_control_bounds(mut self, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        assert_eq!(lower.len(), self.nu);
        assert_eq!(upper.len(), self.nu);
        self.bounds = Some((lower, upper));
        self
    }

    /// Overrides the model name shown in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl AgentModel for LinearAgentModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn nx(&self) -> usize {
        self.nx
    }

    fn nu(&self) -> usize {
        self.nu
    }

    fn nh(&self) -> usize {
        if self.bounds.is_some() { 2 * self.nu } else { 0 }
    }

    fn ffct(&self, out: &mut [f64], _t: f64, x: &[f64], u: &[f64]) {
        add_mat_vec(out, &self.a, self.nx, self.nx, x);
        add_mat_vec(out, &self.b, self.nx, self.nu, u);
    }

    fn dfdx_vec(&self, out: &mut [f64], _t: f64, _x: &[f64], _u: &[f64], vec: &[f64]) {
        add_mat_t_vec(out, &self.a, self.nx, self.nx, vec);
    }

    fn dfdu_vec(&self, out: &mut [f64], _t: f64, _x: &[f64], _u: &[f64], vec: &[f64]) {
        add_mat_t_vec(out, &self.b, self.nx, self.nu, vec);
    }

    fn lfct(&self, _t: f64, x: &[f64], u: &[f64], xdes: &[f64], udes: &[f64]) -> f64 {
        weighted_distance(&self.q, x, xdes) + weighted_distance(&self.r, u, udes)
    }

    fn dldx(&self, out: &mut [f64], _t: f64, x: &[f64], _u: &[f64], xdes: &[f64], _udes: &[f64]) {
        add_weighted_distance_grad(out, &self.q, x, xdes);
    }

    fn dldu(&self, out: &mut [f64], _t: f64, _x: &[f64], u: &[f64], _xdes: &[f64], udes: &[f64]) {
        add_weighted_distance_grad(out, &self.r, u, udes);
    }

    fn vfct(&self, _t: f64, x: &[f64], xdes: &[f64]) -> f64 {
        weighted_distance(&self.p, x, xdes)
    }

    fn dvdx(&self, out: &mut [f64], _t: f64, x: &[f64], xdes: &[f64]) {
        add_weighted_distance_grad(out, &self.p, x, xdes);
    }

    fn hfct(&self, out: &mut [f64], _t: f64, _x: &[f64], u: &[f64]) {
        let Some((lower, upper)) = &self.bounds else {
            return;
        };
        let (above, below) = out.split_at_mut(self.nu);
        for k in 0..self.nu {
            above[k] += u[k] - upper[k];
            below[k] += lower[k] - u[k];
        }
    }

    fn dhdu_vec(&self, out: &mut [f64], _t: f64, _x: &[f64], _u: &[f64], vec: &[f64]) {
        if self.bounds.is_none() {
            return;
        }
        for k in 0..self.nu {
            out[k] += vec[k] - vec[self.nu + k];
        }
    }
}

/// `f_ij = A_ij x_j + B_ij u_j`.
#[derive(Debug, Clone)]
pub struct LinearCouplingModel {
    nx_i: usize,
    nx_j: usize,
    nu_j: usize,
    a: Vec<f64>,
    b: Vec<f64>,
}

impl LinearCouplingModel {
    /// Builds the coupling from row-major `A_ij` (`nx_i × nx_j`) and `B_ij`
    /// (`nx_i × nu_j`).
    ///
    /// # Panics
    /// If the matrix sizes do not match the dimensions.
    pub fn new(a: Vec<f64>, b: Vec<f64>, nx_i: usize, nx_j: usize, nu_j: usize) -> Self {
        assert_eq!(a.len(), nx_i * nx_j, "A_ij must be nx_i × nx_j");
        assert_eq!(b.len(), nx_i * nu_j, "B_ij must be nx_i × nu_j");
        Self { nx_i, nx_j, nu_j, a, b }
    }

    /// Scalar coupling `f_ij = gain · x_j`.
    pub fn scalar(gain: f64) -> Self {
        Self::new(vec![gain], vec![0.0], 1, 1, 1)
    }
}

impl CouplingModel for LinearCouplingModel {
    fn name(&self) -> &str {
        "linear coupling"
    }

    fn ffct(&self, out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], xj: &[f64], uj: &[f64]) {
        add_mat_vec(out, &self.a, self.nx_i, self.nx_j, xj);
        add_mat_vec(out, &self.b, self.nx_i, self.nu_j, uj);
    }

    fn dfdxi_vec(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], _vec: &[f64]) {}

    fn dfdui_vec(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], _vec: &[f64]) {}

    fn dfdxj_vec(&self, out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], vec: &[f64]) {
        add_mat_t_vec(out, &self.a, self.nx_i, self.nx_j, vec);
    }

    fn dfduj_vec(&self, out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], vec: &[f64]) {
        add_mat_t_vec(out, &self.b, self.nx_i, self.nu_j, vec);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamics_add_into_output() {
        let model = LinearAgentModel::new(vec![0.0, 1.0, -1.0, 0.0], vec![0.0, 1.0], 2, 1);
        let mut out = [1.0, 1.0];
        model.ffct(&mut out, 0.0, &[2.0, 3.0], &[0.5]);
        assert_eq!(out, [4.0, -0.5]);
    }

    #[test]
    fn test_control_bounds_become_inequalities() {
        let model = LinearAgentModel::scalar(-1.0, 1.0).with_control_bounds(vec![-1.0], vec![2.0]);
        assert_eq!(model.nh(), 2);

        let mut h = [0.0; 2];
        model.hfct(&mut h, 0.0, &[0.0], &[3.0]);
        assert_eq!(h, [1.0, -4.0]);

        let mut grad = [0.0];
        model.dhdu_vec(&mut grad, 0.0, &[0.0], &[3.0], &[2.0, 0.5]);
        assert_eq!(grad, [1.5]);
    }

    #[test]
    fn test_cost_is_zero_at_desired_point() {
        let model = LinearAgentModel::scalar(-1.0, 1.0).with_weights(vec![2.0], vec![3.0], vec![4.0]);
        assert_eq!(model.lfct(0.0, &[1.0], &[0.5], &[1.0], &[0.5]), 0.0);
        assert_eq!(model.lfct(0.0, &[2.0], &[0.0], &[1.0], &[0.5]), 2.0 + 0.75);
        assert_eq!(model.vfct(0.0, &[0.0], &[1.0]), 4.0);
    }

    #[test]
    fn test_scalar_coupling() {
        let coupling = LinearCouplingModel::scalar(0.2);
        let mut out = [0.0];
        coupling.ffct(&mut out, 0.0, &[1.0], &[0.0], &[5.0], &[7.0]);
        assert!((out[0] - 1.0).abs() < 1e-12);
    }
}

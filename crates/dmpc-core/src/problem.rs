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

//! Interface between an optimal control problem and a local solver.

/// Dimensions of a local optimal control problem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OcpDimensions {
    /// States.
    pub nx: usize,
    /// Controls.
    pub nu: usize,
    /// Parameters (always zero here).
    pub np: usize,
    /// Equality constraints.
    pub ng: usize,
    /// Inequality constraints.
    pub nh: usize,
    /// Terminal equality constraints (always zero here).
    pub ngt: usize,
    /// Terminal inequality constraints (always zero here).
    pub nht: usize,
}

/// An optimal control problem in the form a local solver consumes.
///
/// Unlike the model traits, every evaluator here **overwrites** `out`.
pub trait ProblemDescription: Send + Sync {
    /// Problem dimensions.
    fn ocp_dim(&self) -> OcpDimensions;

    /// Writes the dynamics `f(t, x, u)` into `out` (length `nx`).
    fn ffct(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]);

    /// Writes `(∂f/∂x)ᵀ vec` into `out` (length `nx`).
    fn dfdx_vec(&self, out: &mut [f64], t: f64, x: &[f64], vec: &[f64], u: &[f64]);

    /// Writes `(∂f/∂u)ᵀ vec` into `out` (length `nu`).
    fn dfdu_vec(&self, out: &mut [f64], t: f64, x: &[f64], vec: &[f64], u: &[f64]);

    /// Stage cost.
    fn lfct(&self, t: f64, x: &[f64], u: &[f64]) -> f64;

    /// Writes `∂l/∂x` into `out`.
    fn dldx(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]);

    /// Writes `∂l/∂u` into `out`.
    fn dldu(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]);

    /// Terminal cost.
    fn vfct(&self, t: f64, x: &[f64]) -> f64;

    /// Writes `∂V/∂x` into `out`.
    fn dvdx(&self, out: &mut [f64], t: f64, x: &[f64]);

    /// Writes the equality constraints into `out` (length `ng`).
    fn gfct(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]);

    /// Writes `(∂g/∂x)ᵀ vec` into `out`.
    fn dgdx_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]);

    /// Writes `(∂g/∂u)ᵀ vec` into `out`.
    fn dgdu_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]);

    /// Writes the inequality constraints into `out` (length `nh`).
    fn hfct(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]);

    /// Writes `(∂h/∂x)ᵀ vec` into `out`.
    fn dhdx_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]);

    /// Writes `(∂h/∂u)ᵀ vec` into `out`.
    fn dhdu_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]);
}

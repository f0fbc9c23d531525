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

//! Model contracts for agent dynamics and pairwise couplings.
//!
//! Every evaluator **adds** its contribution into `out`; callers zero the
//! buffer first. Derivatives are vector-Jacobian products: `dfdx_vec` writes
//! `(∂f/∂x)ᵀ · vec`, which is what the adjoint sweep of the local solver needs.
//!
//! Constraint functions default to "no constraints" so simple models only
//! implement dynamics and cost.

use std::fmt::Debug;

use crate::agent::Neighbor;
use crate::index::IndexMap;

/// Dynamics, cost and constraints of a single agent.
pub trait AgentModel: Send + Sync + Debug {
    /// Human-readable model name, used in log messages.
    fn name(&self) -> &str;

    /// State dimension.
    fn nx(&self) -> usize;

    /// Control dimension.
    fn nu(&self) -> usize;

    /// Number of equality constraints `g(x, u) = 0`.
    fn ng(&self) -> usize {
        0
    }

    /// Number of inequality constraints `h(x, u) <= 0`.
    fn nh(&self) -> usize {
        0
    }

    /// Adds `f(t, x, u)` to `out` (length `nx`).
    fn ffct(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]);

    /// Adds `(∂f/∂x)ᵀ vec` to `out` (length `nx`).
    fn dfdx_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]);

    /// Adds `(∂f/∂u)ᵀ vec` to `out` (length `nu`).
    fn dfdu_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]);

    /// Stage cost `l(t, x, u)` relative to the desired state and control.
    fn lfct(&self, t: f64, x: &[f64], u: &[f64], xdes: &[f64], udes: &[f64]) -> f64;

    /// Adds `∂l/∂x` to `out`.
    fn dldx(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], xdes: &[f64], udes: &[f64]);

    /// Adds `∂l/∂u` to `out`.
    fn dldu(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], xdes: &[f64], udes: &[f64]);

    /// Terminal cost `V(t, x)`.
    fn vfct(&self, t: f64, x: &[f64], xdes: &[f64]) -> f64;

    /// Adds `∂V/∂x` to `out`.
    fn dvdx(&self, out: &mut [f64], t: f64, x: &[f64], xdes: &[f64]);

    /// Adds `g(t, x, u)` to `out` (length `ng`).
    fn gfct(&self, _out: &mut [f64], _t: f64, _x: &[f64], _u: &[f64]) {}

    /// Adds `(∂g/∂x)ᵀ vec` to `out`.
    fn dgdx_vec(&self, _out: &mut [f64], _t: f64, _x: &[f64], _u: &[f64], _vec: &[f64]) {}

    /// Adds `(∂g/∂u)ᵀ vec` to `out`.
    fn dgdu_vec(&self, _out: &mut [f64], _t: f64, _x: &[f64], _u: &[f64], _vec: &[f64]) {}

    /// Adds `h(t, x, u)` to `out` (length `nh`).
    fn hfct(&self, _out: &mut [f64], _t: f64, _x: &[f64], _u: &[f64]) {}

    /// Adds `(∂h/∂x)ᵀ vec` to `out`.
    fn dhdx_vec(&self, _out: &mut [f64], _t: f64, _x: &[f64], _u: &[f64], _vec: &[f64]) {}

    /// Adds `(∂h/∂u)ᵀ vec` to `out`.
    fn dhdu_vec(&self, _out: &mut [f64], _t: f64, _x: &[f64], _u: &[f64], _vec: &[f64]) {}
}

/// Influence of neighbor `j` on the dynamics and constraints of agent `i`.
///
/// Arguments always come in the order `(x_i, u_i, x_j, u_j)` where `i` is the
/// agent whose dynamics the coupling term enters.
#[allow(clippy::too_many_arguments)]
pub trait CouplingModel: Send + Sync + Debug {
    /// Human-readable model name, used in log messages.
    fn name(&self) -> &str;

    /// Number of equality constraints `g_ij = 0`.
    fn ng(&self) -> usize {
        0
    }

    /// Number of inequality constraints `h_ij <= 0`.
    fn nh(&self) -> usize {
        0
    }

    /// Adds `f_ij(t, x_i, u_i, x_j, u_j)` to `out` (length `nx_i`).
    fn ffct(&self, out: &mut [f64], t: f64, xi: &[f64], ui: &[f64], xj: &[f64], uj: &[f64]);

    /// Adds `(∂f_ij/∂x_i)ᵀ vec` to `out` (length `nx_i`).
    fn dfdxi_vec(&self, out: &mut [f64], t: f64, xi: &[f64], ui: &[f64], xj: &[f64], uj: &[f64], vec: &[f64]);

    /// Adds `(∂f_ij/∂u_i)ᵀ vec` to `out` (length `nu_i`).
    fn dfdui_vec(&self, out: &mut [f64], t: f64, xi: &[f64], ui: &[f64], xj: &[f64], uj: &[f64], vec: &[f64]);

    /// Adds `(∂f_ij/∂x_j)ᵀ vec` to `out` (length `nx_j`).
    fn dfdxj_vec(&self, out: &mut [f64], t: f64, xi: &[f64], ui: &[f64], xj: &[f64], uj: &[f64], vec: &[f64]);

    /// Adds `(∂f_ij/∂u_j)ᵀ vec` to `out` (length `nu_j`).
    fn dfduj_vec(&self, out: &mut [f64], t: f64, xi: &[f64], ui: &[f64], xj: &[f64], uj: &[f64], vec: &[f64]);

    /// Adds `g_ij` to `out` (length `ng`).
    fn gfct(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64]) {}

    /// Adds `(∂g_ij/∂x_i)ᵀ vec` to `out`.
    fn dgdxi_vec(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], _vec: &[f64]) {}

    /// Adds `(∂g_ij/∂u_i)ᵀ vec` to `out`.
    fn dgdui_vec(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], _vec: &[f64]) {}

    /// Adds `(∂g_ij/∂x_j)ᵀ vec` to `out`.
    fn dgdxj_vec(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], _vec: &[f64]) {}

    /// Adds `(∂g_ij/∂u_j)ᵀ vec` to `out`.
    fn dgduj_vec(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], _vec: &[f64]) {}

    /// Adds `h_ij` to `out` (length `nh`).
    fn hfct(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64]) {}

    /// Adds `(∂h_ij/∂x_i)ᵀ vec` to `out`.
    fn dhdxi_vec(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], _vec: &[f64]) {}

    /// Adds `(∂h_ij/∂u_i)ᵀ vec` to `out`.
    fn dhdui_vec(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], _vec: &[f64]) {}

    /// Adds `(∂h_ij/∂x_j)ᵀ vec` to `out`.
    fn dhdxj_vec(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], _vec: &[f64]) {}

    /// Adds `(∂h_ij/∂u_j)ᵀ vec` to `out`.
    fn dhduj_vec(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], _vec: &[f64]) {}
}

/// Everything a [`NeighborApproximation`] may look at while evaluating the
/// contribution of one neighbor to the extended local problem.
#[derive(Debug, Clone, Copy)]
pub struct ApproximationContext<'a> {
    /// The neighbor being approximated.
    pub neighbor: &'a Neighbor,
    /// All neighbors of the agent, in index-map order.
    pub neighbors: &'a [Neighbor],
    /// Offsets of every neighbor block in the extended vectors.
    pub index: &'a IndexMap,
}

/// How an agent predicts a neighbor inside its own extended problem.
///
/// `x` and `u` are the full extended vectors. Dynamics evaluators write into
/// the full extended `out`; the external-influence evaluator `influence`
/// writes `v_ij`, the influence on this agent from every neighbor except the
/// one in the context, into an `nx_i`-sized buffer.
pub trait NeighborApproximation: Send + Sync + Debug {
    /// Adds the neighbor block's dynamics to `out` (length `Nx`).
    fn ffct(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], ctx: &ApproximationContext<'_>);

    /// Adds `(∂f/∂x)ᵀ vec` of the neighbor block's dynamics to `out` (length `Nx`).
    fn dfdx_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64], ctx: &ApproximationContext<'_>);

    /// Adds `(∂f/∂u)ᵀ vec` of the neighbor block's dynamics to `out` (length `Nu`).
    fn dfdu_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64], ctx: &ApproximationContext<'_>);

    /// Adds `v_ij(t, x, u)` to `out` (length `nx_i`).
    fn influence(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], ctx: &ApproximationContext<'_>);

    /// Adds `(∂v_ij/∂x)ᵀ vec` to `out` (length `Nx`).
    fn dinfluence_dx_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64], ctx: &ApproximationContext<'_>);

    /// Adds `(∂v_ij/∂u)ᵀ vec` to `out` (length `Nu`).
    fn dinfluence_du_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64], ctx: &ApproximationContext<'_>);
}

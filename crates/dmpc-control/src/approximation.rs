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

//! The standard neighbor approximation.
//!
//! Agent `i` predicts neighbor `j` with `j`'s own model, the influence slot
//! `v_ji` from the extended control, and (if `j` is receiving) the copied
//! coupling `f_ji(x_ji, u_ji, x_i, u_i)`:
//!
//! `ẋ_ji = f_j(x_ji, u_ji) + v_ji + f_ji(x_ji, u_ji, x_i, u_i)`
//!
//! The influence on `i` from every neighbor except `j` is
//! `v_ij = Σ_{k ≠ j, k sending} f_ik(x_i, u_i, x_ki, u_ki)`.

use dmpc_core::model::{ApproximationContext, NeighborApproximation};

/// Predicts a neighbor from copies of its model and coupling.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardNeighborApproximation;

impl StandardNeighborApproximation {
    /// Creates the approximation.
    pub fn new() -> Self {
        Self
    }
}

fn own_block<'s>(ctx: &ApproximationContext<'_>, x: &'s [f64], u: &'s [f64]) -> (&'s [f64], &'s [f64]) {
    (&x[ctx.index.own_x()], &u[ctx.index.own_u()])
}

impl NeighborApproximation for StandardNeighborApproximation {
    fn ffct(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], ctx: &ApproximationContext<'_>) {
        let nb = ctx.neighbor;
        let Some(block) = ctx.index.block(nb.id) else {
            return;
        };
        let (xi, ui) = own_block(ctx, x, u);
        let (xj, uj, vj) = (block.x_of(x), block.u_of(u), block.v_of(u));
        let out_j = block.x_of_mut(out);

        nb.agent_model.ffct(out_j, t, xj, uj);
        for (o, v) in out_j.iter_mut().zip(vj) {
            *o += v;
        }
        if let Some(copied) = nb.relation.copied_coupling_model() {
            copied.ffct(out_j, t, xj, uj, xi, ui);
        }
    }

    fn dfdx_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64], ctx: &ApproximationContext<'_>) {
        let nb = ctx.neighbor;
        let Some(block) = ctx.index.block(nb.id) else {
            return;
        };
        let (xi, ui) = own_block(ctx, x, u);
        let (xj, uj, lambda_j) = (block.x_of(x), block.u_of(u), block.x_of(vec));

        nb.agent_model.dfdx_vec(block.x_of_mut(out), t, xj, uj, lambda_j);
        if let Some(copied) = nb.relation.copied_coupling_model() {
            copied.dfdxi_vec(block.x_of_mut(out), t, xj, uj, xi, ui, lambda_j);
            copied.dfdxj_vec(&mut out[ctx.index.own_x()], t, xj, uj, xi, ui, lambda_j);
        }
    }

    fn dfdu_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64], ctx: &ApproximationContext<'_>) {
        let nb = ctx.neighbor;
        let Some(block) = ctx.index.block(nb.id) else {
            return;
        };
        let (xi, ui) = own_block(ctx, x, u);
        let (xj, uj, lambda_j) = (block.x_of(x), block.u_of(u), block.x_of(vec));

        nb.agent_model.dfdu_vec(block.u_of_mut(out), t, xj, uj, lambda_j);
        for (o, l) in block.v_of_mut(out).iter_mut().zip(lambda_j) {
            *o += l;
        }
        if let Some(copied) = nb.relation.copied_coupling_model() {
            copied.dfdui_vec(block.u_of_mut(out), t, xj, uj, xi, ui, lambda_j);
            copied.dfduj_vec(&mut out[ctx.index.own_u()], t, xj, uj, xi, ui, lambda_j);
        }
    }

    fn influence(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], ctx: &ApproximationContext<'_>) {
        let (xi, ui) = own_block(ctx, x, u);
        for (k, block) in ctx.neighbors.iter().zip(ctx.index.blocks()) {
            if k.id == ctx.neighbor.id {
                continue;
            }
            if let Some(model) = k.relation.coupling_model() {
                model.ffct(out, t, xi, ui, block.x_of(x), block.u_of(u));
            }
        }
    }

    fn dinfluence_dx_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64], ctx: &ApproximationContext<'_>) {
        let (xi, ui) = own_block(ctx, x, u);
        for (k, block) in ctx.neighbors.iter().zip(ctx.index.blocks()) {
            if k.id == ctx.neighbor.id {
                continue;
            }
            if let Some(model) = k.relation.coupling_model() {
                let (xk, uk) = (block.x_of(x), block.u_of(u));
                model.dfdxi_vec(&mut out[ctx.index.own_x()], t, xi, ui, xk, uk, vec);
                model.dfdxj_vec(block.x_of_mut(out), t, xi, ui, xk, uk, vec);
            }
        }
    }

    fn dinfluence_du_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64], ctx: &ApproximationContext<'_>) {
        let (xi, ui) = own_block(ctx, x, u);
        for (k, block) in ctx.neighbors.iter().zip(ctx.index.blocks()) {
            if k.id == ctx.neighbor.id {
                continue;
            }
            if let Some(model) = k.relation.coupling_model() {
                let (xk, uk) = (block.x_of(x), block.u_of(u));
                model.dfdui_vec(&mut out[ctx.index.own_u()], t, xi, ui, xk, uk, vec);
                model.dfduj_vec(block.u_of_mut(out), t, xi, ui, xk, uk, vec);
            }
        }
    }
}

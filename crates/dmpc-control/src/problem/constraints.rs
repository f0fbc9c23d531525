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

//! Extended constraints.
//!
//! Constraint vectors are laid out group by group: the agent's own
//! constraints first, then per neighbor in neighbor order the sending
//! coupling's constraints and, when constraints are approximated, the
//! neighbor's own constraints followed by its copied coupling's constraints.

use std::ops::Range;

use dmpc_core::agent::Agent;
use dmpc_core::index::NeighborBlock;
use dmpc_core::model::{AgentModel, CouplingModel};

use super::LocalProblem;

/// Equality (`g = 0`) or inequality (`h <= 0`) constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ConstraintKind {
    Equality,
    Inequality,
}

/// One contiguous group of constraints and the variables it reads.
enum ConstraintGroup<'a> {
    /// `g_i(x_i, u_i)`.
    Own(&'a dyn AgentModel),
    /// `g_ij(x_i, u_i, x_ji, u_ji)` of a sending neighbor.
    Coupling(&'a dyn CouplingModel, &'a NeighborBlock),
    /// `g_j(x_ji, u_ji)` of an approximated neighbor.
    Neighbor(&'a dyn AgentModel, &'a NeighborBlock),
    /// `g_ji(x_ji, u_ji, x_i, u_i)` of a receiving neighbor.
    CopiedCoupling(&'a dyn CouplingModel, &'a NeighborBlock),
}

fn agent_count(model: &dyn AgentModel, kind: ConstraintKind) -> usize {
    match kind {
        ConstraintKind::Equality => model.ng(),
        ConstraintKind::Inequality => model.nh(),
    }
}

fn coupling_count(model: &dyn CouplingModel, kind: ConstraintKind) -> usize {
    match kind {
        ConstraintKind::Equality => model.ng(),
        ConstraintKind::Inequality => model.nh(),
    }
}

/// Number of constraints of `kind` in the agent's extended problem.
pub(super) fn count(agent: &Agent, kind: ConstraintKind) -> usize {
    let mut n = agent_count(agent.model.as_ref(), kind);
    for nb in &agent.neighbors {
        if let Some(model) = nb.relation.coupling_model() {
            n += coupling_count(model.as_ref(), kind);
        }
        if agent.is_approximating_constraints() {
            n += agent_count(nb.agent_model.as_ref(), kind);
            if let Some(copied) = nb.relation.copied_coupling_model() {
                n += coupling_count(copied.as_ref(), kind);
            }
        }
    }
    n
}

fn agent_fct(model: &dyn AgentModel, kind: ConstraintKind, out: &mut [f64], t: f64, x: &[f64], u: &[f64]) {
    match kind {
        ConstraintKind::Equality => model.gfct(out, t, x, u),
        ConstraintKind::Inequality => model.hfct(out, t, x, u),
    }
}

fn agent_dx(model: &dyn AgentModel, kind: ConstraintKind, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]) {
    match kind {
        ConstraintKind::Equality => model.dgdx_vec(out, t, x, u, vec),
        ConstraintKind::Inequality => model.dhdx_vec(out, t, x, u, vec),
    }
}

fn agent_du(model: &dyn AgentModel, kind: ConstraintKind, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]) {
    match kind {
        ConstraintKind::Equality => model.dgdu_vec(out, t, x, u, vec),
        ConstraintKind::Inequality => model.dhdu_vec(out, t, x, u, vec),
    }
}

/// Arguments of a coupling evaluation, in `(x_i, u_i, x_j, u_j)` order of the
/// coupling model itself.
#[derive(Clone, Copy)]
struct CouplingArgs<'s> {
    t: f64,
    xi: &'s [f64],
    ui: &'s [f64],
    xj: &'s [f64],
    uj: &'s [f64],
}

fn coupling_fct(model: &dyn CouplingModel, kind: ConstraintKind, out: &mut [f64], a: CouplingArgs<'_>) {
    match kind {
        ConstraintKind::Equality => model.gfct(out, a.t, a.xi, a.ui, a.xj, a.uj),
        ConstraintKind::Inequality => model.hfct(out, a.t, a.xi, a.ui, a.xj, a.uj),
    }
}

fn coupling_dxi(model: &dyn CouplingModel, kind: ConstraintKind, out: &mut [f64], a: CouplingArgs<'_>, vec: &[f64]) {
    match kind {
        ConstraintKind::Equality => model.dgdxi_vec(out, a.t, a.xi, a.ui, a.xj, a.uj, vec),
        ConstraintKind::Inequality => model.dhdxi_vec(out, a.t, a.xi, a.ui, a.xj, a.uj, vec),
    }
}

fn coupling_dui(model: &dyn CouplingModel, kind: ConstraintKind, out: &mut [f64], a: CouplingArgs<'_>, vec: &[f64]) {
    match kind {
        ConstraintKind::Equality => model.dgdui_vec(out, a.t, a.xi, a.ui, a.xj, a.uj, vec),
        ConstraintKind::Inequality => model.dhdui_vec(out, a.t, a.xi, a.ui, a.xj, a.uj, vec),
    }
}

fn coupling_dxj(model: &dyn CouplingModel, kind: ConstraintKind, out: &mut [f64], a: CouplingArgs<'_>, vec: &[f64]) {
    match kind {
        ConstraintKind::Equality => model.dgdxj_vec(out, a.t, a.xi, a.ui, a.xj, a.uj, vec),
        ConstraintKind::Inequality => model.dhdxj_vec(out, a.t, a.xi, a.ui, a.xj, a.uj, vec),
    }
}

fn coupling_duj(model: &dyn CouplingModel, kind: ConstraintKind, out: &mut [f64], a: CouplingArgs<'_>, vec: &[f64]) {
    match kind {
        ConstraintKind::Equality => model.dgduj_vec(out, a.t, a.xi, a.ui, a.xj, a.uj, vec),
        ConstraintKind::Inequality => model.dhduj_vec(out, a.t, a.xi, a.ui, a.xj, a.uj, vec),
    }
}

impl<'a> LocalProblem<'a> {
    fn constraint_groups(&self, kind: ConstraintKind) -> Vec<(ConstraintGroup<'a>, Range<usize>)> {
        let agent = self.agent;
        let mut groups = Vec::new();
        let mut offset = 0;
        let mut push = |group: ConstraintGroup<'a>, n: usize| {
            if n > 0 {
                groups.push((group, offset..offset + n));
                offset += n;
            }
        };

        push(ConstraintGroup::Own(agent.model.as_ref()), agent_count(agent.model.as_ref(), kind));
        for (nb, block) in self.pairs() {
            if let Some(model) = nb.relation.coupling_model() {
                push(ConstraintGroup::Coupling(model.as_ref(), block), coupling_count(model.as_ref(), kind));
            }
            if agent.is_approximating_constraints() {
                let model = nb.agent_model.as_ref();
                push(ConstraintGroup::Neighbor(model, block), agent_count(model, kind));
                if let Some(copied) = nb.relation.copied_coupling_model() {
                    push(
                        ConstraintGroup::CopiedCoupling(copied.as_ref(), block),
                        coupling_count(copied.as_ref(), kind),
                    );
                }
            }
        }
        groups
    }

    pub(super) fn add_constraints(&self, kind: ConstraintKind, out: &mut [f64], t: f64, x: &[f64], u: &[f64]) {
        let (xi, ui) = (&x[..self.nx_i()], &u[..self.nu_i()]);

        for (group, range) in self.constraint_groups(kind) {
            let out = &mut out[range];
            match group {
                ConstraintGroup::Own(model) => agent_fct(model, kind, out, t, xi, ui),
                ConstraintGroup::Coupling(model, block) => {
                    let args = CouplingArgs { t, xi, ui, xj: block.x_of(x), uj: block.u_of(u) };
                    coupling_fct(model, kind, out, args);
                }
                ConstraintGroup::Neighbor(model, block) => {
                    agent_fct(model, kind, out, t, block.x_of(x), block.u_of(u));
                }
                ConstraintGroup::CopiedCoupling(model, block) => {
                    let args = CouplingArgs { t, xi: block.x_of(x), ui: block.u_of(u), xj: xi, uj: ui };
                    coupling_fct(model, kind, out, args);
                }
            }
        }
    }

    pub(super) fn add_constraints_dx(
        &self,
        kind: ConstraintKind,
        out: &mut [f64],
        t: f64,
        x: &[f64],
        u: &[f64],
        vec: &[f64],
    ) {
        let nx_i = self.nx_i();
        let (xi, ui) = (&x[..nx_i], &u[..self.nu_i()]);

        for (group, range) in self.constraint_groups(kind) {
            let vec = &vec[range];
            match group {
                ConstraintGroup::Own(model) => agent_dx(model, kind, &mut out[..nx_i], t, xi, ui, vec),
                ConstraintGroup::Coupling(model, block) => {
                    let args = CouplingArgs { t, xi, ui, xj: block.x_of(x), uj: block.u_of(u) };
                    coupling_dxi(model, kind, &mut out[..nx_i], args, vec);
                    coupling_dxj(model, kind, block.x_of_mut(out), args, vec);
                }
                ConstraintGroup::Neighbor(model, block) => {
                    agent_dx(model, kind, block.x_of_mut(out), t, block.x_of(x), block.u_of(u), vec);
                }
                ConstraintGroup::CopiedCoupling(model, block) => {
                    let args = CouplingArgs { t, xi: block.x_of(x), ui: block.u_of(u), xj: xi, uj: ui };
                    coupling_dxi(model, kind, block.x_of_mut(out), args, vec);
                    coupling_dxj(model, kind, &mut out[..nx_i], args, vec);
                }
            }
        }
    }

    pub(super) fn add_constraints_du(
        &self,
        kind: ConstraintKind,
        out: &mut [f64],
        t: f64,
        x: &[f64],
        u: &[f64],
        vec: &[f64],
    ) {
        let nu_i = self.nu_i();
        let (xi, ui) = (&x[..self.nx_i()], &u[..nu_i]);

        for (group, range) in self.constraint_groups(kind) {
            let vec = &vec[range];
            match group {
                ConstraintGroup::Own(model) => agent_du(model, kind, &mut out[..nu_i], t, xi, ui, vec),
                ConstraintGroup::Coupling(model, block) => {
                    let args = CouplingArgs { t, xi, ui, xj: block.x_of(x), uj: block.u_of(u) };
                    coupling_dui(model, kind, &mut out[..nu_i], args, vec);
                    coupling_duj(model, kind, block.u_of_mut(out), args, vec);
                }
                ConstraintGroup::Neighbor(model, block) => {
                    agent_du(model, kind, block.u_of_mut(out), t, block.x_of(x), block.u_of(u), vec);
                }
                ConstraintGroup::CopiedCoupling(model, block) => {
                    let args = CouplingArgs { t, xi: block.x_of(x), ui: block.u_of(u), xj: xi, uj: ui };
                    coupling_dui(model, kind, block.u_of_mut(out), args, vec);
                    coupling_duj(model, kind, &mut out[..nu_i], args, vec);
                }
            }
        }
    }
}

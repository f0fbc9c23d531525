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

//! The local problem assembler.
//!
//! [`LocalProblemLayout`] is built once per neighborhood change and owns the
//! index map and constraint counts. [`LocalProblem`] is a cheap borrowed view
//! of an agent plus its layout that implements [`ProblemDescription`]; the
//! controller creates one per local solve, so nothing is shared between
//! concurrent solves.
//!
//! The extended problem contains the agent's own dynamics and coupling terms,
//! one copy of every neighbor predicted through its
//! [`NeighborApproximation`](dmpc_core::model::NeighborApproximation), and the
//! augmented-Lagrangian consensus terms of ADMM.

mod constraints;
mod cost;
mod dynamics;

use dmpc_core::agent::{Agent, AgentId, Neighbor};
use dmpc_core::error::ConfigError;
use dmpc_core::index::{IndexMap, NeighborBlock};
use dmpc_core::model::ApproximationContext;
use dmpc_core::problem::{OcpDimensions, ProblemDescription};

use constraints::ConstraintKind;

/// Index map and constraint counts of one agent's extended problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalProblemLayout {
    index: IndexMap,
    ng: usize,
    nh: usize,
}

impl LocalProblemLayout {
    /// Builds the layout for the agent's current neighbor list and flags.
    pub fn build(agent: &Agent) -> Result<Self, ConfigError> {
        let index = IndexMap::build(
            agent.id,
            agent.nx(),
            agent.nu(),
            agent.neighbors.iter().map(|n| (n.id, n.nx(), n.nu())),
        )?;
        let ng = constraints::count(agent, ConstraintKind::Equality);
        let nh = constraints::count(agent, ConstraintKind::Inequality);

        log::debug!(
            "Assembler[agent {}]: Nx = {}, Nu = {}, Ng = {}, Nh = {}",
            agent.id,
            index.nx(),
            index.nu(),
            ng,
            nh
        );
        Ok(Self { index, ng, nh })
    }

    /// The offsets of every neighbor block.
    pub fn index(&self) -> &IndexMap {
        &self.index
    }

    /// Number of equality constraints.
    pub fn ng(&self) -> usize {
        self.ng
    }

    /// Number of inequality constraints.
    pub fn nh(&self) -> usize {
        self.nh
    }

    /// Dimensions reported to the local solver.
    pub fn ocp_dim(&self) -> OcpDimensions {
        OcpDimensions {
            nx: self.index.nx(),
            nu: self.index.nu(),
            np: 0,
            ng: self.ng,
            nh: self.nh,
            ngt: 0,
            nht: 0,
        }
    }
}

/// An agent's extended optimal control problem.
#[derive(Debug, Clone, Copy)]
pub struct LocalProblem<'a> {
    agent: &'a Agent,
    layout: &'a LocalProblemLayout,
}

impl<'a> LocalProblem<'a> {
    /// Pairs an agent with the layout built from it.
    ///
    /// # Panics
    /// Panics if the layout was built for a different neighbor list.
    pub fn new(agent: &'a Agent, layout: &'a LocalProblemLayout) -> Self {
        assert!(
            agent
                .neighbor_ids()
                .eq(layout.index.blocks().iter().map(|b| b.id)),
            "layout of agent {} is stale",
            agent.id
        );
        Self { agent, layout }
    }

    /// The agent this problem belongs to.
    pub fn agent(&self) -> &'a Agent {
        self.agent
    }

    /// The layout this problem evaluates against.
    pub fn layout(&self) -> &'a LocalProblemLayout {
        self.layout
    }

    /// `v_ij(t, x, u)`, the influence on this agent from everyone but
    /// `neighbor`, or `None` without an approximation for that neighbor.
    pub fn influence(&self, neighbor: AgentId, t: f64, x: &[f64], u: &[f64]) -> Option<Vec<f64>> {
        let nb = self.agent.neighbor(neighbor)?;
        self.neighbor_influence(nb, t, x, u)
    }

    fn neighbor_influence(&self, nb: &Neighbor, t: f64, x: &[f64], u: &[f64]) -> Option<Vec<f64>> {
        let approximation = nb.approximation.as_ref()?;
        let mut v = vec![0.0; self.agent.nx()];
        approximation.influence(&mut v, t, x, u, &self.context(nb));
        Some(v)
    }

    fn pairs(&self) -> impl Iterator<Item = (&'a Neighbor, &'a NeighborBlock)> {
        self.agent.neighbors.iter().zip(self.layout.index.blocks())
    }

    fn context(&self, neighbor: &'a Neighbor) -> ApproximationContext<'a> {
        ApproximationContext {
            neighbor,
            neighbors: &self.agent.neighbors,
            index: &self.layout.index,
        }
    }

    fn nx_i(&self) -> usize {
        self.layout.index.nx_i()
    }

    fn nu_i(&self) -> usize {
        self.layout.index.nu_i()
    }
}

impl ProblemDescription for LocalProblem<'_> {
    fn ocp_dim(&self) -> OcpDimensions {
        self.layout.ocp_dim()
    }

    fn ffct(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]) {
        out.fill(0.0);
        self.add_dynamics(out, t, x, u);
    }

    fn dfdx_vec(&self, out: &mut [f64], t: f64, x: &[f64], vec: &[f64], u: &[f64]) {
        out.fill(0.0);
        self.add_dynamics_dx(out, t, x, u, vec);
    }

    fn dfdu_vec(&self, out: &mut [f64], t: f64, x: &[f64], vec: &[f64], u: &[f64]) {
        out.fill(0.0);
        self.add_dynamics_du(out, t, x, u, vec);
    }

    fn lfct(&self, t: f64, x: &[f64], u: &[f64]) -> f64 {
        self.stage_cost(t, x, u)
    }

    fn dldx(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]) {
        out.fill(0.0);
        self.add_stage_cost_dx(out, t, x, u);
    }

    fn dldu(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]) {
        out.fill(0.0);
        self.add_stage_cost_du(out, t, x, u);
    }

    fn vfct(&self, t: f64, x: &[f64]) -> f64 {
        self.terminal_cost(t, x)
    }

    fn dvdx(&self, out: &mut [f64], t: f64, x: &[f64]) {
        out.fill(0.0);
        self.add_terminal_cost_dx(out, t, x);
    }

    fn gfct(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]) {
        out.fill(0.0);
        self.add_constraints(ConstraintKind::Equality, out, t, x, u);
    }

    fn dgdx_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]) {
        out.fill(0.0);
        self.add_constraints_dx(ConstraintKind::Equality, out, t, x, u, vec);
    }

    fn dgdu_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]) {
        out.fill(0.0);
        self.add_constraints_du(ConstraintKind::Equality, out, t, x, u, vec);
    }

    fn hfct(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]) {
        out.fill(0.0);
        self.add_constraints(ConstraintKind::Inequality, out, t, x, u);
    }

    fn dhdx_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]) {
        out.fill(0.0);
        self.add_constraints_dx(ConstraintKind::Inequality, out, t, x, u, vec);
    }

    fn dhdu_vec(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]) {
        out.fill(0.0);
        self.add_constraints_du(ConstraintKind::Inequality, out, t, x, u, vec);
    }
}

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

//! Agents and their neighborhood.
//!
//! The agent graph is stored as a relation table: every [`Agent`] owns the
//! ordered list of its [`Neighbor`]s, keyed by [`AgentId`]. There are no
//! back-pointers between agents; everything one agent knows about another
//! arrives as a state record.

mod neighbor;

pub use neighbor::{CouplingRelation, Neighbor, RelationKind};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{AgentModel, CouplingModel};
use crate::state::{AgentState, CouplingState, MultiplierState, PenaltyState};

/// Integer identifier of an agent.
///
/// Ids are lookup keys only; ordering inside extended vectors follows the
/// neighbor list, never the id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub usize);

impl AgentId {
    /// The id as an index into dense per-id tables.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which parts of the neighbors' problems an agent folds into its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproximationMode {
    /// Add the neighbors' stage and terminal costs (with cost rescaling).
    pub cost: bool,
    /// Add the neighbors' constraints to the local problem.
    pub constraints: bool,
}

/// Registration descriptor of an agent.
#[derive(Debug, Clone)]
pub struct AgentInfo {
    /// Unique id.
    pub id: AgentId,
    /// Dynamics, cost and constraints.
    pub model: Arc<dyn AgentModel>,
}

/// Registration descriptor of a coupling: `neighbor` enters the dynamics of
/// `agent` through `model`.
#[derive(Debug, Clone)]
pub struct CouplingInfo {
    /// Agent whose dynamics the coupling term enters.
    pub agent: AgentId,
    /// Agent whose state drives the coupling term.
    pub neighbor: AgentId,
    /// `f_ij`.
    pub model: Arc<dyn CouplingModel>,
}

/// One agent with its own records and its neighbor table.
#[derive(Debug, Clone)]
pub struct Agent {
    /// Unique id.
    pub id: AgentId,
    /// Dynamics, cost and constraints.
    pub model: Arc<dyn AgentModel>,
    /// Neighbors in index-map order.
    pub neighbors: Vec<Neighbor>,
    /// Cost / constraint approximation flags.
    pub approximation: ApproximationMode,

    /// Own predicted trajectories `x_i`, `u_i`.
    pub agent_state: AgentState,
    /// Desired trajectories.
    pub desired_agent_state: AgentState,
    /// Own consensus variables `z_x_i`, `z_u_i`.
    pub coupling_state: CouplingState,
    /// Multipliers pricing `z_u_i - u_i`.
    pub multiplier_state: MultiplierState,
    /// Penalties weighting `z_u_i - u_i`.
    pub penalty_state: PenaltyState,
}

impl Agent {
    /// Creates an agent without neighbors and with empty records.
    pub fn new(id: AgentId, model: Arc<dyn AgentModel>) -> Self {
        Self {
            id,
            model,
            neighbors: Vec::new(),
            approximation: ApproximationMode::default(),
            agent_state: AgentState::default(),
            desired_agent_state: AgentState::default(),
            coupling_state: CouplingState::default(),
            multiplier_state: MultiplierState::default(),
            penalty_state: PenaltyState::default(),
        }
    }

    /// State dimension.
    pub fn nx(&self) -> usize {
        self.model.nx()
    }

    /// Control dimension.
    pub fn nu(&self) -> usize {
        self.model.nu()
    }

    /// Returns `true` if neighbor costs are folded into the local problem.
    pub fn is_approximating_cost(&self) -> bool {
        self.approximation.cost
    }

    /// Returns `true` if neighbor constraints are folded into the local problem.
    pub fn is_approximating_constraints(&self) -> bool {
        self.approximation.constraints
    }

    /// Ids of all neighbors, in index-map order.
    pub fn neighbor_ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.neighbors.iter().map(|n| n.id)
    }

    /// Looks up a neighbor by id.
    pub fn neighbor(&self, id: AgentId) -> Option<&Neighbor> {
        self.neighbors.iter().find(|n| n.id == id)
    }

    /// Looks up a neighbor by id, mutably.
    pub fn neighbor_mut(&mut self, id: AgentId) -> Option<&mut Neighbor> {
        self.neighbors.iter_mut().find(|n| n.id == id)
    }

    /// Appends a neighbor. Duplicate ids are rejected later by the index map.
    pub fn add_neighbor(&mut self, neighbor: Neighbor) {
        self.neighbors.push(neighbor);
    }

    /// Removes a neighbor, returning it if it was present.
    pub fn remove_neighbor(&mut self, id: AgentId) -> Option<Neighbor> {
        let position = self.neighbors.iter().position(|n| n.id == id)?;
        Some(self.neighbors.remove(position))
    }
}

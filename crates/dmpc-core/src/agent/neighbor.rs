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

//! Defines how one agent sees a neighbor: the coupling relation and every
//! record it keeps for that pair.

use std::fmt;
use std::sync::Arc;

use crate::model::{AgentModel, CouplingModel, NeighborApproximation};
use crate::state::{AgentState, CouplingState, MultiplierState, PenaltyState};

use super::AgentId;

/// Which coupling models link an agent and one of its neighbors.
///
/// "Sending" means the neighbor's state enters this agent's dynamics through
/// `model` (`f_ij`). "Receiving" means this agent enters the neighbor's
/// dynamics, and `copied` is the neighbor's own coupling model (`f_ji`).
#[derive(Clone, Default)]
pub enum CouplingRelation {
    /// Neighbors without a dynamic coupling, e.g. linked only for consensus.
    #[default]
    NoCoupling,
    /// The neighbor influences this agent.
    SendOnly {
        /// `f_ij`, owned by this agent.
        model: Arc<dyn CouplingModel>,
    },
    /// This agent influences the neighbor.
    ReceiveOnly {
        /// `f_ji`, a copy of the neighbor's model.
        copied: Arc<dyn CouplingModel>,
    },
    /// Influence in both directions.
    Bidirectional {
        /// `f_ij`, owned by this agent.
        model: Arc<dyn CouplingModel>,
        /// `f_ji`, a copy of the neighbor's model.
        copied: Arc<dyn CouplingModel>,
    },
}

/// Payload-free discriminant of a [`CouplingRelation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// See [`CouplingRelation::NoCoupling`].
    NoCoupling,
    /// See [`CouplingRelation::SendOnly`].
    SendOnly,
    /// See [`CouplingRelation::ReceiveOnly`].
    ReceiveOnly,
    /// See [`CouplingRelation::Bidirectional`].
    Bidirectional,
}

impl CouplingRelation {
    /// The payload-free kind of this relation.
    pub fn kind(&self) -> RelationKind {
        match self {
            Self::NoCoupling => RelationKind::NoCoupling,
            Self::SendOnly { .. } => RelationKind::SendOnly,
            Self::ReceiveOnly { .. } => RelationKind::ReceiveOnly,
            Self::Bidirectional { .. } => RelationKind::Bidirectional,
        }
    }

    /// `f_ij`, if the neighbor is sending.
    pub fn coupling_model(&self) -> Option<&Arc<dyn CouplingModel>> {
        match self {
            Self::SendOnly { model } | Self::Bidirectional { model, .. } => Some(model),
            _ => None,
        }
    }

    /// `f_ji`, if the neighbor is receiving.
    pub fn copied_coupling_model(&self) -> Option<&Arc<dyn CouplingModel>> {
        match self {
            Self::ReceiveOnly { copied } | Self::Bidirectional { copied, .. } => Some(copied),
            _ => None,
        }
    }

    /// Returns `true` if the neighbor's state enters this agent's dynamics.
    pub fn is_sending(&self) -> bool {
        self.coupling_model().is_some()
    }

    /// Returns `true` if this agent's state enters the neighbor's dynamics.
    pub fn is_receiving(&self) -> bool {
        self.copied_coupling_model().is_some()
    }

    /// Adds (or replaces) the sending model, keeping any receiving side.
    pub fn with_sending(self, model: Arc<dyn CouplingModel>) -> Self {
        match self {
            Self::NoCoupling | Self::SendOnly { .. } => Self::SendOnly { model },
            Self::ReceiveOnly { copied } | Self::Bidirectional { copied, .. } => {
                Self::Bidirectional { model, copied }
            }
        }
    }

    /// Adds (or replaces) the receiving model, keeping any sending side.
    pub fn with_receiving(self, copied: Arc<dyn CouplingModel>) -> Self {
        match self {
            Self::NoCoupling | Self::ReceiveOnly { .. } => Self::ReceiveOnly { copied },
            Self::SendOnly { model } | Self::Bidirectional { model, .. } => {
                Self::Bidirectional { model, copied }
            }
        }
    }

    /// Drops the sending side.
    pub fn without_sending(self) -> Self {
        match self {
            Self::Bidirectional { copied, .. } => Self::ReceiveOnly { copied },
            Self::SendOnly { .. } => Self::NoCoupling,
            other => other,
        }
    }

    /// Drops the receiving side.
    pub fn without_receiving(self) -> Self {
        match self {
            Self::Bidirectional { model, .. } => Self::SendOnly { model },
            Self::ReceiveOnly { .. } => Self::NoCoupling,
            other => other,
        }
    }
}

impl fmt::Debug for CouplingRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCoupling => write!(f, "NoCoupling"),
            Self::SendOnly { model } => write!(f, "SendOnly({})", model.name()),
            Self::ReceiveOnly { copied } => write!(f, "ReceiveOnly({})", copied.name()),
            Self::Bidirectional { model, copied } => {
                write!(f, "Bidirectional({}, {})", model.name(), copied.name())
            }
        }
    }
}

/// A neighbor `j` as seen by agent `i`.
///
/// The first group of records is received from `j` and replaced wholesale on
/// every exchange. The second group is owned by `i` and sent to `j`.
#[derive(Debug, Clone)]
pub struct Neighbor {
    /// Id of the neighbor.
    pub id: AgentId,
    /// Copy of the neighbor's agent model.
    pub agent_model: Arc<dyn AgentModel>,
    /// Coupling models linking the pair.
    pub relation: CouplingRelation,
    /// How the neighbor is predicted inside the local problem.
    pub approximation: Option<Arc<dyn NeighborApproximation>>,
    /// Size of the neighbor's own neighborhood, used to rescale its cost.
    pub number_of_neighbors: usize,

    /// `x_j`, `u_j` as predicted by the neighbor.
    pub agent_state: AgentState,
    /// Desired state of the neighbor.
    pub desired_agent_state: AgentState,
    /// The neighbor's copy of this agent (`x_ij`, `u_ij`, `v_ij`).
    pub coupled_agent_state: AgentState,
    /// The neighbor's own consensus variables (`z_x_j`, `z_u_j`).
    pub coupling_state: CouplingState,
    /// Previous version of `coupling_state`.
    pub previous_coupling_state: CouplingState,
    /// `z_v_ji`: consensus influence on the neighbor from everyone but this agent.
    pub external_influence_coupling_state: CouplingState,
    /// Previous version of `external_influence_coupling_state`.
    pub previous_external_influence_coupling_state: CouplingState,
    /// The neighbor's multipliers for its copy of this agent.
    pub coupled_multiplier_state: MultiplierState,
    /// The neighbor's penalties for its copy of this agent.
    pub coupled_penalty_state: PenaltyState,

    /// This agent's copy of the neighbor (`x_ji`, `u_ji`, `v_ji`).
    pub local_copy: AgentState,
    /// `v_ij` evaluated on the last local solution, `nx_i` values per sample.
    pub local_influence: Vec<f64>,
    /// `z_v_ij`: consensus influence on this agent from everyone but the neighbor.
    pub influence_coupling_state: CouplingState,
    /// Multipliers pricing `z_v_ij - v_ij`.
    pub influence_multiplier_state: MultiplierState,
    /// Penalties weighting `z_v_ij - v_ij`.
    pub influence_penalty_state: PenaltyState,
    /// Multipliers pricing `z_u_j - u_ji` and `z_v_ji - v_ji`.
    pub copy_multiplier_state: MultiplierState,
    /// Penalties weighting `z_u_j - u_ji` and `z_v_ji - v_ji`.
    pub copy_penalty_state: PenaltyState,
}

impl Neighbor {
    /// A neighbor with empty records; the ADMM controller sizes them.
    pub fn new(id: AgentId, agent_model: Arc<dyn AgentModel>, relation: CouplingRelation) -> Self {
        Self {
            id,
            agent_model,
            relation,
            approximation: None,
            number_of_neighbors: 0,
            agent_state: AgentState::default(),
            desired_agent_state: AgentState::default(),
            coupled_agent_state: AgentState::default(),
            coupling_state: CouplingState::default(),
            previous_coupling_state: CouplingState::default(),
            external_influence_coupling_state: CouplingState::default(),
            previous_external_influence_coupling_state: CouplingState::default(),
            coupled_multiplier_state: MultiplierState::default(),
            coupled_penalty_state: PenaltyState::default(),
            local_copy: AgentState::default(),
            local_influence: Vec::new(),
            influence_coupling_state: CouplingState::default(),
            influence_multiplier_state: MultiplierState::default(),
            influence_penalty_state: PenaltyState::default(),
            copy_multiplier_state: MultiplierState::default(),
            copy_penalty_state: PenaltyState::default(),
        }
    }

    /// Sets the approximation used for this neighbor.
    pub fn with_approximation(mut self, approximation: Arc<dyn NeighborApproximation>) -> Self {
        self.approximation = Some(approximation);
        self
    }

    /// State dimension of the neighbor.
    pub fn nx(&self) -> usize {
        self.agent_model.nx()
    }

    /// Control dimension of the neighbor.
    pub fn nu(&self) -> usize {
        self.agent_model.nu()
    }
}

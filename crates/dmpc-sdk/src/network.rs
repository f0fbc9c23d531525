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

//! The agent graph as a relation table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dmpc_control::StandardNeighborApproximation;
use dmpc_core::agent::{Agent, AgentId, AgentInfo, CouplingInfo, CouplingRelation, Neighbor};
use dmpc_core::error::ConfigError;
use dmpc_core::model::{AgentModel, CouplingModel, NeighborApproximation};
use dmpc_core::state::AgentState;

/// Registration data of one agent.
#[derive(Debug, Clone)]
pub struct AgentEntry {
    /// Dynamics, cost and constraints.
    pub model: Arc<dyn AgentModel>,
    /// Initial state.
    pub x_init: Vec<f64>,
    /// Initial control guess.
    pub u_init: Vec<f64>,
    /// Desired state.
    pub x_des: Vec<f64>,
    /// Desired control.
    pub u_des: Vec<f64>,
}

/// Agents and the couplings between them.
///
/// A coupling `(i, j)` means `j` enters the dynamics of `i`. Agent `i` then
/// sees `j` as a sending neighbor and `j` sees `i` as a receiving neighbor.
#[derive(Debug)]
pub struct Network {
    agents: BTreeMap<AgentId, AgentEntry>,
    couplings: BTreeMap<(AgentId, AgentId), Arc<dyn CouplingModel>>,
    approximation: Arc<dyn NeighborApproximation>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

fn check_len(agent: AgentId, what: &'static str, values: &[f64], expected: usize) -> Result<(), ConfigError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(ConfigError::DimensionMismatch {
            agent,
            what,
            expected,
            actual: values.len(),
        })
    }
}

impl Network {
    /// An empty network predicting neighbors with [`StandardNeighborApproximation`].
    pub fn new() -> Self {
        Self {
            agents: BTreeMap::new(),
            couplings: BTreeMap::new(),
            approximation: Arc::new(StandardNeighborApproximation::new()),
        }
    }

    /// Replaces the neighbor approximation attached to every neighbor.
    pub fn with_approximation(mut self, approximation: Arc<dyn NeighborApproximation>) -> Self {
        self.approximation = approximation;
        self
    }

    /// Adds an agent with its initial state and control. The desired state
    /// and control start at zero.
    pub fn register_agent(&mut self, info: AgentInfo, x_init: &[f64], u_init: &[f64]) -> Result<(), ConfigError> {
        let AgentInfo { id, model } = info;
        if self.agents.contains_key(&id) {
            return Err(ConfigError::DuplicateAgent(id));
        }
        let (nx, nu) = (model.nx(), model.nu());
        if nx == 0 {
            return Err(ConfigError::NonPositiveDimension { agent: id, what: "state" });
        }
        if nu == 0 {
            return Err(ConfigError::NonPositiveDimension { agent: id, what: "control" });
        }
        check_len(id, "initial state", x_init, nx)?;
        check_len(id, "initial control", u_init, nu)?;

        log::info!("Network: registered agent {} ({})", id, model.name());
        self.agents.insert(
            id,
            AgentEntry {
                model,
                x_init: x_init.to_vec(),
                u_init: u_init.to_vec(),
                x_des: vec![0.0; nx],
                u_des: vec![0.0; nu],
            },
        );
        Ok(())
    }

    /// Removes an agent and every coupling that references it. Returns the
    /// agents that lost it as a neighbor.
    pub fn deregister_agent(&mut self, id: AgentId) -> Result<Vec<AgentId>, ConfigError> {
        if !self.agents.contains_key(&id) {
            return Err(ConfigError::UnknownAgent(id));
        }
        let former = self.neighbors_of(id);
        self.couplings.retain(|(i, j), _| *i != id && *j != id);
        self.agents.remove(&id);
        log::info!("Network: deregistered agent {} ({} relations dropped)", id, former.len());
        Ok(former)
    }

    /// Sets the desired state and control of an agent.
    pub fn set_desired_agent_state(&mut self, id: AgentId, x_des: &[f64], u_des: &[f64]) -> Result<(), ConfigError> {
        let entry = self.agents.get_mut(&id).ok_or(ConfigError::UnknownAgent(id))?;
        check_len(id, "desired state", x_des, entry.model.nx())?;
        check_len(id, "desired control", u_des, entry.model.nu())?;
        entry.x_des = x_des.to_vec();
        entry.u_des = u_des.to_vec();
        Ok(())
    }

    /// Overwrites the initial state of an agent.
    pub fn set_initial_state(&mut self, id: AgentId, x_init: &[f64]) -> Result<(), ConfigError> {
        let entry = self.agents.get_mut(&id).ok_or(ConfigError::UnknownAgent(id))?;
        check_len(id, "initial state", x_init, entry.model.nx())?;
        entry.x_init = x_init.to_vec();
        Ok(())
    }

    /// Adds the coupling `info.neighbor → info.agent`.
    pub fn register_coupling(&mut self, info: CouplingInfo) -> Result<(), ConfigError> {
        let CouplingInfo { agent, neighbor, model } = info;
        if agent == neighbor {
            return Err(ConfigError::SelfCoupling(agent));
        }
        for id in [agent, neighbor] {
            if !self.agents.contains_key(&id) {
                return Err(ConfigError::UnknownAgent(id));
            }
        }
        if self.couplings.contains_key(&(agent, neighbor)) {
            return Err(ConfigError::DuplicateNeighbor { agent, neighbor });
        }
        log::debug!("Network: agent {} couples into agent {} ({})", neighbor, agent, model.name());
        self.couplings.insert((agent, neighbor), model);
        Ok(())
    }

    /// Removes the coupling described by `info`.
    pub fn deregister_coupling(&mut self, info: &CouplingInfo) -> Result<(), ConfigError> {
        self.couplings
            .remove(&(info.agent, info.neighbor))
            .map(|_| ())
            .ok_or(ConfigError::UnknownCoupling {
                agent: info.agent,
                neighbor: info.neighbor,
            })
    }

    /// Registered agent ids in ascending order.
    pub fn agent_ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.agents.keys().copied()
    }

    /// Registration data of an agent.
    pub fn entry(&self, id: AgentId) -> Option<&AgentEntry> {
        self.agents.get(&id)
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Returns `true` if no agent is registered.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// `f_ij`, if `j` enters the dynamics of `i`.
    pub fn coupling(&self, i: AgentId, j: AgentId) -> Option<&Arc<dyn CouplingModel>> {
        self.couplings.get(&(i, j))
    }

    /// Agents coupled to `id` in either direction, ascending.
    pub fn neighbors_of(&self, id: AgentId) -> Vec<AgentId> {
        let ids: BTreeSet<AgentId> = self
            .couplings
            .keys()
            .filter_map(|&(i, j)| {
                if i == id {
                    Some(j)
                } else if j == id {
                    Some(i)
                } else {
                    None
                }
            })
            .collect();
        ids.into_iter().collect()
    }

    /// Relation of `i` towards its neighbor `j`.
    pub fn relation(&self, i: AgentId, j: AgentId) -> CouplingRelation {
        let mut relation = CouplingRelation::NoCoupling;
        if let Some(model) = self.couplings.get(&(i, j)) {
            relation = relation.with_sending(Arc::clone(model));
        }
        if let Some(copied) = self.couplings.get(&(j, i)) {
            relation = relation.with_receiving(Arc::clone(copied));
        }
        relation
    }

    /// A fresh agent with its registration data and current neighbor table.
    pub fn build_agent(&self, id: AgentId, t0: f64) -> Result<Agent, ConfigError> {
        let entry = self.agents.get(&id).ok_or(ConfigError::UnknownAgent(id))?;
        let mut agent = Agent::new(id, Arc::clone(&entry.model));
        agent.agent_state = AgentState::constant(id, vec![t0], &entry.x_init, &entry.u_init, &[]);
        agent.desired_agent_state = AgentState::constant(id, vec![t0], &entry.x_des, &entry.u_des, &[]);
        self.sync_agent(&mut agent)?;
        Ok(agent)
    }

    /// Brings the neighbor table and desired state of `agent` in line with
    /// the network, keeping the records of neighbors that stay.
    pub fn sync_agent(&self, agent: &mut Agent) -> Result<(), ConfigError> {
        let entry = self.agents.get(&agent.id).ok_or(ConfigError::UnknownAgent(agent.id))?;
        let t0 = agent.agent_state.t0;
        agent.desired_agent_state = AgentState::constant(agent.id, vec![t0], &entry.x_des, &entry.u_des, &[]);

        let ids = self.neighbors_of(agent.id);
        agent.neighbors.retain(|nb| ids.contains(&nb.id));

        for j in ids {
            let model = Arc::clone(&self.agents.get(&j).ok_or(ConfigError::UnknownAgent(j))?.model);
            let relation = self.relation(agent.id, j);
            let number_of_neighbors = self.neighbors_of(j).len();

            match agent.neighbor_mut(j) {
                Some(nb) => {
                    nb.agent_model = model;
                    nb.relation = relation;
                    nb.number_of_neighbors = number_of_neighbors;
                }
                None => {
                    let mut nb = Neighbor::new(j, model, relation).with_approximation(Arc::clone(&self.approximation));
                    nb.number_of_neighbors = number_of_neighbors;
                    agent.add_neighbor(nb);
                }
            }
        }
        agent.neighbors.sort_by_key(|nb| nb.id);
        Ok(())
    }
}

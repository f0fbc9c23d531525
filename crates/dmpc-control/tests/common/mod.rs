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

//! Network fixtures and a synchronous record exchange for the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dmpc_control::{AdmmController, ExchangePhase, StandardNeighborApproximation};
use dmpc_core::agent::{Agent, AgentId, CouplingRelation, Neighbor};
use dmpc_core::config::OptimizationInfo;
use dmpc_core::model::{AgentModel, CouplingModel, NeighborApproximation};
use dmpc_core::solver::LocalSolver;
use dmpc_core::state::AgentState;
use dmpc_infra::{GradientSolver, LinearAgentModel, LinearCouplingModel};

pub const SAMPLES: usize = 11;

pub fn options(approximate_cost: bool, approximate_constraints: bool) -> OptimizationInfo {
    OptimizationInfo {
        horizon: 1.0,
        horizon_steps: SAMPLES,
        admm_max_iterations: 400,
        admm_primal_tolerance: 1e-2,
        admm_dual_tolerance: 1e-2,
        approximate_cost,
        approximate_constraints,
        ..Default::default()
    }
}

/// `ẋ = a x + u`, unit weights.
pub fn scalar_agent(a: f64) -> Arc<dyn AgentModel> {
    Arc::new(LinearAgentModel::scalar(a, 1.0))
}

/// Two states, one bounded control.
pub fn plant(name: &str) -> Arc<dyn AgentModel> {
    Arc::new(
        LinearAgentModel::new(vec![-1.0, 0.5, 0.0, -0.5], vec![0.0, 1.0], 2, 1)
            .with_control_bounds(vec![-2.0], vec![2.0])
            .with_name(name),
    )
}

/// Two-state coupling that also feeds the neighbor's control through.
pub fn plant_coupling() -> Arc<dyn CouplingModel> {
    Arc::new(LinearCouplingModel::new(vec![0.3, 0.0, 0.1, 0.3], vec![0.1, 0.0], 2, 2, 1))
}

pub fn approximation() -> Arc<dyn NeighborApproximation> {
    Arc::new(StandardNeighborApproximation::new())
}

/// Agents and directed couplings, built into [`Agent`]s the way a network would.
pub struct Topology {
    pub models: Vec<Arc<dyn AgentModel>>,
    /// `(i, j)`: the state of `j` enters the dynamics of `i`.
    pub couplings: BTreeMap<(usize, usize), Arc<dyn CouplingModel>>,
}

impl Topology {
    pub fn new(models: Vec<Arc<dyn AgentModel>>) -> Self {
        Self {
            models,
            couplings: BTreeMap::new(),
        }
    }

    /// Every agent coupled in both directions to its ring neighbors.
    pub fn ring(models: Vec<Arc<dyn AgentModel>>, coupling: Arc<dyn CouplingModel>) -> Self {
        let n = models.len();
        let mut topology = Self::new(models);
        for i in 0..n {
            let j = (i + 1) % n;
            topology = topology.couple_both(i, j, coupling.clone());
        }
        topology
    }

    pub fn couple(mut self, i: usize, j: usize, model: Arc<dyn CouplingModel>) -> Self {
        self.couplings.insert((i, j), model);
        self
    }

    pub fn couple_both(self, i: usize, j: usize, model: Arc<dyn CouplingModel>) -> Self {
        self.couple(i, j, model.clone()).couple(j, i, model)
    }

    pub fn neighbors_of(&self, i: usize) -> BTreeSet<usize> {
        self.couplings
            .keys()
            .filter_map(|&(a, b)| match (a == i, b == i) {
                (true, false) => Some(b),
                (false, true) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn relation(&self, i: usize, j: usize) -> CouplingRelation {
        let mut relation = CouplingRelation::NoCoupling;
        if let Some(model) = self.couplings.get(&(i, j)) {
            relation = relation.with_sending(model.clone());
        }
        if let Some(copied) = self.couplings.get(&(j, i)) {
            relation = relation.with_receiving(copied.clone());
        }
        relation
    }

    /// Agent `i` starting at `x0` with zero controls and a zero target.
    pub fn agent(&self, i: usize, x0: &[f64]) -> Agent {
        let model = self.models[i].clone();
        let mut agent = Agent::new(AgentId(i), model.clone());
        agent.agent_state = constant(i, x0, &vec![0.0; model.nu()]);
        agent.desired_agent_state = constant(i, &vec![0.0; model.nx()], &vec![0.0; model.nu()]);
        for j in self.neighbors_of(i) {
            agent.add_neighbor(neighbor(
                j,
                self.models[j].clone(),
                self.relation(i, j),
                self.neighbors_of(j).len(),
            ));
        }
        agent
    }

    /// Initialized controllers for every agent, all starting at `x0`.
    pub fn controllers(&self, info: &OptimizationInfo, x0: &[&[f64]]) -> Vec<AdmmController> {
        let solver: Arc<dyn LocalSolver> = Arc::new(GradientSolver::new());
        (0..self.models.len())
            .map(|i| {
                let mut controller = AdmmController::new(self.agent(i, x0[i]), solver.clone(), info.clone());
                controller.initialize().expect("valid topology");
                controller
            })
            .collect()
    }
}

pub fn constant(i: usize, x: &[f64], u: &[f64]) -> AgentState {
    AgentState::constant(AgentId(i), vec![0.0], x, u, &[])
}

/// Neighbor `j` with the standard approximation and a zero target.
pub fn neighbor(
    j: usize,
    model: Arc<dyn AgentModel>,
    relation: CouplingRelation,
    number_of_neighbors: usize,
) -> Neighbor {
    let (nx, nu) = (model.nx(), model.nu());
    let mut nb = Neighbor::new(AgentId(j), model, relation).with_approximation(approximation());
    nb.number_of_neighbors = number_of_neighbors;
    nb.desired_agent_state = constant(j, &vec![0.0; nx], &vec![0.0; nu]);
    nb
}

/// Delivers every record of `phase` directly to its receiver.
pub fn exchange(controllers: &mut [AdmmController], phase: ExchangePhase) {
    let mail: Vec<_> = controllers
        .iter()
        .flat_map(|c| {
            let from = c.id();
            c.outgoing(phase)
                .into_iter()
                .map(move |(to, kind, record)| (from, to, kind, record))
        })
        .collect();
    for (from, to, kind, record) in mail {
        let receiver = controllers
            .iter_mut()
            .find(|c| c.id() == to)
            .expect("receiver is part of the network");
        receiver
            .apply_incoming(from, kind, record)
            .expect("record fits the receiver");
    }
}

/// One full ADMM iteration; returns `true` once every agent has converged.
pub fn iterate(controllers: &mut [AdmmController]) -> bool {
    for c in controllers.iter_mut() {
        c.update_agent_states().expect("local solve");
    }
    exchange(controllers, ExchangePhase::AgentStates);
    for c in controllers.iter_mut() {
        c.update_coupling_states();
    }
    exchange(controllers, ExchangePhase::CouplingStates);
    for c in controllers.iter_mut() {
        c.update_multiplier_states();
        c.penalty_parameter_adaption();
    }
    exchange(controllers, ExchangePhase::MultiplierStates);
    controllers
        .iter_mut()
        .fold(true, |all, c| c.finish_iteration() && all)
}

/// Runs the setup exchange and iterates until convergence or `max_iterations`.
/// Returns the number of iterations taken.
pub fn solve(controllers: &mut [AdmmController], max_iterations: usize) -> (usize, bool) {
    exchange(controllers, ExchangePhase::Setup);
    for iteration in 1..=max_iterations {
        if iterate(controllers) {
            return (iteration, true);
        }
    }
    (max_iterations, false)
}

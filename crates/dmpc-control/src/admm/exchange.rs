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

//! Outgoing and incoming state records of one controller.

use dmpc_core::agent::AgentId;
use dmpc_core::comm::{RecordKind, StateRecord};
use dmpc_core::error::CommunicationError;
use dmpc_core::math::TIME_EPSILON;

use super::AdmmController;

/// Point of the iteration at which records are exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangePhase {
    /// Before the first iteration of a solve: everything.
    Setup,
    /// After the local solve.
    AgentStates,
    /// After the consensus update.
    CouplingStates,
    /// After the multiplier update and penalty adaptation.
    MultiplierStates,
}

impl ExchangePhase {
    /// Record kinds sent to every neighbor in this phase.
    pub fn kinds(self) -> &'static [RecordKind] {
        match self {
            Self::Setup => &RecordKind::ALL,
            Self::AgentStates => &[RecordKind::AgentState, RecordKind::CoupledAgentState],
            Self::CouplingStates => &[
                RecordKind::CouplingState,
                RecordKind::ExternalInfluenceCouplingState,
            ],
            Self::MultiplierStates => &[
                RecordKind::CoupledMultiplierState,
                RecordKind::CoupledPenaltyState,
            ],
        }
    }
}

/// Expected shape of an incoming record: samples and per-sample dimensions.
struct Shape {
    samples: Option<usize>,
    nx: usize,
    nu: usize,
    nv: Option<usize>,
}

impl AdmmController {
    /// Records this agent sends in `phase`, as `(receiver, kind, record)`.
    pub fn outgoing(&self, phase: ExchangePhase) -> Vec<(AgentId, RecordKind, StateRecord)> {
        let agent = &self.agent;
        let mut out = Vec::with_capacity(agent.neighbors.len() * phase.kinds().len());

        for nb in &agent.neighbors {
            for &kind in phase.kinds() {
                let record = match kind {
                    RecordKind::AgentState => StateRecord::Agent(agent.agent_state.clone()),
                    RecordKind::DesiredAgentState => {
                        StateRecord::Agent(agent.desired_agent_state.clone())
                    }
                    RecordKind::CoupledAgentState => StateRecord::Agent(nb.local_copy.clone()),
                    RecordKind::CouplingState => StateRecord::Coupling(agent.coupling_state.clone()),
                    RecordKind::ExternalInfluenceCouplingState => {
                        StateRecord::Coupling(nb.influence_coupling_state.clone())
                    }
                    RecordKind::CoupledMultiplierState => {
                        StateRecord::Multiplier(nb.copy_multiplier_state.clone())
                    }
                    RecordKind::CoupledPenaltyState => {
                        StateRecord::Penalty(nb.copy_penalty_state.clone())
                    }
                };
                out.push((nb.id, kind, record));
            }
        }
        out
    }

    /// Stores a record received from neighbor `from`.
    ///
    /// The record replaces the previous one of the same kind wholesale after
    /// its dimensions are checked against this agent's view of the pair.
    pub fn apply_incoming(
        &mut self,
        from: AgentId,
        kind: RecordKind,
        record: StateRecord,
    ) -> Result<(), CommunicationError> {
        let to = self.agent.id;
        if !record.matches(kind) {
            return Err(CommunicationError::UnexpectedRecord { to, from, kind });
        }

        let (nx_i, nu_i) = (self.agent.nx(), self.agent.nu());
        let samples = self.info.horizon_steps;
        let t0 = self.agent.agent_state.t0;
        let nb = self
            .agent
            .neighbor_mut(from)
            .ok_or(CommunicationError::NotANeighbor { to, from })?;
        let (nx_j, nu_j) = (nb.nx(), nb.nu());

        let malformed = |reason: String| CommunicationError::MalformedRecord { to, from, kind, reason };
        let horizon = Some(samples);

        match (kind, record) {
            (RecordKind::AgentState, StateRecord::Agent(state)) => {
                check_agent(&state, Shape { samples: horizon, nx: nx_j, nu: nu_j, nv: None }).map_err(malformed)?;
                if state.t.first().is_some_and(|t| (t - t0).abs() > 1e3 * TIME_EPSILON) {
                    log::trace!(
                        "ADMM[agent {}]: agent {} is on horizon t0 = {} (own t0 = {})",
                        to,
                        from,
                        state.t0,
                        t0
                    );
                }
                nb.agent_state = state;
            }
            (RecordKind::DesiredAgentState, StateRecord::Agent(state)) => {
                check_agent(&state, Shape { samples: None, nx: nx_j, nu: nu_j, nv: None }).map_err(malformed)?;
                nb.desired_agent_state = state;
            }
            (RecordKind::CoupledAgentState, StateRecord::Agent(state)) => {
                check_agent(&state, Shape { samples: horizon, nx: nx_i, nu: nu_i, nv: Some(nx_i) }).map_err(malformed)?;
                nb.coupled_agent_state = state;
            }
            (RecordKind::CouplingState, StateRecord::Coupling(state)) => {
                check_len("z_u", state.z_u.len(), samples * nu_j).map_err(malformed)?;
                nb.previous_coupling_state = std::mem::replace(&mut nb.coupling_state, state);
            }
            (RecordKind::ExternalInfluenceCouplingState, StateRecord::Coupling(state)) => {
                check_len("z_v", state.z_v.len(), samples * nx_j).map_err(malformed)?;
                nb.previous_external_influence_coupling_state =
                    std::mem::replace(&mut nb.external_influence_coupling_state, state);
            }
            (RecordKind::CoupledMultiplierState, StateRecord::Multiplier(state)) => {
                check_len("mu_u", state.mu_u.len(), samples * nu_i).map_err(malformed)?;
                check_len("mu_v", state.mu_v.len(), samples * nx_i).map_err(malformed)?;
                nb.coupled_multiplier_state = state;
            }
            (RecordKind::CoupledPenaltyState, StateRecord::Penalty(state)) => {
                check_len("rho_u", state.rho_u.len(), samples * nu_i).map_err(malformed)?;
                check_len("rho_v", state.rho_v.len(), samples * nx_i).map_err(malformed)?;
                nb.coupled_penalty_state = state;
            }
            _ => return Err(CommunicationError::UnexpectedRecord { to, from, kind }),
        }
        Ok(())
    }
}

fn check_len(what: &str, actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("{what} has {actual} values, expected {expected}"))
    }
}

fn check_agent(state: &dmpc_core::state::AgentState, shape: Shape) -> Result<(), String> {
    let samples = state.samples();
    if samples == 0 {
        return Err("empty time grid".to_string());
    }
    if let Some(expected) = shape.samples {
        check_len("t", samples, expected)?;
    }
    check_len("x", state.x.len(), samples * shape.nx)?;
    check_len("u", state.u.len(), samples * shape.nu)?;
    if let Some(nv) = shape.nv {
        check_len("v", state.v.len(), samples * nv)?;
    }
    Ok(())
}

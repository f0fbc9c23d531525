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

//! Communication contract for exchanging state records between agents.
//!
//! A transport delivers each [`Envelope`] to its receiver at least once;
//! receivers address records by `(from, round, kind)` so duplicates simply
//! overwrite each other. Ordering across different senders is not assumed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::error::CommunicationError;
use crate::state::{AgentState, CouplingState, MultiplierState, PenaltyState};

/// What a record means to its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// The sender's own predicted trajectories.
    AgentState,
    /// The sender's desired trajectories.
    DesiredAgentState,
    /// The sender's copy of the receiver.
    CoupledAgentState,
    /// The sender's own consensus variables.
    CouplingState,
    /// The sender's consensus influence excluding the receiver.
    ExternalInfluenceCouplingState,
    /// The sender's multipliers for its copy of the receiver.
    CoupledMultiplierState,
    /// The sender's penalties for its copy of the receiver.
    CoupledPenaltyState,
}

impl RecordKind {
    /// Every kind, in exchange order.
    pub const ALL: [RecordKind; 7] = [
        RecordKind::AgentState,
        RecordKind::DesiredAgentState,
        RecordKind::CoupledAgentState,
        RecordKind::CouplingState,
        RecordKind::ExternalInfluenceCouplingState,
        RecordKind::CoupledMultiplierState,
        RecordKind::CoupledPenaltyState,
    ];
}

/// A state record of any of the four families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateRecord {
    /// Trajectories.
    Agent(AgentState),
    /// Consensus variables.
    Coupling(CouplingState),
    /// Multipliers.
    Multiplier(MultiplierState),
    /// Penalties.
    Penalty(PenaltyState),
}

impl StateRecord {
    /// Returns `true` if the payload family fits `kind`.
    pub fn matches(&self, kind: RecordKind) -> bool {
        matches!(
            (self, kind),
            (
                StateRecord::Agent(_),
                RecordKind::AgentState | RecordKind::DesiredAgentState | RecordKind::CoupledAgentState
            ) | (
                StateRecord::Coupling(_),
                RecordKind::CouplingState | RecordKind::ExternalInfluenceCouplingState
            ) | (StateRecord::Multiplier(_), RecordKind::CoupledMultiplierState)
                | (StateRecord::Penalty(_), RecordKind::CoupledPenaltyState)
        )
    }
}

/// A record in transit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender.
    pub from: AgentId,
    /// Receiver.
    pub to: AgentId,
    /// Exchange round the record belongs to.
    pub round: u64,
    /// Meaning of the record.
    pub kind: RecordKind,
    /// Payload.
    pub record: StateRecord,
}

/// Transport between agents.
///
/// `receive` waits until the addressed record is available; callers bound the
/// wait with a timeout.
#[async_trait]
pub trait CommunicationInterface: Send + Sync {
    /// Opens a mailbox for `agent`. Idempotent.
    fn register(&self, agent: AgentId);

    /// Closes the mailbox of `agent`, dropping pending records.
    fn deregister(&self, agent: AgentId);

    /// Delivers `envelope` to its receiver.
    async fn send(&self, envelope: Envelope) -> Result<(), CommunicationError>;

    /// Waits for the record `(from, round, kind)` addressed to `to`.
    async fn receive(
        &self,
        to: AgentId,
        from: AgentId,
        round: u64,
        kind: RecordKind,
    ) -> Result<StateRecord, CommunicationError>;
}

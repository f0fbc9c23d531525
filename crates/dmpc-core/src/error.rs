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

//! Error hierarchy of the distributed MPC stack.
//!
//! Configuration faults are rejected at setup time, solver faults are local
//! and recoverable, communication faults are fatal to the current run. The
//! driver wraps all of them in [`DmpcError`] together with the agent,
//! iteration and phase they happened in.

use std::fmt;

use thiserror::Error;

use crate::agent::AgentId;
use crate::comm::RecordKind;

/// Invalid registration data or options.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A neighbor id appears twice in an agent's neighbor list.
    #[error("agent {agent} lists neighbor {neighbor} more than once")]
    DuplicateNeighbor {
        /// The agent holding the list.
        agent: AgentId,
        /// The repeated neighbor id.
        neighbor: AgentId,
    },
    /// A model reports a zero state or control dimension.
    #[error("agent {agent} has a non-positive {what} dimension")]
    NonPositiveDimension {
        /// The offending agent.
        agent: AgentId,
        /// `"state"` or `"control"`.
        what: &'static str,
    },
    /// An id that is not registered was referenced.
    #[error("agent {0} is not registered")]
    UnknownAgent(AgentId),
    /// No coupling between the two agents is registered.
    #[error("agent {neighbor} is not coupled into agent {agent}")]
    UnknownCoupling {
        /// Agent whose dynamics the coupling would enter.
        agent: AgentId,
        /// Agent driving the coupling.
        neighbor: AgentId,
    },
    /// An id was registered twice.
    #[error("agent {0} is already registered")]
    DuplicateAgent(AgentId),
    /// An agent was coupled to itself.
    #[error("agent {0} cannot be coupled to itself")]
    SelfCoupling(AgentId),
    /// A vector handed in at registration has the wrong length.
    #[error("agent {agent}: {what} expects {expected} values, got {actual}")]
    DimensionMismatch {
        /// The agent the vector belongs to.
        agent: AgentId,
        /// Which vector.
        what: &'static str,
        /// Length required by the model.
        expected: usize,
        /// Length received.
        actual: usize,
    },
    /// An option is out of range.
    #[error("invalid option `{name}`: {reason}")]
    InvalidOption {
        /// Field name in [`OptimizationInfo`](crate::config::OptimizationInfo).
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// A configuration file could not be read or parsed.
    #[error("failed to load configuration: {0}")]
    Parse(String),
}

/// Failure of one local optimal control solve.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// The solver hit its iteration cap and was asked to treat that as failure.
    #[error("local solver did not converge within {iterations} iterations")]
    NotConverged {
        /// Iterations performed.
        iterations: usize,
    },
    /// A non-finite value appeared in the trajectory, cost or gradient.
    #[error("numerical failure in local solver: {0}")]
    NumericalFailure(String),
    /// The problem and the initial guess disagree on dimensions.
    #[error("{what} expects {expected} values, got {actual}")]
    DimensionMismatch {
        /// Which vector.
        what: &'static str,
        /// Length required.
        expected: usize,
        /// Length received.
        actual: usize,
    },
}

/// Failure of the state-record exchange.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommunicationError {
    /// No record arrived within the exchange timeout.
    #[error("agent {to} timed out waiting for {kind:?} from agent {from} (exchange {round})")]
    Timeout {
        /// Receiving agent.
        to: AgentId,
        /// Expected sender.
        from: AgentId,
        /// Expected record kind.
        kind: RecordKind,
        /// Exchange round.
        round: u64,
    },
    /// The mailbox of an agent is gone.
    #[error("mailbox of agent {0} is disconnected")]
    Disconnected(AgentId),
    /// A record arrived under a kind it does not belong to.
    #[error("agent {to} received a record of the wrong kind for {kind:?} from agent {from}")]
    UnexpectedRecord {
        /// Receiving agent.
        to: AgentId,
        /// Sender.
        from: AgentId,
        /// Kind the record was tagged with.
        kind: RecordKind,
    },
    /// A record arrived with dimensions that do not match the receiver's view.
    #[error("agent {to} received a malformed {kind:?} from agent {from}: {reason}")]
    MalformedRecord {
        /// Receiving agent.
        to: AgentId,
        /// Sender.
        from: AgentId,
        /// Record kind.
        kind: RecordKind,
        /// What does not match.
        reason: String,
    },
    /// A record was addressed to an agent that is not a neighbor of the sender.
    #[error("agent {from} is not a neighbor of agent {to}")]
    NotANeighbor {
        /// Receiving agent.
        to: AgentId,
        /// Sender.
        from: AgentId,
    },
}

/// Phase of the ADMM loop an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Registration and index construction.
    Setup,
    /// Local optimal control solve.
    AgentStates,
    /// Consensus variable update.
    CouplingStates,
    /// Multiplier update.
    MultiplierStates,
    /// Penalty adaptation.
    PenaltyAdaption,
    /// Record exchange between agents.
    Exchange,
}

/// Where an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentContext {
    /// Agent that raised the error.
    pub agent: AgentId,
    /// ADMM iteration.
    pub iteration: usize,
    /// Phase of the iteration.
    pub phase: Phase,
}

impl fmt::Display for AgentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "agent {} in {:?} (iteration {})",
            self.agent, self.phase, self.iteration
        )
    }
}

/// Any error surfaced by the distributed controller.
#[derive(Debug, Error)]
pub enum DmpcError {
    /// Invalid configuration.
    #[error("{context}: {source}")]
    Config {
        /// Where it happened.
        context: AgentContext,
        /// The underlying fault.
        #[source]
        source: ConfigError,
    },
    /// A local solve failed.
    #[error("{context}: {source}")]
    Solve {
        /// Where it happened.
        context: AgentContext,
        /// The underlying fault.
        #[source]
        source: SolveError,
    },
    /// The exchange failed.
    #[error("{context}: {source}")]
    Communication {
        /// Where it happened.
        context: AgentContext,
        /// The underlying fault.
        #[source]
        source: CommunicationError,
    },
    /// An agent failed more consecutive local solves than allowed.
    #[error("{context}: {failures} consecutive local solve failures")]
    SolveFailuresExceeded {
        /// Where it happened.
        context: AgentContext,
        /// Consecutive failures counted.
        failures: usize,
    },
    /// A worker task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Runtime(String),
}

impl DmpcError {
    /// The agent context, if the error carries one.
    pub fn context(&self) -> Option<&AgentContext> {
        match self {
            Self::Config { context, .. }
            | Self::Solve { context, .. }
            | Self::Communication { context, .. }
            | Self::SolveFailuresExceeded { context, .. } => Some(context),
            Self::Runtime(_) => None,
        }
    }
}

/// Result alias used throughout the controller.
pub type DmpcResult<T> = Result<T, DmpcError>;

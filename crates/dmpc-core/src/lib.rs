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

//! # DMPC Core
//!
//! Foundational crate containing the state records, model traits, and
//! interface contracts shared by every part of the distributed MPC stack.
//!
//! Nothing in here solves anything. The ADMM controller and the local problem
//! assembler live in `dmpc-control`, concrete solvers, transports and models
//! in `dmpc-infra`.

#![warn(missing_docs)]

pub mod agent;
pub mod comm;
pub mod config;
pub mod error;
pub mod index;
pub mod math;
pub mod model;
pub mod problem;
pub mod solver;
pub mod state;

pub use agent::{Agent, AgentId, ApproximationMode, CouplingRelation, Neighbor};
pub use config::OptimizationInfo;
pub use error::{DmpcError, DmpcResult};
pub use index::IndexMap;
pub use state::{AgentState, CouplingState, MultiplierState, PenaltyState};

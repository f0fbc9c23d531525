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

//! The public-facing API of the distributed MPC stack.
//!
//! Register agents and couplings on a [`Dmpc`], then either [`Dmpc::solve`]
//! one horizon or run a closed-loop simulation with [`Dmpc::run_dmpc`].

use std::path::Path;

use anyhow::Context;
use dmpc_core::config::OptimizationInfo;

mod driver;
pub mod network;
pub mod simulation;
pub mod solution;

pub use driver::Dmpc;
pub use network::Network;
pub use solution::{write_solution, Solution, SolutionStatus, SolveSummary};

/// Everything needed to set up and run a network.
pub mod prelude {
    pub use crate::{Dmpc, Network, Solution, SolutionStatus, SolveSummary};
    pub use dmpc_core::agent::{AgentId, AgentInfo, CouplingInfo};
    pub use dmpc_core::config::OptimizationInfo;
    pub use dmpc_core::error::{DmpcError, DmpcResult};
    pub use dmpc_core::model::{AgentModel, CouplingModel};
    pub use dmpc_infra::{
        CentralCommunication, GradientSolver, LinearAgentModel, LinearCouplingModel, LocalCommunication,
        SmartGridAgentModel, SmartGridCouplingModel,
    };
}

/// Loads and validates options from a RON file.
pub fn load_options(path: impl AsRef<Path>) -> anyhow::Result<OptimizationInfo> {
    let path = path.as_ref();
    let info = OptimizationInfo::from_file(path).with_context(|| format!("loading {}", path.display()))?;
    info.validate()
        .with_context(|| format!("validating {}", path.display()))?;
    Ok(info)
}

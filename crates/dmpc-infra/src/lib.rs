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

//! # DMPC Infra
//!
//! Concrete implementations of the contracts in `dmpc-core`: a gradient-based
//! single-shooting local solver, in-process transports, and ready-made agent
//! and coupling models.

pub mod comm;
pub mod models;
pub mod solver;

pub use comm::{CentralCommunication, LocalCommunication};
pub use models::{LinearAgentModel, LinearCouplingModel, SmartGridAgentModel, SmartGridCouplingModel};
pub use solver::GradientSolver;

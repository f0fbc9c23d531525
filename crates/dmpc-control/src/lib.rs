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

//! # DMPC Control
//!
//! The per-agent machinery of the distributed controller: the local problem
//! assembler that extends an agent's optimal control problem with copies of
//! its neighbors, the standard neighbor approximation, and the ADMM iteration
//! controller that drives consensus.

pub mod admm;
pub mod approximation;
pub mod problem;

pub use admm::{AdmmController, AdmmStatus, ExchangePhase, Residuals};
pub use approximation::StandardNeighborApproximation;
pub use problem::{LocalProblem, LocalProblemLayout};

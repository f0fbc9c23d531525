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

//! Contract for the local optimal control solver.

use std::fmt::Debug;

use crate::config::OptimizationInfo;
use crate::error::SolveError;
use crate::problem::ProblemDescription;

/// Starting point of a local solve.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialGuess {
    /// Horizon start.
    pub t0: f64,
    /// Fixed initial state, `nx` values.
    pub x0: Vec<f64>,
    /// Control trajectory, `horizon_steps * nu` values, sample-major.
    pub u: Vec<f64>,
}

/// Result of a local solve on the horizon grid.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSolution {
    /// Sample times.
    pub t: Vec<f64>,
    /// States, sample-major.
    pub x: Vec<f64>,
    /// Controls, sample-major.
    pub u: Vec<f64>,
    /// Final cost.
    pub cost: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// `false` if the solver stopped on its iteration cap.
    pub converged: bool,
}

/// Solves one [`ProblemDescription`] over the horizon described by
/// [`OptimizationInfo`].
pub trait LocalSolver: Send + Sync + Debug {
    /// Runs the solver from `guess`.
    fn solve(
        &self,
        problem: &dyn ProblemDescription,
        guess: &InitialGuess,
        info: &OptimizationInfo,
    ) -> Result<LocalSolution, SolveError>;
}

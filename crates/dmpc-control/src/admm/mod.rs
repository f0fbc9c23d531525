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

//! ADMM iteration controller.
//!
//! One [`AdmmController`] drives one agent through the consensus iteration:
//!
//! 1. `update_agent_states` solves the extended local problem.
//! 2. Agent states are exchanged, then `update_coupling_states` recomputes the
//!    consensus variables this agent owns.
//! 3. Coupling states are exchanged, then `update_multiplier_states` performs
//!    dual ascent and `penalty_parameter_adaption` balances the residuals.
//! 4. Multiplier and penalty states are exchanged.
//!
//! The controller never talks to other agents directly. It produces outgoing
//! records through [`AdmmController::outgoing`] and consumes incoming ones
//! through [`AdmmController::apply_incoming`]; the driver moves them.

mod coupling;
mod exchange;
mod multiplier;
mod penalty;
mod records;

pub use exchange::ExchangePhase;
pub use penalty::adapt_penalty_parameter;

use std::sync::Arc;

use dmpc_core::agent::{Agent, AgentId};
use dmpc_core::config::OptimizationInfo;
use dmpc_core::error::{ConfigError, SolveError};
use dmpc_core::index::IndexMap;
use dmpc_core::math::uniform_grid;
use dmpc_core::solver::{InitialGuess, LocalSolution, LocalSolver};
use dmpc_core::state::CouplingState;

use crate::problem::{LocalProblem, LocalProblemLayout};

/// Lifecycle of a controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdmmStatus {
    /// Registration may still change; no layout yet.
    #[default]
    Uninitialized,
    /// Layout built and records sized; ready for the first iteration.
    Ready,
    /// Inside the ADMM loop.
    Iterating,
    /// Both residuals are below tolerance.
    Converged,
    /// Too many consecutive local solve failures.
    Failed,
}

/// Primal and dual residual of the last iteration (infinity norms).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residuals {
    /// Largest consensus violation `|z - local|`.
    pub primal: f64,
    /// Largest change of an owned consensus variable `|z - z_prev|`.
    pub dual: f64,
}

impl Default for Residuals {
    fn default() -> Self {
        Self {
            primal: f64::INFINITY,
            dual: f64::INFINITY,
        }
    }
}

/// Per-agent ADMM state machine.
#[derive(Debug, Clone)]
pub struct AdmmController {
    agent: Agent,
    solver: Arc<dyn LocalSolver>,
    info: OptimizationInfo,
    layout: Option<LocalProblemLayout>,
    status: AdmmStatus,
    iteration: usize,
    residuals: Residuals,
    consecutive_failures: usize,
    total_failures: usize,
    last_cost: f64,
    previous_coupling_state: CouplingState,
    // Previous `z_v_ij`, aligned with the neighbor list.
    previous_influence_coupling_states: Vec<CouplingState>,
}

impl AdmmController {
    /// Wraps an agent. Call [`initialize`](Self::initialize) before iterating.
    pub fn new(agent: Agent, solver: Arc<dyn LocalSolver>, info: OptimizationInfo) -> Self {
        Self {
            agent,
            solver,
            info,
            layout: None,
            status: AdmmStatus::Uninitialized,
            iteration: 0,
            residuals: Residuals::default(),
            consecutive_failures: 0,
            total_failures: 0,
            last_cost: f64::NAN,
            previous_coupling_state: CouplingState::default(),
            previous_influence_coupling_states: Vec::new(),
        }
    }

    /// Id of the controlled agent.
    pub fn id(&self) -> AgentId {
        self.agent.id
    }

    /// The controlled agent.
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Mutable access to the agent. Any change sends the controller back to
    /// [`AdmmStatus::Uninitialized`].
    pub fn agent_mut(&mut self) -> &mut Agent {
        self.status = AdmmStatus::Uninitialized;
        self.layout = None;
        &mut self.agent
    }

    /// Consumes the controller, returning the agent.
    pub fn into_agent(self) -> Agent {
        self.agent
    }

    /// Options in use.
    pub fn info(&self) -> &OptimizationInfo {
        &self.info
    }

    /// Current lifecycle state.
    pub fn status(&self) -> AdmmStatus {
        self.status
    }

    /// Completed iterations of the current solve.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Residuals of the last iteration.
    pub fn residuals(&self) -> Residuals {
        self.residuals
    }

    /// Local solve failures since the controller was created.
    pub fn solve_failures(&self) -> usize {
        self.total_failures
    }

    /// Local solve failures since the last successful solve.
    pub fn consecutive_solve_failures(&self) -> usize {
        self.consecutive_failures
    }

    /// Cost of the last successful local solve.
    pub fn last_cost(&self) -> f64 {
        self.last_cost
    }

    /// Layout of the extended problem, once initialized.
    pub fn layout(&self) -> Option<&LocalProblemLayout> {
        self.layout.as_ref()
    }

    /// Index map of the extended problem, once initialized.
    pub fn index_map(&self) -> Option<&IndexMap> {
        self.layout.as_ref().map(LocalProblemLayout::index)
    }

    /// The extended problem as seen by the local solver.
    pub fn problem(&self) -> Option<LocalProblem<'_>> {
        self.layout
            .as_ref()
            .map(|layout| LocalProblem::new(&self.agent, layout))
    }

    /// Sample grid of the current horizon.
    pub fn grid(&self) -> Vec<f64> {
        uniform_grid(
            self.agent.agent_state.t0,
            self.info.step_size(),
            self.info.horizon_steps,
        )
    }

    /// Builds the layout and sizes every record on the horizon grid.
    ///
    /// Idempotent: records that already have the right shape are kept.
    pub fn initialize(&mut self) -> Result<(), ConfigError> {
        self.info.validate()?;
        self.agent.approximation = self.info.approximation();
        let layout = LocalProblemLayout::build(&self.agent)?;

        let grid = self.grid();
        records::prepare(&mut self.agent, &grid, self.info.admm_penalty_init);

        self.previous_coupling_state = self.agent.coupling_state.clone();
        self.previous_influence_coupling_states = self
            .agent
            .neighbors
            .iter()
            .map(|nb| nb.influence_coupling_state.clone())
            .collect();

        self.layout = Some(layout);
        self.begin_solve();
        log::info!(
            "ADMM[agent {}]: initialized with {} neighbors on {} samples",
            self.agent.id,
            self.agent.neighbors.len(),
            grid.len()
        );
        Ok(())
    }

    /// Resets the iteration counter and residuals for a new solve, keeping
    /// multipliers and penalties as a warm start.
    pub fn begin_solve(&mut self) {
        self.iteration = 0;
        self.residuals = Residuals::default();
        self.consecutive_failures = 0;
        if self.layout.is_some() {
            self.status = AdmmStatus::Ready;
        }
    }

    /// Moves the horizon forward by `dt` for the next solve.
    ///
    /// With `shift_control` the samples move along with the grid so the
    /// previous solution warm-starts the next one; otherwise only the time
    /// grid moves.
    pub fn shift_horizon(&mut self, dt: f64) {
        if self.info.shift_control {
            records::shift(&mut self.agent, dt);
            self.previous_coupling_state.shift(dt);
            for previous in &mut self.previous_influence_coupling_states {
                previous.shift(dt);
            }
        } else {
            records::retime(&mut self.agent, dt);
            self.previous_coupling_state = self.agent.coupling_state.clone();
            self.previous_influence_coupling_states = self
                .agent
                .neighbors
                .iter()
                .map(|nb| nb.influence_coupling_state.clone())
                .collect();
        }
        self.begin_solve();
    }

    /// Overwrites the first state sample, which the local solver keeps fixed.
    pub fn set_initial_state(&mut self, x0: &[f64]) -> Result<(), ConfigError> {
        let nx = self.agent.nx();
        if x0.len() != nx {
            return Err(ConfigError::DimensionMismatch {
                agent: self.agent.id,
                what: "initial state",
                expected: nx,
                actual: x0.len(),
            });
        }
        if self.agent.agent_state.x.len() < nx {
            self.agent.agent_state.x.resize(nx, 0.0);
        }
        self.agent.agent_state.x[..nx].copy_from_slice(x0);
        Ok(())
    }

    /// Marks the controller as failed.
    pub fn mark_failed(&mut self) {
        log::error!(
            "ADMM[agent {}]: giving up after {} consecutive local solve failures",
            self.agent.id,
            self.consecutive_failures
        );
        self.status = AdmmStatus::Failed;
    }

    /// Returns `true` once both residuals are within tolerance.
    pub fn is_converged(&self) -> bool {
        self.iteration > 0
            && self.residuals.primal <= self.info.admm_primal_tolerance
            && self.residuals.dual <= self.info.admm_dual_tolerance
    }

    /// Closes an iteration, updating the status. Returns [`is_converged`](Self::is_converged).
    pub fn finish_iteration(&mut self) -> bool {
        self.iteration += 1;
        let converged = self.is_converged();
        if self.status != AdmmStatus::Failed {
            self.status = if converged {
                AdmmStatus::Converged
            } else {
                AdmmStatus::Iterating
            };
        }
        log::debug!(
            "ADMM[agent {}]: iteration {} primal = {:.3e}, dual = {:.3e}",
            self.agent.id,
            self.iteration,
            self.residuals.primal,
            self.residuals.dual
        );
        converged
    }

    /// Solves the extended local problem and stores the prediction.
    ///
    /// On failure the previous agent state is kept and the failure is counted.
    ///
    /// # Panics
    /// Panics if the controller was not initialized.
    pub fn update_agent_states(&mut self) -> Result<(), SolveError> {
        let layout = self
            .layout
            .as_ref()
            .expect("AdmmController::initialize must run before update_agent_states");
        if self.status != AdmmStatus::Failed {
            self.status = AdmmStatus::Iterating;
        }

        let problem = LocalProblem::new(&self.agent, layout);
        let guess = self.initial_guess(layout);

        let result = self
            .solver
            .solve(&problem, &guess, &self.info)
            .and_then(|solution| {
                check_shape(&solution, layout.index(), self.info.horizon_steps)?;
                check_finite(&solution)?;
                let influences = influence_trajectories(&problem, &solution);
                Ok((solution, influences))
            });

        match result {
            Ok((solution, influences)) => {
                log::debug!(
                    "ADMM[agent {}]: local solve cost = {:.6e} after {} iterations{}",
                    self.agent.id,
                    solution.cost,
                    solution.iterations,
                    if solution.converged { "" } else { " (iteration cap)" }
                );
                self.consecutive_failures = 0;
                self.last_cost = solution.cost;
                self.store_solution(&solution, influences);
                Ok(())
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.total_failures += 1;
                log::warn!(
                    "ADMM[agent {}]: local solve failed ({} in a row): {}",
                    self.agent.id,
                    self.consecutive_failures,
                    e
                );
                Err(e)
            }
        }
    }

    fn initial_guess(&self, layout: &LocalProblemLayout) -> InitialGuess {
        let index = layout.index();
        let agent = &self.agent;
        let samples = self.info.horizon_steps;

        let mut x0 = vec![0.0; index.nx()];
        x0[index.own_x()].copy_from_slice(agent.agent_state.x_at(0));
        for (nb, block) in agent.neighbors.iter().zip(index.blocks()) {
            // Copies start where the neighbor says it is.
            block.x_of_mut(&mut x0).copy_from_slice(nb.agent_state.x_at(0));
        }

        let nu = index.nu();
        let mut u = vec![0.0; samples * nu];
        for (k, uk) in u.chunks_exact_mut(nu).enumerate() {
            uk[index.own_u()].copy_from_slice(agent.agent_state.u_at(k));
            for (nb, block) in agent.neighbors.iter().zip(index.blocks()) {
                let copy = &nb.local_copy;
                block.u_of_mut(uk).copy_from_slice(copy.u_at(k));
                let nv = block.v.len();
                block.v_of_mut(uk).copy_from_slice(&copy.v[k * nv..(k + 1) * nv]);
            }
        }

        InitialGuess {
            t0: agent.agent_state.t0,
            x0,
            u,
        }
    }

    fn store_solution(&mut self, solution: &LocalSolution, influences: Vec<Vec<f64>>) {
        let Some(layout) = self.layout.as_ref() else {
            return;
        };
        let index = layout.index();
        let (nx, nu) = (index.nx(), index.nu());
        let (nx_i, nu_i) = (index.nx_i(), index.nu_i());
        let agent = &mut self.agent;

        agent.agent_state.t.clone_from(&solution.t);
        agent.agent_state.t0 = solution.t.first().copied().unwrap_or(agent.agent_state.t0);

        for (k, (xk, uk)) in solution.x.chunks_exact(nx).zip(solution.u.chunks_exact(nu)).enumerate() {
            agent.agent_state.x[k * nx_i..(k + 1) * nx_i].copy_from_slice(&xk[index.own_x()]);
            agent.agent_state.u[k * nu_i..(k + 1) * nu_i].copy_from_slice(&uk[index.own_u()]);

            for (nb, block) in agent.neighbors.iter_mut().zip(index.blocks()) {
                let (nx_j, nu_j) = (block.x.len(), block.u.len());
                let copy = &mut nb.local_copy;
                copy.x[k * nx_j..(k + 1) * nx_j].copy_from_slice(block.x_of(xk));
                copy.u[k * nu_j..(k + 1) * nu_j].copy_from_slice(block.u_of(uk));
                copy.v[k * nx_j..(k + 1) * nx_j].copy_from_slice(block.v_of(uk));
            }
        }

        for (nb, influence) in agent.neighbors.iter_mut().zip(influences) {
            nb.local_copy.t.clone_from(&solution.t);
            nb.local_copy.t0 = agent.agent_state.t0;
            if !influence.is_empty() {
                nb.local_influence = influence;
            }
        }
    }
}

/// `v_ij` along the solution for every neighbor (empty without approximation).
fn influence_trajectories(problem: &LocalProblem<'_>, solution: &LocalSolution) -> Vec<Vec<f64>> {
    let dims = problem.layout().ocp_dim();
    problem
        .agent()
        .neighbors
        .iter()
        .map(|nb| {
            if nb.approximation.is_none() {
                return Vec::new();
            }
            solution
                .t
                .iter()
                .zip(solution.x.chunks_exact(dims.nx))
                .zip(solution.u.chunks_exact(dims.nu))
                .flat_map(|((&t, xk), uk)| problem.influence(nb.id, t, xk, uk).unwrap_or_default())
                .collect()
        })
        .collect()
}

fn check_shape(solution: &LocalSolution, index: &IndexMap, samples: usize) -> Result<(), SolveError> {
    let mismatch = |what, expected, actual| SolveError::DimensionMismatch { what, expected, actual };
    if solution.t.len() != samples {
        return Err(mismatch("local solution time grid", samples, solution.t.len()));
    }
    if solution.x.len() != samples * index.nx() {
        return Err(mismatch("local solution states", samples * index.nx(), solution.x.len()));
    }
    if solution.u.len() != samples * index.nu() {
        return Err(mismatch("local solution controls", samples * index.nu(), solution.u.len()));
    }
    Ok(())
}

fn check_finite(solution: &LocalSolution) -> Result<(), SolveError> {
    let finite = solution.cost.is_finite()
        && solution.x.iter().all(|v| v.is_finite())
        && solution.u.iter().all(|v| v.is_finite());
    if finite {
        Ok(())
    } else {
        Err(SolveError::NumericalFailure(
            "local solution contains non-finite values".to_string(),
        ))
    }
}

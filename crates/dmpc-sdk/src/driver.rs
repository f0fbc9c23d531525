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

//! The distributed controller: registration, the ADMM loop, and the
//! receding-horizon simulation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use dmpc_control::{AdmmController, AdmmStatus, ExchangePhase};
use dmpc_core::agent::{AgentId, AgentInfo, CouplingInfo};
use dmpc_core::comm::{CommunicationInterface, Envelope};
use dmpc_core::config::OptimizationInfo;
use dmpc_core::error::{AgentContext, CommunicationError, ConfigError, DmpcError, DmpcResult, Phase, SolveError};
use dmpc_core::math::TIME_EPSILON;
use dmpc_core::solver::LocalSolver;
use dmpc_core::state::AgentState;
use dmpc_infra::{CentralCommunication, GradientSolver, LocalCommunication};
use dmpc_telemetry::{ConvergenceHistory, PhaseTimings, ScopedTimer};
use tokio::task::JoinSet;

use crate::network::Network;
use crate::simulation::{euler_step, AppliedSamples};
use crate::solution::{write_solution, Solution, SolutionStatus, SolveSummary};

fn context(agent: AgentId, iteration: usize, phase: Phase) -> AgentContext {
    AgentContext { agent, iteration, phase }
}

fn setup_error(agent: AgentId) -> impl FnOnce(ConfigError) -> DmpcError {
    move |source| DmpcError::Config {
        context: context(agent, 0, Phase::Setup),
        source,
    }
}

/// Runs distributed MPC over a [`Network`] of agents.
///
/// Every agent is driven by its own [`AdmmController`]. Per phase the
/// controllers run as blocking tasks on the tokio runtime; between phases
/// their records travel through the [`CommunicationInterface`].
pub struct Dmpc {
    info: OptimizationInfo,
    network: Network,
    comm: Arc<dyn CommunicationInterface>,
    solver: Arc<dyn LocalSolver>,
    controllers: BTreeMap<AgentId, AdmmController>,
    topology_changed: bool,
    round: u64,
    history: ConvergenceHistory,
    solutions: BTreeMap<AgentId, Solution>,
    stored_samples: Option<usize>,
}

impl Dmpc {
    /// A controller exchanging records through `comm`, solving locally with
    /// [`GradientSolver`].
    pub fn new(info: OptimizationInfo, comm: Arc<dyn CommunicationInterface>) -> Self {
        Self {
            info,
            network: Network::new(),
            comm,
            solver: Arc::new(GradientSolver::new()),
            controllers: BTreeMap::new(),
            topology_changed: false,
            round: 0,
            history: ConvergenceHistory::new(),
            solutions: BTreeMap::new(),
            stored_samples: None,
        }
    }

    /// Direct agent-to-agent exchange.
    pub fn local(info: OptimizationInfo) -> Self {
        Self::new(info, Arc::new(LocalCommunication::new()))
    }

    /// Exchange relayed by a coordinator task.
    ///
    /// # Panics
    /// When called outside a tokio runtime.
    pub fn central(info: OptimizationInfo) -> Self {
        Self::new(info, Arc::new(CentralCommunication::spawn()))
    }

    /// Replaces the local solver used by every agent.
    pub fn with_solver(mut self, solver: Arc<dyn LocalSolver>) -> Self {
        self.solver = solver;
        self.controllers.clear();
        self.topology_changed = true;
        self
    }

    /// Options in use.
    pub fn info(&self) -> &OptimizationInfo {
        &self.info
    }

    /// The agent graph.
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Controller of one agent, once the first solve has built it.
    pub fn controller(&self, id: AgentId) -> Option<&AdmmController> {
        self.controllers.get(&id)
    }

    /// Residual history of the last solve.
    pub fn history(&self) -> &ConvergenceHistory {
        &self.history
    }

    /// Solution of one agent.
    pub fn solution(&self, id: AgentId) -> Option<&Solution> {
        self.solutions.get(&id)
    }

    /// Solutions of all agents, by id.
    pub fn solutions(&self) -> &BTreeMap<AgentId, Solution> {
        &self.solutions
    }

    /// Adds an agent. Takes effect at the next solve.
    pub fn register_agent(&mut self, info: AgentInfo, x_init: &[f64], u_init: &[f64]) -> DmpcResult<()> {
        let id = info.id;
        self.network.register_agent(info, x_init, u_init).map_err(setup_error(id))?;
        self.comm.register(id);
        self.topology_changed = true;
        Ok(())
    }

    /// Removes an agent and every coupling referencing it.
    pub fn deregister_agent(&mut self, id: AgentId) -> DmpcResult<()> {
        self.network.deregister_agent(id).map_err(setup_error(id))?;
        self.comm.deregister(id);
        self.controllers.remove(&id);
        self.solutions.remove(&id);
        self.topology_changed = true;
        Ok(())
    }

    /// Sets the desired state and control of an agent.
    pub fn set_desired_agent_state(&mut self, id: AgentId, x_des: &[f64], u_des: &[f64]) -> DmpcResult<()> {
        self.network
            .set_desired_agent_state(id, x_des, u_des)
            .map_err(setup_error(id))?;
        self.topology_changed = true;
        Ok(())
    }

    /// Overwrites the initial state of an agent.
    pub fn set_initial_state(&mut self, id: AgentId, x_init: &[f64]) -> DmpcResult<()> {
        self.network.set_initial_state(id, x_init).map_err(setup_error(id))?;
        if let Some(controller) = self.controllers.get_mut(&id) {
            controller.set_initial_state(x_init).map_err(setup_error(id))?;
        }
        Ok(())
    }

    /// Adds the coupling `info.neighbor → info.agent`.
    pub fn register_coupling(&mut self, info: CouplingInfo) -> DmpcResult<()> {
        let id = info.agent;
        self.network.register_coupling(info).map_err(setup_error(id))?;
        self.topology_changed = true;
        Ok(())
    }

    /// Removes a coupling.
    pub fn deregister_coupling(&mut self, info: &CouplingInfo) -> DmpcResult<()> {
        self.network.deregister_coupling(info).map_err(setup_error(info.agent))?;
        self.topology_changed = true;
        Ok(())
    }

    /// Bounds the closed-loop history kept per agent to the latest `samples`.
    pub fn cap_stored_data(&mut self, samples: usize) {
        self.stored_samples = Some(samples);
        for solution in self.solutions.values_mut() {
            solution.cap_stored_data(samples);
        }
    }

    /// Writes the solution of `id` as JSON next to `prefix`.
    pub fn print_solution_to_file(&self, id: AgentId, prefix: &str) -> anyhow::Result<PathBuf> {
        let solution = self
            .solutions
            .get(&id)
            .ok_or_else(|| anyhow!("no solution stored for agent {id}"))?;
        write_solution(solution, prefix)
    }

    /// Brings every controller in line with the network and the horizon
    /// starting at `t0`.
    fn prepare(&mut self, t0: f64) -> DmpcResult<()> {
        if self.topology_changed {
            for id in self.network.agent_ids().collect::<Vec<_>>() {
                match self.controllers.get_mut(&id) {
                    Some(controller) => self
                        .network
                        .sync_agent(controller.agent_mut())
                        .map_err(setup_error(id))?,
                    None => {
                        let agent = self.network.build_agent(id, t0).map_err(setup_error(id))?;
                        let controller = AdmmController::new(agent, Arc::clone(&self.solver), self.info.clone());
                        self.controllers.insert(id, controller);
                    }
                }
            }
            self.topology_changed = false;
        }

        for (&id, controller) in &mut self.controllers {
            if (controller.agent().agent_state.t0 - t0).abs() > 1e3 * TIME_EPSILON {
                controller.agent_mut().agent_state.t0 = t0;
            }
            if controller.status() == AdmmStatus::Uninitialized {
                controller.initialize().map_err(setup_error(id))?;
            }
            controller.begin_solve();
        }
        Ok(())
    }

    /// Runs `work` on a copy of every controller as a blocking task.
    ///
    /// The copies replace the controllers only once every task has joined,
    /// so a cancelled or failed phase leaves them as they were.
    async fn run_phase<R, F>(&mut self, work: F) -> DmpcResult<Vec<(AgentId, R)>>
    where
        R: Send + 'static,
        F: Fn(&mut AdmmController) -> R + Send + Sync + 'static,
    {
        let work = Arc::new(work);
        let mut tasks = JoinSet::new();
        for controller in self.controllers.values() {
            let mut controller = controller.clone();
            let work = Arc::clone(&work);
            tasks.spawn_blocking(move || {
                let result = work(&mut controller);
                (controller, result)
            });
        }

        let mut updated = BTreeMap::new();
        let mut results = Vec::with_capacity(tasks.len());
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((controller, result)) => {
                    let id = controller.id();
                    results.push((id, result));
                    updated.insert(id, controller);
                }
                Err(e) => {
                    log::error!("DMPC: worker task failed: {e}");
                    failure.get_or_insert(DmpcError::Runtime(e.to_string()));
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }
        self.controllers.extend(updated);
        Ok(results)
    }

    /// Sends every record of `phase` and waits for every expected one.
    async fn exchange(&mut self, phase: ExchangePhase, iteration: usize) -> DmpcResult<()> {
        self.round += 1;
        let round = self.round;

        let outgoing: Vec<Envelope> = self
            .controllers
            .values()
            .flat_map(|controller| {
                let from = controller.id();
                controller
                    .outgoing(phase)
                    .into_iter()
                    .map(move |(to, kind, record)| Envelope { from, to, round, kind, record })
            })
            .collect();
        for envelope in outgoing {
            let from = envelope.from;
            self.comm
                .send(envelope)
                .await
                .map_err(|source| DmpcError::Communication {
                    context: context(from, iteration, Phase::Exchange),
                    source,
                })?;
        }

        // Everything is received before anything is applied.
        let timeout = self.info.exchange_timeout_duration();
        let mut incoming = Vec::new();
        for controller in self.controllers.values() {
            let to = controller.id();
            for from in controller.agent().neighbor_ids() {
                for &kind in phase.kinds() {
                    let record = tokio::time::timeout(timeout, self.comm.receive(to, from, round, kind))
                        .await
                        .unwrap_or(Err(CommunicationError::Timeout { to, from, kind, round }))
                        .map_err(|source| DmpcError::Communication {
                            context: context(to, iteration, Phase::Exchange),
                            source,
                        })?;
                    incoming.push((to, from, kind, record));
                }
            }
        }
        for (to, from, kind, record) in incoming {
            let Some(controller) = self.controllers.get_mut(&to) else {
                continue;
            };
            controller
                .apply_incoming(from, kind, record)
                .map_err(|source| DmpcError::Communication {
                    context: context(to, iteration, Phase::Exchange),
                    source,
                })?;
        }
        log::trace!("DMPC: exchange {round} ({phase:?}) complete");
        Ok(())
    }

    /// Solves the distributed problem on the horizon starting at `t0`.
    ///
    /// Stops when every agent has converged or after
    /// `admm_max_iterations` iterations. Local solve failures are tolerated
    /// until an agent exceeds `admm_max_solve_failures` in a row.
    pub async fn solve(&mut self, t0: f64) -> DmpcResult<SolveSummary> {
        self.prepare(t0)?;
        self.history.clear();
        let mut timings = PhaseTimings::default();

        {
            let _timer = ScopedTimer::new(&mut timings.exchange);
            self.exchange(ExchangePhase::Setup, 0).await?;
        }

        let mut iterations = 0;
        let mut converged = self.controllers.is_empty();
        while !converged && iterations < self.info.admm_max_iterations {
            iterations += 1;

            let solved = {
                let _timer = ScopedTimer::new(&mut timings.local_solve);
                self.run_phase(|c| c.update_agent_states()).await?
            };
            self.escalate_failures(solved, iterations)?;

            {
                let _timer = ScopedTimer::new(&mut timings.exchange);
                self.exchange(ExchangePhase::AgentStates, iterations).await?;
            }
            {
                let _timer = ScopedTimer::new(&mut timings.coupling_update);
                self.run_phase(|c| c.update_coupling_states()).await?;
            }
            {
                let _timer = ScopedTimer::new(&mut timings.exchange);
                self.exchange(ExchangePhase::CouplingStates, iterations).await?;
            }
            {
                let _timer = ScopedTimer::new(&mut timings.multiplier_update);
                self.run_phase(|c| {
                    c.update_multiplier_states();
                    c.penalty_parameter_adaption();
                })
                .await?;
            }
            {
                let _timer = ScopedTimer::new(&mut timings.exchange);
                self.exchange(ExchangePhase::MultiplierStates, iterations).await?;
            }

            converged = true;
            for controller in self.controllers.values_mut() {
                converged &= controller.finish_iteration();
                let residuals = controller.residuals();
                self.history
                    .record(controller.id(), iterations, residuals.primal, residuals.dual);
            }
        }

        self.store_solutions();
        self.history.log_summary();
        log::info!(
            "DMPC: horizon at t0 = {:.4} {} after {} iterations ({:.1} ms)",
            t0,
            if converged { "converged" } else { "hit the iteration cap" },
            iterations,
            timings.total().as_secs_f64() * 1e3
        );

        Ok(SolveSummary {
            t0,
            iterations,
            converged,
            timings,
            convergence: self.history.summary(),
        })
    }

    fn escalate_failures(
        &mut self,
        solved: Vec<(AgentId, Result<(), SolveError>)>,
        iteration: usize,
    ) -> DmpcResult<()> {
        for (id, result) in solved {
            let Err(source) = result else {
                continue;
            };
            let Some(controller) = self.controllers.get_mut(&id) else {
                continue;
            };
            let failures = controller.consecutive_solve_failures();
            let error = DmpcError::Solve {
                context: context(id, iteration, Phase::AgentStates),
                source,
            };
            if failures > self.info.admm_max_solve_failures {
                log::error!("DMPC: {error}");
                controller.mark_failed();
                self.store_solutions();
                return Err(DmpcError::SolveFailuresExceeded {
                    context: context(id, iteration, Phase::AgentStates),
                    failures,
                });
            }
            log::warn!("DMPC: {error}, keeping the previous prediction");
        }
        Ok(())
    }

    fn store_solutions(&mut self) {
        for (&id, controller) in &self.controllers {
            let residuals = controller.residuals();
            let status = match controller.status() {
                AdmmStatus::Failed => SolutionStatus::Failed,
                _ if controller.is_converged() => SolutionStatus::Converged,
                _ => SolutionStatus::MaxIterations,
            };
            let solution = self.solutions.entry(id).or_insert_with(|| Solution {
                agent: id,
                trajectory: AgentState::default(),
                closed_loop: AgentState {
                    i: id,
                    ..AgentState::default()
                },
                primal_residual: f64::INFINITY,
                dual_residual: f64::INFINITY,
                iterations: 0,
                solve_failures: 0,
                cost: f64::NAN,
                status,
            });
            solution.trajectory = controller.agent().agent_state.clone();
            solution.primal_residual = residuals.primal;
            solution.dual_residual = residuals.dual;
            solution.iterations = controller.iteration();
            solution.solve_failures = controller.solve_failures();
            solution.cost = controller.last_cost();
            solution.status = status;
        }
    }

    /// Closed-loop simulation over `t_sim` starting at `t0`.
    ///
    /// Each step solves the distributed problem, applies the first control
    /// sample of every agent to the coupled plant for one step of length
    /// `dt`, and moves the horizon forward.
    pub async fn run_dmpc(&mut self, t_sim: f64, t0: f64) -> DmpcResult<Vec<SolveSummary>> {
        let dt = self.info.step_size();
        let steps = (t_sim / dt).round().max(0.0) as usize;
        let mut summaries = Vec::with_capacity(steps);
        let mut t = t0;

        log::info!("DMPC: simulating {steps} steps of {dt:.4} from t = {t0:.4}");
        for step in 0..steps {
            summaries.push(self.solve(t).await?);

            let applied: AppliedSamples = self
                .controllers
                .iter()
                .map(|(&id, c)| {
                    let state = &c.agent().agent_state;
                    (id, (state.x_at(0).to_vec(), state.u_at(0).to_vec()))
                })
                .collect();
            let next = euler_step(&self.network, &applied, t, dt);

            for (id, (x, u)) in &applied {
                if let Some(solution) = self.solutions.get_mut(id) {
                    solution.push_closed_loop(t, x, u);
                    if let Some(samples) = self.stored_samples {
                        solution.cap_stored_data(samples);
                    }
                }
            }

            t += dt;
            for (id, x) in next {
                self.network.set_initial_state(id, &x).map_err(setup_error(id))?;
                if let Some(controller) = self.controllers.get_mut(&id) {
                    controller.shift_horizon(dt);
                    controller.set_initial_state(&x).map_err(setup_error(id))?;
                }
            }
            log::debug!("DMPC: closed-loop step {} done, t = {:.4}", step + 1, t);
        }
        Ok(summaries)
    }
}

impl std::fmt::Debug for Dmpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dmpc")
            .field("agents", &self.network.len())
            .field("controllers", &self.controllers.len())
            .field("round", &self.round)
            .finish_non_exhaustive()
    }
}

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

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dmpc_core::comm::{CommunicationInterface, Envelope, RecordKind, StateRecord};
use dmpc_core::error::{CommunicationError, Phase, SolveError};
use dmpc_core::problem::ProblemDescription;
use dmpc_core::solver::{InitialGuess, LocalSolution, LocalSolver};
use dmpc_sdk::prelude::*;

fn options() -> OptimizationInfo {
    OptimizationInfo {
        horizon: 1.0,
        horizon_steps: 11,
        admm_max_iterations: 400,
        admm_primal_tolerance: 1e-2,
        admm_dual_tolerance: 1e-2,
        exchange_timeout: 2_000,
        ..Default::default()
    }
}

/// Two scalar agents, `ẋ_i = -x_i + u_i + 0.2 x_j`.
fn register_pair(dmpc: &mut Dmpc) {
    for (id, x0) in [(0, 1.0), (1, -0.5)] {
        let info = AgentInfo {
            id: AgentId(id),
            model: Arc::new(LinearAgentModel::scalar(-1.0, 1.0)),
        };
        dmpc.register_agent(info, &[x0], &[0.0]).unwrap();
    }
    for (agent, neighbor) in [(0, 1), (1, 0)] {
        dmpc.register_coupling(CouplingInfo {
            agent: AgentId(agent),
            neighbor: AgentId(neighbor),
            model: Arc::new(LinearCouplingModel::scalar(0.2)),
        })
        .unwrap();
    }
}

fn assert_copies_agree(dmpc: &Dmpc) {
    for (me, other) in [(0, 1), (1, 0)] {
        let controller = dmpc.controller(AgentId(me)).unwrap();
        let copy = &controller.agent().neighbor(AgentId(other)).unwrap().local_copy;
        let own = &dmpc.solution(AgentId(other)).unwrap().trajectory;
        for (a, b) in copy.u.iter().zip(&own.u) {
            assert!((a - b).abs() < 0.05, "agent {me} predicts {a} for agent {other}, which plans {b}");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pair_converges_with_direct_exchange() {
    let mut dmpc = Dmpc::local(options());
    register_pair(&mut dmpc);

    let summary = dmpc.solve(0.0).await.unwrap();
    assert!(summary.converged, "stopped after {} iterations", summary.iterations);
    assert!(summary.iterations > 1);
    assert_eq!(summary.convergence.iterations, summary.iterations);

    for id in [AgentId(0), AgentId(1)] {
        let solution = dmpc.solution(id).unwrap();
        assert_eq!(solution.status, SolutionStatus::Converged);
        assert!(solution.primal_residual <= 1e-2);
        assert_eq!(solution.trajectory.samples(), 11);
    }
    // Agent 0 starts above the origin and steers down.
    assert!(dmpc.solution(AgentId(0)).unwrap().trajectory.u[0] < 0.0);
    assert_copies_agree(&dmpc);
}

#[tokio::test]
async fn test_pair_converges_through_coordinator() {
    let mut dmpc = Dmpc::central(options());
    register_pair(&mut dmpc);

    let summary = dmpc.solve(0.0).await.unwrap();
    assert!(summary.converged);
    assert_copies_agree(&dmpc);
}

#[tokio::test]
async fn test_closed_loop_records_applied_samples() {
    let mut dmpc = Dmpc::local(OptimizationInfo {
        admm_max_iterations: 50,
        ..options()
    });
    register_pair(&mut dmpc);
    dmpc.cap_stored_data(2);

    let summaries = dmpc.run_dmpc(0.3, 0.0).await.unwrap();
    assert_eq!(summaries.len(), 3);
    assert!((summaries[2].t0 - 0.2).abs() < 1e-9);

    let history = &dmpc.solution(AgentId(0)).unwrap().closed_loop;
    assert_eq!(history.t.len(), 2);
    assert!((history.t[1] - 0.2).abs() < 1e-9);
    assert!(history.x[1] < history.x[0]);
    assert!(history.x[0] < 1.0);
}

#[tokio::test]
async fn test_unknown_agents_are_rejected() {
    let mut dmpc = Dmpc::local(options());
    register_pair(&mut dmpc);

    let err = dmpc
        .register_coupling(CouplingInfo {
            agent: AgentId(0),
            neighbor: AgentId(5),
            model: Arc::new(LinearCouplingModel::scalar(1.0)),
        })
        .unwrap_err();
    assert!(matches!(err, DmpcError::Config { .. }));
    assert_eq!(err.context().unwrap().phase, Phase::Setup);

    dmpc.deregister_agent(AgentId(1)).unwrap();
    assert!(dmpc.network().neighbors_of(AgentId(0)).is_empty());
    let summary = dmpc.solve(0.0).await.unwrap();
    assert!(summary.converged);
}

/// Accepts every record and never delivers any.
struct BlackHole;

#[async_trait]
impl CommunicationInterface for BlackHole {
    fn register(&self, _agent: AgentId) {}

    fn deregister(&self, _agent: AgentId) {}

    async fn send(&self, _envelope: Envelope) -> Result<(), CommunicationError> {
        Ok(())
    }

    async fn receive(
        &self,
        _to: AgentId,
        _from: AgentId,
        _round: u64,
        _kind: RecordKind,
    ) -> Result<StateRecord, CommunicationError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_missing_records_time_out() {
    let mut dmpc = Dmpc::new(
        OptimizationInfo {
            exchange_timeout: 20,
            ..options()
        },
        Arc::new(BlackHole),
    );
    register_pair(&mut dmpc);

    let started = std::time::Instant::now();
    let err = dmpc.solve(0.0).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2));
    match err {
        DmpcError::Communication { context, source } => {
            assert_eq!(context.phase, Phase::Exchange);
            assert!(matches!(source, CommunicationError::Timeout { .. }));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[derive(Debug)]
struct FailingSolver;

impl LocalSolver for FailingSolver {
    fn solve(
        &self,
        _problem: &dyn ProblemDescription,
        _guess: &InitialGuess,
        _info: &OptimizationInfo,
    ) -> Result<LocalSolution, SolveError> {
        Err(SolveError::NumericalFailure("diverged".to_string()))
    }
}

#[tokio::test]
async fn test_repeated_solve_failures_escalate() {
    let mut dmpc = Dmpc::local(OptimizationInfo {
        admm_max_solve_failures: 0,
        ..options()
    })
    .with_solver(Arc::new(FailingSolver));
    register_pair(&mut dmpc);

    let err = dmpc.solve(0.0).await.unwrap_err();
    match err {
        DmpcError::SolveFailuresExceeded { context, failures } => {
            assert_eq!(failures, 1);
            assert_eq!(context.iteration, 1);
            assert_eq!(context.phase, Phase::AgentStates);
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(dmpc.solutions().values().any(|s| s.status == SolutionStatus::Failed));
}

#[tokio::test]
async fn test_solution_file_is_written() {
    let mut dmpc = Dmpc::local(options());
    register_pair(&mut dmpc);
    dmpc.solve(0.0).await.unwrap();

    let dir = std::env::temp_dir().join(format!("dmpc-sdk-test-{}", std::process::id()));
    let prefix = format!("{}/", dir.display());
    let path = dmpc.print_solution_to_file(AgentId(1), &prefix).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"agent\": 1"));
    std::fs::remove_dir_all(dir).ok();

    assert!(dmpc.print_solution_to_file(AgentId(7), &prefix).is_err());
}

/// Sleeps before every local solve.
#[derive(Debug)]
struct SlowSolver {
    delay: Duration,
    inner: GradientSolver,
}

impl LocalSolver for SlowSolver {
    fn solve(
        &self,
        problem: &dyn ProblemDescription,
        guess: &InitialGuess,
        info: &OptimizationInfo,
    ) -> Result<LocalSolution, SolveError> {
        std::thread::sleep(self.delay);
        self.inner.solve(problem, guess, info)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_solve_keeps_every_controller() {
    let solver = SlowSolver {
        delay: Duration::from_millis(200),
        inner: GradientSolver::new(),
    };
    let mut dmpc = Dmpc::local(OptimizationInfo {
        admm_max_iterations: 2,
        ..options()
    })
    .with_solver(Arc::new(solver));
    register_pair(&mut dmpc);

    let cancelled = tokio::time::timeout(Duration::from_millis(50), dmpc.solve(0.0)).await;
    assert!(cancelled.is_err());
    for id in [AgentId(0), AgentId(1)] {
        let controller = dmpc.controller(id).unwrap();
        assert_eq!(controller.iteration(), 0);
        assert_eq!(controller.solve_failures(), 0);
    }

    let summary = dmpc.solve(0.0).await.unwrap();
    assert!(summary.iterations > 0);
    assert_eq!(dmpc.solutions().len(), 2);
    for solution in dmpc.solutions().values() {
        assert_eq!(solution.iterations, summary.iterations);
        assert!(solution.primal_residual.is_finite());
    }
}

/// Repeats the last sample of every [`GradientSolver`] solution.
#[derive(Debug)]
struct ExtraSampleSolver(GradientSolver);

impl LocalSolver for ExtraSampleSolver {
    fn solve(
        &self,
        problem: &dyn ProblemDescription,
        guess: &InitialGuess,
        info: &OptimizationInfo,
    ) -> Result<LocalSolution, SolveError> {
        let mut solution = self.0.solve(problem, guess, info)?;
        let dims = problem.ocp_dim();
        let last = solution.t.last().copied().unwrap_or(guess.t0);
        solution.t.push(last + info.step_size());
        solution.x.extend_from_within(solution.x.len() - dims.nx..);
        solution.u.extend_from_within(solution.u.len() - dims.nu..);
        Ok(solution)
    }
}

#[tokio::test]
async fn test_misshaped_solutions_fail_without_losing_agents() {
    let mut dmpc = Dmpc::local(OptimizationInfo {
        admm_max_solve_failures: 0,
        ..options()
    })
    .with_solver(Arc::new(ExtraSampleSolver(GradientSolver::new())));
    register_pair(&mut dmpc);

    let err = dmpc.solve(0.0).await.unwrap_err();
    match err {
        DmpcError::SolveFailuresExceeded { context, failures } => {
            assert_eq!(failures, 1);
            assert_eq!(context.iteration, 1);
        }
        other => panic!("unexpected error {other}"),
    }
    for id in [AgentId(0), AgentId(1)] {
        let controller = dmpc.controller(id).unwrap();
        assert_eq!(controller.agent().agent_state.t.len(), options().horizon_steps);
        assert_eq!(controller.solve_failures(), 1);
    }
    assert_eq!(dmpc.solutions().len(), 2);
}

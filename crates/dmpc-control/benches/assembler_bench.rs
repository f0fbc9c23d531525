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

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use dmpc_control::{AdmmController, StandardNeighborApproximation};
use dmpc_core::agent::{Agent, AgentId, CouplingRelation, Neighbor};
use dmpc_core::config::OptimizationInfo;
use dmpc_core::model::{AgentModel, CouplingModel};
use dmpc_core::problem::ProblemDescription;
use dmpc_core::solver::LocalSolver;
use dmpc_core::state::AgentState;
use dmpc_infra::{GradientSolver, SmartGridAgentModel, SmartGridCouplingModel};

/// Node 0 of a four-node ring with every approximation switched on.
fn ring_node() -> AdmmController {
    let node = |k: usize| -> Arc<dyn AgentModel> {
        Arc::new(
            SmartGridAgentModel::new(
                &[0.1 * k as f64, 0.2, 0.1, 100.0, 0.01],
                &[1.0, 1.0, 1.0, 1.0, 0.1],
                format!("node {k}"),
            )
            .expect("valid node"),
        )
    };
    let line: Arc<dyn CouplingModel> = Arc::new(
        SmartGridCouplingModel::new(&[10.0, 0.1, 100.0])
            .expect("valid line")
            .with_line_capacity(5.0),
    );

    let mut agent = Agent::new(AgentId(0), node(0));
    agent.agent_state = AgentState::constant(AgentId(0), vec![0.0], &[0.1, 0.0], &[0.0], &[]);
    agent.desired_agent_state = AgentState::constant(AgentId(0), vec![0.0], &[0.0, 0.0], &[0.0], &[]);
    for j in [1, 3] {
        let relation = CouplingRelation::NoCoupling
            .with_sending(line.clone())
            .with_receiving(line.clone());
        let mut nb = Neighbor::new(AgentId(j), node(j), relation)
            .with_approximation(Arc::new(StandardNeighborApproximation::new()));
        nb.number_of_neighbors = 2;
        nb.desired_agent_state = AgentState::constant(AgentId(j), vec![0.0], &[0.0, 0.0], &[0.0], &[]);
        agent.add_neighbor(nb);
    }

    let info = OptimizationInfo {
        horizon_steps: 21,
        approximate_cost: true,
        approximate_constraints: true,
        ..Default::default()
    };
    let solver: Arc<dyn LocalSolver> = Arc::new(GradientSolver::new());
    let mut controller = AdmmController::new(agent, solver, info);
    controller.initialize().expect("valid ring node");
    controller
}

fn bench_assembler(c: &mut Criterion) {
    let controller = ring_node();
    let problem = controller.problem().expect("initialized");
    let dims = problem.ocp_dim();
    let x: Vec<f64> = (0..dims.nx).map(|k| 0.01 * k as f64).collect();
    let u: Vec<f64> = (0..dims.nu).map(|k| -0.02 * k as f64).collect();
    let mut grad_u = vec![0.0; dims.nu];
    let mut lambda = vec![0.0; dims.nx];
    let adjoint = vec![1.0; dims.nx];

    let mut group = c.benchmark_group("Local Problem (4-node ring)");

    group.bench_function("lfct", |b| {
        b.iter(|| black_box(problem.lfct(black_box(0.3), &x, &u)));
    });

    group.bench_function("dldu", |b| {
        b.iter(|| {
            problem.dldu(&mut grad_u, black_box(0.3), &x, &u);
            black_box(&grad_u);
        });
    });

    group.bench_function("dfdx_vec", |b| {
        b.iter(|| {
            problem.dfdx_vec(&mut lambda, black_box(0.3), &x, &adjoint, &u);
            black_box(&lambda);
        });
    });

    group.finish();
}

fn bench_local_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("ADMM");
    group.sample_size(10);
    group.bench_function("update_agent_states", |b| {
        b.iter_batched(
            ring_node,
            |mut controller| {
                controller.update_agent_states().expect("local solve");
                black_box(controller.last_cost())
            },
            criterion::BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_assembler, bench_local_solve);
criterion_main!(benches);

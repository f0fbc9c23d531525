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

//! Structure and derivative consistency of the extended local problem.

mod common;

use std::ops::Range;
use std::sync::Arc;

use approx::{assert_relative_eq, relative_eq};
use dmpc_control::AdmmController;
use dmpc_core::agent::{Agent, AgentId, CouplingRelation, RelationKind};
use dmpc_core::model::{AgentModel, CouplingModel};
use dmpc_core::problem::ProblemDescription;
use dmpc_core::solver::LocalSolver;
use dmpc_infra::{GradientSolver, LinearAgentModel, SmartGridCouplingModel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::{neighbor, options, plant, plant_coupling, scalar_agent, Topology};

fn controller(agent: Agent, cost: bool, constraints: bool) -> AdmmController {
    let solver: Arc<dyn LocalSolver> = Arc::new(GradientSolver::new());
    let mut controller = AdmmController::new(agent, solver, options(cost, constraints));
    controller.initialize().expect("valid agent");
    controller
}

fn random_vec(rng: &mut StdRng, len: usize) -> Vec<f64> {
    (0..len).map(|_| rng.random_range(-1.0..1.0)).collect()
}

fn fill(values: &mut [f64], rng: &mut StdRng, lo: f64, hi: f64) {
    values.iter_mut().for_each(|v| *v = rng.random_range(lo..hi));
}

/// Gives every consensus record of `agent` random contents of the right shape.
fn scramble(agent: &mut Agent, rng: &mut StdRng) {
    fill(&mut agent.coupling_state.z_u, rng, -1.0, 1.0);
    fill(&mut agent.multiplier_state.mu_u, rng, -1.0, 1.0);
    fill(&mut agent.penalty_state.rho_u, rng, 0.5, 2.0);
    fill(&mut agent.desired_agent_state.x, rng, -1.0, 1.0);
    fill(&mut agent.desired_agent_state.u, rng, -1.0, 1.0);

    for nb in &mut agent.neighbors {
        fill(&mut nb.desired_agent_state.x, rng, -1.0, 1.0);
        fill(&mut nb.desired_agent_state.u, rng, -1.0, 1.0);
        fill(&mut nb.coupling_state.z_u, rng, -1.0, 1.0);
        fill(&mut nb.external_influence_coupling_state.z_v, rng, -1.0, 1.0);
        fill(&mut nb.copy_multiplier_state.mu_u, rng, -1.0, 1.0);
        fill(&mut nb.copy_multiplier_state.mu_v, rng, -1.0, 1.0);
        fill(&mut nb.copy_penalty_state.rho_u, rng, 0.5, 2.0);
        fill(&mut nb.copy_penalty_state.rho_v, rng, 0.5, 2.0);
        fill(&mut nb.influence_coupling_state.z_v, rng, -1.0, 1.0);
        fill(&mut nb.influence_multiplier_state.mu_v, rng, -1.0, 1.0);
        fill(&mut nb.influence_penalty_state.rho_v, rng, 0.5, 2.0);
    }
}

/// Central differences of `f` at `at`.
fn numeric_gradient(f: impl Fn(&[f64]) -> f64, at: &[f64]) -> Vec<f64> {
    const H: f64 = 1e-6;
    (0..at.len())
        .map(|k| {
            let mut plus = at.to_vec();
            let mut minus = at.to_vec();
            plus[k] += H;
            minus[k] -= H;
            (f(&plus) - f(&minus)) / (2.0 * H)
        })
        .collect()
}

fn assert_gradient(what: &str, analytic: &[f64], numeric: &[f64]) {
    assert_eq!(analytic.len(), numeric.len(), "{what}: length");
    for (k, (a, n)) in analytic.iter().zip(numeric).enumerate() {
        assert!(
            relative_eq!(*a, *n, epsilon = 1e-5, max_relative = 1e-5),
            "{what}[{k}]: analytic {a} vs numeric {n}"
        );
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Checks every derivative routine of `problem` at a random point.
fn check_derivatives(problem: &dyn ProblemDescription, rng: &mut StdRng, label: &str) {
    let dims = problem.ocp_dim();
    let t = rng.random_range(0.0..1.0);
    let x = random_vec(rng, dims.nx);
    let u = random_vec(rng, dims.nu);

    let mut out = vec![0.0; dims.nx];
    problem.dldx(&mut out, t, &x, &u);
    let numeric = numeric_gradient(|x| problem.lfct(t, x, &u), &x);
    assert_gradient(&format!("{label} dldx"), &out, &numeric);

    let mut out = vec![0.0; dims.nu];
    problem.dldu(&mut out, t, &x, &u);
    let numeric = numeric_gradient(|u| problem.lfct(t, &x, u), &u);
    assert_gradient(&format!("{label} dldu"), &out, &numeric);

    let mut out = vec![0.0; dims.nx];
    problem.dvdx(&mut out, t, &x);
    let numeric = numeric_gradient(|x| problem.vfct(t, x), &x);
    assert_gradient(&format!("{label} dvdx"), &out, &numeric);

    let adjoint = random_vec(rng, dims.nx);
    let f_dot = |x: &[f64], u: &[f64]| {
        let mut f = vec![0.0; dims.nx];
        problem.ffct(&mut f, t, x, u);
        dot(&f, &adjoint)
    };
    let mut out = vec![0.0; dims.nx];
    problem.dfdx_vec(&mut out, t, &x, &adjoint, &u);
    assert_gradient(&format!("{label} dfdx"), &out, &numeric_gradient(|x| f_dot(x, &u), &x));
    let mut out = vec![0.0; dims.nu];
    problem.dfdu_vec(&mut out, t, &x, &adjoint, &u);
    assert_gradient(&format!("{label} dfdu"), &out, &numeric_gradient(|u| f_dot(&x, u), &u));

    if dims.nh > 0 {
        let adjoint = random_vec(rng, dims.nh);
        let h_dot = |x: &[f64], u: &[f64]| {
            let mut h = vec![0.0; dims.nh];
            problem.hfct(&mut h, t, x, u);
            dot(&h, &adjoint)
        };
        let mut out = vec![0.0; dims.nx];
        problem.dhdx_vec(&mut out, t, &x, &u, &adjoint);
        assert_gradient(&format!("{label} dhdx"), &out, &numeric_gradient(|x| h_dot(x, &u), &x));
        let mut out = vec![0.0; dims.nu];
        problem.dhdu_vec(&mut out, t, &x, &u, &adjoint);
        assert_gradient(&format!("{label} dhdu"), &out, &numeric_gradient(|u| h_dot(&x, u), &u));
    }

    if dims.ng > 0 {
        let adjoint = random_vec(rng, dims.ng);
        let g_dot = |x: &[f64], u: &[f64]| {
            let mut g = vec![0.0; dims.ng];
            problem.gfct(&mut g, t, x, u);
            dot(&g, &adjoint)
        };
        let mut out = vec![0.0; dims.nx];
        problem.dgdx_vec(&mut out, t, &x, &u, &adjoint);
        assert_gradient(&format!("{label} dgdx"), &out, &numeric_gradient(|x| g_dot(x, &u), &x));
        let mut out = vec![0.0; dims.nu];
        problem.dgdu_vec(&mut out, t, &x, &u, &adjoint);
        assert_gradient(&format!("{label} dgdu"), &out, &numeric_gradient(|u| g_dot(&x, u), &u));
    }
}

fn line() -> Arc<dyn CouplingModel> {
    Arc::new(
        SmartGridCouplingModel::new(&[1.0, 1.0, 1.0])
            .expect("valid line")
            .with_line_capacity(0.8),
    )
}

fn relation(kind: RelationKind) -> CouplingRelation {
    let none = CouplingRelation::NoCoupling;
    match kind {
        RelationKind::NoCoupling => none,
        RelationKind::SendOnly => none.with_sending(line()),
        RelationKind::ReceiveOnly => none.with_receiving(line()),
        RelationKind::Bidirectional => none.with_sending(line()).with_receiving(line()),
    }
}

#[test]
fn test_derivatives_match_finite_differences_for_every_relation_and_flag() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let kinds = [
        RelationKind::NoCoupling,
        RelationKind::SendOnly,
        RelationKind::ReceiveOnly,
        RelationKind::Bidirectional,
    ];

    for kind in kinds {
        for (cost, constraints) in [(false, false), (true, false), (false, true), (true, true)] {
            let mut agent = Agent::new(AgentId(0), plant("agent 0"));
            agent.add_neighbor(neighbor(1, plant("agent 1"), relation(kind), 1));
            // A second, linearly coupled neighbor so the influence terms are nonzero.
            let both = CouplingRelation::NoCoupling
                .with_sending(plant_coupling())
                .with_receiving(plant_coupling());
            agent.add_neighbor(neighbor(2, plant("agent 2"), both, 2));

            let mut controller = controller(agent, cost, constraints);
            scramble(controller.agent_mut(), &mut rng);
            controller.initialize().expect("records keep their shape");

            let problem = controller.problem().expect("initialized");
            let label = format!("{kind:?} cost={cost} constraints={constraints}");
            for _ in 0..3 {
                check_derivatives(&problem, &mut rng, &label);
            }
        }
    }
}

#[test]
fn test_constraint_counts_follow_relation_and_flags() {
    for (kind, own_coupling, copied_coupling) in [
        (RelationKind::NoCoupling, 0, 0),
        (RelationKind::SendOnly, 2, 0),
        (RelationKind::ReceiveOnly, 0, 2),
        (RelationKind::Bidirectional, 2, 2),
    ] {
        let mut agent = Agent::new(AgentId(0), plant("agent 0"));
        agent.add_neighbor(neighbor(1, plant("agent 1"), relation(kind), 1));

        // Own bounds (2) plus the line limit when the neighbor sends.
        let plain = controller(agent.clone(), false, false);
        assert_eq!(plain.layout().unwrap().nh(), 2 + own_coupling, "{kind:?}");

        // Adds the neighbor's bounds and the copied line limit.
        let approximated = controller(agent, false, true);
        assert_eq!(
            approximated.layout().unwrap().nh(),
            2 + own_coupling + 2 + copied_coupling,
            "{kind:?}"
        );
        assert_eq!(approximated.layout().unwrap().ng(), 0);
    }
}

#[test]
fn test_agent_without_neighbors_solves_its_own_problem() {
    let model = plant("alone");
    let mut agent = Agent::new(AgentId(0), model.clone());
    agent.agent_state = common::constant(0, &[1.0, -1.0], &[0.0]);
    agent.desired_agent_state = common::constant(0, &[0.0, 0.0], &[0.0]);

    let controller = controller(agent, true, true);
    let problem = controller.problem().unwrap();
    let dims = problem.ocp_dim();
    assert_eq!((dims.nx, dims.nu, dims.ng, dims.nh), (2, 1, 0, 2));

    // At the consensus value of the control the augmented term vanishes.
    let (t, x, u) = (0.3, [0.4, -0.7], [0.0]);
    assert_relative_eq!(problem.lfct(t, &x, &u), model.lfct(t, &x, &u, &[0.0, 0.0], &[0.0]));
    assert_relative_eq!(problem.vfct(t, &x), model.vfct(t, &x, &[0.0, 0.0]));

    let (mut f, mut f_model) = ([0.0; 2], [0.0; 2]);
    problem.ffct(&mut f, t, &x, &[0.5]);
    model.ffct(&mut f_model, t, &x, &[0.5]);
    assert_eq!(f, f_model);

    let (mut h, mut h_model) = ([0.0; 2], [0.0; 2]);
    problem.hfct(&mut h, t, &x, &[3.0]);
    model.hfct(&mut h_model, t, &x, &[3.0]);
    assert_eq!(h, h_model);
    assert!(h[0] > 0.0, "upper bound violated");
}

#[test]
fn test_extended_vectors_are_partitioned_by_the_index_map() {
    let cube: Arc<dyn AgentModel> = Arc::new(LinearAgentModel::new(vec![0.0; 9], vec![0.0; 6], 3, 2));
    let mut agent = Agent::new(AgentId(4), plant("agent 4"));
    for (id, model) in [(9, scalar_agent(-1.0)), (1, cube), (6, plant("agent 6"))] {
        agent.add_neighbor(neighbor(id, model, CouplingRelation::NoCoupling, 1));
    }
    let controller = controller(agent, false, false);
    let index = controller.index_map().unwrap();

    fn claim(owner: &mut [Option<&'static str>], range: Range<usize>, who: &'static str) {
        for k in range {
            assert!(owner[k].is_none(), "{who} overlaps {:?} at {k}", owner[k]);
            owner[k] = Some(who);
        }
    }

    let mut x_owner = vec![None; index.nx()];
    let mut u_owner = vec![None; index.nu()];

    claim(&mut x_owner, index.own_x(), "own x");
    claim(&mut u_owner, index.own_u(), "own u");
    let mut previous_end = (index.own_x().end, index.own_u().end);
    for block in index.blocks() {
        // Blocks are contiguous and laid out in neighbor order.
        assert_eq!(block.x.start, previous_end.0);
        assert_eq!(block.u.start, previous_end.1);
        assert_eq!(block.v.start, block.u.end);
        claim(&mut x_owner, block.x.clone(), "x_ji");
        claim(&mut u_owner, block.u.clone(), "u_ji");
        claim(&mut u_owner, block.v.clone(), "v_ji");
        previous_end = (block.x.end, block.v.end);

        assert_eq!(index.x_index_xji(block.id), Some(block.x.start));
        assert_eq!(index.u_index_uji(block.id), Some(block.u.start));
        assert_eq!(index.u_index_vji(block.id), Some(block.v.start));
    }
    assert!(x_owner.iter().all(Option::is_some));
    assert!(u_owner.iter().all(Option::is_some));

    // 2 + 1 + 3 + 2, and 1 + (1 + 1) + (2 + 3) + (1 + 2), in neighbor-list order.
    assert_eq!((index.nx(), index.nu()), (8, 11));
    assert_eq!(
        index.blocks().iter().map(|b| b.id).collect::<Vec<_>>(),
        vec![AgentId(9), AgentId(1), AgentId(6)]
    );
    assert_eq!(index.x_index_xji(AgentId(2)), None);
}

/// Sum of every agent's extended stage and terminal cost with all consensus
/// terms switched off, each agent evaluated at the same global point.
fn network_cost(topology: &Topology, point: &[(Vec<f64>, Vec<f64>)]) -> (f64, f64) {
    let n = topology.models.len();
    let (mut stage, mut terminal) = (0.0, 0.0);
    for i in 0..n {
        let x0 = point[i].0.clone();
        let mut controller = controller(topology.agent(i, &x0), true, false);
        {
            let agent = controller.agent_mut();
            agent.penalty_state.rho_u.fill(0.0);
            for nb in &mut agent.neighbors {
                nb.copy_penalty_state.rho_u.fill(0.0);
                nb.copy_penalty_state.rho_v.fill(0.0);
                nb.influence_penalty_state.rho_v.fill(0.0);
            }
        }
        controller.initialize().unwrap();

        let problem = controller.problem().unwrap();
        let index = controller.index_map().unwrap();
        let mut x = vec![0.0; index.nx()];
        let mut u = vec![0.0; index.nu()];
        x[index.own_x()].copy_from_slice(&point[i].0);
        u[index.own_u()].copy_from_slice(&point[i].1);
        for block in index.blocks() {
            let j = block.id.index();
            block.x_of_mut(&mut x).copy_from_slice(&point[j].0);
            block.u_of_mut(&mut u).copy_from_slice(&point[j].1);
        }
        stage += problem.lfct(0.2, &x, &u);
        terminal += problem.vfct(1.0, &x);
    }
    (stage, terminal)
}

fn central_cost(topology: &Topology, point: &[(Vec<f64>, Vec<f64>)]) -> (f64, f64) {
    topology
        .models
        .iter()
        .zip(point)
        .fold((0.0, 0.0), |(stage, terminal), (model, (x, u))| {
            let (xdes, udes) = (vec![0.0; model.nx()], vec![0.0; model.nu()]);
            (
                stage + model.lfct(0.2, x, u, &xdes, &udes),
                terminal + model.vfct(1.0, x, &xdes),
            )
        })
}

#[test]
fn test_rescaled_costs_add_up_to_the_central_cost_on_rings() {
    let mut rng = StdRng::seed_from_u64(7);
    for n in [2, 3] {
        let models = (0..n).map(|k| plant(&format!("agent {k}"))).collect();
        let topology = Topology::ring(models, plant_coupling());
        let point: Vec<_> = (0..n)
            .map(|_| (random_vec(&mut rng, 2), random_vec(&mut rng, 1)))
            .collect();

        let (stage, terminal) = network_cost(&topology, &point);
        let (central_stage, central_terminal) = central_cost(&topology, &point);
        assert_relative_eq!(stage, central_stage, max_relative = 1e-12);
        assert_relative_eq!(terminal, central_terminal, max_relative = 1e-12);
    }
}

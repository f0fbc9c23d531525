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

//! Sizing and shifting of the records an agent keeps.

use dmpc_core::agent::Agent;
use dmpc_core::math::TIME_EPSILON;
use dmpc_core::state::{AgentState, CouplingState, MultiplierState, PenaltyState};

fn on_grid(t: &[f64], grid: &[f64]) -> bool {
    t.len() == grid.len() && t.iter().zip(grid).all(|(a, b)| (a - b).abs() < 1e3 * TIME_EPSILON)
}

/// Interpolates `state` onto `grid`; mismatching dimensions become zeros.
fn resample(state: &AgentState, grid: &[f64], nx: usize, nu: usize, nv: usize) -> AgentState {
    let samples = grid.len();
    let mut out = AgentState {
        i: state.i,
        t0: grid.first().copied().unwrap_or_default(),
        t: grid.to_vec(),
        x: vec![0.0; samples * nx],
        u: vec![0.0; samples * nu],
        v: vec![0.0; samples * nv],
    };
    let usable = !state.t.is_empty();
    for (k, &tk) in grid.iter().enumerate() {
        if usable && state.nx() == nx {
            state.interpolate_x(tk, &mut out.x[k * nx..(k + 1) * nx]);
        }
        if usable && state.nu() == nu {
            state.interpolate_u(tk, &mut out.u[k * nu..(k + 1) * nu]);
        }
        if usable && state.nv() == nv {
            state.interpolate_v(tk, &mut out.v[k * nv..(k + 1) * nv]);
        }
    }
    out
}

fn agent_fits(state: &AgentState, grid: &[f64], nx: usize, nu: usize, nv: usize) -> bool {
    on_grid(&state.t, grid) && state.has_shape(grid.len(), nx, nu, nv)
}

fn coupling_fits(state: &CouplingState, grid: &[f64], nx: usize, nu: usize, nv: usize) -> bool {
    on_grid(&state.t, grid) && state.has_shape(grid.len(), nx, nu, nv)
}

fn multiplier_fits(state: &MultiplierState, grid: &[f64], nx: usize, nu: usize, nv: usize) -> bool {
    on_grid(&state.t, grid) && state.has_shape(grid.len(), nx, nu, nv)
}

fn penalty_fits(state: &PenaltyState, grid: &[f64], nx: usize, nu: usize, nv: usize) -> bool {
    on_grid(&state.t, grid) && state.has_shape(grid.len(), nx, nu, nv)
}

fn coupling_from(state: &AgentState) -> CouplingState {
    CouplingState {
        i: state.i,
        t0: state.t0,
        t: state.t.clone(),
        z_x: state.x.clone(),
        z_u: state.u.clone(),
        z_v: Vec::new(),
    }
}

/// Gives every record of `agent` the shape its role requires on `grid`.
///
/// Records that already fit are left untouched, so multipliers and penalties
/// survive a re-initialization.
pub(super) fn prepare(agent: &mut Agent, grid: &[f64], rho: f64) {
    let (id, nx_i, nu_i) = (agent.id, agent.nx(), agent.nu());
    let t = grid.to_vec();

    if !agent_fits(&agent.agent_state, grid, nx_i, nu_i, 0) {
        agent.agent_state = resample(&agent.agent_state, grid, nx_i, nu_i, 0);
        agent.agent_state.i = id;
    }
    if !coupling_fits(&agent.coupling_state, grid, nx_i, nu_i, 0) {
        agent.coupling_state = coupling_from(&agent.agent_state);
    }
    if !multiplier_fits(&agent.multiplier_state, grid, nx_i, nu_i, 0) {
        agent.multiplier_state = MultiplierState::zeros(id, t.clone(), nx_i, nu_i, 0);
    }
    if !penalty_fits(&agent.penalty_state, grid, nx_i, nu_i, 0) {
        agent.penalty_state = PenaltyState::filled(id, t.clone(), nx_i, nu_i, 0, rho);
    }

    let own = agent.agent_state.clone();
    for nb in &mut agent.neighbors {
        let (j, nx_j, nu_j) = (nb.id, nb.nx(), nb.nu());

        // Received from j.
        if !agent_fits(&nb.agent_state, grid, nx_j, nu_j, 0) {
            nb.agent_state = resample(&nb.agent_state, grid, nx_j, nu_j, 0);
            nb.agent_state.i = j;
        }
        if !agent_fits(&nb.coupled_agent_state, grid, nx_i, nu_i, nx_i) {
            nb.coupled_agent_state = resample(&own, grid, nx_i, nu_i, nx_i);
        }
        if !coupling_fits(&nb.coupling_state, grid, nx_j, nu_j, 0) {
            nb.coupling_state = coupling_from(&nb.agent_state);
        }
        if !coupling_fits(&nb.previous_coupling_state, grid, nx_j, nu_j, 0) {
            nb.previous_coupling_state = nb.coupling_state.clone();
        }
        if !coupling_fits(&nb.external_influence_coupling_state, grid, 0, 0, nx_j) {
            nb.external_influence_coupling_state = CouplingState::constant(j, t.clone(), &[], &[], &vec![0.0; nx_j]);
        }
        if !coupling_fits(&nb.previous_external_influence_coupling_state, grid, 0, 0, nx_j) {
            nb.previous_external_influence_coupling_state = nb.external_influence_coupling_state.clone();
        }
        if !multiplier_fits(&nb.coupled_multiplier_state, grid, 0, nu_i, nx_i) {
            nb.coupled_multiplier_state = MultiplierState::zeros(id, t.clone(), 0, nu_i, nx_i);
        }
        if !penalty_fits(&nb.coupled_penalty_state, grid, 0, nu_i, nx_i) {
            nb.coupled_penalty_state = PenaltyState::filled(id, t.clone(), 0, nu_i, nx_i, rho);
        }

        // Owned by this agent.
        if !agent_fits(&nb.local_copy, grid, nx_j, nu_j, nx_j) {
            nb.local_copy = resample(&nb.agent_state, grid, nx_j, nu_j, nx_j);
            nb.local_copy.i = j;
        }
        if nb.local_influence.len() != grid.len() * nx_i {
            nb.local_influence = vec![0.0; grid.len() * nx_i];
        }
        if !coupling_fits(&nb.influence_coupling_state, grid, 0, 0, nx_i) {
            nb.influence_coupling_state = CouplingState::constant(id, t.clone(), &[], &[], &vec![0.0; nx_i]);
        }
        if !multiplier_fits(&nb.influence_multiplier_state, grid, 0, 0, nx_i) {
            nb.influence_multiplier_state = MultiplierState::zeros(id, t.clone(), 0, 0, nx_i);
        }
        if !penalty_fits(&nb.influence_penalty_state, grid, 0, 0, nx_i) {
            nb.influence_penalty_state = PenaltyState::filled(id, t.clone(), 0, 0, nx_i, rho);
        }
        if !multiplier_fits(&nb.copy_multiplier_state, grid, 0, nu_j, nx_j) {
            nb.copy_multiplier_state = MultiplierState::zeros(j, t.clone(), 0, nu_j, nx_j);
        }
        if !penalty_fits(&nb.copy_penalty_state, grid, 0, nu_j, nx_j) {
            nb.copy_penalty_state = PenaltyState::filled(j, t.clone(), 0, nu_j, nx_j, rho);
        }
    }
}

fn advance(t0: &mut f64, t: &mut [f64], dt: f64) {
    *t0 += dt;
    for tk in t.iter_mut() {
        *tk += dt;
    }
}

/// Moves every record's time grid by `dt`, keeping the samples in place.
pub(super) fn retime(agent: &mut Agent, dt: f64) {
    advance(&mut agent.agent_state.t0, &mut agent.agent_state.t, dt);
    advance(&mut agent.coupling_state.t0, &mut agent.coupling_state.t, dt);
    advance(&mut agent.multiplier_state.t0, &mut agent.multiplier_state.t, dt);
    advance(&mut agent.penalty_state.t0, &mut agent.penalty_state.t, dt);

    for nb in &mut agent.neighbors {
        for state in [&mut nb.agent_state, &mut nb.coupled_agent_state, &mut nb.local_copy] {
            advance(&mut state.t0, &mut state.t, dt);
        }
        for state in [
            &mut nb.coupling_state,
            &mut nb.previous_coupling_state,
            &mut nb.external_influence_coupling_state,
            &mut nb.previous_external_influence_coupling_state,
            &mut nb.influence_coupling_state,
        ] {
            advance(&mut state.t0, &mut state.t, dt);
        }
        for state in [
            &mut nb.coupled_multiplier_state,
            &mut nb.influence_multiplier_state,
            &mut nb.copy_multiplier_state,
        ] {
            advance(&mut state.t0, &mut state.t, dt);
        }
        for state in [
            &mut nb.coupled_penalty_state,
            &mut nb.influence_penalty_state,
            &mut nb.copy_penalty_state,
        ] {
            advance(&mut state.t0, &mut state.t, dt);
        }
    }
}

/// Shifts every horizon-bound record by one sample.
pub(super) fn shift(agent: &mut Agent, dt: f64) {
    agent.agent_state.shift(dt);
    agent.coupling_state.shift(dt);
    agent.multiplier_state.shift(dt);
    agent.penalty_state.shift(dt);

    let nx_i = agent.nx();
    for nb in &mut agent.neighbors {
        nb.agent_state.shift(dt);
        nb.coupled_agent_state.shift(dt);
        nb.coupling_state.shift(dt);
        nb.previous_coupling_state.shift(dt);
        nb.external_influence_coupling_state.shift(dt);
        nb.previous_external_influence_coupling_state.shift(dt);
        nb.coupled_multiplier_state.shift(dt);
        nb.coupled_penalty_state.shift(dt);
        nb.local_copy.shift(dt);
        dmpc_core::math::shift_samples(&mut nb.local_influence, nx_i);
        nb.influence_coupling_state.shift(dt);
        nb.influence_multiplier_state.shift(dt);
        nb.influence_penalty_state.shift(dt);
        nb.copy_multiplier_state.shift(dt);
        nb.copy_penalty_state.shift(dt);
    }
}

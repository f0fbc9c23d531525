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

//! Extended cost: (rescaled) own and neighbor costs plus the consensus terms.
//!
//! Consensus terms, with `r = z - local`:
//! * own control, `z_u_i - u_i`
//! * per neighbor influence, `z_v_ij - v_ij(x, u)`
//! * per neighbor copied influence slot, `z_v_ji - v_ji`
//! * per neighbor copied control, `z_u_j - u_ji`

use dmpc_core::agent::Neighbor;
use dmpc_core::math::{add_scaled, augmented_slope, augmented_term};
use dmpc_core::state::{AgentState, CouplingState, MultiplierState, PenaltyState};

use super::LocalProblem;

/// Consensus variable, multiplier and penalty of one term at one time.
struct ConsensusSample {
    z: Vec<f64>,
    mu: Vec<f64>,
    rho: Vec<f64>,
}

impl ConsensusSample {
    fn control(t: f64, dim: usize, z: &CouplingState, mu: &MultiplierState, rho: &PenaltyState) -> Self {
        let mut sample = Self::zeros(dim);
        z.interpolate_z_u(t, &mut sample.z);
        mu.interpolate_mu_u(t, &mut sample.mu);
        rho.interpolate_rho_u(t, &mut sample.rho);
        sample
    }

    fn influence(t: f64, dim: usize, z: &CouplingState, mu: &MultiplierState, rho: &PenaltyState) -> Self {
        let mut sample = Self::zeros(dim);
        z.interpolate_z_v(t, &mut sample.z);
        mu.interpolate_mu_v(t, &mut sample.mu);
        rho.interpolate_rho_v(t, &mut sample.rho);
        sample
    }

    fn zeros(dim: usize) -> Self {
        Self {
            z: vec![0.0; dim],
            mu: vec![0.0; dim],
            rho: vec![0.0; dim],
        }
    }

    fn cost(&self, local: &[f64]) -> f64 {
        (0..self.z.len())
            .map(|c| augmented_term(self.mu[c], self.rho[c], self.z[c] - local[c]))
            .sum()
    }

    /// `∂cost/∂local`, i.e. the negated slope since `r = z - local`.
    fn gradient(&self, local: &[f64]) -> Vec<f64> {
        (0..self.z.len())
            .map(|c| -augmented_slope(self.mu[c], self.rho[c], self.z[c] - local[c]))
            .collect()
    }

    fn add_gradient(&self, out: &mut [f64], local: &[f64]) {
        add_scaled(out, &self.gradient(local), 1.0);
    }
}

fn desired(state: &AgentState, t: f64, nx: usize, nu: usize) -> (Vec<f64>, Vec<f64>) {
    let mut xdes = vec![0.0; nx];
    let mut udes = vec![0.0; nu];
    state.interpolate_x(t, &mut xdes);
    state.interpolate_u(t, &mut udes);
    (xdes, udes)
}

fn neighbor_scale(nb: &Neighbor) -> f64 {
    1.0 / (1.0 + nb.number_of_neighbors as f64)
}

fn copied_control(t: f64, nb: &Neighbor) -> ConsensusSample {
    ConsensusSample::control(
        t,
        nb.nu(),
        &nb.coupling_state,
        &nb.copy_multiplier_state,
        &nb.copy_penalty_state,
    )
}

fn copied_influence(t: f64, nb: &Neighbor) -> ConsensusSample {
    ConsensusSample::influence(
        t,
        nb.nx(),
        &nb.external_influence_coupling_state,
        &nb.copy_multiplier_state,
        &nb.copy_penalty_state,
    )
}

impl LocalProblem<'_> {
    fn own_scale(&self) -> f64 {
        1.0 / (1.0 + self.agent.neighbors.len() as f64)
    }

    fn own_control(&self, t: f64) -> ConsensusSample {
        ConsensusSample::control(
            t,
            self.nu_i(),
            &self.agent.coupling_state,
            &self.agent.multiplier_state,
            &self.agent.penalty_state,
        )
    }

    fn influence_sample(&self, t: f64, nb: &Neighbor) -> ConsensusSample {
        ConsensusSample::influence(
            t,
            self.nx_i(),
            &nb.influence_coupling_state,
            &nb.influence_multiplier_state,
            &nb.influence_penalty_state,
        )
    }

    pub(super) fn stage_cost(&self, t: f64, x: &[f64], u: &[f64]) -> f64 {
        let agent = self.agent;
        let (nx_i, nu_i) = (self.nx_i(), self.nu_i());
        let (xi, ui) = (&x[..nx_i], &u[..nu_i]);

        let (xdes, udes) = desired(&agent.desired_agent_state, t, nx_i, nu_i);
        let mut l = agent.model.lfct(t, xi, ui, &xdes, &udes);

        if agent.is_approximating_cost() {
            l *= self.own_scale();
            for (nb, block) in self.pairs() {
                let (xdes_j, udes_j) = desired(&nb.desired_agent_state, t, nb.nx(), nb.nu());
                let lj = nb
                    .agent_model
                    .lfct(t, block.x_of(x), block.u_of(u), &xdes_j, &udes_j);
                l += neighbor_scale(nb) * lj;
            }
        }

        l += self.own_control(t).cost(ui);

        for (nb, block) in self.pairs() {
            if let Some(v) = self.neighbor_influence(nb, t, x, u) {
                l += self.influence_sample(t, nb).cost(&v);
            }
            l += copied_influence(t, nb).cost(block.v_of(u));
            l += copied_control(t, nb).cost(block.u_of(u));
        }
        l
    }

    pub(super) fn add_stage_cost_dx(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]) {
        let agent = self.agent;
        let (nx_i, nu_i) = (self.nx_i(), self.nu_i());
        let (xi, ui) = (&x[..nx_i], &u[..nu_i]);

        let (xdes, udes) = desired(&agent.desired_agent_state, t, nx_i, nu_i);
        agent.model.dldx(&mut out[..nx_i], t, xi, ui, &xdes, &udes);

        if agent.is_approximating_cost() {
            let scale = self.own_scale();
            out[..nx_i].iter_mut().for_each(|o| *o *= scale);

            for (nb, block) in self.pairs() {
                let (xdes_j, udes_j) = desired(&nb.desired_agent_state, t, nb.nx(), nb.nu());
                let mut grad = vec![0.0; nb.nx()];
                nb.agent_model
                    .dldx(&mut grad, t, block.x_of(x), block.u_of(u), &xdes_j, &udes_j);
                add_scaled(block.x_of_mut(out), &grad, neighbor_scale(nb));
            }
        }

        // Only the influence term depends on the extended state.
        for (nb, _) in self.pairs() {
            let (Some(approximation), Some(v)) = (&nb.approximation, self.neighbor_influence(nb, t, x, u)) else {
                continue;
            };
            let adjoint = self.influence_sample(t, nb).gradient(&v);
            approximation.dinfluence_dx_vec(out, t, x, u, &adjoint, &self.context(nb));
        }
    }

    pub(super) fn add_stage_cost_du(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]) {
        let agent = self.agent;
        let (nx_i, nu_i) = (self.nx_i(), self.nu_i());
        let (xi, ui) = (&x[..nx_i], &u[..nu_i]);

        let (xdes, udes) = desired(&agent.desired_agent_state, t, nx_i, nu_i);
        agent.model.dldu(&mut out[..nu_i], t, xi, ui, &xdes, &udes);

        if agent.is_approximating_cost() {
            let scale = self.own_scale();
            out[..nu_i].iter_mut().for_each(|o| *o *= scale);

            for (nb, block) in self.pairs() {
                let (xdes_j, udes_j) = desired(&nb.desired_agent_state, t, nb.nx(), nb.nu());
                let mut grad = vec![0.0; nb.nu()];
                nb.agent_model
                    .dldu(&mut grad, t, block.x_of(x), block.u_of(u), &xdes_j, &udes_j);
                add_scaled(block.u_of_mut(out), &grad, neighbor_scale(nb));
            }
        }

        self.own_control(t).add_gradient(&mut out[..nu_i], ui);

        for (nb, block) in self.pairs() {
            if let (Some(approximation), Some(v)) = (&nb.approximation, self.neighbor_influence(nb, t, x, u)) {
                let adjoint = self.influence_sample(t, nb).gradient(&v);
                approximation.dinfluence_du_vec(out, t, x, u, &adjoint, &self.context(nb));
            }
            copied_influence(t, nb).add_gradient(block.v_of_mut(out), block.v_of(u));
            copied_control(t, nb).add_gradient(block.u_of_mut(out), block.u_of(u));
        }
    }

    pub(super) fn terminal_cost(&self, t: f64, x: &[f64]) -> f64 {
        let agent = self.agent;
        let nx_i = self.nx_i();

        let (xdes, _) = desired(&agent.desired_agent_state, t, nx_i, 0);
        let mut v = agent.model.vfct(t, &x[..nx_i], &xdes);

        if agent.is_approximating_cost() {
            v *= self.own_scale();
            for (nb, block) in self.pairs() {
                let (xdes_j, _) = desired(&nb.desired_agent_state, t, nb.nx(), 0);
                v += neighbor_scale(nb) * nb.agent_model.vfct(t, block.x_of(x), &xdes_j);
            }
        }
        v
    }

    pub(super) fn add_terminal_cost_dx(&self, out: &mut [f64], t: f64, x: &[f64]) {
        let agent = self.agent;
        let nx_i = self.nx_i();

        let (xdes, _) = desired(&agent.desired_agent_state, t, nx_i, 0);
        agent.model.dvdx(&mut out[..nx_i], t, &x[..nx_i], &xdes);

        if agent.is_approximating_cost() {
            let scale = self.own_scale();
            out[..nx_i].iter_mut().for_each(|o| *o *= scale);

            for (nb, block) in self.pairs() {
                let (xdes_j, _) = desired(&nb.desired_agent_state, t, nb.nx(), 0);
                let mut grad = vec![0.0; nb.nx()];
                nb.agent_model.dvdx(&mut grad, t, block.x_of(x), &xdes_j);
                add_scaled(block.x_of_mut(out), &grad, neighbor_scale(nb));
            }
        }
    }
}

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

//! Dual ascent on the consensus multipliers.

use super::AdmmController;

/// `mu += rho * (z - local)`, returning the largest `|z - local|`.
fn dual_ascent(mu: &mut [f64], rho: &[f64], z: &[f64], local: &[f64]) -> f64 {
    let mut primal = 0.0_f64;
    for (idx, mu) in mu.iter_mut().enumerate() {
        let r = z[idx] - local[idx];
        *mu += rho[idx] * r;
        primal = primal.max(r.abs());
    }
    primal
}

impl AdmmController {
    /// Updates every multiplier this agent owns and sets the primal residual.
    pub fn update_multiplier_states(&mut self) {
        let agent = &mut self.agent;

        let mut primal = dual_ascent(
            &mut agent.multiplier_state.mu_u,
            &agent.penalty_state.rho_u,
            &agent.coupling_state.z_u,
            &agent.agent_state.u,
        );

        for nb in &mut agent.neighbors {
            if nb.approximation.is_some() {
                primal = primal.max(dual_ascent(
                    &mut nb.influence_multiplier_state.mu_v,
                    &nb.influence_penalty_state.rho_v,
                    &nb.influence_coupling_state.z_v,
                    &nb.local_influence,
                ));
            }
            primal = primal.max(dual_ascent(
                &mut nb.copy_multiplier_state.mu_v,
                &nb.copy_penalty_state.rho_v,
                &nb.external_influence_coupling_state.z_v,
                &nb.local_copy.v,
            ));
            primal = primal.max(dual_ascent(
                &mut nb.copy_multiplier_state.mu_u,
                &nb.copy_penalty_state.rho_u,
                &nb.coupling_state.z_u,
                &nb.local_copy.u,
            ));
        }

        self.residuals.primal = primal;
    }
}

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

//! Consensus variable update.
//!
//! Each consensus variable is the penalty-weighted minimizer of the
//! augmented-Lagrangian terms of everyone who holds a local value of it:
//!
//! `z = (Σ_k rho_k a_k - Σ_k mu_k) / Σ_k rho_k`

use dmpc_core::math::norm_inf;

use super::AdmmController;

/// One participant of a consensus variable: local values, multipliers and
/// penalties on the same flat layout as the variable.
struct Participant<'a> {
    local: &'a [f64],
    mu: &'a [f64],
    rho: &'a [f64],
}

/// Writes the penalty-weighted consensus of `participants` into `z`.
/// Entries without any penalty weight keep their value.
fn weighted_consensus(z: &mut [f64], participants: &[Participant<'_>]) {
    for (idx, z) in z.iter_mut().enumerate() {
        let (mut num, mut den) = (0.0, 0.0);
        for p in participants {
            num += p.rho[idx] * p.local[idx] - p.mu[idx];
            den += p.rho[idx];
        }
        if den > 0.0 {
            *z = num / den;
        }
    }
}

fn max_change(new: &[f64], old: &[f64]) -> f64 {
    new.iter()
        .zip(old)
        .fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs()))
}

impl AdmmController {
    /// Recomputes `z_x_i`, `z_u_i` and every `z_v_ij` from the latest local
    /// solution and the records received from the neighbors, and sets the
    /// dual residual.
    pub fn update_coupling_states(&mut self) {
        let agent = &mut self.agent;

        let previous = agent.coupling_state.clone();
        agent.coupling_state.t.clone_from(&agent.agent_state.t);
        agent.coupling_state.t0 = agent.agent_state.t0;
        // The state consensus is the own state itself.
        agent.coupling_state.z_x.clone_from(&agent.agent_state.x);

        {
            let mut participants = vec![Participant {
                local: &agent.agent_state.u,
                mu: &agent.multiplier_state.mu_u,
                rho: &agent.penalty_state.rho_u,
            }];
            participants.extend(agent.neighbors.iter().map(|nb| Participant {
                local: &nb.coupled_agent_state.u,
                mu: &nb.coupled_multiplier_state.mu_u,
                rho: &nb.coupled_penalty_state.rho_u,
            }));
            weighted_consensus(&mut agent.coupling_state.z_u, &participants);
        }
        let mut dual = max_change(&agent.coupling_state.z_u, &previous.z_u);

        for (nb, previous_influence) in agent
            .neighbors
            .iter_mut()
            .zip(self.previous_influence_coupling_states.iter_mut())
        {
            *previous_influence = nb.influence_coupling_state.clone();

            let mut participants = Vec::with_capacity(2);
            if nb.approximation.is_some() {
                participants.push(Participant {
                    local: &nb.local_influence,
                    mu: &nb.influence_multiplier_state.mu_v,
                    rho: &nb.influence_penalty_state.rho_v,
                });
            }
            participants.push(Participant {
                local: &nb.coupled_agent_state.v,
                mu: &nb.coupled_multiplier_state.mu_v,
                rho: &nb.coupled_penalty_state.rho_v,
            });
            weighted_consensus(&mut nb.influence_coupling_state.z_v, &participants);

            dual = dual.max(max_change(
                &nb.influence_coupling_state.z_v,
                &previous_influence.z_v,
            ));
            log::trace!(
                "ADMM[agent {}]: z_v towards agent {} |z_v| = {:.3e}",
                agent.id,
                nb.id,
                norm_inf(&nb.influence_coupling_state.z_v)
            );
        }

        self.previous_coupling_state = previous;
        self.residuals.dual = dual;
    }
}

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

//! Plant simulation for the receding-horizon loop.

use std::collections::BTreeMap;

use dmpc_core::agent::AgentId;

use crate::network::Network;

/// First state and control sample of every agent's current prediction.
pub type AppliedSamples = BTreeMap<AgentId, (Vec<f64>, Vec<f64>)>;

/// One explicit-Euler step of the true coupled dynamics
/// `ẋ_i = f_i(x_i, u_i) + Σ_j f_ij(x_i, u_i, x_j, u_j)`.
///
/// Agents missing from `network` are skipped.
pub fn euler_step(network: &Network, applied: &AppliedSamples, t: f64, dt: f64) -> BTreeMap<AgentId, Vec<f64>> {
    applied
        .iter()
        .filter_map(|(&id, (x, u))| {
            let entry = network.entry(id)?;
            let mut f = vec![0.0; x.len()];
            entry.model.ffct(&mut f, t, x, u);
            for j in network.neighbors_of(id) {
                if let (Some(model), Some((xj, uj))) = (network.coupling(id, j), applied.get(&j)) {
                    model.ffct(&mut f, t, x, u, xj, uj);
                }
            }
            let next = x.iter().zip(&f).map(|(xk, fk)| xk + dt * fk).collect();
            Some((id, next))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use dmpc_core::agent::{AgentInfo, CouplingInfo};
    use dmpc_infra::{LinearAgentModel, LinearCouplingModel};
    use std::sync::Arc;

    #[test]
    fn test_euler_step_includes_incoming_couplings_only() {
        let mut network = Network::new();
        for id in 0..2 {
            let info = AgentInfo {
                id: AgentId(id),
                model: Arc::new(LinearAgentModel::scalar(-1.0, 1.0)),
            };
            network.register_agent(info, &[1.0], &[0.0]).unwrap();
        }
        network
            .register_coupling(CouplingInfo {
                agent: AgentId(0),
                neighbor: AgentId(1),
                model: Arc::new(LinearCouplingModel::scalar(0.5)),
            })
            .unwrap();

        let applied: AppliedSamples = [
            (AgentId(0), (vec![1.0], vec![0.2])),
            (AgentId(1), (vec![2.0], vec![0.0])),
        ]
        .into_iter()
        .collect();
        let next = euler_step(&network, &applied, 0.0, 0.1);

        // 1 + 0.1 * (-1 + 0.2 + 0.5 * 2)
        assert_relative_eq!(next[&AgentId(0)][0], 1.02);
        // 2 + 0.1 * (-2)
        assert_relative_eq!(next[&AgentId(1)][0], 1.8);
    }
}

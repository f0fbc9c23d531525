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

//! Residual-balancing penalty adaptation.

use dmpc_core::config::OptimizationInfo;

use super::AdmmController;

/// Adapts one penalty parameter to the ratio of its residuals.
///
/// Increases `penalty` by `admm_penalty_increase_factor` when the primal
/// residual exceeds `admm_residual_ratio` times the dual residual, decreases
/// it by `admm_penalty_decrease_factor` in the opposite case, and clamps the
/// result to `[admm_penalty_min, admm_penalty_max]`.
pub fn adapt_penalty_parameter(primal: f64, dual: f64, penalty: f64, info: &OptimizationInfo) -> f64 {
    balance(primal, dual, penalty, info).clamp(info.admm_penalty_min, info.admm_penalty_max)
}

fn balance(primal: f64, dual: f64, penalty: f64, info: &OptimizationInfo) -> f64 {
    let ratio = info.admm_residual_ratio;
    if primal > ratio * dual {
        penalty * info.admm_penalty_increase_factor
    } else if dual > ratio * primal {
        penalty / info.admm_penalty_decrease_factor
    } else {
        penalty
    }
}

/// Adapts every entry of `rho` from its own primal residual `|z - local|` and
/// dual residual `|z - z_prev|`. Entries with both residuals already within
/// tolerance are left alone. Returns the number of entries that were clamped.
fn adapt_entries(rho: &mut [f64], z: &[f64], local: &[f64], z_prev: &[f64], info: &OptimizationInfo) -> usize {
    let mut clamped = 0;
    for (idx, rho) in rho.iter_mut().enumerate() {
        let primal = (z[idx] - local[idx]).abs();
        let dual = (z[idx] - z_prev[idx]).abs();
        if primal <= info.admm_primal_tolerance && dual <= info.admm_dual_tolerance {
            continue;
        }
        let wanted = balance(primal, dual, *rho, info);
        let adapted = wanted.clamp(info.admm_penalty_min, info.admm_penalty_max);
        if adapted != wanted {
            clamped += 1;
        }
        *rho = adapted;
    }
    clamped
}

impl AdmmController {
    /// Adapts every penalty this agent owns. No-op unless
    /// `admm_adapt_penalty` is set.
    pub fn penalty_parameter_adaption(&mut self) {
        if !self.info.admm_adapt_penalty {
            return;
        }
        let info = &self.info;
        let agent = &mut self.agent;

        let mut clamped = adapt_entries(
            &mut agent.penalty_state.rho_u,
            &agent.coupling_state.z_u,
            &agent.agent_state.u,
            &self.previous_coupling_state.z_u,
            info,
        );

        for (nb, previous_influence) in agent
            .neighbors
            .iter_mut()
            .zip(&self.previous_influence_coupling_states)
        {
            if nb.approximation.is_some() {
                clamped += adapt_entries(
                    &mut nb.influence_penalty_state.rho_v,
                    &nb.influence_coupling_state.z_v,
                    &nb.local_influence,
                    &previous_influence.z_v,
                    info,
                );
            }
            clamped += adapt_entries(
                &mut nb.copy_penalty_state.rho_v,
                &nb.external_influence_coupling_state.z_v,
                &nb.local_copy.v,
                &nb.previous_external_influence_coupling_state.z_v,
                info,
            );
            clamped += adapt_entries(
                &mut nb.copy_penalty_state.rho_u,
                &nb.coupling_state.z_u,
                &nb.local_copy.u,
                &nb.previous_coupling_state.z_u,
                info,
            );
        }

        if clamped > 0 {
            log::warn!(
                "ADMM[agent {}]: {} penalty entries clamped to [{:.1e}, {:.1e}]",
                agent.id,
                clamped,
                info.admm_penalty_min,
                info.admm_penalty_max
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> OptimizationInfo {
        OptimizationInfo {
            admm_penalty_min: 0.1,
            admm_penalty_max: 10.0,
            admm_penalty_increase_factor: 2.0,
            admm_penalty_decrease_factor: 2.0,
            admm_residual_ratio: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_penalty_increases_when_primal_dominates() {
        let rho = adapt_penalty_parameter(1.0, 0.01, 1.0, &info());
        assert!(rho > 1.0);
        assert_eq!(rho, 2.0);
    }

    #[test]
    fn test_penalty_decreases_when_dual_dominates() {
        let rho = adapt_penalty_parameter(0.01, 1.0, 1.0, &info());
        assert!(rho < 1.0);
        assert_eq!(rho, 0.5);
    }

    #[test]
    fn test_penalty_unchanged_when_balanced() {
        assert_eq!(adapt_penalty_parameter(1.0, 0.5, 1.0, &info()), 1.0);
    }

    #[test]
    fn test_penalty_stays_within_bounds() {
        let info = info();
        let mut rho = 1.0;
        for _ in 0..20 {
            rho = adapt_penalty_parameter(1.0, 0.0, rho, &info);
            assert!(rho <= info.admm_penalty_max);
        }
        assert_eq!(rho, info.admm_penalty_max);

        for _ in 0..20 {
            rho = adapt_penalty_parameter(0.0, 1.0, rho, &info);
            assert!(rho >= info.admm_penalty_min);
        }
        assert_eq!(rho, info.admm_penalty_min);
    }

    #[test]
    fn test_adapt_entries_skips_converged_and_counts_clamps() {
        let info = info();
        let mut rho = vec![1.0, 8.0];
        // Entry 0 is converged; entry 1 wants to double past the bound.
        let clamped = adapt_entries(&mut rho, &[0.0, 1.0], &[0.0, 0.0], &[0.0, 1.0], &info);
        assert_eq!(rho, vec![1.0, 10.0]);
        assert_eq!(clamped, 1);
    }
}

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

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::math::{interpolate, shift_samples};

use super::{field_matches, is_strictly_increasing, per_sample_len, shift_grid};

/// Per-sample ADMM penalty parameters, aligned with a [`MultiplierState`].
///
/// Every entry stays within `[admm_penalty_min, admm_penalty_max]` once the
/// controller has adapted it.
///
/// [`MultiplierState`]: super::MultiplierState
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PenaltyState {
    /// Agent whose variables the penalties weight.
    pub i: AgentId,
    /// Start of the horizon.
    pub t0: f64,
    /// Sample times.
    pub t: Vec<f64>,
    /// Penalties on state consensus.
    pub rho_x: Vec<f64>,
    /// Penalties on control consensus.
    pub rho_u: Vec<f64>,
    /// Penalties on external-influence consensus.
    pub rho_v: Vec<f64>,
}

impl PenaltyState {
    /// Penalties set to `rho` everywhere on the grid `t`.
    pub fn filled(i: AgentId, t: Vec<f64>, nx: usize, nu: usize, nv: usize, rho: f64) -> Self {
        let samples = t.len();
        Self {
            i,
            t0: t.first().copied().unwrap_or_default(),
            rho_x: vec![rho; nx * samples],
            rho_u: vec![rho; nu * samples],
            rho_v: vec![rho; nv * samples],
            t,
        }
    }

    /// Returns `true` if the record has `samples` grid points and the given
    /// per-sample dimensions.
    pub fn has_shape(&self, samples: usize, nx: usize, nu: usize, nv: usize) -> bool {
        self.t.len() == samples
            && field_matches(&self.rho_x, nx, samples)
            && field_matches(&self.rho_u, nu, samples)
            && field_matches(&self.rho_v, nv, samples)
            && is_strictly_increasing(&self.t)
    }

    /// Interpolates `rho_u` at `time` into `out`.
    pub fn interpolate_rho_u(&self, time: f64, out: &mut [f64]) {
        interpolate(&self.t, &self.rho_u, time, out);
    }

    /// Interpolates `rho_v` at `time` into `out`.
    pub fn interpolate_rho_v(&self, time: f64, out: &mut [f64]) {
        interpolate(&self.t, &self.rho_v, time, out);
    }

    /// Smallest and largest penalty in the record, `None` when empty.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.rho_x
            .iter()
            .chain(&self.rho_u)
            .chain(&self.rho_v)
            .fold(None, |acc, &rho| match acc {
                None => Some((rho, rho)),
                Some((lo, hi)) => Some((lo.min(rho), hi.max(rho))),
            })
    }

    /// Moves the horizon forward by `dt`, dropping the first sample.
    pub fn shift(&mut self, dt: f64) {
        let samples = self.t.len().max(1);
        let dims = [
            per_sample_len(&self.rho_x, samples),
            per_sample_len(&self.rho_u, samples),
            per_sample_len(&self.rho_v, samples),
        ];
        shift_grid(&mut self.t0, &mut self.t, dt);
        shift_samples(&mut self.rho_x, dims[0]);
        shift_samples(&mut self.rho_u, dims[1]);
        shift_samples(&mut self.rho_v, dims[2]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_bounds() {
        let mut penalty = PenaltyState::filled(AgentId(1), vec![0.0, 1.0], 1, 2, 1, 3.0);
        assert_eq!(penalty.bounds(), Some((3.0, 3.0)));
        penalty.rho_u[1] = 0.5;
        penalty.rho_v[0] = 7.0;
        assert_eq!(penalty.bounds(), Some((0.5, 7.0)));
        assert!(penalty.has_shape(2, 1, 2, 1));
    }

    #[test]
    fn test_empty_penalty_has_no_bounds() {
        assert_eq!(PenaltyState::default().bounds(), None);
    }
}

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

use super::{field_matches, is_strictly_increasing, repeat_sample, per_sample_len, shift_grid};

/// Lagrange multipliers of the consensus constraints held by one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiplierState {
    /// Agent whose variables the multipliers price.
    pub i: AgentId,
    /// Start of the horizon.
    pub t0: f64,
    /// Sample times.
    pub t: Vec<f64>,
    /// Multipliers on state consensus.
    pub mu_x: Vec<f64>,
    /// Multipliers on control consensus.
    pub mu_u: Vec<f64>,
    /// Multipliers on external-influence consensus.
    pub mu_v: Vec<f64>,
}

impl MultiplierState {
    /// All-zero multipliers on the grid `t`.
    pub fn zeros(i: AgentId, t: Vec<f64>, nx: usize, nu: usize, nv: usize) -> Self {
        let samples = t.len();
        Self {
            i,
            t0: t.first().copied().unwrap_or_default(),
            mu_x: repeat_sample(&vec![0.0; nx], samples),
            mu_u: repeat_sample(&vec![0.0; nu], samples),
            mu_v: repeat_sample(&vec![0.0; nv], samples),
            t,
        }
    }

    /// Returns `true` if the record has `samples` grid points and the given
    /// per-sample dimensions.
    pub fn has_shape(&self, samples: usize, nx: usize, nu: usize, nv: usize) -> bool {
        self.t.len() == samples
            && field_matches(&self.mu_x, nx, samples)
            && field_matches(&self.mu_u, nu, samples)
            && field_matches(&self.mu_v, nv, samples)
            && is_strictly_increasing(&self.t)
    }

    /// Interpolates `mu_u` at `time` into `out`.
    pub fn interpolate_mu_u(&self, time: f64, out: &mut [f64]) {
        interpolate(&self.t, &self.mu_u, time, out);
    }

    /// Interpolates `mu_v` at `time` into `out`.
    pub fn interpolate_mu_v(&self, time: f64, out: &mut [f64]) {
        interpolate(&self.t, &self.mu_v, time, out);
    }

    /// Moves the horizon forward by `dt`, dropping the first sample.
    pub fn shift(&mut self, dt: f64) {
        let samples = self.t.len().max(1);
        let dims = [
            per_sample_len(&self.mu_x, samples),
            per_sample_len(&self.mu_u, samples),
            per_sample_len(&self.mu_v, samples),
        ];
        shift_grid(&mut self.t0, &mut self.t, dt);
        shift_samples(&mut self.mu_x, dims[0]);
        shift_samples(&mut self.mu_u, dims[1]);
        shift_samples(&mut self.mu_v, dims[2]);
    }
}

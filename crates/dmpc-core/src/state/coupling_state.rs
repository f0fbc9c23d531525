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

/// Consensus (coupling) variables owned by one agent.
///
/// `z_u` is the agreed control of agent `i`, `z_x` mirrors its state, and
/// `z_v` is the agreed external influence on `i`. An agent's own coupling
/// record carries `z_x`/`z_u`; the per-neighbor influence records carry `z_v`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CouplingState {
    /// Owning agent.
    pub i: AgentId,
    /// Start of the horizon.
    pub t0: f64,
    /// Sample times.
    pub t: Vec<f64>,
    /// Consensus state.
    pub z_x: Vec<f64>,
    /// Consensus control.
    pub z_u: Vec<f64>,
    /// Consensus external influence.
    pub z_v: Vec<f64>,
}

impl CouplingState {
    /// Builds a record holding the same sample at every grid point.
    pub fn constant(i: AgentId, t: Vec<f64>, z_x: &[f64], z_u: &[f64], z_v: &[f64]) -> Self {
        let samples = t.len();
        Self {
            i,
            t0: t.first().copied().unwrap_or_default(),
            z_x: repeat_sample(z_x, samples),
            z_u: repeat_sample(z_u, samples),
            z_v: repeat_sample(z_v, samples),
            t,
        }
    }

    /// Per-sample dimension of `z_u`.
    pub fn nu(&self) -> usize {
        per_sample_len(&self.z_u, self.t.len().max(1))
    }

    /// Per-sample dimension of `z_v`.
    pub fn nv(&self) -> usize {
        per_sample_len(&self.z_v, self.t.len().max(1))
    }

    /// Returns `true` if the record has `samples` grid points and the given
    /// per-sample dimensions.
    pub fn has_shape(&self, samples: usize, nx: usize, nu: usize, nv: usize) -> bool {
        self.t.len() == samples
            && field_matches(&self.z_x, nx, samples)
            && field_matches(&self.z_u, nu, samples)
            && field_matches(&self.z_v, nv, samples)
            && is_strictly_increasing(&self.t)
    }

    /// Interpolates `z_u` at `time` into `out`.
    pub fn interpolate_z_u(&self, time: f64, out: &mut [f64]) {
        interpolate(&self.t, &self.z_u, time, out);
    }

    /// Interpolates `z_v` at `time` into `out`.
    pub fn interpolate_z_v(&self, time: f64, out: &mut [f64]) {
        interpolate(&self.t, &self.z_v, time, out);
    }

    /// Moves the horizon forward by `dt`, dropping the first sample.
    pub fn shift(&mut self, dt: f64) {
        let samples = self.t.len().max(1);
        let (nx, nu, nv) = (
            per_sample_len(&self.z_x, samples),
            self.nu(),
            self.nv(),
        );
        shift_grid(&mut self.t0, &mut self.t, dt);
        shift_samples(&mut self.z_x, nx);
        shift_samples(&mut self.z_u, nu);
        shift_samples(&mut self.z_v, nv);
    }
}

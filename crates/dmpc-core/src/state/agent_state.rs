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

/// State, control and external-influence trajectories of one agent.
///
/// Used both for an agent's own prediction and for the copy of a neighbor held
/// by another agent. In a copy, `v` holds the external influence on the copied
/// agent coming from everyone except the holder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Agent the trajectories describe.
    pub i: AgentId,
    /// Start of the horizon.
    pub t0: f64,
    /// Sample times.
    pub t: Vec<f64>,
    /// States, `t.len() * nx` values.
    pub x: Vec<f64>,
    /// Controls, `t.len() * nu` values.
    pub u: Vec<f64>,
    /// External influence, `t.len() * nv` values (may be empty).
    pub v: Vec<f64>,
}

impl AgentState {
    /// Builds a record holding the same sample at every grid point.
    pub fn constant(i: AgentId, t: Vec<f64>, x: &[f64], u: &[f64], v: &[f64]) -> Self {
        let samples = t.len();
        Self {
            i,
            t0: t.first().copied().unwrap_or_default(),
            x: repeat_sample(x, samples),
            u: repeat_sample(u, samples),
            v: repeat_sample(v, samples),
            t,
        }
    }

    /// Number of samples on the grid.
    pub fn samples(&self) -> usize {
        self.t.len()
    }

    /// Per-sample state dimension.
    pub fn nx(&self) -> usize {
        per_sample_len(&self.x, self.samples().max(1))
    }

    /// Per-sample control dimension.
    pub fn nu(&self) -> usize {
        per_sample_len(&self.u, self.samples().max(1))
    }

    /// Per-sample external-influence dimension.
    pub fn nv(&self) -> usize {
        per_sample_len(&self.v, self.samples().max(1))
    }

    /// Returns `true` if the record has `samples` grid points and the given
    /// per-sample dimensions.
    pub fn has_shape(&self, samples: usize, nx: usize, nu: usize, nv: usize) -> bool {
        self.t.len() == samples
            && field_matches(&self.x, nx, samples)
            && field_matches(&self.u, nu, samples)
            && field_matches(&self.v, nv, samples)
            && is_strictly_increasing(&self.t)
    }

    /// State sample `k`.
    pub fn x_at(&self, k: usize) -> &[f64] {
        let nx = self.nx();
        &self.x[k * nx..(k + 1) * nx]
    }

    /// Control sample `k`.
    pub fn u_at(&self, k: usize) -> &[f64] {
        let nu = self.nu();
        &self.u[k * nu..(k + 1) * nu]
    }

    /// Interpolates the state at `time` into `out`.
    pub fn interpolate_x(&self, time: f64, out: &mut [f64]) {
        interpolate(&self.t, &self.x, time, out);
    }

    /// Interpolates the control at `time` into `out`.
    pub fn interpolate_u(&self, time: f64, out: &mut [f64]) {
        interpolate(&self.t, &self.u, time, out);
    }

    /// Interpolates the external influence at `time` into `out`.
    pub fn interpolate_v(&self, time: f64, out: &mut [f64]) {
        interpolate(&self.t, &self.v, time, out);
    }

    /// Moves the horizon forward by `dt`, dropping the first sample.
    pub fn shift(&mut self, dt: f64) {
        let (nx, nu, nv) = (self.nx(), self.nu(), self.nv());
        shift_grid(&mut self.t0, &mut self.t, dt);
        shift_samples(&mut self.x, nx);
        shift_samples(&mut self.u, nu);
        shift_samples(&mut self.v, nv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_record_shape() {
        let state = AgentState::constant(AgentId(2), vec![0.0, 0.5, 1.0], &[1.0, 2.0], &[3.0], &[]);
        assert_eq!(state.samples(), 3);
        assert_eq!(state.nx(), 2);
        assert_eq!(state.nu(), 1);
        assert_eq!(state.nv(), 0);
        assert!(state.has_shape(3, 2, 1, 0));
        assert_eq!(state.x_at(2), &[1.0, 2.0]);
    }

    #[test]
    fn test_shift_moves_grid_and_samples() {
        let mut state = AgentState {
            i: AgentId(0),
            t0: 0.0,
            t: vec![0.0, 1.0, 2.0],
            x: vec![1.0, 2.0, 3.0],
            u: vec![4.0, 5.0, 6.0],
            v: vec![],
        };
        state.shift(1.0);
        assert_eq!(state.t0, 1.0);
        assert_eq!(state.t, vec![1.0, 2.0, 3.0]);
        assert_eq!(state.x, vec![2.0, 3.0, 3.0]);
        assert_eq!(state.u, vec![5.0, 6.0, 6.0]);
    }

    #[test]
    fn test_has_shape_rejects_unsorted_grid() {
        let state = AgentState::constant(AgentId(0), vec![0.0, 0.0], &[1.0], &[1.0], &[]);
        assert!(!state.has_shape(2, 1, 1, 0));
    }
}

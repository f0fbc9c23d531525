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

//! Time-sampled state records exchanged between agents.
//!
//! Every record carries the owning agent id, the horizon start `t0` and a
//! strictly increasing time grid `t`. Per-sample vectors are stored
//! sample-major in flat `Vec<f64>` fields. Records are plain values: they are
//! replaced wholesale when a newer version arrives from a neighbor.

mod agent_state;
mod coupling_state;
mod multiplier_state;
mod penalty_state;

pub use agent_state::AgentState;
pub use coupling_state::CouplingState;
pub use multiplier_state::MultiplierState;
pub use penalty_state::PenaltyState;

use crate::math::TIME_EPSILON;

/// Length of one sample of a sample-major field holding `samples` samples.
pub(crate) fn per_sample_len(values: &[f64], samples: usize) -> usize {
    if samples == 0 {
        0
    } else {
        values.len() / samples
    }
}

/// Returns `true` if `t` is strictly increasing.
pub fn is_strictly_increasing(t: &[f64]) -> bool {
    t.windows(2).all(|w| w[1] - w[0] > TIME_EPSILON)
}

/// Repeats `sample` once per grid point.
pub(crate) fn repeat_sample(sample: &[f64], samples: usize) -> Vec<f64> {
    let mut values = Vec::with_capacity(sample.len() * samples);
    for _ in 0..samples {
        values.extend_from_slice(sample);
    }
    values
}

/// Checks that a sample-major field matches the grid.
pub(crate) fn field_matches(values: &[f64], dim: usize, samples: usize) -> bool {
    values.len() == dim * samples
}

/// Advances a grid by `dt`.
pub(crate) fn shift_grid(t0: &mut f64, t: &mut [f64], dt: f64) {
    *t0 += dt;
    for tk in t.iter_mut() {
        *tk += dt;
    }
}

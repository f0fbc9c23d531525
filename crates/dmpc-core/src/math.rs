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

//! Small numeric helpers on flat `f64` slices.
//!
//! Trajectories are stored sample-major: sample `k` of a record with per-sample
//! dimension `n` lives at `values[k * n..(k + 1) * n]`.

/// Tolerance below which two sample times are treated as identical.
pub const TIME_EPSILON: f64 = 1e-12;

/// Returns the infinity norm of `values` (0.0 for an empty slice).
pub fn norm_inf(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

/// Adds `scale * src` to `out`, element by element.
///
/// # Panics
/// Panics if the slices differ in length.
pub fn add_scaled(out: &mut [f64], src: &[f64], scale: f64) {
    assert_eq!(out.len(), src.len(), "add_scaled: length mismatch");
    for (o, s) in out.iter_mut().zip(src) {
        *o += scale * s;
    }
}

/// Dot product of two slices of equal length.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// One augmented-Lagrangian consensus term `mu * r + rho / 2 * r^2`.
#[inline]
pub fn augmented_term(mu: f64, rho: f64, residual: f64) -> f64 {
    mu * residual + 0.5 * rho * residual * residual
}

/// Derivative of [`augmented_term`] with respect to the residual.
#[inline]
pub fn augmented_slope(mu: f64, rho: f64, residual: f64) -> f64 {
    mu + rho * residual
}

/// Builds the uniform sample grid `t0, t0 + dt, ..., t0 + (n - 1) * dt`.
pub fn uniform_grid(t0: f64, dt: f64, n: usize) -> Vec<f64> {
    (0..n).map(|k| t0 + k as f64 * dt).collect()
}

/// Linearly interpolates a sample-major trajectory at `time`.
///
/// The per-sample dimension is `out.len()`. Times outside the grid clamp to the
/// first or last sample, and a single-sample trajectory is treated as constant.
/// An empty grid writes zeros.
pub fn interpolate(t: &[f64], values: &[f64], time: f64, out: &mut [f64]) {
    let dim = out.len();
    if dim == 0 {
        return;
    }
    if t.is_empty() || values.len() < dim {
        out.fill(0.0);
        return;
    }
    let samples = t.len().min(values.len() / dim);
    let sample = |k: usize| &values[k * dim..(k + 1) * dim];

    if samples == 1 || time <= t[0] {
        out.copy_from_slice(sample(0));
        return;
    }
    let last = samples - 1;
    if time >= t[last] {
        out.copy_from_slice(sample(last));
        return;
    }

    // First sample strictly after `time`; the guards above keep it in 1..=last.
    let hi = t[..samples].partition_point(|&tk| tk <= time).clamp(1, last);
    let lo = hi - 1;
    let span = t[hi] - t[lo];
    let w = if span.abs() < TIME_EPSILON {
        0.0
    } else {
        (time - t[lo]) / span
    };
    for ((o, a), b) in out.iter_mut().zip(sample(lo)).zip(sample(hi)) {
        *o = a + w * (b - a);
    }
}

/// Shifts a sample-major trajectory one sample towards the front, repeating the
/// last sample. Used to warm-start the next horizon.
pub fn shift_samples(values: &mut [f64], dim: usize) {
    if dim == 0 || values.len() <= dim {
        return;
    }
    values.copy_within(dim.., 0);
    let n = values.len();
    values.copy_within(n - 2 * dim..n - dim, n - dim);
}

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

//! Ready-made agent and coupling models.

mod linear;
mod smart_grid;

pub use linear::{LinearAgentModel, LinearCouplingModel};
pub use smart_grid::{SmartGridAgentModel, SmartGridCouplingModel};

/// `out += M v` for a row-major `rows × cols` matrix.
pub(crate) fn add_mat_vec(out: &mut [f64], m: &[f64], rows: usize, cols: usize, v: &[f64]) {
    for r in 0..rows {
        let row = &m[r * cols..(r + 1) * cols];
        out[r] += row.iter().zip(v).map(|(a, b)| a * b).sum::<f64>();
    }
}

/// `out += Mᵀ v` for a row-major `rows × cols` matrix.
pub(crate) fn add_mat_t_vec(out: &mut [f64], m: &[f64], rows: usize, cols: usize, v: &[f64]) {
    for r in 0..rows {
        let row = &m[r * cols..(r + 1) * cols];
        for (o, a) in out.iter_mut().zip(row) {
            *o += a * v[r];
        }
    }
}

/// `Σ w_k (a_k - b_k)²`.
pub(crate) fn weighted_distance(w: &[f64], a: &[f64], b: &[f64]) -> f64 {
    w.iter()
        .zip(a.iter().zip(b))
        .map(|(w, (a, b))| w * (a - b) * (a - b))
        .sum()
}

/// `out += 2 w ⊙ (a - b)`.
pub(crate) fn add_weighted_distance_grad(out: &mut [f64], w: &[f64], a: &[f64], b: &[f64]) {
    for (o, (w, (a, b))) in out.iter_mut().zip(w.iter().zip(a.iter().zip(b))) {
        *o += 2.0 * w * (a - b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mat_vec_and_transpose() {
        // [[1, 2, 3], [4, 5, 6]]
        let m = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut out = [0.0; 2];
        add_mat_vec(&mut out, &m, 2, 3, &[1.0, 0.0, -1.0]);
        assert_eq!(out, [-2.0, -2.0]);

        let mut out = [0.0; 3];
        add_mat_t_vec(&mut out, &m, 2, 3, &[1.0, 1.0]);
        assert_eq!(out, [5.0, 7.0, 9.0]);
    }
}

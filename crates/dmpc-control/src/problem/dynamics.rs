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

//! Extended dynamics: own model, sending couplings, approximated neighbors.

use super::LocalProblem;

impl LocalProblem<'_> {
    pub(super) fn add_dynamics(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64]) {
        let (nx_i, nu_i) = (self.nx_i(), self.nu_i());
        let (xi, ui) = (&x[..nx_i], &u[..nu_i]);

        self.agent.model.ffct(&mut out[..nx_i], t, xi, ui);

        for (nb, block) in self.pairs() {
            if let Some(model) = nb.relation.coupling_model() {
                model.ffct(&mut out[..nx_i], t, xi, ui, block.x_of(x), block.u_of(u));
            }
            if let Some(approximation) = &nb.approximation {
                approximation.ffct(out, t, x, u, &self.context(nb));
            }
        }
    }

    pub(super) fn add_dynamics_dx(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]) {
        let (nx_i, nu_i) = (self.nx_i(), self.nu_i());
        let (xi, ui, lambda_i) = (&x[..nx_i], &u[..nu_i], &vec[..nx_i]);

        self.agent.model.dfdx_vec(&mut out[..nx_i], t, xi, ui, lambda_i);

        for (nb, block) in self.pairs() {
            let (xj, uj) = (block.x_of(x), block.u_of(u));
            if let Some(model) = nb.relation.coupling_model() {
                model.dfdxi_vec(&mut out[..nx_i], t, xi, ui, xj, uj, lambda_i);
                model.dfdxj_vec(block.x_of_mut(out), t, xi, ui, xj, uj, lambda_i);
            }
            if let Some(approximation) = &nb.approximation {
                approximation.dfdx_vec(out, t, x, u, vec, &self.context(nb));
            }
        }
    }

    pub(super) fn add_dynamics_du(&self, out: &mut [f64], t: f64, x: &[f64], u: &[f64], vec: &[f64]) {
        let (nx_i, nu_i) = (self.nx_i(), self.nu_i());
        let (xi, ui, lambda_i) = (&x[..nx_i], &u[..nu_i], &vec[..nx_i]);

        self.agent.model.dfdu_vec(&mut out[..nu_i], t, xi, ui, lambda_i);

        for (nb, block) in self.pairs() {
            let (xj, uj) = (block.x_of(x), block.u_of(u));
            if let Some(model) = nb.relation.coupling_model() {
                model.dfdui_vec(&mut out[..nu_i], t, xi, ui, xj, uj, lambda_i);
                model.dfduj_vec(block.u_of_mut(out), t, xi, ui, xj, uj, lambda_i);
            }
            if let Some(approximation) = &nb.approximation {
                approximation.dfdu_vec(out, t, x, u, vec, &self.context(nb));
            }
        }
    }
}

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

//! Swing-equation model of a power grid node.
//!
//! Each node has state `x = [θ, ω]` (phase angle and frequency deviation)
//! and one control `u`, the power injected by a controllable source.

use dmpc_core::error::ConfigError;
use dmpc_core::model::{AgentModel, CouplingModel};

use super::{add_weighted_distance_grad, weighted_distance};

fn expect_len(name: &'static str, values: &[f64], expected: usize) -> Result<(), ConfigError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(ConfigError::InvalidOption {
            name,
            reason: format!("expected {expected} values, got {}", values.len()),
        })
    }
}

/// A generator or consumer node.
///
/// `θ̇ = ω` and `I Ω ω̇ = -2κΩ ω + P0 - p + u`, written as
/// `ω̇ = -(2κ / I) ω + (P0 - p + u) / (I Ω)`.
#[derive(Debug, Clone)]
pub struct SmartGridAgentModel {
    name: String,
    load: f64,
    generation: f64,
    inertia: f64,
    frequency: f64,
    damping: f64,
    p: [f64; 2],
    q: [f64; 2],
    r: [f64; 1],
}

impl SmartGridAgentModel {
    /// `model` is `[p, P0, I, Ω, κ]`, `cost` is `[P0, P1, Q0, Q1, R0]`.
    pub fn new(model: &[f64], cost: &[f64], name: impl Into<String>) -> Result<Self, ConfigError> {
        expect_len("smart grid model parameters", model, 5)?;
        expect_len("smart grid cost parameters", cost, 5)?;
        if model[2] <= 0.0 || model[3] <= 0.0 {
            return Err(ConfigError::InvalidOption {
                name: "smart grid model parameters",
                reason: "inertia and nominal frequency must be positive".to_string(),
            });
        }
        Ok(Self {
            name: name.into(),
            load: model[0],
            generation: model[1],
            inertia: model[2],
            frequency: model[3],
            damping: model[4],
            p: [cost[0], cost[1]],
            q: [cost[2], cost[3]],
            r: [cost[4]],
        })
    }

    fn control_gain(&self) -> f64 {
        1.0 / (self.inertia * self.frequency)
    }
}

impl AgentModel for SmartGridAgentModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn nx(&self) -> usize {
        2
    }

    fn nu(&self) -> usize {
        1
    }

    fn ffct(&self, out: &mut [f64], _t: f64, x: &[f64], u: &[f64]) {
        out[0] += x[1];
        out[1] += -2.0 * self.damping / self.inertia * x[1]
            + (self.generation - self.load + u[0]) * self.control_gain();
    }

    fn dfdx_vec(&self, out: &mut [f64], _t: f64, _x: &[f64], _u: &[f64], vec: &[f64]) {
        out[1] += vec[0] - 2.0 * self.damping / self.inertia * vec[1];
    }

    fn dfdu_vec(&self, out: &mut [f64], _t: f64, _x: &[f64], _u: &[f64], vec: &[f64]) {
        out[0] += self.control_gain() * vec[1];
    }

    fn lfct(&self, _t: f64, x: &[f64], u: &[f64], xdes: &[f64], udes: &[f64]) -> f64 {
        weighted_distance(&self.q, x, xdes) + weighted_distance(&self.r, u, udes)
    }

    fn dldx(&self, out: &mut [f64], _t: f64, x: &[f64], _u: &[f64], xdes: &[f64], _udes: &[f64]) {
        add_weighted_distance_grad(out, &self.q, x, xdes);
    }

    fn dldu(&self, out: &mut [f64], _t: f64, _x: &[f64], u: &[f64], _xdes: &[f64], udes: &[f64]) {
        add_weighted_distance_grad(out, &self.r, u, udes);
    }

    fn vfct(&self, _t: f64, x: &[f64], xdes: &[f64]) -> f64 {
        weighted_distance(&self.p, x, xdes)
    }

    fn dvdx(&self, out: &mut [f64], _t: f64, x: &[f64], xdes: &[f64]) {
        add_weighted_distance_grad(out, &self.p, x, xdes);
    }
}

/// Power flow over a transmission line between nodes `j` and `i`:
/// `ω̇_i += P_max / (I Ω) · sin(θ_j - θ_i)`.
///
/// With a line capacity `F` the flow is bounded by `|P_max sin(θ_j - θ_i)| <= F`.
#[derive(Debug, Clone)]
pub struct SmartGridCouplingModel {
    max_power: f64,
    inertia: f64,
    frequency: f64,
    capacity: Option<f64>,
}

impl SmartGridCouplingModel {
    /// `params` is `[P_max, I, Ω]` where `I` and `Ω` belong to the receiving node.
    pub fn new(params: &[f64]) -> Result<Self, ConfigError> {
        expect_len("smart grid coupling parameters", params, 3)?;
        if params[1] <= 0.0 || params[2] <= 0.0 {
            return Err(ConfigError::InvalidOption {
                name: "smart grid coupling parameters",
                reason: "inertia and nominal frequency must be positive".to_string(),
            });
        }
        Ok(Self {
            max_power: params[0],
            inertia: params[1],
            frequency: params[2],
            capacity: None,
        })
    }

    /// Adds the line capacity constraint.
    pub fn with_line_capacity(mut self, capacity: f64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    fn gain(&self) -> f64 {
        self.max_power / (self.inertia * self.frequency)
    }
}

impl CouplingModel for SmartGridCouplingModel {
    fn name(&self) -> &str {
        "power line"
    }

    fn nh(&self) -> usize {
        if self.capacity.is_some() { 2 } else { 0 }
    }

    fn ffct(&self, out: &mut [f64], _t: f64, xi: &[f64], _ui: &[f64], xj: &[f64], _uj: &[f64]) {
        out[1] += self.gain() * (xj[0] - xi[0]).sin();
    }

    fn dfdxi_vec(&self, out: &mut [f64], _t: f64, xi: &[f64], _ui: &[f64], xj: &[f64], _uj: &[f64], vec: &[f64]) {
        out[0] -= self.gain() * (xj[0] - xi[0]).cos() * vec[1];
    }

    fn dfdui_vec(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], _vec: &[f64]) {}

    fn dfdxj_vec(&self, out: &mut [f64], _t: f64, xi: &[f64], _ui: &[f64], xj: &[f64], _uj: &[f64], vec: &[f64]) {
        out[0] += self.gain() * (xj[0] - xi[0]).cos() * vec[1];
    }

    fn dfduj_vec(&self, _out: &mut [f64], _t: f64, _xi: &[f64], _ui: &[f64], _xj: &[f64], _uj: &[f64], _vec: &[f64]) {}

    fn hfct(&self, out: &mut [f64], _t: f64, xi: &[f64], _ui: &[f64], xj: &[f64], _uj: &[f64]) {
        let Some(capacity) = self.capacity else {
            return;
        };
        let flow = self.max_power * (xj[0] - xi[0]).sin();
        out[0] += flow - capacity;
        out[1] += -flow - capacity;
    }

    fn dhdxi_vec(&self, out: &mut [f64], _t: f64, xi: &[f64], _ui: &[f64], xj: &[f64], _uj: &[f64], vec: &[f64]) {
        if self.capacity.is_some() {
            let slope = self.max_power * (xj[0] - xi[0]).cos();
            out[0] += -slope * (vec[0] - vec[1]);
        }
    }

    fn dhdxj_vec(&self, out: &mut [f64], _t: f64, xi: &[f64], _ui: &[f64], xj: &[f64], _uj: &[f64], vec: &[f64]) {
        if self.capacity.is_some() {
            let slope = self.max_power * (xj[0] - xi[0]).cos();
            out[0] += slope * (vec[0] - vec[1]);
        }
    }
}

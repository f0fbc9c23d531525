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

//! Options of the local solver and the ADMM loop.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::ApproximationMode;
use crate::error::ConfigError;

/// All tunables of a distributed MPC run.
///
/// Missing fields in a RON file fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationInfo {
    /// Prediction horizon length `T`.
    pub horizon: f64,
    /// Number of samples `N` on the horizon, endpoints included.
    pub horizon_steps: usize,
    /// Warm-start the next horizon with the shifted previous solution.
    pub shift_control: bool,

    /// Iteration cap of the local gradient solver.
    pub max_gradient_iterations: usize,
    /// Gradient infinity-norm below which a local solve has converged.
    pub gradient_tolerance: f64,
    /// First step tried by the line search.
    pub line_search_init: f64,
    /// Step below which the line search gives up.
    pub line_search_min: f64,
    /// Weight of the quadratic constraint penalty in the local cost.
    pub constraint_penalty: f64,

    /// Iteration cap of the ADMM loop.
    pub admm_max_iterations: usize,
    /// Primal residual tolerance.
    pub admm_primal_tolerance: f64,
    /// Dual residual tolerance.
    pub admm_dual_tolerance: f64,
    /// Initial penalty parameter.
    pub admm_penalty_init: f64,
    /// Lower bound of every penalty parameter.
    pub admm_penalty_min: f64,
    /// Upper bound of every penalty parameter.
    pub admm_penalty_max: f64,
    /// Factor applied when the primal residual dominates.
    pub admm_penalty_increase_factor: f64,
    /// Factor divided out when the dual residual dominates.
    pub admm_penalty_decrease_factor: f64,
    /// Ratio between the residuals that triggers an adaptation.
    pub admm_residual_ratio: f64,
    /// Enables residual-balancing penalty adaptation.
    pub admm_adapt_penalty: bool,
    /// Consecutive local solve failures tolerated before an agent is failed.
    pub admm_max_solve_failures: usize,

    /// Fold neighbor costs into the local problem.
    pub approximate_cost: bool,
    /// Fold neighbor constraints into the local problem.
    pub approximate_constraints: bool,

    /// Exchange timeout in milliseconds.
    pub exchange_timeout: u64,
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for OptimizationInfo {
    fn default() -> Self {
        Self {
            horizon: 1.0,
            horizon_steps: 11,
            shift_control: true,
            max_gradient_iterations: 500,
            gradient_tolerance: 1e-8,
            line_search_init: 1.0,
            line_search_min: 1e-12,
            constraint_penalty: 100.0,
            admm_max_iterations: 200,
            admm_primal_tolerance: 1e-3,
            admm_dual_tolerance: 1e-3,
            admm_penalty_init: 1.0,
            admm_penalty_min: 1e-3,
            admm_penalty_max: 1e3,
            admm_penalty_increase_factor: 1.5,
            admm_penalty_decrease_factor: 1.5,
            admm_residual_ratio: 10.0,
            admm_adapt_penalty: true,
            admm_max_solve_failures: 3,
            approximate_cost: false,
            approximate_constraints: false,
            exchange_timeout: 5_000,
            log_filter: "info".to_string(),
        }
    }
}

impl OptimizationInfo {
    /// Parses options from RON text and validates them.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let info: Self = ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        info.validate()?;
        Ok(info)
    }

    /// Reads options from a RON file and validates them.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_ron_str(&text)
    }

    /// Serializes the options as pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Sampling interval `T / (N - 1)`.
    pub fn step_size(&self) -> f64 {
        self.horizon / (self.horizon_steps.max(2) - 1) as f64
    }

    /// Exchange timeout as a [`Duration`].
    pub fn exchange_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout)
    }

    /// Approximation flags derived from the options.
    pub fn approximation(&self) -> ApproximationMode {
        ApproximationMode {
            cost: self.approximate_cost,
            constraints: self.approximate_constraints,
        }
    }

    /// Checks every option for range errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("horizon", self.horizon)?;
        if self.horizon_steps < 2 {
            return Err(invalid("horizon_steps", "needs at least two samples"));
        }
        if self.max_gradient_iterations == 0 {
            return Err(invalid("max_gradient_iterations", "must be at least 1"));
        }
        positive("gradient_tolerance", self.gradient_tolerance)?;
        positive("line_search_init", self.line_search_init)?;
        positive("line_search_min", self.line_search_min)?;
        if self.line_search_min > self.line_search_init {
            return Err(invalid("line_search_min", "exceeds line_search_init"));
        }
        if !(self.constraint_penalty >= 0.0 && self.constraint_penalty.is_finite()) {
            return Err(invalid("constraint_penalty", "must be finite and non-negative"));
        }
        if self.admm_max_iterations == 0 {
            return Err(invalid("admm_max_iterations", "must be at least 1"));
        }
        positive("admm_primal_tolerance", self.admm_primal_tolerance)?;
        positive("admm_dual_tolerance", self.admm_dual_tolerance)?;
        positive("admm_penalty_min", self.admm_penalty_min)?;
        positive("admm_penalty_max", self.admm_penalty_max)?;
        if !(self.admm_penalty_min..=self.admm_penalty_max).contains(&self.admm_penalty_init) {
            return Err(invalid(
                "admm_penalty_init",
                "must lie within [admm_penalty_min, admm_penalty_max]",
            ));
        }
        if !(self.admm_penalty_increase_factor > 1.0) {
            return Err(invalid("admm_penalty_increase_factor", "must exceed 1"));
        }
        if !(self.admm_penalty_decrease_factor > 1.0) {
            return Err(invalid("admm_penalty_decrease_factor", "must exceed 1"));
        }
        if !(self.admm_residual_ratio >= 1.0) {
            return Err(invalid("admm_residual_ratio", "must be at least 1"));
        }
        if self.exchange_timeout == 0 {
            return Err(invalid("exchange_timeout", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidOption {
        name,
        reason: reason.to_string(),
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid(name, "must be finite and positive"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_is_valid() {
        let info = OptimizationInfo::default();
        assert!(info.validate().is_ok());
        assert_relative_eq!(info.step_size(), 0.1);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let info = OptimizationInfo::from_ron_str("(horizon: 2.0, horizon_steps: 21)").unwrap();
        assert_relative_eq!(info.step_size(), 0.1);
        assert_eq!(info.admm_max_iterations, 200);
    }

    #[test]
    fn test_ron_round_trip() {
        let mut info = OptimizationInfo::default();
        info.approximate_cost = true;
        let text = info.to_ron_string().unwrap();
        assert_eq!(OptimizationInfo::from_ron_str(&text).unwrap(), info);
    }

    #[test]
    fn test_rejects_penalty_outside_bounds() {
        let info = OptimizationInfo {
            admm_penalty_init: 1e4,
            ..Default::default()
        };
        assert!(matches!(
            info.validate(),
            Err(ConfigError::InvalidOption {
                name: "admm_penalty_init",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_single_sample_horizon() {
        let info = OptimizationInfo {
            horizon_steps: 1,
            ..Default::default()
        };
        assert!(info.validate().is_err());
    }
}

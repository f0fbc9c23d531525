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

//! Results of an ADMM run and of a closed-loop simulation.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use dmpc_core::agent::AgentId;
use dmpc_core::state::AgentState;
use dmpc_telemetry::{ConvergenceSummary, PhaseTimings};
use serde::Serialize;

/// How an agent's last ADMM run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolutionStatus {
    /// Both residuals fell below tolerance.
    Converged,
    /// The iteration cap was reached first.
    MaxIterations,
    /// Too many consecutive local solve failures.
    Failed,
}

/// Per-agent outcome of the last ADMM run plus its closed-loop history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    /// Agent the solution belongs to.
    pub agent: AgentId,
    /// Predicted trajectory over the last horizon.
    pub trajectory: AgentState,
    /// Applied states and controls, one sample per closed-loop step.
    pub closed_loop: AgentState,
    /// Final primal residual.
    pub primal_residual: f64,
    /// Final dual residual.
    pub dual_residual: f64,
    /// ADMM iterations of the last run.
    pub iterations: usize,
    /// Local solve failures since registration.
    pub solve_failures: usize,
    /// Cost of the last local solve.
    pub cost: f64,
    /// Outcome of the last run.
    pub status: SolutionStatus,
}

impl Solution {
    /// Appends one applied sample to the closed-loop history.
    pub fn push_closed_loop(&mut self, t: f64, x: &[f64], u: &[f64]) {
        let history = &mut self.closed_loop;
        if history.t.is_empty() {
            history.t0 = t;
        }
        history.t.push(t);
        history.x.extend_from_slice(x);
        history.u.extend_from_slice(u);
    }

    /// Keeps only the latest `samples` closed-loop samples.
    pub fn cap_stored_data(&mut self, samples: usize) {
        let history = &mut self.closed_loop;
        let stored = history.t.len();
        if stored <= samples {
            return;
        }
        let (nx, nu) = (history.nx(), history.nu());
        let drop = stored - samples;
        history.t.drain(..drop);
        history.x.drain(..drop * nx);
        history.u.drain(..drop * nu);
        history.t0 = history.t.first().copied().unwrap_or(history.t0);
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Outcome of one distributed solve over all agents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolveSummary {
    /// Horizon start.
    pub t0: f64,
    /// ADMM iterations performed.
    pub iterations: usize,
    /// Whether every agent converged.
    pub converged: bool,
    /// Wall-clock time per phase.
    pub timings: PhaseTimings,
    /// Residual history of the run.
    pub convergence: ConvergenceSummary,
}

/// Writes `solution` as JSON to `<prefix>agent_<id>.json` and returns the path.
pub fn write_solution(solution: &Solution, prefix: &str) -> anyhow::Result<PathBuf> {
    let path = PathBuf::from(format!("{prefix}agent_{}.json", solution.agent));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = solution.to_json().context("serializing solution")?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    log::info!("Solution: wrote agent {} to {}", solution.agent, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solution() -> Solution {
        Solution {
            agent: AgentId(4),
            trajectory: AgentState::default(),
            closed_loop: AgentState {
                i: AgentId(4),
                ..AgentState::default()
            },
            primal_residual: 1e-4,
            dual_residual: 2e-4,
            iterations: 12,
            solve_failures: 0,
            cost: 0.5,
            status: SolutionStatus::Converged,
        }
    }

    #[test]
    fn test_cap_stored_data_keeps_latest_samples() {
        let mut solution = solution();
        for k in 0..5 {
            let t = k as f64 * 0.1;
            solution.push_closed_loop(t, &[k as f64, -(k as f64)], &[0.5 * k as f64]);
        }
        solution.cap_stored_data(2);

        let history = &solution.closed_loop;
        assert_eq!(history.t.len(), 2);
        assert!((history.t0 - 0.3).abs() < 1e-12);
        assert_eq!(history.x, vec![3.0, -3.0, 4.0, -4.0]);
        assert_eq!(history.u, vec![1.5, 2.0]);
    }

    #[test]
    fn test_solution_serializes_status() {
        let json = solution().to_json().unwrap();
        assert!(json.contains("\"status\": \"Converged\""));
        assert!(json.contains("\"iterations\": 12"));
    }
}

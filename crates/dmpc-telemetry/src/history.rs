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

//! Rolling and whole-run records of ADMM residuals.

use std::collections::BTreeMap;

use dmpc_core::agent::AgentId;
use serde::Serialize;

/// Number of iterations kept per agent for trend analysis.
pub const WINDOW: usize = 32;

/// A fixed-size circular buffer for storing numerical samples.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    data: [T; N],
    index: usize,
    count: usize,
}

impl<T: Default + Copy, const N: usize> RingBuffer<T, N> {
    /// Creates a new, empty ring buffer.
    pub fn new() -> Self {
        Self {
            data: [T::default(); N],
            index: 0,
            count: 0,
        }
    }

    /// Pushes a new value into the buffer, overwriting the oldest if full.
    pub fn push(&mut self, value: T) {
        self.data[self.index] = value;
        self.index = (self.index + 1) % N;
        if self.count < N {
            self.count += 1;
        }
    }

    /// Returns the number of elements currently in the buffer.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Most recent value.
    pub fn latest(&self) -> Option<T> {
        (self.count > 0).then(|| self.data[(self.index + N - 1) % N])
    }

    /// Returns an iterator over the values in chronological order (oldest to newest).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (left, right) = self.data.split_at(self.index);
        let skip = if self.count < N { right.len() } else { 0 };
        right[skip..].iter().chain(left.iter())
    }
}

impl<T: Default + Copy, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<f64, N> {
    /// Arithmetic mean, `0.0` when empty.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.iter().sum::<f64>() / self.count as f64
    }

    /// Difference between the mean of the newer and the older half.
    /// Negative while the values decrease.
    pub fn trend(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let half = self.count / 2;
        let first: f64 = self.iter().take(half).sum::<f64>() / half as f64;
        let last: f64 = self.iter().skip(self.count - half).sum::<f64>() / half as f64;
        last - first
    }
}

#[derive(Debug, Clone, Default)]
struct AgentTrack {
    primal: RingBuffer<f64, WINDOW>,
    dual: RingBuffer<f64, WINDOW>,
    iterations: usize,
}

/// Per-agent statistics over the most recent iterations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgentSummary {
    /// Iterations recorded for the agent.
    pub iterations: usize,
    /// Last primal residual.
    pub primal: f64,
    /// Last dual residual.
    pub dual: f64,
    /// Mean primal residual over the window.
    pub average_primal: f64,
    /// Mean dual residual over the window.
    pub average_dual: f64,
    /// Primal trend over the window, negative while improving.
    pub primal_trend: f64,
    /// Dual trend over the window, negative while improving.
    pub dual_trend: f64,
}

/// Whole-run view of the residuals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceSummary {
    /// ADMM iterations recorded.
    pub iterations: usize,
    /// Largest primal residual over all agents, per iteration.
    pub primal: Vec<f64>,
    /// Largest dual residual over all agents, per iteration.
    pub dual: Vec<f64>,
    /// Per-agent statistics.
    pub agents: BTreeMap<AgentId, AgentSummary>,
}

impl ConvergenceSummary {
    /// Pretty JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Collects residuals reported by every agent in every ADMM iteration.
#[derive(Debug, Clone, Default)]
pub struct ConvergenceHistory {
    agents: BTreeMap<AgentId, AgentTrack>,
    primal: Vec<f64>,
    dual: Vec<f64>,
}

impl ConvergenceHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the residuals of `agent` for `iteration` (1-based).
    pub fn record(&mut self, agent: AgentId, iteration: usize, primal: f64, dual: f64) {
        let track = self.agents.entry(agent).or_default();
        track.primal.push(primal);
        track.dual.push(dual);
        track.iterations = track.iterations.max(iteration);

        if iteration == 0 {
            return;
        }
        if self.primal.len() < iteration {
            self.primal.resize(iteration, 0.0);
            self.dual.resize(iteration, 0.0);
        }
        let k = iteration - 1;
        self.primal[k] = self.primal[k].max(primal);
        self.dual[k] = self.dual[k].max(dual);
    }

    /// Forgets everything, e.g. at the start of a new horizon.
    pub fn clear(&mut self) {
        self.agents.clear();
        self.primal.clear();
        self.dual.clear();
    }

    /// Number of iterations recorded.
    pub fn iterations(&self) -> usize {
        self.primal.len()
    }

    /// Whether neither residual of `agent` decreased over the window.
    pub fn is_stagnating(&self, agent: AgentId) -> bool {
        self.agents.get(&agent).is_some_and(|track| {
            track.primal.count() == WINDOW && track.primal.trend() >= 0.0 && track.dual.trend() >= 0.0
        })
    }

    /// Statistics of one agent.
    pub fn agent_summary(&self, agent: AgentId) -> Option<AgentSummary> {
        self.agents.get(&agent).map(|track| AgentSummary {
            iterations: track.iterations,
            primal: track.primal.latest().unwrap_or(f64::INFINITY),
            dual: track.dual.latest().unwrap_or(f64::INFINITY),
            average_primal: track.primal.average(),
            average_dual: track.dual.average(),
            primal_trend: track.primal.trend(),
            dual_trend: track.dual.trend(),
        })
    }

    /// Snapshot of the whole run.
    pub fn summary(&self) -> ConvergenceSummary {
        ConvergenceSummary {
            iterations: self.iterations(),
            primal: self.primal.clone(),
            dual: self.dual.clone(),
            agents: self
                .agents
                .keys()
                .filter_map(|id| self.agent_summary(*id).map(|s| (*id, s)))
                .collect(),
        }
    }

    /// Logs one line per agent at `info` level.
    pub fn log_summary(&self) {
        for (id, summary) in self.summary().agents {
            log::info!(
                "Convergence[agent {id}]: {} iterations, primal {:.3e}, dual {:.3e} (trend {:+.2e}/{:+.2e})",
                summary.iterations,
                summary.primal,
                summary.dual,
                summary.primal_trend,
                summary.dual_trend
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ring_buffer_chronological_order() {
        let mut buffer = RingBuffer::<f64, 3>::new();
        buffer.push(1.0);
        buffer.push(2.0);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0]);
        buffer.push(3.0);
        buffer.push(4.0);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(buffer.latest(), Some(4.0));
        assert_relative_eq!(buffer.average(), 3.0);
    }

    #[test]
    fn test_decreasing_residuals_have_negative_trend() {
        let mut buffer = RingBuffer::<f64, 8>::new();
        for k in 0..8 {
            buffer.push(1.0 / (k + 1) as f64);
        }
        assert!(buffer.trend() < 0.0);
    }

    #[test]
    fn test_history_keeps_worst_residual_per_iteration() {
        let mut history = ConvergenceHistory::new();
        history.record(AgentId(0), 1, 0.5, 0.1);
        history.record(AgentId(1), 1, 0.2, 0.3);
        history.record(AgentId(0), 2, 0.05, 0.01);

        let summary = history.summary();
        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.primal, vec![0.5, 0.05]);
        assert_eq!(summary.dual, vec![0.3, 0.01]);
        assert_eq!(summary.agents[&AgentId(0)].iterations, 2);
        assert_eq!(summary.agents[&AgentId(1)].primal, 0.2);
        assert!(summary.to_json().unwrap().contains("\"iterations\": 2"));
    }

    #[test]
    fn test_stagnation_needs_full_window() {
        let mut history = ConvergenceHistory::new();
        for k in 1..=WINDOW {
            history.record(AgentId(3), k, 1.0, 1.0);
        }
        assert!(history.is_stagnating(AgentId(3)));
        assert!(!history.is_stagnating(AgentId(4)));
    }
}

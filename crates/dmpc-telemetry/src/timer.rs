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

//! RAII wall-clock timers for the phases of an ADMM iteration.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Accumulated wall-clock time per phase of the ADMM loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PhaseTimings {
    /// Local optimal control solves.
    pub local_solve: Duration,
    /// Coupling-state updates.
    pub coupling_update: Duration,
    /// Multiplier and penalty updates.
    pub multiplier_update: Duration,
    /// Waiting on neighbor records.
    pub exchange: Duration,
}

impl PhaseTimings {
    /// Sum over all phases.
    pub fn total(&self) -> Duration {
        self.local_solve + self.coupling_update + self.multiplier_update + self.exchange
    }
}

/// Adds the time between its creation and its drop to a [`Duration`].
pub struct ScopedTimer<'a> {
    start: Instant,
    slot: &'a mut Duration,
}

impl<'a> ScopedTimer<'a> {
    /// Starts timing into `slot`.
    pub fn new(slot: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            slot,
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        *self.slot += self.start.elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_timer_accumulates() {
        let mut timings = PhaseTimings::default();
        {
            let _timer = ScopedTimer::new(&mut timings.exchange);
            std::thread::sleep(Duration::from_millis(2));
        }
        {
            let _timer = ScopedTimer::new(&mut timings.exchange);
        }
        assert!(timings.exchange >= Duration::from_millis(2));
        assert_eq!(timings.total(), timings.exchange);
    }
}

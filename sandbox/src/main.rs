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

//! Three power grid nodes on a ring, each controlled by its own agent.
//!
//! Run with: `cargo run -p sandbox -- --sim-time 2.0 --config sandbox/smart_grid.ron`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dmpc_sdk::load_options;
use dmpc_sdk::prelude::*;
use dmpc_telemetry::init_logging;

#[derive(Parser, Debug)]
#[command(version, about = "Distributed MPC of a three-node smart grid")]
struct Cli {
    /// RON file with optimization options; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated time in seconds.
    #[arg(long, default_value_t = 1.0)]
    sim_time: f64,

    /// Route all records through a coordinator instead of direct mailboxes.
    #[arg(long)]
    central: bool,

    /// Prefix of the written solution files.
    #[arg(long, default_value = "solutions/")]
    output: String,
}

/// `(load, generation)` per node; the total is balanced.
const NODES: [(f64, f64); 3] = [(1.0, 0.0), (0.0, 1.5), (0.5, 0.0)];

const INERTIA: f64 = 0.1;
const FREQUENCY: f64 = 100.0;
const DAMPING: f64 = 0.01;
const LINE_POWER: f64 = 10.0;

fn build_grid(dmpc: &mut Dmpc) -> Result<()> {
    for (k, (load, generation)) in NODES.into_iter().enumerate() {
        let model = SmartGridAgentModel::new(
            &[load, generation, INERTIA, FREQUENCY, DAMPING],
            &[1.0, 1.0, 1.0, 1.0, 0.1],
            format!("node {k}"),
        )?;
        let info = AgentInfo {
            id: AgentId(k),
            model: Arc::new(model),
        };
        dmpc.register_agent(info, &[0.0, 0.0], &[0.0])?;
        dmpc.set_desired_agent_state(AgentId(k), &[0.0, 0.0], &[0.0])?;
    }

    let line = Arc::new(SmartGridCouplingModel::new(&[LINE_POWER, INERTIA, FREQUENCY])?);
    for k in 0..NODES.len() {
        let next = (k + 1) % NODES.len();
        for (agent, neighbor) in [(k, next), (next, k)] {
            dmpc.register_coupling(CouplingInfo {
                agent: AgentId(agent),
                neighbor: AgentId(neighbor),
                model: line.clone(),
            })?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let info = match &cli.config {
        Some(path) => load_options(path)?,
        None => OptimizationInfo::default(),
    };
    init_logging(&info.log_filter);

    let mut dmpc = if cli.central {
        Dmpc::central(info)
    } else {
        Dmpc::local(info)
    };
    build_grid(&mut dmpc)?;

    let summaries = dmpc.run_dmpc(cli.sim_time, 0.0).await?;
    let converged = summaries.iter().filter(|s| s.converged).count();
    log::info!(
        "Sandbox: {} of {} horizons converged, {} ADMM iterations in total",
        converged,
        summaries.len(),
        summaries.iter().map(|s| s.iterations).sum::<usize>()
    );

    for id in dmpc.network().agent_ids() {
        dmpc.print_solution_to_file(id, &cli.output)?;
    }
    Ok(())
}

//! # cellsim-node
//!
//! Node binary: launches the configured devices, then executes
//! newline-delimited orchestrator commands from stdin. This is the bus
//! adapter a single-node deployment needs; multi-node deployments replace
//! the loopback orchestrator with the real cluster bus.

use cellsim_node::{CollabError, Command, CommandOutput, Node, NodeConfig, NodeError};
use clap::Parser;
use parking_lot::Mutex;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Mobile-device emulation node.
#[derive(Parser, Debug)]
#[command(name = "cellsim-node", version, about)]
struct Cli {
    /// Node configuration YAML (devices, access points, taps).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `cellsim_modem=debug`.
    #[arg(long, default_value = "info")]
    log_filter: String,
}

/// A bridge stand-in that only records reattachment requests in the log.
/// The real virtual-network plane is supplied by the surrounding platform.
struct LogBridge;

impl cellsim_node::Bridge for LogBridge {
    fn network_connect(
        &self,
        device: &str,
        iface: usize,
        bridge: &str,
        vlan: u32,
    ) -> Result<(), CollabError> {
        info!(
            "bridge: connect {}[{}] -> vlan {} on {}",
            device, iface, vlan, bridge
        );
        Ok(())
    }

    fn network_disconnect(&self, device: &str, iface: usize) -> Result<(), CollabError> {
        info!("bridge: disconnect {}[{}]", device, iface);
        Ok(())
    }
}

/// Single-node bus: a broadcast loops straight back into this node.
struct LoopbackOrchestrator {
    node: Mutex<Weak<Node>>,
}

impl LoopbackOrchestrator {
    fn new() -> Arc<Self> {
        Arc::new(LoopbackOrchestrator {
            node: Mutex::new(Weak::new()),
        })
    }

    fn bind(&self, node: &Arc<Node>) {
        *self.node.lock() = Arc::downgrade(node);
    }
}

impl cellsim_node::Orchestrator for LoopbackOrchestrator {
    fn broadcast(&self, command: &str) -> Result<(), CollabError> {
        let node = self
            .node
            .lock()
            .upgrade()
            .ok_or("node is gone")?;
        let cmd = cellsim_node::command::parse(command)?;
        node.execute(cmd)?;
        Ok(())
    }
}

fn main() -> Result<(), NodeError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let orchestrator = LoopbackOrchestrator::new();
    let node = Node::new(Arc::new(LogBridge), orchestrator.clone());
    orchestrator.bind(&node);

    if let Some(path) = &cli.config {
        let config = NodeConfig::load(path)?;
        for ap in &config.access_points {
            node.create_access_point(ap.to_access_point());
        }
        for tap in &config.taps {
            if let Err(err) = node.add_tap(tap.low, tap.high, &tap.path) {
                warn!("tap {}: {}", tap.path.display(), err);
            }
        }
        for device in &config.devices {
            let prefix = device.prefix.parse()?;
            match node.launch_device(&device.name, &device.instance_dir, prefix) {
                Ok(launched) => info!(
                    "device {} is number {}",
                    launched.name(),
                    launched.number()
                ),
                Err(err) => error!("launch {}: {}", device.name, err),
            }
        }
    }

    node.start_wander_loop();

    // The orchestrator bus: one command per line on stdin.
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match cellsim_node::command::parse(&line).and_then(|cmd: Command| node.execute(cmd)) {
            Ok(CommandOutput::Ok) => {}
            Ok(output) => print!("{output}"),
            Err(err) => eprintln!("error: {err}"),
        }
    }

    node.shutdown();
    Ok(())
}

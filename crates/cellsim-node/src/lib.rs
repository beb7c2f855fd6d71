//! # cellsim-node
//!
//! Per-node orchestration of emulated mobile devices.
//!
//! This crate assembles the protocol pieces into running devices and wires
//! them to the rest of the cluster:
//!
//! - [`Device`] binds a GSM modem, a Wi-Fi modem, and a GPS feed to one VM
//! - [`Node`] owns the process-wide registries (devices, access points,
//!   SMS taps, number counters), the propagation loop, and SMS routing
//! - [`command`] parses and executes the textual command surface the
//!   orchestrator bus delivers
//!
//! The surrounding platform supplies two collaborators: a [`Bridge`] that
//! can re-attach a device's virtual NIC to a (bridge, vlan) pair, and an
//! [`Orchestrator`] that broadcasts command strings to every node.

pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod node;
pub mod number;
pub mod tap;

pub use command::{Command, CommandOutput};
pub use config::NodeConfig;
pub use device::{Device, DeviceStreams, NetworkBinding};
pub use error::NodeError;
pub use node::Node;
pub use number::{Counter, NumberPrefix};
pub use tap::SmsTap;

/// Errors surfaced by the external collaborators.
pub type CollabError = Box<dyn std::error::Error + Send + Sync>;

/// The virtual-network plane: re-attaches device NICs to backing networks.
///
/// Implementations must be safe to call from the per-device SSID watcher
/// threads; the collaborator serializes its own bridge operations.
pub trait Bridge: Send + Sync {
    /// Attach interface `iface` of `device` to `vlan` on `bridge`.
    fn network_connect(
        &self,
        device: &str,
        iface: usize,
        bridge: &str,
        vlan: u32,
    ) -> Result<(), CollabError>;

    /// Detach interface `iface` of `device`.
    fn network_disconnect(&self, device: &str, iface: usize) -> Result<(), CollabError>;
}

/// The cluster bus: broadcasts a command string to every node.
pub trait Orchestrator: Send + Sync {
    /// Deliver `command` cluster-wide, including back to this node.
    fn broadcast(&self, command: &str) -> Result<(), CollabError>;
}

//! The per-node coordinator.
//!
//! One [`Node`] owns every process-wide registry: the device table, the
//! access-point registry, the SMS taps, and the per-prefix number counters.
//! All of it sits behind a single mutex; readers take snapshots, so no lock
//! is held across guest I/O.

use crate::device::Device;
use crate::error::NodeError;
use crate::number::{Counter, NumberPrefix};
use crate::tap::SmsTap;
use crate::{Bridge, Orchestrator};
use cellsim_radio::AccessPoint;
use gsm_sms::Message;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interval of the wander/visibility loop.
const WANDER_TICK: Duration = Duration::from_secs(1);

#[derive(Default)]
struct NodeState {
    devices: HashMap<String, Arc<Device>>,
    access_points: HashMap<String, AccessPoint>,
    taps: HashMap<PathBuf, Arc<SmsTap>>,
    counters: HashMap<NumberPrefix, Arc<Counter>>,
}

/// The coordinator owning this node's devices and registries.
pub struct Node {
    bridge: Arc<dyn Bridge>,
    orchestrator: Arc<dyn Orchestrator>,
    state: Mutex<NodeState>,
}

impl Node {
    /// Create a node wired to its external collaborators.
    pub fn new(bridge: Arc<dyn Bridge>, orchestrator: Arc<dyn Orchestrator>) -> Arc<Node> {
        Arc::new(Node {
            bridge,
            orchestrator,
            state: Mutex::new(NodeState::default()),
        })
    }

    /// Start the 1-second wander loop. It advances every moving device,
    /// then recomputes AP visibility globally; it exits when the node is
    /// dropped.
    pub fn start_wander_loop(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        thread::spawn(move || {
            let mut rng = rand::thread_rng();
            loop {
                let Some(node) = weak.upgrade() else {
                    debug!("wander loop exiting");
                    return;
                };
                let devices = node.devices();
                for device in devices {
                    if device.wander_tick(&mut rng) {
                        debug!(
                            "Device[{}]: moved to {:?}",
                            device.name(),
                            device.current_location()
                        );
                    }
                }
                node.update_visibility();
                drop(node);
                thread::sleep(WANDER_TICK);
            }
        });
    }

    // ========================================================================
    // Devices
    // ========================================================================

    /// Allocate a number from `prefix`, rejecting prefixes that overlap an
    /// already-registered block.
    pub fn allocate_number(&self, prefix: NumberPrefix) -> Result<i64, NodeError> {
        let mut state = self.state.lock();
        if !state.counters.contains_key(&prefix) {
            if let Some(existing) = state.counters.keys().find(|p| p.overlaps(&prefix)) {
                return Err(NodeError::OverlappingPrefixes(*existing, prefix));
            }
            state.counters.insert(prefix, Arc::new(Counter::new()));
        }
        let counter = state.counters[&prefix].clone();
        drop(state);
        prefix.next(&counter)
    }

    /// Launch a device against the guest sockets under `instance_dir` and
    /// register it.
    pub fn launch_device(
        &self,
        name: &str,
        instance_dir: &Path,
        prefix: NumberPrefix,
    ) -> Result<Arc<Device>, NodeError> {
        let number = self.allocate_number(prefix)?;
        let device = Device::launch(
            name,
            instance_dir,
            number,
            prefix,
            self.bridge.clone(),
            self.orchestrator.clone(),
        )?;
        self.register_device(device.clone());
        info!("launched device {} with number {}", name, number);
        Ok(device)
    }

    /// Register an externally assembled device (embedders that dial the
    /// guest sockets themselves).
    pub fn register_device(&self, device: Arc<Device>) {
        self.state
            .lock()
            .devices
            .insert(device.name().to_string(), device);
    }

    /// Close a device, detach its interface, and drop it from the table.
    pub fn close_device(&self, name: &str) -> Result<(), NodeError> {
        let device = self
            .state
            .lock()
            .devices
            .remove(name)
            .ok_or_else(|| NodeError::NoSuchDevice(name.to_string()))?;
        device.close();
        if let Err(err) = self.bridge.network_disconnect(name, 0) {
            warn!("Device[{}]: bridge detach failed: {}", name, err);
        }
        Ok(())
    }

    /// Close every device.
    pub fn shutdown(&self) {
        let devices = std::mem::take(&mut self.state.lock().devices);
        for device in devices.values() {
            device.close();
        }
    }

    /// Find a device by name.
    pub fn find_device(&self, name: &str) -> Result<Arc<Device>, NodeError> {
        self.state
            .lock()
            .devices
            .get(name)
            .cloned()
            .ok_or_else(|| NodeError::NoSuchDevice(name.to_string()))
    }

    /// Snapshot of every registered device.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.state.lock().devices.values().cloned().collect()
    }

    // ========================================================================
    // Access Points
    // ========================================================================

    /// Add (or replace) an access point and recompute visibility.
    pub fn create_access_point(&self, ap: AccessPoint) {
        info!(
            "access point {} -> vlan {} on {}",
            ap.ssid, ap.vlan, ap.bridge
        );
        self.state.lock().access_points.insert(ap.ssid.clone(), ap);
        self.update_visibility();
    }

    /// Remove an access point and recompute visibility.
    pub fn delete_access_point(&self, ssid: &str) -> Result<(), NodeError> {
        let removed = self.state.lock().access_points.remove(ssid);
        if removed.is_none() {
            return Err(NodeError::NoSuchAccessPoint(ssid.to_string()));
        }
        self.update_visibility();
        Ok(())
    }

    /// Snapshot of the AP registry, sorted by SSID for stable listings.
    pub fn access_points(&self) -> Vec<AccessPoint> {
        let mut aps: Vec<AccessPoint> = self.state.lock().access_points.values().cloned().collect();
        aps.sort_by(|a, b| a.ssid.cmp(&b.ssid));
        aps
    }

    /// Recompute which APs every running device can see and hand the
    /// results to its supplicant as fresh scan results.
    pub fn update_visibility(&self) {
        let (aps, devices) = {
            let state = self.state.lock();
            (
                state
                    .access_points
                    .values()
                    .cloned()
                    .collect::<Vec<AccessPoint>>(),
                state.devices.values().cloned().collect::<Vec<_>>(),
            )
        };
        for device in devices {
            if device.is_running() {
                device.update_visible(&aps);
            }
        }
    }

    // ========================================================================
    // SMS Taps
    // ========================================================================

    /// Create a tap over `[low, high]` appending to `path`.
    pub fn add_tap(&self, low: i64, high: i64, path: &Path) -> Result<(), NodeError> {
        let mut state = self.state.lock();
        if state.taps.contains_key(path) {
            return Err(NodeError::DuplicateTap(path.to_path_buf()));
        }
        let tap = SmsTap::create(low, high, path)?;
        state.taps.insert(path.to_path_buf(), Arc::new(tap));
        Ok(())
    }

    /// Delete the tap at `path`, or all taps when `path` is `None`.
    pub fn delete_tap(&self, path: Option<&Path>) {
        let mut state = self.state.lock();
        match path {
            Some(path) => {
                state.taps.remove(path);
            }
            None => state.taps.clear(),
        }
    }

    /// Snapshot of the tap registry.
    pub fn taps(&self) -> Vec<Arc<SmsTap>> {
        let mut taps: Vec<Arc<SmsTap>> = self.state.lock().taps.values().cloned().collect();
        taps.sort_by(|a, b| a.path().cmp(b.path()));
        taps
    }

    // ========================================================================
    // SMS Routing
    // ========================================================================

    /// Deliver a canonical-form message: push it to every local device whose
    /// number matches the destination, and append it to every tap whose
    /// range contains the destination.
    pub fn deliver(&self, msg: &Message) -> Result<(), NodeError> {
        let (devices, taps) = self.routing_snapshot();

        for device in devices {
            if device.number() == msg.dst {
                debug!("delivering SMS for {} to device {}", msg.dst, device.name());
                metrics::counter!("cellsim.sms.delivered").increment(1);
                device.modem().push_sms(msg.clone())?;
            }
        }

        for tap in taps {
            if tap.matches(msg.dst) {
                if let Err(err) = tap.record(msg) {
                    warn!("couldn't write to tap {}: {}", tap.path().display(), err);
                }
            }
        }
        Ok(())
    }

    /// Deliver a locally composed text to `to`, splitting it as needed.
    pub fn deliver_text(&self, to: i64, from: i64, text: &str) -> Result<(), NodeError> {
        let (devices, taps) = self.routing_snapshot();

        for device in devices {
            if device.number() == to {
                debug!("found {} at device {}", to, device.name());
                for msg in Message::split(from, to, text) {
                    metrics::counter!("cellsim.sms.delivered").increment(1);
                    device.modem().push_sms(msg)?;
                }
            }
        }

        for tap in taps {
            if tap.matches(to) {
                if let Err(err) = tap.record_plain(from, to, text) {
                    warn!("couldn't write to tap {}: {}", tap.path().display(), err);
                }
            }
        }
        Ok(())
    }

    /// Push a text straight to one named device, regardless of numbers.
    pub fn push_text(&self, vm: &str, from: i64, text: &str) -> Result<(), NodeError> {
        let device = self.find_device(vm)?;
        for msg in Message::split(from, device.number(), text) {
            device.modem().push_sms(msg)?;
        }
        Ok(())
    }

    /// Device names whose number matches `to`.
    pub fn lookup(&self, to: i64) -> Vec<String> {
        self.devices()
            .into_iter()
            .filter(|d| d.number() == to)
            .map(|d| d.name().to_string())
            .collect()
    }

    /// Clear SMS history on one device, or on all of them.
    pub fn clear_sms(&self, vm: Option<&str>) -> Result<(), NodeError> {
        match vm {
            Some(vm) => self.find_device(vm)?.modem().clear_history(),
            None => {
                for device in self.devices() {
                    device.modem().clear_history();
                }
            }
        }
        Ok(())
    }

    fn routing_snapshot(&self) -> (Vec<Arc<Device>>, Vec<Arc<SmsTap>>) {
        let state = self.state.lock();
        (
            state.devices.values().cloned().collect(),
            state.taps.values().cloned().collect(),
        )
    }

    // ========================================================================
    // GPS
    // ========================================================================

    /// Feed an NMEA sentence to a device and recompute visibility.
    pub fn push_gps(&self, vm: &str, sentence: &str) -> Result<(), NodeError> {
        self.find_device(vm)?.push_gps(sentence)?;
        self.update_visibility();
        Ok(())
    }

    /// Set a device's wander speed.
    pub fn set_wander_speed(&self, vm: &str, speed: f64) -> Result<(), NodeError> {
        self.find_device(vm)?.set_move_speed(speed);
        Ok(())
    }
}

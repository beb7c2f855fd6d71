//! Per-device assembly.
//!
//! A launched device owns the full guest-facing sensor plane: the GSM modem
//! on its radio serial port, the Wi-Fi modem on its supplicant sockets, and
//! the GPS feed. Four threads run per device: the modem command reader, the
//! postman draining the modem's outbound messages to the cluster, the Wi-Fi
//! control reader, and the SSID watcher that re-attaches the device's
//! virtual NIC when the supplicant picks a network.

use crate::error::NodeError;
use crate::number::NumberPrefix;
use crate::{Bridge, Orchestrator};
use cellsim_common::{nmea, Location};
use cellsim_modem::Modem;
use cellsim_radio::{visible_access_points, AccessPoint, UNIVERSAL_LEVEL_DBM};
use cellsim_wifi::{ApLevel, WifiModem};
use gsm_sms::Message;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

/// Guest socket names under the VM instance directory.
const GPS_SOCKET: &str = "serial0";
const MODEM_SOCKET: &str = "serial1";
const WIFI_CONTROL_SOCKET: &str = "virtio-serial0";
const WIFI_MONITOR_SOCKET: &str = "virtio-serial1";

/// The (vlan, bridge) pair an SSID maps to for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkBinding {
    /// VLAN id of the backing network.
    pub vlan: u32,
    /// Bridge carrying that VLAN.
    pub bridge: String,
}

/// The streams a device is wired to, for embedders that dial (or fake)
/// the guest sockets themselves.
pub struct DeviceStreams {
    /// Bidirectional modem AT stream.
    pub modem: UnixStream,
    /// Supplicant control stream.
    pub wifi_control: UnixStream,
    /// Supplicant monitor stream.
    pub wifi_monitor: UnixStream,
    /// GPS feed; only written.
    pub gps: UnixStream,
}

/// One emulated mobile device.
pub struct Device {
    name: String,
    number: i64,
    prefix: NumberPrefix,

    modem: Arc<Modem>,
    wifi: Arc<WifiModem>,
    gps: Mutex<BufWriter<UnixStream>>,

    origin: Mutex<Location>,
    current: Mutex<Location>,
    destination: Mutex<Location>,
    move_speed: Mutex<f64>,

    access_points: Arc<Mutex<HashMap<String, NetworkBinding>>>,
    running: AtomicBool,
}

impl Device {
    /// Dial the guest sockets under `instance_dir` and assemble a device.
    pub fn launch(
        name: &str,
        instance_dir: &Path,
        number: i64,
        prefix: NumberPrefix,
        bridge: Arc<dyn Bridge>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Result<Arc<Device>, NodeError> {
        let dial = |socket: &str| {
            let path = instance_dir.join(socket);
            UnixStream::connect(&path).map_err(|err| {
                NodeError::Io(std::io::Error::new(
                    err.kind(),
                    format!("dial {}: {err}", path.display()),
                ))
            })
        };

        let streams = DeviceStreams {
            gps: dial(GPS_SOCKET)?,
            modem: dial(MODEM_SOCKET)?,
            wifi_control: dial(WIFI_CONTROL_SOCKET)?,
            wifi_monitor: dial(WIFI_MONITOR_SOCKET)?,
        };
        Self::attach(name, number, prefix, streams, bridge, orchestrator)
    }

    /// Assemble a device over already-connected streams and start its
    /// threads.
    pub fn attach(
        name: &str,
        number: i64,
        prefix: NumberPrefix,
        streams: DeviceStreams,
        bridge: Arc<dyn Bridge>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Result<Arc<Device>, NodeError> {
        let (outbound_tx, outbound_rx) = std::sync::mpsc::channel();
        let modem = Arc::new(Modem::new(number, streams.modem, outbound_tx)?);
        let (wifi, network_names) = WifiModem::new(streams.wifi_control, streams.wifi_monitor)?;
        let wifi = Arc::new(wifi);

        let device = Arc::new(Device {
            name: name.to_string(),
            number,
            prefix,
            modem: modem.clone(),
            wifi: wifi.clone(),
            gps: Mutex::new(BufWriter::new(streams.gps)),
            origin: Mutex::new(Location::origin()),
            current: Mutex::new(Location::origin()),
            destination: Mutex::new(Location::origin()),
            move_speed: Mutex::new(0.0),
            access_points: Arc::new(Mutex::new(HashMap::new())),
            running: AtomicBool::new(true),
        });

        debug!("Device[{}]: launching with number {}", name, number);

        let modem_name = name.to_string();
        thread::spawn(move || {
            if let Err(err) = modem.run() {
                error!("Device[{}]: modem exited: {}", modem_name, err);
            }
            // Whatever ended the reader, the tickers and postman go with it.
            modem.close();
        });

        let wifi_name = name.to_string();
        thread::spawn(move || {
            if let Err(err) = wifi.run() {
                error!("Device[{}]: wifi modem exited: {}", wifi_name, err);
            }
            wifi.close();
        });

        let postman_name = name.to_string();
        thread::spawn(move || run_postman(postman_name, outbound_rx, orchestrator));

        let watcher_name = name.to_string();
        let watcher_map = device.access_points.clone();
        thread::spawn(move || run_ssid_watcher(watcher_name, network_names, watcher_map, bridge));

        Ok(device)
    }

    /// The device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The allocated phone number.
    pub fn number(&self) -> i64 {
        self.number
    }

    /// The prefix the number was allocated from.
    pub fn prefix(&self) -> NumberPrefix {
        self.prefix
    }

    /// The GSM modem, for SMS delivery and history.
    pub fn modem(&self) -> &Modem {
        &self.modem
    }

    /// The device's last known position.
    pub fn current_location(&self) -> Location {
        *self.current.lock()
    }

    /// Whether the device is live (launched and not yet closed).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Feed an NMEA sentence to the guest and move the device there.
    ///
    /// The caller is expected to recompute AP visibility afterwards.
    pub fn push_gps(&self, sentence: &str) -> Result<(), NodeError> {
        let location = nmea::parse(sentence)?;
        debug!("Device[{}]: GPS fix {:?}", self.name, location);
        *self.current.lock() = location;
        *self.origin.lock() = location;

        let mut gps = self.gps.lock();
        gps.write_all(sentence.as_bytes())?;
        gps.write_all(b"\n")?;
        gps.flush()?;
        Ok(())
    }

    /// Configure the SSID -> (vlan, bridge) map and show those networks to
    /// the supplicant at full strength.
    pub fn set_wifi_networks(&self, entries: Vec<(String, NetworkBinding)>) {
        let levels: Vec<ApLevel> = entries
            .iter()
            .map(|(ssid, _)| ApLevel {
                ssid: ssid.clone(),
                level_dbm: UNIVERSAL_LEVEL_DBM,
            })
            .collect();

        let mut map = self.access_points.lock();
        map.clear();
        for (ssid, binding) in entries {
            map.insert(ssid, binding);
        }
        drop(map);

        self.wifi.update_scan_results(&levels);
    }

    /// Recompute this device's scan results from the global AP registry.
    pub fn update_visible(&self, aps: &[AccessPoint]) {
        let at = self.current_location();
        let levels: Vec<ApLevel> = visible_access_points(aps.iter(), &at)
            .into_iter()
            .map(|v| ApLevel {
                ssid: v.ssid,
                level_dbm: v.level_dbm,
            })
            .collect();
        self.wifi.update_scan_results(&levels);
    }

    /// Set the wander speed in degrees per tick; 0 stops the device.
    pub fn set_move_speed(&self, speed: f64) {
        *self.move_speed.lock() = speed;
    }

    /// Advance one wander tick. Returns true when the device moved.
    pub fn wander_tick<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        let speed = *self.move_speed.lock();
        if speed == 0.0 || !self.is_running() {
            return false;
        }

        let current = *self.current.lock();
        let mut destination = *self.destination.lock();
        if cellsim_radio::needs_destination(&current, &destination) {
            destination = cellsim_radio::pick_destination(&self.origin.lock(), rng);
            debug!("Device[{}]: new destination {:?}", self.name, destination);
            *self.destination.lock() = destination;
        }

        let stepped = cellsim_radio::step_toward(&current, &destination, speed);
        *self.current.lock() = stepped;
        true
    }

    /// Stop all per-device threads and close the guest sockets.
    pub fn close(&self) {
        debug!("Device[{}]: closing", self.name);
        self.running.store(false, Ordering::Relaxed);
        self.modem.close();
        self.wifi.close();
    }
}

/// Drain the modem's outbound messages and broadcast each to the cluster in
/// canonical form. Delivery is best-effort and never retried.
fn run_postman(name: String, outbox: Receiver<Message>, orchestrator: Arc<dyn Orchestrator>) {
    for msg in outbox {
        let command = format!("sms deliver-raw {}", msg.raw());
        debug!("Device[{}]: posting SMS {} -> {}", name, msg.src, msg.dst);
        metrics::counter!("cellsim.sms.posted").increment(1);
        if let Err(err) = orchestrator.broadcast(&command) {
            warn!("Device[{}]: sms delivery failed: {}", name, err);
        }
    }
    debug!("Device[{}]: postman exiting", name);
}

/// React to supplicant network selections by re-attaching the device's
/// first interface to the backing network of the chosen SSID.
fn run_ssid_watcher(
    name: String,
    network_names: Receiver<String>,
    access_points: Arc<Mutex<HashMap<String, NetworkBinding>>>,
    bridge: Arc<dyn Bridge>,
) {
    for ssid in network_names {
        debug!("Device[{}]: changed to wifi network {:?}", name, ssid);
        let binding = access_points.lock().get(&ssid).cloned();
        if let Some(binding) = binding {
            debug!(
                "Device[{}]: switching to vlan {} on bridge {}",
                name, binding.vlan, binding.bridge
            );
            if let Err(err) = bridge.network_connect(&name, 0, &binding.bridge, binding.vlan) {
                warn!("Device[{}]: bridge reattach failed: {}", name, err);
            }
        }
    }
    debug!("Device[{}]: ssid watcher exiting", name);
}

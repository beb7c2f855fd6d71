//! # cellsim-wifi
//!
//! Wi-Fi supplicant protocol emulator.
//!
//! The guest's supplicant client speaks a request/response protocol over a
//! "control" byte stream and expects asynchronous events on a second
//! "monitor" stream. Messages on both are NUL-terminated and carry a fixed
//! interface prefix. This modem maintains the supplicant-visible state:
//!
//! - the per-network property database (`ADD_NETWORK` / `SET_NETWORK` / ...)
//! - the currently selected network
//! - synthetic scan results, refreshed by the radio-propagation engine
//!
//! Selecting a network publishes its SSID on a channel so the enclosing
//! device can re-attach its virtual NIC to the matching backing network.

mod commands;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Constants
// ============================================================================

/// Interface prefix every message begins with. The trailing space matters.
pub const PREFIX: &str = "IFNAME=eth0 ";

/// BSSID reported when the selected SSID has no scan entry.
const NULL_BSSID: &str = "00:00:00:00:00:00";

// ============================================================================
// Errors
// ============================================================================

/// Errors produced by the Wi-Fi modem.
#[derive(Debug, Error)]
pub enum WifiError {
    /// A guest socket failed.
    #[error("wifi transport: {0}")]
    Transport(#[from] std::io::Error),
}

// ============================================================================
// Scan Results
// ============================================================================

/// One synthetic access point as reported to the supplicant.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// 1-based result id.
    pub id: usize,
    /// Synthetic BSSID derived from the id.
    pub bssid: String,
    /// Channel frequency in MHz.
    pub freq: i32,
    /// Signal level in dBm.
    pub level: i32,
    /// Timestamp of the last beacon frame (always zero here).
    pub tsf: String,
    /// Capability flags.
    pub flags: String,
    /// Network name.
    pub ssid: String,
}

/// An SSID and its signal level, as computed by the propagation engine.
#[derive(Debug, Clone)]
pub struct ApLevel {
    /// Network name.
    pub ssid: String,
    /// Signal level in dBm.
    pub level_dbm: i32,
}

// ============================================================================
// Wi-Fi Modem
// ============================================================================

/// The supplicant-protocol server bound to one guest's control and monitor
/// sockets.
pub struct WifiModem {
    control: UnixStream,
    control_out: Mutex<BufWriter<UnixStream>>,
    monitor: UnixStream,
    monitor_out: Mutex<BufWriter<UnixStream>>,

    networks: Mutex<HashMap<u32, HashMap<String, String>>>,
    selected: Mutex<Option<u32>>,
    scan_results: Mutex<Vec<ScanResult>>,
    next_id: AtomicU32,

    network_name_tx: Sender<String>,
}

impl WifiModem {
    /// Create a modem over already-connected control and monitor sockets.
    ///
    /// Returns the modem and the receiving end of the network-name channel:
    /// each time the supplicant selects (or re-sets) an SSID, its unquoted
    /// name is published there.
    pub fn new(
        control: UnixStream,
        monitor: UnixStream,
    ) -> Result<(Self, Receiver<String>), WifiError> {
        let control_out = Mutex::new(BufWriter::new(control.try_clone()?));
        let monitor_out = Mutex::new(BufWriter::new(monitor.try_clone()?));
        let (tx, rx) = std::sync::mpsc::channel();

        Ok((
            WifiModem {
                control,
                control_out,
                monitor,
                monitor_out,
                networks: Mutex::new(HashMap::new()),
                selected: Mutex::new(None),
                scan_results: Mutex::new(Vec::new()),
                next_id: AtomicU32::new(0),
                network_name_tx: tx,
            },
            rx,
        ))
    }

    /// Replace the scan results with freshly computed AP levels.
    ///
    /// Ids are 1-based; BSSIDs are derived from the id; every network is
    /// open on channel 1.
    pub fn update_scan_results(&self, aps: &[ApLevel]) {
        let mut results = Vec::with_capacity(aps.len());
        for (i, ap) in aps.iter().enumerate() {
            let id = i + 1;
            results.push(ScanResult {
                id,
                bssid: format!(
                    "00:00:00:{:02x}:{:02x}:{:02x}",
                    (id / 65536) % 256,
                    (id / 256) % 256,
                    id % 256
                ),
                freq: 2412,
                level: ap.level_dbm,
                tsf: "0000000000000000".to_string(),
                flags: "[OPEN]".to_string(),
                ssid: ap.ssid.clone(),
            });
        }
        *self.scan_results.lock() = results;
    }

    /// Stop the modem; the blocked control reader unblocks via shutdown.
    pub fn close(&self) {
        let _ = self.control.shutdown(Shutdown::Both);
        let _ = self.monitor.shutdown(Shutdown::Both);
    }

    /// Control-command loop. Exits cleanly on EOF or shutdown.
    pub fn run(&self) -> Result<(), WifiError> {
        let mut reader = BufReader::new(self.control.try_clone()?);
        loop {
            let mut raw = Vec::new();
            if reader.read_until(0, &mut raw)? == 0 {
                debug!("WifiModem: guest closed the control socket");
                return Ok(());
            }
            if raw.last() == Some(&0) {
                raw.pop();
            }

            let command = String::from_utf8_lossy(&raw).into_owned();
            metrics::counter!("cellsim.wifi.commands").increment(1);
            self.handle_command(&command)?;
        }
    }

    // ========================================================================
    // Command Dispatch
    // ========================================================================

    fn handle_command(&self, command: &str) -> Result<(), WifiError> {
        let cmd = command.strip_prefix(PREFIX).unwrap_or(command);
        debug!("WifiModem: < {}", cmd);

        if commands::ok_command(cmd) {
            return self.reply("OK");
        }
        if let Some(resp) = commands::canned_response(cmd) {
            return self.reply(resp);
        }

        // DRIVER WLS_BATCHING STOP and SCAN_INTERVAL are in the OK table, so
        // only the stateful variants reach the checks below.
        if cmd.starts_with("SCAN") {
            self.monitor_event("CTRL-EVENT-SCAN-RESULTS")?;
            return self.reply("OK");
        }
        if cmd.starts_with("BSS RANGE=0-") {
            let dump = self.scan_dump();
            return self.reply(&dump);
        }
        if cmd.starts_with("DRIVER WLS_BATCHING GET") {
            let dump = self.batched_scan_dump();
            return self.reply(&dump);
        }
        if cmd.starts_with("ADD_NETWORK") {
            let id = self.add_network();
            return self.reply(&id.to_string());
        }
        if cmd.starts_with("REMOVE_NETWORK") {
            self.remove_network(cmd);
            return self.reply("OK");
        }
        if cmd.starts_with("DISABLE_NETWORK") {
            self.set_enabled(cmd, false);
            return self.reply("OK");
        }
        if cmd.starts_with("ENABLE_NETWORK") {
            self.set_enabled(cmd, true);
            return self.reply("OK");
        }
        if cmd.starts_with("SET_NETWORK") {
            return match self.set_network_property(cmd) {
                true => self.reply("OK"),
                false => self.reply("NULL"),
            };
        }
        if cmd.starts_with("GET_NETWORK") {
            return match self.get_network_property(cmd) {
                Some(value) => self.reply(&value),
                None => self.reply("NULL"),
            };
        }
        if cmd.starts_with("SELECT_NETWORK") {
            self.select_network(cmd);
            self.emit_connected_events()?;
            return self.reply("OK");
        }
        if cmd.starts_with("RECONNECT") {
            return if self.selected_properties().is_some() {
                self.emit_connected_events()?;
                self.reply("OK")
            } else {
                self.reply("NULL")
            };
        }
        if cmd.starts_with("DISCONNECT") {
            *self.selected.lock() = None;
            self.monitor_event("CTRL-EVENT-DISCONNECTED")?;
            return self.reply("OK");
        }
        if cmd.starts_with("SIGNAL_POLL") {
            return match self.signal_poll() {
                Some(data) => self.reply(&data),
                None => self.reply("FAIL"),
            };
        }
        if cmd.starts_with("LIST_NETWORKS") {
            let table = self.network_table();
            return self.reply(&table);
        }
        if cmd.starts_with("STATUS") {
            return match self.status_block() {
                Some(data) => self.reply(&data),
                None => self.reply("FAIL"),
            };
        }

        warn!("WifiModem: unknown command {:?}", cmd);
        self.reply("UNKNOWN COMMAND")
    }

    // ========================================================================
    // Stateful Commands
    // ========================================================================

    fn add_network(&self) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let defaults = commands::NETWORK_DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.networks.lock().insert(id, defaults);
        debug!("WifiModem: added network {}", id);
        id
    }

    fn remove_network(&self, cmd: &str) {
        let Some(id) = id_argument(cmd) else { return };
        let mut selected = self.selected.lock();
        if *selected == Some(id) {
            *selected = None;
        }
        self.networks.lock().remove(&id);
        debug!("WifiModem: removed network {}", id);
    }

    fn set_enabled(&self, cmd: &str, enabled: bool) {
        let Some(id) = id_argument(cmd) else { return };
        let mut networks = self.networks.lock();
        if let Some(props) = networks.get_mut(&id) {
            if enabled {
                props.insert("enabled".to_string(), "true".to_string());
            } else {
                props.remove("enabled");
            }
        }
    }

    fn set_network_property(&self, cmd: &str) -> bool {
        // SET_NETWORK <id> <key> <value with spaces>
        let mut parts = cmd.splitn(4, ' ');
        let (id, key, value) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(id), Some(key), Some(value)) => (id, key, value),
            _ => return false,
        };
        let Ok(id) = id.parse::<u32>() else {
            return false;
        };

        let mut networks = self.networks.lock();
        let Some(props) = networks.get_mut(&id) else {
            return false;
        };
        props.insert(key.to_string(), value.to_string());
        drop(networks);

        if key == "ssid" {
            self.publish_network_name(value);
        }
        true
    }

    fn get_network_property(&self, cmd: &str) -> Option<String> {
        // GET_NETWORK <id> <key>; the key stops at the next word boundary
        // and anything after it is ignored.
        let mut parts = cmd.split_whitespace();
        let (id, key) = match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(id), Some(key)) => (id, key),
            _ => return None,
        };
        let id: u32 = id.parse().ok()?;

        let networks = self.networks.lock();
        let value = networks.get(&id).and_then(|props| props.get(key));
        Some(match value {
            // A missing property answers with a bare NUL byte.
            None => "\x00".to_string(),
            Some(v) => v.clone(),
        })
    }

    fn select_network(&self, cmd: &str) {
        let Some(id) = id_argument(cmd) else { return };
        *self.selected.lock() = Some(id);
        debug!("WifiModem: selected network {}", id);

        let ssid = self
            .networks
            .lock()
            .get(&id)
            .and_then(|props| props.get("ssid").cloned())
            .unwrap_or_default();
        self.publish_network_name(&ssid);
    }

    /// The property map of the selected network, if one is selected.
    fn selected_properties(&self) -> Option<HashMap<String, String>> {
        let id = (*self.selected.lock())?;
        self.networks.lock().get(&id).cloned()
    }

    fn signal_poll(&self) -> Option<String> {
        let props = self.selected_properties()?;
        let ssid = props.get("ssid")?;
        let unquoted = ssid.trim_matches('"');

        // Good quality on channel 1 unless a scan result says otherwise.
        let mut level = -43;
        let mut freq = 2412;
        for sr in self.scan_results.lock().iter() {
            if sr.ssid == unquoted {
                level = sr.level;
                freq = sr.freq;
                break;
            }
        }
        Some(format!(
            "RSSI={level}\nLINKSPEED=54\nNOISE=9999\nFREQUENCY={freq}"
        ))
    }

    fn status_block(&self) -> Option<String> {
        let selected = *self.selected.lock();
        let props = selected.and_then(|id| self.networks.lock().get(&id).cloned());
        let (id, props) = match (selected, props) {
            (Some(id), Some(props)) => (id, props),
            _ => {
                return Some(
                    "wpa_state=DISCONNECTED\naddress=00:00:00:00:00:00\n\
                     uuid=00000000-0000-0000-0000-000000000000\n"
                        .to_string(),
                )
            }
        };

        let ssid = props.get("ssid")?;
        let unquoted = ssid.trim_matches('"');

        let mut block = String::new();
        for sr in self.scan_results.lock().iter() {
            if sr.ssid == unquoted {
                block.push_str(&format!("bssid={}\n", sr.bssid));
                block.push_str(&format!("freq={}\n", sr.freq));
                block.push_str(&format!("ssid={}\n", ssid));
                block.push_str(&format!("id={}\n", id));
                block.push_str("mode=station\n");
                block.push_str("wpa_state=COMPLETED\n");
                break;
            }
        }
        Some(block)
    }

    fn network_table(&self) -> String {
        let selected = *self.selected.lock();
        let networks = self.networks.lock();

        let mut ids: Vec<u32> = networks.keys().copied().collect();
        ids.sort_unstable();

        let mut table = String::from("network id / ssid / bssid / flags\n");
        for id in ids {
            let Some(ssid) = networks[&id].get("ssid") else {
                // not set up yet
                continue;
            };
            table.push_str(&format!("{id}\t{ssid}\tany"));
            if selected == Some(id) {
                table.push_str("\t[CURRENT]");
            }
            table.push('\n');
        }
        table
    }

    fn scan_dump(&self) -> String {
        let results = self.scan_results.lock();
        let mut dump = String::new();
        for sr in results.iter() {
            dump.push_str(&format!("id={}\n", sr.id));
            dump.push_str(&format!("bssid={}\n", sr.bssid));
            dump.push_str(&format!("freq={}\n", sr.freq));
            dump.push_str(&format!("level={}\n", sr.level));
            dump.push_str(&format!("tsf={}\n", sr.tsf));
            dump.push_str(&format!("flags={}\n", sr.flags));
            dump.push_str(&format!("ssid={}\n", sr.ssid));
            dump.push_str("====\n");
        }
        if dump.is_empty() {
            "\x00".to_string()
        } else {
            dump + "####"
        }
    }

    fn batched_scan_dump(&self) -> String {
        let results = self.scan_results.lock();
        let mut dump = format!("scancount={}\n", results.len());
        for sr in results.iter() {
            dump.push_str(&format!("bssid={}\n", sr.bssid));
            dump.push_str(&format!("freq={}\n", sr.freq));
            dump.push_str(&format!("level={}\n", sr.level));
            dump.push_str(&format!("ssid={}\n", sr.ssid));
            dump.push_str("dist=10\n");
            dump.push_str("distSd=1\n");
            dump.push_str("====\n");
        }
        dump + "----"
    }

    // ========================================================================
    // Events & Writes
    // ========================================================================

    /// Emit CONNECTED and STATE-CHANGE on the monitor stream for the
    /// selected network. Networks without an ssid property emit nothing.
    fn emit_connected_events(&self) -> Result<(), WifiError> {
        let Some(props) = self.selected_properties() else {
            return Ok(());
        };
        let Some(ssid) = props.get("ssid") else {
            return Ok(());
        };
        let id = match *self.selected.lock() {
            Some(id) => id,
            None => return Ok(()),
        };

        let unquoted = ssid.trim_matches('"');
        let mut bssid = NULL_BSSID.to_string();
        for sr in self.scan_results.lock().iter() {
            if sr.ssid == unquoted {
                bssid = sr.bssid.clone();
                break;
            }
        }

        self.monitor_event(&format!(
            "CTRL-EVENT-CONNECTED Connection to {bssid} completed (reauth) [id={id} id_str=]"
        ))?;
        self.monitor_event(&format!(
            "CTRL-EVENT-STATE-CHANGE SSID={ssid} BSSID={bssid} id={id} state=3"
        ))
    }

    fn publish_network_name(&self, ssid: &str) {
        let name = ssid.trim_matches('"').to_string();
        if self.network_name_tx.send(name).is_err() {
            debug!("WifiModem: network-name receiver is gone");
        }
    }

    fn reply(&self, s: &str) -> Result<(), WifiError> {
        debug!("WifiModem: > {:?}", s);
        let mut out = self.control_out.lock();
        out.write_all(s.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn monitor_event(&self, event: &str) -> Result<(), WifiError> {
        debug!("WifiModem: monitor {}", event);
        let mut out = self.monitor_out.lock();
        out.write_all(PREFIX.as_bytes())?;
        out.write_all(event.as_bytes())?;
        out.write_all(&[0])?;
        out.flush()?;
        Ok(())
    }
}

/// Parse the numeric id after a one-word verb, e.g. `SELECT_NETWORK 3`.
fn id_argument(cmd: &str) -> Option<u32> {
    cmd.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    struct Harness {
        modem: Arc<WifiModem>,
        control: UnixStream,
        monitor: UnixStream,
        names: Receiver<String>,
    }

    fn start() -> Harness {
        let (control_host, control_guest) = UnixStream::pair().unwrap();
        let (monitor_host, monitor_guest) = UnixStream::pair().unwrap();
        let (modem, names) = WifiModem::new(control_host, monitor_host).unwrap();
        let modem = Arc::new(modem);
        let runner = modem.clone();
        thread::spawn(move || {
            let _ = runner.run();
        });
        control_guest
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        monitor_guest
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        Harness {
            modem,
            control: control_guest,
            monitor: monitor_guest,
            names,
        }
    }

    fn send(h: &mut Harness, cmd: &str) -> String {
        h.control.write_all(PREFIX.as_bytes()).unwrap();
        h.control.write_all(cmd.as_bytes()).unwrap();
        h.control.write_all(&[0]).unwrap();
        read_some(&mut h.control)
    }

    fn read_some(stream: &mut UnixStream) -> String {
        let mut collected = Vec::new();
        let deadline = Instant::now() + Duration::from_millis(500);
        while Instant::now() < deadline {
            let mut buf = [0u8; 4096];
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    collected.extend_from_slice(&buf[..n]);
                    break;
                }
                Err(_) => {}
            }
        }
        String::from_utf8_lossy(&collected).into_owned()
    }

    #[test]
    fn test_housekeeping_commands() {
        let mut h = start();
        assert_eq!(send(&mut h, "SET device_name emu"), "OK");
        assert_eq!(send(&mut h, "DRIVER MACADDR"), "00:00:00:00:00:00");
        assert_eq!(send(&mut h, "NO_SUCH_VERB"), "UNKNOWN COMMAND");
        h.modem.close();
    }

    #[test]
    fn test_network_lifecycle_and_status() {
        let mut h = start();

        assert_eq!(send(&mut h, "ADD_NETWORK"), "0");
        assert_eq!(send(&mut h, "SET_NETWORK 0 ssid \"Foo\""), "OK");
        assert_eq!(h.names.recv_timeout(Duration::from_secs(1)).unwrap(), "Foo");

        assert_eq!(send(&mut h, "SELECT_NETWORK 0"), "OK");
        assert_eq!(h.names.recv_timeout(Duration::from_secs(1)).unwrap(), "Foo");

        // Foo is not in scan results yet: no COMPLETED state.
        let status = send(&mut h, "STATUS");
        assert!(!status.contains("wpa_state=COMPLETED"), "{status:?}");

        h.modem.update_scan_results(&[ApLevel {
            ssid: "Foo".to_string(),
            level_dbm: -50,
        }]);
        let status = send(&mut h, "STATUS");
        assert!(status.contains("wpa_state=COMPLETED"), "{status:?}");
        assert!(status.contains("bssid=00:00:00:00:00:01"), "{status:?}");

        let signal = send(&mut h, "SIGNAL_POLL");
        assert_eq!(signal, "RSSI=-50\nLINKSPEED=54\nNOISE=9999\nFREQUENCY=2412");

        let list = send(&mut h, "LIST_NETWORKS");
        assert!(list.contains("0\t\"Foo\"\tany\t[CURRENT]"), "{list:?}");

        assert_eq!(send(&mut h, "DISCONNECT"), "OK");
        let status = send(&mut h, "STATUS");
        assert!(status.contains("wpa_state=DISCONNECTED"), "{status:?}");
        assert_eq!(send(&mut h, "SIGNAL_POLL"), "FAIL");

        h.modem.close();
    }

    #[test]
    fn test_monitor_events_on_select() {
        let mut h = start();
        h.modem.update_scan_results(&[ApLevel {
            ssid: "Bar".to_string(),
            level_dbm: -44,
        }]);

        send(&mut h, "ADD_NETWORK");
        send(&mut h, "SET_NETWORK 0 ssid \"Bar\"");
        h.names.recv_timeout(Duration::from_secs(1)).unwrap();
        send(&mut h, "SCAN");
        let event = read_some(&mut h.monitor);
        assert!(event.contains("CTRL-EVENT-SCAN-RESULTS"), "{event:?}");

        send(&mut h, "SELECT_NETWORK 0");
        let events = read_some(&mut h.monitor);
        assert!(events.contains("CTRL-EVENT-CONNECTED Connection to 00:00:00:00:00:01"), "{events:?}");
        assert!(
            events.contains("CTRL-EVENT-STATE-CHANGE SSID=\"Bar\" BSSID=00:00:00:00:00:01 id=0 state=3"),
            "{events:?}"
        );

        send(&mut h, "DISCONNECT");
        let event = read_some(&mut h.monitor);
        assert!(event.contains("CTRL-EVENT-DISCONNECTED"), "{event:?}");

        h.modem.close();
    }

    #[test]
    fn test_scan_dumps() {
        let mut h = start();

        // No results: a bare NUL byte.
        let empty = send(&mut h, "BSS RANGE=0-15");
        assert_eq!(empty, "\x00");

        h.modem.update_scan_results(&[
            ApLevel {
                ssid: "one".to_string(),
                level_dbm: -50,
            },
            ApLevel {
                ssid: "two".to_string(),
                level_dbm: -60,
            },
        ]);

        let dump = send(&mut h, "BSS RANGE=0-15");
        assert!(dump.starts_with("id=1\n"), "{dump:?}");
        assert!(dump.contains("ssid=one\n====\nid=2\n"), "{dump:?}");
        assert!(dump.contains("level=-60\n"), "{dump:?}");
        assert!(dump.ends_with("====\n####"), "{dump:?}");

        let batch = send(&mut h, "DRIVER WLS_BATCHING GET");
        assert!(batch.starts_with("scancount=2\n"), "{batch:?}");
        assert!(batch.contains("dist=10\ndistSd=1\n"), "{batch:?}");
        assert!(batch.ends_with("----"), "{batch:?}");

        h.modem.close();
    }

    #[test]
    fn test_network_properties() {
        let mut h = start();

        assert_eq!(send(&mut h, "ADD_NETWORK"), "0");
        assert_eq!(send(&mut h, "ADD_NETWORK"), "1");

        // Seeded defaults are readable.
        assert_eq!(send(&mut h, "GET_NETWORK 0 proto"), "WPA RSN");
        // Text after the key is ignored, not folded into it.
        assert_eq!(send(&mut h, "GET_NETWORK 0 proto trailing"), "WPA RSN");
        // A missing property answers a NUL byte; a bad id answers NULL.
        assert_eq!(send(&mut h, "GET_NETWORK 0 psk"), "\x00");
        assert_eq!(send(&mut h, "GET_NETWORK nine psk"), "NULL");

        assert_eq!(send(&mut h, "ENABLE_NETWORK 1"), "OK");
        assert_eq!(send(&mut h, "GET_NETWORK 1 enabled"), "true");
        assert_eq!(send(&mut h, "DISABLE_NETWORK 1"), "OK");
        assert_eq!(send(&mut h, "GET_NETWORK 1 enabled"), "\x00");

        assert_eq!(send(&mut h, "REMOVE_NETWORK 0"), "OK");
        assert_eq!(send(&mut h, "GET_NETWORK 0 proto"), "\x00");

        // RECONNECT without a selection is refused.
        assert_eq!(send(&mut h, "RECONNECT"), "NULL");

        h.modem.close();
    }
}

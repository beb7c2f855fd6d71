//! The textual command surface.
//!
//! Nodes receive newline-delimited command strings from the orchestrator
//! bus: operator-issued configuration (`mobile ap create ...`, `gps wander ...`)
//! and node-to-node traffic (`sms deliver-raw <base64>`). This module parses
//! them into [`Command`] values and executes them against a [`Node`].

use crate::device::NetworkBinding;
use crate::error::NodeError;
use crate::node::Node;
use cellsim_common::{nmea, Location};
use cellsim_radio::AccessPoint;
use chrono::{DateTime, Utc};
use gsm_sms::Message;
use std::fmt;
use std::path::PathBuf;

/// Bridge used when an access point or wifi entry names none.
pub const DEFAULT_BRIDGE: &str = "cellbr0";

// ============================================================================
// Command Model
// ============================================================================

/// A parsed command from the orchestrator bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `mobile ap`: list access points.
    ApList,
    /// `mobile ap create <ssid> <vlan> [bridge] [<lat> <long> <mW>]`
    ApCreate {
        ssid: String,
        vlan: u32,
        bridge: Option<String>,
        /// (lat, long, milliwatts) for a location-dependent transmitter.
        transmitter: Option<(f64, f64, f64)>,
    },
    /// `mobile ap delete <ssid>`
    ApDelete { ssid: String },

    /// `wifi <vm> <ssid,vlan[,bridge]>...`
    Wifi {
        vm: String,
        networks: Vec<(String, NetworkBinding)>,
    },

    /// `gps push <vm> <lat> <long> [accuracy]`
    GpsPush {
        vm: String,
        lat: f64,
        long: f64,
        accuracy: f64,
    },
    /// `gps push-raw <vm> <NMEA>`
    GpsPushRaw { vm: String, sentence: String },
    /// `gps wander <walking|driving|stop> <vm>`
    GpsWander { vm: String, speed: f64 },

    /// `sms push <vm> <from> <msg>...`
    SmsPush {
        vm: String,
        from: i64,
        text: String,
    },
    /// `sms deliver <to> <from> <msg>...`
    SmsDeliver { to: i64, from: i64, text: String },
    /// `sms deliver-raw <base64>`
    SmsDeliverRaw { raw: String },
    /// `sms tap`
    TapList,
    /// `sms tap add <low> <high> <path>`
    TapAdd { low: i64, high: i64, path: PathBuf },
    /// `sms tap delete <path|all>`
    TapDelete { path: Option<PathBuf> },
    /// `sms history [vm]`
    SmsHistory { vm: Option<String> },
    /// `sms lookup <to>`
    SmsLookup { to: i64 },
    /// `clear sms [vm]`
    SmsClear { vm: Option<String> },
}

/// What a command produced, for rendering on the bus reply path.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// Nothing to report.
    Ok,
    /// A single line of text.
    Text(String),
    /// A tabular response.
    Table {
        header: Vec<&'static str>,
        rows: Vec<Vec<String>>,
    },
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutput::Ok => Ok(()),
            CommandOutput::Text(s) => writeln!(f, "{s}"),
            CommandOutput::Table { header, rows } => {
                writeln!(f, "{}", header.join("\t"))?;
                for row in rows {
                    writeln!(f, "{}", row.join("\t"))?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse one command line.
pub fn parse(line: &str) -> Result<Command, NodeError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let bad = || NodeError::BadCommand(line.to_string());

    match tokens.as_slice() {
        ["mobile", "ap"] => Ok(Command::ApList),
        ["mobile", "ap", "create", ssid, vlan, rest @ ..] => {
            let vlan: u32 = vlan.parse().map_err(|_| bad())?;
            let (bridge, transmitter) = match rest {
                [] => (None, None),
                [bridge] => (Some(bridge.to_string()), None),
                [lat, long, mw] => (None, Some(parse_transmitter(lat, long, mw, bad)?)),
                [bridge, lat, long, mw] => (
                    Some(bridge.to_string()),
                    Some(parse_transmitter(lat, long, mw, bad)?),
                ),
                _ => return Err(bad()),
            };
            Ok(Command::ApCreate {
                ssid: ssid.to_string(),
                vlan,
                bridge,
                transmitter,
            })
        }
        ["mobile", "ap", "delete", ssid] => Ok(Command::ApDelete {
            ssid: ssid.to_string(),
        }),

        ["wifi", vm, entries @ ..] if !entries.is_empty() => {
            let mut networks = Vec::with_capacity(entries.len());
            for entry in entries {
                let parts: Vec<&str> = entry.split(',').collect();
                let (ssid, vlan, bridge) = match parts.as_slice() {
                    [ssid, vlan] => (ssid, vlan, DEFAULT_BRIDGE),
                    [ssid, vlan, bridge] => (ssid, vlan, *bridge),
                    _ => return Err(bad()),
                };
                networks.push((
                    ssid.to_string(),
                    NetworkBinding {
                        vlan: vlan.parse().map_err(|_| bad())?,
                        bridge: bridge.to_string(),
                    },
                ));
            }
            Ok(Command::Wifi {
                vm: vm.to_string(),
                networks,
            })
        }

        ["gps", "push", vm, lat, long, acc @ ..] => {
            let accuracy = match acc {
                [] => 1.0,
                [acc] => acc.parse().map_err(|_| bad())?,
                _ => return Err(bad()),
            };
            Ok(Command::GpsPush {
                vm: vm.to_string(),
                lat: lat.parse().map_err(|_| bad())?,
                long: long.parse().map_err(|_| bad())?,
                accuracy,
            })
        }
        ["gps", "push-raw", vm, sentence @ ..] if !sentence.is_empty() => {
            Ok(Command::GpsPushRaw {
                vm: vm.to_string(),
                sentence: sentence.join(" "),
            })
        }
        ["gps", "wander", mode, vm] => {
            let speed = match *mode {
                "walking" => cellsim_radio::WALKING_SPEED,
                "driving" => cellsim_radio::DRIVING_SPEED,
                "stop" => 0.0,
                _ => return Err(bad()),
            };
            Ok(Command::GpsWander {
                vm: vm.to_string(),
                speed,
            })
        }

        ["sms", "push", vm, from, msg @ ..] if !msg.is_empty() => Ok(Command::SmsPush {
            vm: vm.to_string(),
            from: normalize_number(from)?,
            text: msg.join(" "),
        }),
        ["sms", "deliver", to, from, msg @ ..] if !msg.is_empty() => Ok(Command::SmsDeliver {
            to: normalize_number(to)?,
            from: normalize_number(from)?,
            text: msg.join(" "),
        }),
        ["sms", "deliver-raw", raw] => Ok(Command::SmsDeliverRaw {
            raw: raw.to_string(),
        }),
        ["sms", "tap"] => Ok(Command::TapList),
        ["sms", "tap", "add", low, high, path] => Ok(Command::TapAdd {
            low: normalize_number(low)?,
            high: normalize_number(high)?,
            path: PathBuf::from(path),
        }),
        ["sms", "tap", "delete", path] => Ok(Command::TapDelete {
            path: (*path != "all").then(|| PathBuf::from(path)),
        }),
        ["sms", "history"] => Ok(Command::SmsHistory { vm: None }),
        ["sms", "history", vm] => Ok(Command::SmsHistory {
            vm: Some(vm.to_string()),
        }),
        ["sms", "lookup", to] => Ok(Command::SmsLookup {
            to: normalize_number(to)?,
        }),
        ["clear", "sms"] => Ok(Command::SmsClear { vm: None }),
        ["clear", "sms", vm] => Ok(Command::SmsClear {
            vm: Some(vm.to_string()),
        }),

        _ => Err(bad()),
    }
}

fn parse_transmitter(
    lat: &str,
    long: &str,
    mw: &str,
    bad: impl Fn() -> NodeError,
) -> Result<(f64, f64, f64), NodeError> {
    Ok((
        lat.parse().map_err(|_| bad())?,
        long.parse().map_err(|_| bad())?,
        mw.parse().map_err(|_| bad())?,
    ))
}

/// Parse a phone-number argument.
fn normalize_number(s: &str) -> Result<i64, NodeError> {
    s.parse().map_err(|_| NodeError::BadNumber(s.to_string()))
}

// ============================================================================
// Execution
// ============================================================================

impl Node {
    /// Execute a parsed command.
    pub fn execute(&self, cmd: Command) -> Result<CommandOutput, NodeError> {
        match cmd {
            Command::ApList => {
                let rows = self
                    .access_points()
                    .into_iter()
                    .map(|ap| {
                        let (lat, long) = match ap.loc {
                            Some(loc) => (format!("{:.4}", loc.lat), format!("{:.4}", loc.long)),
                            None => ("-".to_string(), "-".to_string()),
                        };
                        vec![
                            ap.ssid,
                            ap.vlan.to_string(),
                            ap.bridge,
                            lat,
                            long,
                            format!("{:.2}", ap.milliwatts),
                        ]
                    })
                    .collect();
                Ok(CommandOutput::Table {
                    header: vec!["SSID", "VLAN", "Bridge", "Latitude", "Longitude", "Power"],
                    rows,
                })
            }
            Command::ApCreate {
                ssid,
                vlan,
                bridge,
                transmitter,
            } => {
                let bridge = bridge.unwrap_or_else(|| DEFAULT_BRIDGE.to_string());
                let ap = match transmitter {
                    Some((lat, long, mw)) => AccessPoint::located(
                        ssid,
                        vlan,
                        bridge,
                        Location::new(lat, long, 1.0),
                        mw,
                    ),
                    None => AccessPoint::universal(ssid, vlan, bridge),
                };
                self.create_access_point(ap);
                Ok(CommandOutput::Ok)
            }
            Command::ApDelete { ssid } => {
                self.delete_access_point(&ssid)?;
                Ok(CommandOutput::Ok)
            }

            Command::Wifi { vm, networks } => {
                self.find_device(&vm)?.set_wifi_networks(networks);
                Ok(CommandOutput::Ok)
            }

            Command::GpsPush {
                vm,
                lat,
                long,
                accuracy,
            } => {
                let sentence = nmea::to_sentence(&Location::new(lat, long, accuracy));
                self.push_gps(&vm, &sentence)?;
                Ok(CommandOutput::Ok)
            }
            Command::GpsPushRaw { vm, sentence } => {
                self.push_gps(&vm, &sentence)?;
                Ok(CommandOutput::Ok)
            }
            Command::GpsWander { vm, speed } => {
                self.set_wander_speed(&vm, speed)?;
                Ok(CommandOutput::Ok)
            }

            Command::SmsPush { vm, from, text } => {
                self.push_text(&vm, from, &text)?;
                Ok(CommandOutput::Ok)
            }
            Command::SmsDeliver { to, from, text } => {
                self.deliver_text(to, from, &text)?;
                Ok(CommandOutput::Ok)
            }
            Command::SmsDeliverRaw { raw } => {
                let msg = Message::from_raw(&raw)?;
                self.deliver(&msg)?;
                Ok(CommandOutput::Ok)
            }

            Command::TapList => {
                let rows = self
                    .taps()
                    .into_iter()
                    .map(|tap| {
                        vec![
                            tap.low().to_string(),
                            tap.high().to_string(),
                            tap.path().display().to_string(),
                        ]
                    })
                    .collect();
                Ok(CommandOutput::Table {
                    header: vec!["Low", "High", "Path"],
                    rows,
                })
            }
            Command::TapAdd { low, high, path } => {
                self.add_tap(low, high, &path)?;
                Ok(CommandOutput::Ok)
            }
            Command::TapDelete { path } => {
                self.delete_tap(path.as_deref());
                Ok(CommandOutput::Ok)
            }

            Command::SmsHistory { vm } => {
                let devices = match vm {
                    Some(vm) => vec![self.find_device(&vm)?],
                    None => self.devices(),
                };
                let mut rows = Vec::new();
                for device in devices {
                    let modem = device.modem();
                    for msg in modem.inbox().iter().chain(modem.outbox().iter()) {
                        rows.push(vec![
                            device.name().to_string(),
                            msg.src.to_string(),
                            msg.dst.to_string(),
                            DateTime::<Utc>::from(msg.time)
                                .format("%Y-%m-%d %H:%M:%S")
                                .to_string(),
                            msg.text.clone(),
                        ]);
                    }
                }
                Ok(CommandOutput::Table {
                    header: vec!["Device", "Source", "Dest", "Time", "Message"],
                    rows,
                })
            }
            Command::SmsLookup { to } => Ok(CommandOutput::Text(self.lookup(to).join(" "))),
            Command::SmsClear { vm } => {
                self.clear_sms(vm.as_deref())?;
                Ok(CommandOutput::Ok)
            }
        }
    }
}

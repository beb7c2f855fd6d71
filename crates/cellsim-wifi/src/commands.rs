//! Command tables for the supplicant protocol.
//!
//! The guest's supplicant client issues a long tail of SET/DRIVER
//! housekeeping commands during bring-up that only need an OK, plus a couple
//! that want a fixed value. Everything stateful is handled in the modem
//! itself.

/// Commands acknowledged with a literal `OK`, matched by prefix.
pub(crate) const OK_COMMANDS: &[&str] = &[
    "SET device_name",
    "SET manufacturer",
    "SET model_name",
    "SET model_number",
    "SET serial_number",
    "SET config_methods",
    "SET device_type",
    "SCAN_INTERVAL",
    "DRIVER BTCOEXSCAN-STOP",
    "DRIVER RXFILTER-STOP",
    "DRIVER RXFILTER-ADD",
    "DRIVER RXFILTER-START",
    "DRIVER RXFILTER-REMOVE",
    "DRIVER WLS_BATCHING STOP",
    "DRIVER STOP",
    "DRIVER SETSUSPENDMODE",
    "SET ps",
    "DRIVER SETBAND",
    "BSS_FLUSH",
    "SAVE_CONFIG",
    "TERMINATE",
];

/// Commands answered with a fixed value, matched by prefix.
pub(crate) const CANNED_RESPONSES: &[(&str, &str)] = &[
    ("DRIVER MACADDR", "00:00:00:00:00:00"),
    ("DRIVER BTCOEXMODE", "0"),
];

/// Property defaults seeded into every freshly added network.
pub(crate) const NETWORK_DEFAULTS: &[(&str, &str)] = &[
    ("proto", "WPA RSN"),
    ("key_mgmt", "WPA-PSK WPA-EAP"),
    ("pairwise", "CCMP TKIP"),
    ("scan_ssid", "0"),
    ("group", "CCMP TKIP WEP104 WEP40"),
    ("engine", "0"),
];

pub(crate) fn ok_command(cmd: &str) -> bool {
    OK_COMMANDS.iter().any(|ok| cmd.starts_with(ok))
}

pub(crate) fn canned_response(cmd: &str) -> Option<&'static str> {
    CANNED_RESPONSES
        .iter()
        .find(|(prefix, _)| cmd.starts_with(prefix))
        .map(|(_, resp)| *resp)
}

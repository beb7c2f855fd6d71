use crate::number::NumberPrefix;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned to command callers and device embedders.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The prefix/counter pair has exhausted its 10-digit space.
    #[error("no numbers left to allocate")]
    OutOfNumbers,

    /// Two configured number prefixes allocate from overlapping blocks.
    #[error("number prefixes overlap: {0} and {1}")]
    OverlappingPrefixes(NumberPrefix, NumberPrefix),

    /// A prefix string that is not 0-10 decimal digits.
    #[error("invalid number prefix {0:?}")]
    BadPrefix(String),

    /// A tap already writes to this file.
    #[error("already a tap using file {}", .0.display())]
    DuplicateTap(PathBuf),

    /// Lookup of an unknown access point.
    #[error("no such access point {0:?}")]
    NoSuchAccessPoint(String),

    /// Lookup of an unknown device.
    #[error("no such device {0:?}")]
    NoSuchDevice(String),

    /// A phone-number argument that did not parse.
    #[error("{0:?} is not a valid phone number")]
    BadNumber(String),

    /// A malformed command line.
    #[error("invalid command: {0}")]
    BadCommand(String),

    /// A malformed node configuration file.
    #[error("configuration: {0}")]
    Config(String),

    /// The virtual-network collaborator refused a reattachment.
    #[error("bridge: {0}")]
    Bridge(String),

    #[error(transparent)]
    Modem(#[from] cellsim_modem::ModemError),

    #[error(transparent)]
    Wifi(#[from] cellsim_wifi::WifiError),

    #[error(transparent)]
    Sms(#[from] gsm_sms::SmsError),

    #[error(transparent)]
    Nmea(#[from] cellsim_common::nmea::NmeaError),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

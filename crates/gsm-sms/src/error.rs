use thiserror::Error;

/// Errors produced by the SMS codec.
#[derive(Debug, Error)]
pub enum SmsError {
    /// The user data (including any header padding) exceeds 160 septets.
    #[error("message too long: {0} septets, max 160 including header padding")]
    TooLong(usize),

    /// The payload is not valid 7-bit data or is not valid hex.
    #[error("bad 7-bit encoding: {0}")]
    BadEncoding(String),

    /// The PDU ended before the named field.
    #[error("truncated PDU at {0}")]
    Truncated(&'static str),

    /// The sender/recipient address did not parse as a phone number.
    #[error("bad address {0:?}")]
    BadAddress(String),

    /// Only the 7-bit default alphabet (DCS 0) is supported.
    #[error("unsupported data coding scheme {0:#04x}")]
    UnsupportedCoding(u8),

    /// A concatenation reference length outside {1, 2}.
    #[error("bad concatenation reference length {0}")]
    BadRefLen(u8),

    /// The canonical transit record failed to decode.
    #[error("bad transit record: {0}")]
    BadTransitRecord(String),
}

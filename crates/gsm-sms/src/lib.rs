//! # gsm-sms
//!
//! SMS message model and PDU codec for the cellsim emulation core.
//!
//! This crate provides the message types and wire codecs for the GSM short
//! message service as spoken between an emulated modem and its guest:
//! - The [`Message`] model with concatenated-SMS segmentation
//! - The 7-bit (septet) user-data codec and SMS-DELIVER/SUBMIT PDU
//!   pack/unpack ([`codec`])
//! - A canonical binary transit form for moving messages between cluster
//!   nodes ([`Message::raw`] / [`Message::from_raw`])
//!
//! ## Segmentation
//!
//! Texts shorter than 160 characters travel as a single unconcatenated
//! message. Longer texts are cut into 152-character segments sharing a random
//! 16-bit concatenation reference, with 1-based part indices:
//!
//! ```rust
//! use gsm_sms::Message;
//!
//! let parts = Message::split(1234567, 7654321, &"a".repeat(400));
//! assert_eq!(parts.len(), 3);
//! assert_eq!(parts[0].concat.as_ref().unwrap().total_parts, 3);
//! ```

pub mod codec;
pub mod error;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use error::SmsError;

// ============================================================================
// Constants
// ============================================================================

/// Maximum septets in a single unconcatenated message.
pub const MAX_SINGLE_SEPTETS: usize = 160;

/// Segment length used when splitting long texts (16-bit reference variant).
pub const SEGMENT_SEPTETS: usize = 152;

/// Version tag of the canonical transit record.
const TRANSIT_VERSION: u8 = 1;

// ============================================================================
// Message Model
// ============================================================================

/// Concatenation header of a multi-part message segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatInfo {
    /// Reference id width in bytes: 1 or 2.
    pub ref_len: u8,
    /// Reference id; only the first `ref_len` bytes are significant.
    pub ref_id: [u8; 2],
    /// Number of segments in the full message.
    pub total_parts: u8,
    /// 1-based index of this segment.
    pub part_index: u8,
}

/// One SMS unit: a single message or one segment of a concatenated message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Sender phone number.
    pub src: i64,
    /// Destination phone number.
    pub dst: i64,
    /// Text payload (7-bit alphabet).
    pub text: String,
    /// Wall-clock time the message entered the system.
    pub time: SystemTime,
    /// Concatenation header; `None` for single-part messages.
    pub concat: Option<ConcatInfo>,
}

impl Message {
    /// Create a single unconcatenated message.
    pub fn single(src: i64, dst: i64, text: impl Into<String>) -> Self {
        Message {
            src,
            dst,
            text: text.into(),
            time: SystemTime::now(),
            concat: None,
        }
    }

    /// Bounds-check a text and split it into one or more messages.
    ///
    /// Texts under 160 characters yield one plain message. Longer texts are
    /// split into 152-character segments carrying a shared random 16-bit
    /// concatenation reference.
    pub fn split(src: i64, dst: i64, text: &str) -> Vec<Message> {
        if text.len() < MAX_SINGLE_SEPTETS {
            return vec![Message::single(src, dst, text)];
        }

        let ref_id: [u8; 2] = rand::random();
        let total_parts = text.len().div_ceil(SEGMENT_SEPTETS) as u8;

        text.as_bytes()
            .chunks(SEGMENT_SEPTETS)
            .enumerate()
            .map(|(i, chunk)| Message {
                src,
                dst,
                text: String::from_utf8_lossy(chunk).into_owned(),
                time: SystemTime::now(),
                concat: Some(ConcatInfo {
                    ref_len: 2,
                    ref_id,
                    total_parts,
                    part_index: i as u8 + 1,
                }),
            })
            .collect()
    }

    /// Septets of padding the user-data header occupies, if any.
    pub fn udh_pad_septets(&self) -> usize {
        match &self.concat {
            None => 0,
            Some(c) if c.ref_len == 1 => 7,
            Some(_) => 8,
        }
    }

    /// Serialize to the canonical transit form: a little-endian binary
    /// record wrapped in standard base64, suitable for embedding in a
    /// `sms deliver-raw` command.
    pub fn raw(&self) -> String {
        let (ref_len, ref_id, total_parts, part_index) = match &self.concat {
            Some(c) => (c.ref_len, c.ref_id, c.total_parts, c.part_index),
            None => (0, [0, 0], 0, 0),
        };
        let millis = self
            .time
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;

        let mut buf = Vec::with_capacity(30 + self.text.len());
        buf.push(TRANSIT_VERSION);
        buf.extend_from_slice(&self.src.to_le_bytes());
        buf.extend_from_slice(&self.dst.to_le_bytes());
        buf.extend_from_slice(&(self.text.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.text.as_bytes());
        buf.push(ref_len);
        buf.extend_from_slice(&ref_id);
        buf.push(total_parts);
        buf.push(part_index);
        buf.extend_from_slice(&millis.to_le_bytes());

        BASE64.encode(buf)
    }

    /// Deserialize a message from its canonical transit form.
    ///
    /// Rejects unknown record versions, reference lengths outside {0, 1, 2},
    /// and text that is not valid UTF-8.
    pub fn from_raw(b64: &str) -> Result<Message, SmsError> {
        let buf = BASE64
            .decode(b64.trim())
            .map_err(|e| SmsError::BadTransitRecord(e.to_string()))?;
        let mut r = Reader { buf: &buf, pos: 0 };

        let version = r.byte("version")?;
        if version != TRANSIT_VERSION {
            return Err(SmsError::BadTransitRecord(format!(
                "unknown record version {version}"
            )));
        }

        let src = i64::from_le_bytes(r.array("src")?);
        let dst = i64::from_le_bytes(r.array("dst")?);
        let text_len = u32::from_le_bytes(r.array("text length")?) as usize;
        let text = String::from_utf8(r.take(text_len, "text")?.to_vec())
            .map_err(|e| SmsError::BadTransitRecord(e.to_string()))?;

        let ref_len = r.byte("ref length")?;
        let ref_id: [u8; 2] = r.array("ref id")?;
        let total_parts = r.byte("total parts")?;
        let part_index = r.byte("part index")?;
        let millis = u64::from_le_bytes(r.array("time")?);

        let concat = match ref_len {
            0 => None,
            1 | 2 => Some(ConcatInfo {
                ref_len,
                ref_id,
                total_parts,
                part_index,
            }),
            n => return Err(SmsError::BadRefLen(n)),
        };

        Ok(Message {
            src,
            dst,
            text,
            time: UNIX_EPOCH + Duration::from_millis(millis),
            concat,
        })
    }
}

/// Bounds-checked reader over the transit record.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], SmsError> {
        if self.buf.len() - self.pos < n {
            return Err(SmsError::BadTransitRecord(format!("truncated at {field}")));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn byte(&mut self, field: &'static str) -> Result<u8, SmsError> {
        Ok(self.take(1, field)?[0])
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], SmsError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_short_text_is_single() {
        let msgs = Message::split(1, 2, &"x".repeat(159));
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].concat.is_none());
    }

    #[test]
    fn test_split_long_text() {
        let text = "y".repeat(400);
        let msgs = Message::split(1, 2, &text);
        assert_eq!(msgs.len(), 3);
        let first = msgs[0].concat.unwrap();
        assert_eq!(first.total_parts, 3);
        for (i, m) in msgs.iter().enumerate() {
            let c = m.concat.unwrap();
            assert_eq!(c.ref_len, 2);
            assert_eq!(c.ref_id, first.ref_id);
            assert_eq!(c.part_index, i as u8 + 1);
        }
        let joined: String = msgs.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_split_boundary_at_160() {
        let msgs = Message::split(1, 2, &"z".repeat(160));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].text.len(), 152);
        assert_eq!(msgs[1].text.len(), 8);
    }

    #[test]
    fn test_transit_roundtrip() {
        let mut msg = Message::single(1234567, 8675309, "around the cluster");
        msg.concat = Some(ConcatInfo {
            ref_len: 2,
            ref_id: [0xab, 0xcd],
            total_parts: 4,
            part_index: 2,
        });
        let decoded = Message::from_raw(&msg.raw()).unwrap();
        assert_eq!(decoded.src, msg.src);
        assert_eq!(decoded.dst, msg.dst);
        assert_eq!(decoded.text, msg.text);
        assert_eq!(decoded.concat, msg.concat);
    }

    #[test]
    fn test_transit_rejects_bad_ref_len() {
        let msg = Message::single(1, 2, "hi");
        let mut buf = BASE64.decode(msg.raw()).unwrap();
        // ref_len sits right after the text bytes
        let ref_len_at = 1 + 8 + 8 + 4 + msg.text.len();
        buf[ref_len_at] = 3;
        let b64 = BASE64.encode(buf);
        assert!(matches!(Message::from_raw(&b64), Err(SmsError::BadRefLen(3))));
    }

    #[test]
    fn test_transit_rejects_garbage() {
        assert!(Message::from_raw("not base64 at all!!!").is_err());
        assert!(Message::from_raw(&BASE64.encode([1u8, 2, 3])).is_err());
    }
}

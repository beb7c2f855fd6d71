//! SMS-DELIVER/SUBMIT PDU pack and unpack.
//!
//! The wire form is the hex-encoded PDU exchanged with the guest radio
//! interface: SMSC block, PDU-type byte, nibble-swapped address, protocol and
//! coding bytes, then the user data packed 8 septets to 7 octets. Multi-part
//! segments carry a user data header (UDH) overwritten into septet-aligned
//! padding at the front of the payload.
//!
//! Packing walkthrough for "hellohello":
//!
//! ```text
//! 68 65 6c 6c 6f 68 65 6c 6c 6f
//! 68:                                    1101000
//! 65:                            110010|1
//! 6c:                    11011|00
//! 6c:            1101|100
//! 6f:    110|1111
//! ...
//! -> e8 32 9b fd 46 97 d9 ec 37
//! ```
//!
//! Each septet contributes its low bits to the previous output row and its
//! high bits to its own row; a scratch byte catches the spill of the final
//! septet and is discarded.

use crate::{ConcatInfo, Message, SmsError, MAX_SINGLE_SEPTETS};
use std::time::SystemTime;

/// Address type for national numbers.
const ADDR_TYPE_NATIONAL: u8 = 0x81;

// ============================================================================
// Septet Packing
// ============================================================================

/// Encode a message's user data: UDH (for concatenated segments) plus the
/// text packed down to septets.
pub fn encode_user_data(msg: &Message) -> Result<Vec<u8>, SmsError> {
    if !msg.text.is_ascii() {
        return Err(SmsError::BadEncoding(
            "text contains characters outside the 7-bit alphabet".into(),
        ));
    }

    // Build the UDH and prepend one zero septet per padded header septet so
    // the 7-bit stream stays octet-aligned past the header.
    let mut header: Vec<u8> = Vec::new();
    let mut septets: Vec<u8> = Vec::new();
    if let Some(c) = &msg.concat {
        match c.ref_len {
            1 => {
                header.extend_from_slice(&[0x05, 0x00, 0x03, c.ref_id[0], c.total_parts, c.part_index]);
                septets.extend_from_slice(&[0; 7]);
            }
            2 => {
                header.extend_from_slice(&[
                    0x06,
                    0x08,
                    0x04,
                    c.ref_id[0],
                    c.ref_id[1],
                    c.total_parts,
                    c.part_index,
                ]);
                septets.extend_from_slice(&[0; 8]);
            }
            n => return Err(SmsError::BadRefLen(n)),
        }
    }
    septets.extend_from_slice(msg.text.as_bytes());

    if septets.len() > MAX_SINGLE_SEPTETS {
        return Err(SmsError::TooLong(septets.len()));
    }

    // 7/8 the septet count, rounded up, plus a scratch byte discarded below.
    let length = (septets.len() * 7).div_ceil(8) + 1;
    let mut packed = vec![0u8; length];
    for (idx, &sept) in septets.iter().enumerate() {
        let row = idx - idx / 8;
        // The previous row, except on the first septet of each 8-septet
        // group, where the low bits vanish off the top anyway.
        let prevrow = row + (idx % 8 == 0) as usize - 1;
        let lsb = ((sept as u16) << (8 - idx % 8)) as u8;
        packed[prevrow] |= lsb;
        packed[row] |= sept >> (idx % 8);
    }
    packed.truncate(length - 1);

    // The packed header bytes replace the zero-septet padding verbatim.
    if !header.is_empty() {
        packed[..header.len()].copy_from_slice(&header);
    }

    Ok(packed)
}

/// Decode packed user data back into text and an optional concatenation
/// header.
///
/// `udl` is the authoritative septet count from the PDU: an unpacked tail
/// longer than it (the ambiguous all-zero eighth septet) is truncated.
pub fn decode_user_data(
    udl: u8,
    data: &[u8],
    has_udh: bool,
) -> Result<(String, Option<ConcatInfo>), SmsError> {
    if data.is_empty() {
        return Ok((String::new(), None));
    }

    let mut concat = None;
    let mut stripped: Vec<u8>;
    let mut udh_len = 0usize;
    if has_udh {
        // Length byte counts the bytes that follow it.
        udh_len = data[0] as usize;
        if data.len() < udh_len + 1 {
            return Err(SmsError::Truncated("user data header"));
        }
        match data.get(1).copied() {
            Some(0x00) if udh_len + 1 >= 6 => {
                concat = Some(ConcatInfo {
                    ref_len: 1,
                    ref_id: [data[3], 0],
                    total_parts: data[4],
                    part_index: data[5],
                });
            }
            Some(0x08) if udh_len + 1 >= 7 => {
                concat = Some(ConcatInfo {
                    ref_len: 2,
                    ref_id: [data[3], data[4]],
                    total_parts: data[5],
                    part_index: data[6],
                });
            }
            _ => {}
        }
        // Zero the header bytes so the septet expansion below stays aligned;
        // the corresponding text bytes are stripped afterwards.
        stripped = vec![0u8; udh_len + 1];
        stripped.extend_from_slice(&data[udh_len + 1..]);
    } else {
        stripped = data.to_vec();
    }

    // 8/7 the octet count plus a scratch byte for the spill of the last row.
    let length = stripped.len() * 8 / 7 + 1;
    let mut out = vec![0u8; length];
    for (i, &oct) in stripped.iter().enumerate() {
        let idx = i + i / 7;
        out[idx] |= (oct << (i % 7)) & 0x7F;
        out[idx + 1] |= oct >> (7 - i % 7);
    }
    out.truncate(length - 1);

    if has_udh {
        // Header bytes plus the one extra byte the 7-to-8 expansion grew.
        if out.len() < udh_len + 2 {
            return Err(SmsError::Truncated("user data"));
        }
        out.drain(..udh_len + 2);
    }
    if out.len() > udl as usize {
        out.truncate(udl as usize);
    }

    Ok((String::from_utf8_lossy(&out).into_owned(), concat))
}

// ============================================================================
// Address Swizzle
// ============================================================================

/// Nibble-swap a decimal digit string into packed BCD, padding odd lengths
/// with an F nibble.
pub fn swizzle(digits: &str) -> Vec<u8> {
    let mut padded: Vec<u8> = digits.bytes().collect();
    if padded.len() % 2 == 1 {
        padded.push(b'F');
    }

    padded
        .chunks(2)
        .map(|pair| (nibble(pair[1]) << 4) | nibble(pair[0]))
        .collect()
}

/// Undo [`swizzle`], dropping a trailing pad nibble if present.
pub fn unswizzle(packed: &[u8]) -> String {
    let hexed = hex::encode(packed);
    let mut digits = String::with_capacity(hexed.len());
    for pair in hexed.as_bytes().chunks(2) {
        digits.push(pair[1] as char);
        digits.push(pair[0] as char);
    }
    if digits.ends_with('f') {
        digits.pop();
    }
    digits
}

fn nibble(c: u8) -> u8 {
    match c {
        b'F' | b'f' => 0xF,
        _ => c.wrapping_sub(b'0') & 0xF,
    }
}

// ============================================================================
// PDU Pack / Unpack
// ============================================================================

/// Pack a message into the hex PDU delivered to the guest.
///
/// The frame is SMS-DELIVER shaped: zero-length SMSC (the host is the
/// service center), UDHI set for concatenated segments, national sender
/// address, 7-bit coding, and a blank timestamp.
pub fn pack(msg: &Message) -> Result<String, SmsError> {
    let pdu_type: u8 = if msg.concat.is_some() { 0x40 } else { 0x00 };

    let sender = msg.src.to_string();
    let user_data = encode_user_data(msg)?;
    // In septets, counting the padded header septets, not packed octets.
    let udl = (msg.text.len() + msg.udh_pad_septets()) as u8;

    let mut bytes = Vec::with_capacity(16 + user_data.len());
    bytes.push(0x00); // no SMSC, the host is the center
    bytes.push(pdu_type);
    bytes.push(sender.len() as u8);
    bytes.push(ADDR_TYPE_NATIONAL);
    bytes.extend_from_slice(&swizzle(&sender));
    bytes.push(0x00); // protocol id: SMS
    bytes.push(0x00); // coding: 7-bit default alphabet
    bytes.extend_from_slice(&[0; 7]); // blank timestamp
    bytes.push(udl);
    bytes.extend_from_slice(&user_data);

    Ok(hex::encode(bytes))
}

/// Unpack a hex PDU into a [`Message`].
///
/// Accepts both directions of the protocol: an SMS-SUBMIT from the guest
/// fills the destination field, an SMS-DELIVER fills the sender.
pub fn unpack(pdu: &str) -> Result<Message, SmsError> {
    let bytes = hex::decode(pdu.trim()).map_err(|e| SmsError::BadEncoding(e.to_string()))?;
    let mut r = Pdu { buf: &bytes, pos: 0 };

    // SMSC length counts the type-of-address byte plus the packed number.
    let smsc_len = r.byte("SMSC length")? as usize;
    r.take(smsc_len, "SMSC")?;

    let pdu_type = r.byte("PDU type")?;
    if pdu_type & 0x01 != 0 {
        // SMS-SUBMIT carries a message reference we have no use for.
        r.byte("message reference")?;
    }

    let addr_digits = r.byte("address length")? as usize;
    r.byte("address type")?;
    let addr = r.take(addr_digits.div_ceil(2), "address")?;
    let number: i64 = unswizzle(addr)
        .parse()
        .map_err(|_| SmsError::BadAddress(unswizzle(addr)))?;

    r.byte("protocol id")?;
    let coding = r.byte("coding scheme")?;
    if coding != 0 {
        return Err(SmsError::UnsupportedCoding(coding));
    }

    if pdu_type & 0x03 == 0x00 {
        r.take(7, "timestamp")?;
    }
    if pdu_type & 0x10 != 0 {
        r.byte("validity period")?;
    }

    let udl = r.byte("user data length")?;
    let (text, concat) = decode_user_data(udl, r.rest(), pdu_type & 0x40 != 0)?;

    let mut msg = Message {
        src: 0,
        dst: 0,
        text,
        time: SystemTime::now(),
        concat,
    };
    match pdu_type & 0x03 {
        0x00 => msg.src = number,
        0x01 => msg.dst = number,
        _ => {}
    }
    Ok(msg)
}

/// Bounds-checked cursor over the raw PDU bytes.
struct Pdu<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Pdu<'a> {
    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], SmsError> {
        if self.buf.len() - self.pos < n {
            return Err(SmsError::Truncated(field));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn byte(&mut self, field: &'static str) -> Result<u8, SmsError> {
        Ok(self.take(1, field)?[0])
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: i64 = 1234567;
    const DST: i64 = 7654321;

    /// A known SMS-SUBMIT vector: "testing1234567890" to 867-5309.
    const JENNY_PDU: &str = "0001000781685703f9000011f4f29c9e769f63b219ad66bbe17230";

    #[test]
    fn test_unpack_known_vector() {
        let msg = unpack(JENNY_PDU).unwrap();
        assert_eq!(msg.dst, 8675309);
        assert_eq!(msg.text, "testing1234567890");
    }

    #[test]
    fn test_pack_hellohello_user_data() {
        let msg = Message::single(12, 34, "hellohello");
        let packed = encode_user_data(&msg).unwrap();
        assert_eq!(hex::encode(packed), "e8329bfd4697d9ec37");
    }

    #[test]
    fn test_single_roundtrip_all_lengths() {
        // One message per alignment position across the septet window, plus
        // punctuation-heavy and near-limit cases.
        let mut messages: Vec<String> = (0..26)
            .map(|i| {
                let c = (b'a' + i as u8) as char;
                std::iter::repeat(c).take(i).collect()
            })
            .collect();
        messages.push("abcdefghijklmno  pqrst uvwxy z/*2'\"^!@#%^&_+)39(".into());
        messages.push("q".repeat(159));

        for text in &messages {
            let msg = Message::single(SRC, DST, text.clone());
            let pdu = pack(&msg).unwrap();
            let back = unpack(&pdu).unwrap();
            assert_eq!(&back.text, text, "roundtrip failed for len {}", text.len());
            assert_eq!(back.src, SRC);
            assert!(back.concat.is_none());
        }
    }

    #[test]
    fn test_multipart_roundtrip() {
        for len in [160usize, 200, 304, 400, 1111, 1600] {
            let text: String = (0..len).map(|i| (b'a' + (i % 26) as u8) as char).collect();
            let parts = Message::split(SRC, DST, &text);
            assert_eq!(parts.len(), len.div_ceil(152));

            let mut rebuilt = String::new();
            let mut ref_ids = Vec::new();
            for (i, part) in parts.iter().enumerate() {
                let back = unpack(&pack(part).unwrap()).unwrap();
                let c = back.concat.expect("segment lost its concat header");
                assert_eq!(c.part_index as usize, i + 1);
                assert_eq!(c.total_parts as usize, parts.len());
                ref_ids.push(c.ref_id);
                rebuilt.push_str(&back.text);
            }
            assert!(ref_ids.windows(2).all(|w| w[0] == w[1]));
            assert_eq!(rebuilt, text, "multi-part rebuild failed for len {len}");
        }
    }

    #[test]
    fn test_eight_bit_ref_roundtrip() {
        let mut msg = Message::single(SRC, DST, "legacy reference width");
        msg.concat = Some(ConcatInfo {
            ref_len: 1,
            ref_id: [0x42, 0],
            total_parts: 3,
            part_index: 2,
        });
        let back = unpack(&pack(&msg).unwrap()).unwrap();
        let c = back.concat.unwrap();
        assert_eq!(c.ref_len, 1);
        assert_eq!(c.ref_id, [0x42, 0]);
        assert_eq!(c.total_parts, 3);
        assert_eq!(c.part_index, 2);
        assert_eq!(back.text, msg.text);
    }

    #[test]
    fn test_pack_too_long() {
        let msg = Message::single(SRC, DST, "v".repeat(161));
        assert!(matches!(pack(&msg), Err(SmsError::TooLong(161))));

        let mut seg = Message::single(SRC, DST, "w".repeat(153));
        seg.concat = Some(ConcatInfo {
            ref_len: 2,
            ref_id: [0, 1],
            total_parts: 2,
            part_index: 1,
        });
        assert!(matches!(pack(&seg), Err(SmsError::TooLong(161))));
    }

    #[test]
    fn test_pack_rejects_non_ascii() {
        let msg = Message::single(SRC, DST, "smörgåsbord");
        assert!(matches!(pack(&msg), Err(SmsError::BadEncoding(_))));
    }

    #[test]
    fn test_unpack_truncated() {
        assert!(matches!(unpack("0001"), Err(SmsError::Truncated(_))));
        assert!(matches!(unpack("zz"), Err(SmsError::BadEncoding(_))));
    }

    #[test]
    fn test_unpack_rejects_ucs2() {
        // Same as the known vector but with coding scheme 0x08 (UCS-2).
        let pdu = "0001000781685703f9000811f4f29c9e769f63b219ad66bbe17230";
        assert!(matches!(unpack(pdu), Err(SmsError::UnsupportedCoding(0x08))));
    }

    #[test]
    fn test_swizzle_roundtrip() {
        assert_eq!(unswizzle(&swizzle("8675309")), "8675309");
        assert_eq!(unswizzle(&swizzle("12345678")), "12345678");
        assert_eq!(hex::encode(swizzle("8675309")), "685703f9");
    }

    #[test]
    fn test_empty_message() {
        let msg = Message::single(SRC, DST, "");
        let back = unpack(&pack(&msg).unwrap()).unwrap();
        assert_eq!(back.text, "");
    }
}

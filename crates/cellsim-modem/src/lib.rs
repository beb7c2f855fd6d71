//! # cellsim-modem
//!
//! GSM modem state machine for emulated mobile devices.
//!
//! The modem sits on the guest's radio serial port and speaks the AT dialect
//! the guest's telephony stack expects during boot and operation:
//!
//! - **Queries** (`AT+XXX?`) report current parameter values
//! - **Assignments** (`AT+XXX=a,b`) update modem state
//! - **Other** commands (`AT+CGSN`) return canned identity values
//!
//! A command line may carry several `;`-separated subcommands; their
//! responses are concatenated and the aggregate ends in `OK` only when no
//! subcommand raised an error. Unsolicited registration events and inbound
//! SMS frames share the guest socket with synchronous replies, so every
//! write goes through one mutex-guarded writer and frames never interleave.

mod sim;

use gsm_sms::{codec, Message, SmsError};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Constants
// ============================================================================

/// Terminator of a successful aggregate reply.
const MSG_OK: &str = "\r\nOK\r\n";

/// Ctrl-Z, ending the PDU entry that follows a CMGS prompt.
const CTRL_Z: u8 = 0x1a;

/// Interval between unsolicited-registration checks.
const REGISTRATION_TICK: Duration = Duration::from_secs(10);

/// Location area / cell id pair reported for the emulated tower.
const TOWER: (&str, &str) = ("036D", "58B2");

// ============================================================================
// Errors
// ============================================================================

/// Errors produced by the modem.
#[derive(Debug, Error)]
pub enum ModemError {
    /// An inbound message could not be packed for delivery to the guest.
    #[error("failed to pack SMS: {0}")]
    Pack(#[from] SmsError),

    /// The guest socket failed.
    #[error("modem transport: {0}")]
    Transport(#[from] std::io::Error),
}

// ============================================================================
// Modem State
// ============================================================================

/// Mutable AT-parameter state.
#[derive(Debug)]
struct Status {
    /// COPS `<mode>`: operator selection status.
    reg_status: i64,
    /// COPS `<format>`: rendering of the operator name.
    reg_format: i64,
    /// Stored SIM PIN.
    pin: i64,
    /// CREG unsolicited-reporting mode.
    creg: i64,
    /// CGREG unsolicited-reporting mode.
    cgreg: i64,
    /// 0 = PDU-mode SMS, 1 = text mode.
    cmgf: i64,
    /// Cyclic message reference for CMGS acknowledgements.
    mr: u8,
}

impl Default for Status {
    fn default() -> Self {
        Status {
            reg_status: 0,
            reg_format: 2,
            pin: 0,
            creg: 0,
            cgreg: 0,
            cmgf: 0,
            mr: 0,
        }
    }
}

type GuestWriter = Arc<Mutex<BufWriter<UnixStream>>>;

/// The modem bound to one guest serial socket.
pub struct Modem {
    number: i64,
    stream: UnixStream,
    writer: GuestWriter,
    status: Arc<Mutex<Status>>,
    inbox: Mutex<Vec<Message>>,
    outbox: Mutex<Vec<Message>>,
    /// Taken on close so the downstream postman sees the channel end.
    outbound: Mutex<Option<Sender<Message>>>,
    ticker_stops: Mutex<Vec<Sender<()>>>,
    ticker_starts: Mutex<Vec<Receiver<()>>>,
}

impl Modem {
    /// Create a modem over an already-connected guest socket.
    ///
    /// Messages the guest sends with CMGS are handed off on `outbound` for
    /// cluster delivery.
    pub fn new(
        number: i64,
        stream: UnixStream,
        outbound: Sender<Message>,
    ) -> Result<Self, ModemError> {
        let writer = Arc::new(Mutex::new(BufWriter::new(stream.try_clone()?)));

        let mut stops = Vec::new();
        let mut starts = Vec::new();
        for _ in 0..2 {
            let (tx, rx) = std::sync::mpsc::channel();
            stops.push(tx);
            starts.push(rx);
        }

        Ok(Modem {
            number,
            stream,
            writer,
            status: Arc::new(Mutex::new(Status::default())),
            inbox: Mutex::new(Vec::new()),
            outbox: Mutex::new(Vec::new()),
            outbound: Mutex::new(Some(outbound)),
            ticker_stops: Mutex::new(stops),
            ticker_starts: Mutex::new(starts),
        })
    }

    /// The phone number assigned to this modem.
    pub fn number(&self) -> i64 {
        self.number
    }

    /// Snapshot of messages delivered to the guest.
    pub fn inbox(&self) -> Vec<Message> {
        self.inbox.lock().clone()
    }

    /// Snapshot of messages the guest has sent.
    pub fn outbox(&self) -> Vec<Message> {
        self.outbox.lock().clone()
    }

    /// Drop all recorded message history.
    pub fn clear_history(&self) {
        self.inbox.lock().clear();
        self.outbox.lock().clear();
    }

    /// Take a PDU from the tower side and deliver it to the guest's inbox
    /// as an unsolicited `+CMT` frame.
    pub fn push_sms(&self, msg: Message) -> Result<(), ModemError> {
        let pdu = codec::pack(&msg)?;
        self.inbox.lock().push(msg);
        write_guest(&self.writer, &format!("\r\n+CMT: 0\r\n{pdu}\r\n"))?;
        Ok(())
    }

    /// Stop the modem: the registration tickers exit at their next tick, the
    /// blocked command reader unblocks via socket shutdown, and dropping the
    /// outbound sender lets the postman drain out.
    pub fn close(&self) {
        for stop in self.ticker_stops.lock().drain(..) {
            let _ = stop.send(());
        }
        self.outbound.lock().take();
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    /// Command-processing loop. Blocks until the guest closes the socket or
    /// [`Modem::close`] shuts it down; both exit cleanly.
    pub fn run(&self) -> Result<(), ModemError> {
        self.spawn_registration_tickers();

        let mut reader = BufReader::new(self.stream.try_clone()?);
        loop {
            let mut raw = Vec::new();
            if reader.read_until(b'\r', &mut raw)? == 0 {
                debug!("Modem[{}]: guest closed the serial socket", self.number);
                return Ok(());
            }

            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_matches(['\r', '\n']);
            if line.len() <= 1 {
                continue;
            }
            debug!("Modem[{}]: < {}", self.number, line);

            let mut out = String::new();
            let mut was_error = false;
            for sub in line.split(';') {
                metrics::counter!("cellsim.modem.commands").increment(1);
                let (resp, err) = self.handle_subcommand(sub, &mut reader)?;
                out.push_str(&resp);
                was_error |= err;
            }
            if !was_error {
                out.push_str(MSG_OK);
            }

            debug!("Modem[{}]: > {:?}", self.number, out);
            write_guest(&self.writer, &out)?;
        }
    }

    // ========================================================================
    // Command Dispatch
    // ========================================================================

    /// Handle one `;`-separated subcommand, returning its response text and
    /// whether it raised an error (which suppresses the trailing OK).
    fn handle_subcommand(
        &self,
        sub: &str,
        reader: &mut BufReader<UnixStream>,
    ) -> Result<(String, bool), ModemError> {
        let cmd = normalize(sub);
        if cmd.ends_with('?') {
            Ok(self.parse_query(cmd))
        } else if cmd.contains('=') {
            self.parse_assignment(cmd, reader)
        } else {
            Ok(other_command(cmd))
        }
    }

    fn parse_query(&self, cmd: &str) -> (String, bool) {
        let status = self.status.lock();
        let ret = match cmd {
            "CFUN?" => "\r\n+CFUN: 1\r\n".to_string(),
            "CPIN?" => "\r\n+CPIN: READY\r\n".to_string(),
            "CGREG?" => format!("\r\n+CGREG: {},1\r\n", status.cgreg),
            "CREG?" => format!(
                "\r\n+CREG: {},1,\"{}\",\"{}\"\r\n",
                status.creg, TOWER.0, TOWER.1
            ),
            "COPS?" => {
                let name = match status.reg_format {
                    0 => "\"CellSim Network\"",
                    1 => "\"CELLSIM\"",
                    _ => "\"00101\"",
                };
                format!(
                    "\r\n+COPS: {},{},{}\r\n",
                    status.reg_status, status.reg_format, name
                )
            }
            _ => String::new(),
        };
        (ret, false)
    }

    fn parse_assignment(
        &self,
        cmd: &str,
        reader: &mut BufReader<UnixStream>,
    ) -> Result<(String, bool), ModemError> {
        let (name, arg_str) = match cmd.split_once('=') {
            Some(pair) => pair,
            None => return Ok((String::new(), false)),
        };
        let args: Vec<&str> = arg_str.split(',').collect();
        let first: i64 = args[0].trim().parse().unwrap_or(0);

        let mut ret = String::new();
        let mut was_error = false;
        match name {
            "CGREG" => {
                self.status.lock().cgreg = first;
                ret = format!("\r\n+CGREG: {}\r\n", args[0]);
            }
            "CREG" => self.status.lock().creg = first,
            "CPIN" => {
                let mut status = self.status.lock();
                status.pin = first;
                debug!("Modem[{}]: SIM PIN set to {}", self.number, status.pin);
            }
            "CMGF" => self.status.lock().cmgf = first,
            "COPS" => {
                let mut status = self.status.lock();
                if first == 3 {
                    if let Some(fmt) = args.get(1) {
                        status.reg_format = fmt.trim().parse().unwrap_or(status.reg_format);
                    }
                } else if first == 0 || first == 1 {
                    status.reg_status = first;
                }
            }
            "CRSM" => match sim::crsm_response(arg_str) {
                Some(resp) => ret = format!("\r\n{resp}\r\n"),
                None => {
                    ret = "\r\n+CME ERROR: BAD COMMAND\r\n".to_string();
                    was_error = true;
                }
            },
            "CSMS" => ret = "\r\n+CSMS: 1,1,1\r\n".to_string(),
            "CMGS" => return self.receive_outgoing_sms(reader),
            _ => {}
        }

        Ok((ret, was_error))
    }

    /// CMGS: prompt the guest, read a PDU up to Ctrl-Z, and queue the
    /// message for cluster delivery.
    ///
    /// The prompt read has no deadline; a guest that never completes the
    /// exchange holds this command reader until the socket closes.
    fn receive_outgoing_sms(
        &self,
        reader: &mut BufReader<UnixStream>,
    ) -> Result<(String, bool), ModemError> {
        if self.status.lock().cmgf == 1 {
            return Ok(("\r\n+CME ERROR: NOT SUPPORTED\r\n".to_string(), true));
        }

        write_guest(&self.writer, "\r\n> ")?;

        let mut entry = Vec::new();
        if reader.read_until(CTRL_Z, &mut entry)? == 0 {
            return Err(ModemError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "guest closed the socket during SMS entry",
            )));
        }
        entry.pop(); // the Ctrl-Z itself

        let mr = {
            let mut status = self.status.lock();
            let mr = status.mr;
            status.mr = status.mr.wrapping_add(1);
            mr
        };

        match codec::unpack(String::from_utf8_lossy(&entry).trim()) {
            Ok(mut msg) => {
                msg.src = self.number;
                debug!("Modem[{}]: new SMS to {}: {}", self.number, msg.dst, msg.text);
                metrics::counter!("cellsim.sms.sent").increment(1);
                self.outbox.lock().push(msg.clone());
                let delivered = match &*self.outbound.lock() {
                    Some(tx) => tx.send(msg).is_ok(),
                    None => false,
                };
                if !delivered {
                    warn!("Modem[{}]: outbound channel closed, dropping SMS", self.number);
                }
            }
            Err(err) => {
                warn!("Modem[{}]: SMS PDU did not unpack: {}", self.number, err);
            }
        }

        Ok((format!("\r\n+CMGS: {mr}\r\n"), false))
    }

    // ========================================================================
    // Unsolicited Registration Events
    // ========================================================================

    fn spawn_registration_tickers(&self) {
        let mut starts = self.ticker_starts.lock();
        let (cgreg_rx, creg_rx) = match (starts.pop(), starts.pop()) {
            (Some(a), Some(b)) => (a, b),
            // run() was called twice; the tickers are already out.
            _ => return,
        };
        drop(starts);

        let creg_frame = format!("\r\n+CREG: 1,\"{}\",\"{}\"\r\n{}", TOWER.0, TOWER.1, MSG_OK);
        spawn_ticker(
            self.status.clone(),
            self.writer.clone(),
            creg_rx,
            |s| s.creg,
            2,
            creg_frame,
        );
        spawn_ticker(
            self.status.clone(),
            self.writer.clone(),
            cgreg_rx,
            |s| s.cgreg,
            1,
            format!("\r\n+CGREG: 1\r\n{MSG_OK}"),
        );
    }
}

/// Emit `frame` once each time the watched reporting mode transitions to
/// `target`, checking every tick. Exits when the stop channel fires or its
/// sender is dropped.
fn spawn_ticker(
    status: Arc<Mutex<Status>>,
    writer: GuestWriter,
    stop: Receiver<()>,
    field: fn(&Status) -> i64,
    target: i64,
    frame: String,
) {
    thread::spawn(move || {
        let mut last = 0;
        loop {
            match stop.recv_timeout(REGISTRATION_TICK) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }
            let current = field(&status.lock());
            if current != last && current == target {
                if write_guest(&writer, &frame).is_err() {
                    return;
                }
                last = current;
            }
        }
    });
}

// ============================================================================
// Helpers
// ============================================================================

/// Serialize a write to the guest so unsolicited frames never interleave
/// with synchronous replies.
fn write_guest(writer: &Mutex<BufWriter<UnixStream>>, s: &str) -> std::io::Result<()> {
    let mut w = writer.lock();
    w.write_all(s.as_bytes())?;
    w.flush()
}

/// Strip the `AT+` prefix, or a bare leading `+`.
fn normalize(sub: &str) -> &str {
    if let Some(rest) = sub.strip_prefix("AT+") {
        rest
    } else {
        sub.strip_prefix('+').unwrap_or(sub)
    }
}

/// Commands that are neither queries nor assignments: canned identity values.
fn other_command(cmd: &str) -> (String, bool) {
    let ret = match cmd {
        // IMEI
        "CGSN" => "\r\n135790248939\r\n",
        // MCC + MNC + subscriber id
        "CIMI" => "\r\n001011234567890\r\n",
        // signal quality
        "CSQ" => "\r\n+CSQ: 31.99\r\n",
        _ => "",
    };
    (ret.to_string(), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::mpsc;
    use std::time::Instant;

    /// Read from the guest side until `pattern` shows up or two seconds pass.
    fn read_until_match(guest: &mut UnixStream, pattern: &str) -> String {
        guest
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        let mut collected = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            let mut buf = [0u8; 4096];
            match guest.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
                Err(_) => {}
            }
            if String::from_utf8_lossy(&collected).contains(pattern) {
                break;
            }
        }
        String::from_utf8_lossy(&collected).into_owned()
    }

    fn start_modem(number: i64) -> (Arc<Modem>, UnixStream, mpsc::Receiver<Message>) {
        let (modem_side, guest_side) = UnixStream::pair().unwrap();
        let (tx, rx) = mpsc::channel();
        let modem = Arc::new(Modem::new(number, modem_side, tx).unwrap());
        let runner = modem.clone();
        thread::spawn(move || {
            let _ = runner.run();
        });
        (modem, guest_side, rx)
    }

    #[test]
    fn test_query_commands() {
        let (modem, mut guest, _rx) = start_modem(1234567);

        guest.write_all(b"AT+CFUN?\r").unwrap();
        let resp = read_until_match(&mut guest, "OK");
        assert!(resp.contains("+CFUN: 1"), "{resp:?}");
        assert!(resp.ends_with("\r\nOK\r\n"), "{resp:?}");

        guest.write_all(b"AT+COPS?\r").unwrap();
        let resp = read_until_match(&mut guest, "OK");
        assert!(resp.contains("+COPS: 0,2,\"00101\""), "{resp:?}");

        modem.close();
    }

    #[test]
    fn test_subcommand_aggregation() {
        let (modem, mut guest, _rx) = start_modem(1234567);

        guest.write_all(b"AT+CGSN;+CIMI\r").unwrap();
        let resp = read_until_match(&mut guest, "OK");
        assert!(resp.contains("135790248939"), "{resp:?}");
        assert!(resp.contains("001011234567890"), "{resp:?}");
        assert_eq!(resp.matches("OK").count(), 1, "{resp:?}");

        modem.close();
    }

    #[test]
    fn test_crsm_table_and_bad_command() {
        let (modem, mut guest, _rx) = start_modem(1234567);

        guest.write_all(b"AT+CRSM=176,28436,0,0,20\r").unwrap();
        let resp = read_until_match(&mut guest, "OK");
        assert!(
            resp.contains("+CRSM: 144,0,416e64726f6964"),
            "{resp:?}"
        );

        guest.write_all(b"AT+CRSM=242,0,0,0,0\r").unwrap();
        let resp = read_until_match(&mut guest, "BAD COMMAND");
        assert!(resp.contains("+CME ERROR: BAD COMMAND"), "{resp:?}");
        assert!(!resp.contains("OK"), "error reply must suppress OK: {resp:?}");

        modem.close();
    }

    #[test]
    fn test_cmgs_roundtrip() {
        let (modem, mut guest, rx) = start_modem(5551234);

        guest.write_all(b"AT+CMGS=24\r").unwrap();
        let prompt = read_until_match(&mut guest, "> ");
        assert!(prompt.contains("> "), "{prompt:?}");

        // An SMS-SUBMIT of "testing1234567890" to 8675309.
        guest
            .write_all(b"0001000781685703f9000011f4f29c9e769f63b219ad66bbe17230\x1a")
            .unwrap();
        let resp = read_until_match(&mut guest, "+CMGS");
        assert!(resp.contains("+CMGS: 0"), "{resp:?}");

        let sent = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(sent.src, 5551234, "modem must stamp its own number");
        assert_eq!(sent.dst, 8675309);
        assert_eq!(sent.text, "testing1234567890");
        assert_eq!(modem.outbox().len(), 1);

        // The reference is cyclic: a second send gets 1.
        guest.write_all(b"AT+CMGS=24\r").unwrap();
        read_until_match(&mut guest, "> ");
        guest
            .write_all(b"0001000781685703f9000011f4f29c9e769f63b219ad66bbe17230\x1a")
            .unwrap();
        let resp = read_until_match(&mut guest, "+CMGS");
        assert!(resp.contains("+CMGS: 1"), "{resp:?}");

        modem.close();
    }

    #[test]
    fn test_cmgs_text_mode_not_supported() {
        let (modem, mut guest, _rx) = start_modem(5551234);

        guest.write_all(b"AT+CMGF=1\r").unwrap();
        read_until_match(&mut guest, "OK");
        guest.write_all(b"AT+CMGS=\"8675309\"\r").unwrap();
        let resp = read_until_match(&mut guest, "NOT SUPPORTED");
        assert!(resp.contains("+CME ERROR: NOT SUPPORTED"), "{resp:?}");

        modem.close();
    }

    #[test]
    fn test_multipart_delivery_in_order() {
        let (modem, mut guest, _rx) = start_modem(1234567);

        let text: String = (0..400).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        for msg in Message::split(8675309, 1234567, &text) {
            modem.push_sms(msg).unwrap();
        }

        guest
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        let mut collected = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            let mut buf = [0u8; 4096];
            match guest.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
                Err(_) => {}
            }
            let s = String::from_utf8_lossy(&collected);
            if s.matches("+CMT: 0").count() >= 3 && s.ends_with("\r\n") {
                break;
            }
        }
        let mut raw = String::from_utf8_lossy(&collected).into_owned();

        // Three +CMT frames, each a header line and a PDU line.
        let mut parts = Vec::new();
        while let Some(at) = raw.find("\r\n+CMT: 0\r\n") {
            let rest = &raw[at + "\r\n+CMT: 0\r\n".len()..];
            let end = rest.find("\r\n").unwrap();
            let msg = codec::unpack(&rest[..end]).unwrap();
            parts.push(msg);
            raw = rest[end..].to_string();
        }
        assert_eq!(parts.len(), 3);
        for (i, part) in parts.iter().enumerate() {
            let c = part.concat.expect("multi-part frame lost its header");
            assert_eq!(c.part_index as usize, i + 1, "frames out of order");
            assert_eq!(c.total_parts, 3);
        }
        let rebuilt: String = parts.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(rebuilt, text);
        assert_eq!(modem.inbox().len(), 3);

        modem.close();
    }

    #[test]
    fn test_close_unblocks_reader() {
        let (modem_side, _guest_side) = UnixStream::pair().unwrap();
        let (tx, _rx) = mpsc::channel();
        let modem = Arc::new(Modem::new(42, modem_side, tx).unwrap());
        let runner = modem.clone();
        let handle = thread::spawn(move || runner.run());

        thread::sleep(Duration::from_millis(50));
        modem.close();
        let _ = handle.join().expect("reader thread must exit after close");
    }
}

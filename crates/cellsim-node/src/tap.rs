//! SMS host taps.
//!
//! A tap claims an inclusive number range and appends one line per message
//! delivered into that range, whether or not a device also received it.
//! Taps are how host-side tooling observes SMS traffic without a VM.

use crate::error::NodeError;
use gsm_sms::Message;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// An appendable sink for messages addressed into `[low, high]`.
#[derive(Debug)]
pub struct SmsTap {
    low: i64,
    high: i64,
    path: PathBuf,
    output: Mutex<BufWriter<File>>,
}

impl SmsTap {
    /// Create the tap file and claim the range.
    pub fn create(low: i64, high: i64, path: &Path) -> Result<Self, NodeError> {
        let file = File::create(path)?;
        Ok(SmsTap {
            low,
            high,
            path: path.to_path_buf(),
            output: Mutex::new(BufWriter::new(file)),
        })
    }

    /// The file this tap appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The low end of the claimed range.
    pub fn low(&self) -> i64 {
        self.low
    }

    /// The high end of the claimed range.
    pub fn high(&self) -> i64 {
        self.high
    }

    /// Whether a destination number falls inside the claimed range.
    pub fn matches(&self, number: i64) -> bool {
        self.low <= number && number <= self.high
    }

    /// Append one line for a message that arrived in canonical form,
    /// including its concatenation position.
    pub fn record(&self, msg: &Message) -> std::io::Result<()> {
        let (part, total) = match &msg.concat {
            Some(c) => (c.part_index, c.total_parts),
            None => (0, 0),
        };
        let mut out = self.output.lock();
        writeln!(
            out,
            "{} -> {}\t{} of {}\t{}",
            msg.src, msg.dst, part, total, msg.text
        )?;
        out.flush()
    }

    /// Append one line for a locally composed text.
    pub fn record_plain(&self, from: i64, to: i64, text: &str) -> std::io::Result<()> {
        let mut out = self.output.lock();
        writeln!(out, "{} -> {} \t{}", from, to, text)?;
        out.flush()
    }
}

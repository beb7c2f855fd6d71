//! Phone-number allocation.
//!
//! Every device gets a 10-digit number drawn from its configured prefix
//! block. A prefix of width w leaves 10-w digits of counter space; a
//! full-width prefix names exactly one number. Blocks must not overlap, so
//! one prefix may not be a leading substring of another.

use crate::error::NodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic source of allocation ids, starting at 0.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// A fresh counter at zero.
    pub fn new() -> Self {
        Counter(AtomicU64::new(0))
    }

    /// Take the next id.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// A telephone-number prefix of 0-10 decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumberPrefix {
    /// No prefix: the counter spans the whole 10-digit space.
    None,
    /// A fixed leading digit block.
    Digits(u64),
}

impl NumberPrefix {
    /// Number of decimal digits the prefix occupies.
    pub fn width(&self) -> u32 {
        match self {
            NumberPrefix::None => 0,
            NumberPrefix::Digits(p) => digit_width(*p),
        }
    }

    /// Allocate the next number in this prefix's block.
    ///
    /// A full 10-digit prefix names one number and allocates it exactly
    /// once; afterwards, and whenever the counter id outgrows the remaining
    /// digit space, allocation fails with [`NodeError::OutOfNumbers`].
    pub fn next(&self, counter: &Counter) -> Result<i64, NodeError> {
        let id = counter.next();
        let prefix_width = self.width();

        if prefix_width == 10 {
            return match (self, id) {
                (NumberPrefix::Digits(p), 0) => Ok(*p as i64),
                _ => Err(NodeError::OutOfNumbers),
            };
        }

        let id_width = digit_width(id).max(1);
        if id_width + prefix_width > 10 {
            return Err(NodeError::OutOfNumbers);
        }

        let base = match self {
            NumberPrefix::None => 0,
            NumberPrefix::Digits(p) => *p,
        };
        Ok((base * 10u64.pow(10 - prefix_width) + id) as i64)
    }

    /// The prefix as its bare digit string (empty for [`NumberPrefix::None`]).
    pub fn digits(&self) -> String {
        match self {
            NumberPrefix::None => String::new(),
            NumberPrefix::Digits(p) => p.to_string(),
        }
    }

    /// True when the two prefixes allocate from overlapping number blocks,
    /// which happens exactly when one digit string leads the other.
    pub fn overlaps(&self, other: &NumberPrefix) -> bool {
        let a = self.digits();
        let b = other.digits();
        a.starts_with(&b) || b.starts_with(&a)
    }
}

impl fmt::Display for NumberPrefix {
    /// Pad with X to the full 10-digit width, e.g. `223344XXXX`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.digits();
        write!(f, "{}{}", digits, "X".repeat(10 - digits.len()))
    }
}

impl FromStr for NumberPrefix {
    type Err = NodeError;

    /// The empty string and the legacy `-1` sentinel both mean "no prefix".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "-1" {
            return Ok(NumberPrefix::None);
        }
        if s.len() > 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NodeError::BadPrefix(s.to_string()));
        }
        s.parse()
            .map(NumberPrefix::Digits)
            .map_err(|_| NodeError::BadPrefix(s.to_string()))
    }
}

fn digit_width(mut v: u64) -> u32 {
    let mut width = 0;
    while v > 0 {
        width += 1;
        v /= 10;
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_six_digit_prefix_block() {
        let prefix: NumberPrefix = "123456".parse().unwrap();
        let counter = Counter::new();

        for i in 0..10_000 {
            let n = prefix.next(&counter).unwrap();
            assert_eq!(n, 1_234_560_000 + i as i64);
        }
        assert!(matches!(
            prefix.next(&counter),
            Err(NodeError::OutOfNumbers)
        ));
    }

    #[test]
    fn test_eight_digit_prefix_block() {
        let prefix: NumberPrefix = "12345678".parse().unwrap();
        let counter = Counter::new();
        for i in 0..100 {
            assert_eq!(prefix.next(&counter).unwrap(), 1_234_567_800 + i as i64);
        }
        assert!(prefix.next(&counter).is_err());
    }

    #[test]
    fn test_full_width_prefix_allocates_once() {
        let prefix: NumberPrefix = "1234567890".parse().unwrap();
        let counter = Counter::new();
        assert_eq!(prefix.next(&counter).unwrap(), 1_234_567_890);
        assert!(matches!(
            prefix.next(&counter),
            Err(NodeError::OutOfNumbers)
        ));
    }

    #[test]
    fn test_unprefixed_allocation() {
        let prefix = NumberPrefix::None;
        let counter = Counter::new();
        assert_eq!(prefix.next(&counter).unwrap(), 0);
        assert_eq!(prefix.next(&counter).unwrap(), 1);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("".parse::<NumberPrefix>().unwrap(), NumberPrefix::None);
        assert_eq!("-1".parse::<NumberPrefix>().unwrap(), NumberPrefix::None);
        assert_eq!(
            "223344".parse::<NumberPrefix>().unwrap(),
            NumberPrefix::Digits(223344)
        );
        assert!("22b3".parse::<NumberPrefix>().is_err());
        assert!("12345678901".parse::<NumberPrefix>().is_err());

        assert_eq!(NumberPrefix::Digits(223344).to_string(), "223344XXXX");
        assert_eq!(NumberPrefix::None.to_string(), "XXXXXXXXXX");
    }

    #[test]
    fn test_overlap_detection() {
        let a: NumberPrefix = "223344".parse().unwrap();
        let b: NumberPrefix = "22334".parse().unwrap();
        let c: NumberPrefix = "223345".parse().unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(NumberPrefix::None.overlaps(&a));
    }
}

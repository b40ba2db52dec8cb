//! Byte sizes with unit parsing and display.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// A memory size stored in bytes.
///
/// Parses strings like "512MiB", "2GiB", "64KiB", "100MB", "4096B" and bare
/// numbers (bytes). Binary suffixes (`KiB`, `MiB`, `GiB`) are powers of 1024,
/// decimal ones (`KB`, `MB`, `GB`) powers of 1000. Display uses the largest
/// binary unit that divides the value evenly.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteSize(u64);

impl ByteSize {
    /// Creates a size from a byte count.
    pub fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Returns the size in bytes.
    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Returns the size in mebibytes.
    pub fn mib(&self) -> f64 {
        self.0 as f64 / MIB as f64
    }
}

impl fmt::Debug for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteSize({self})")
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        if b >= GIB && b % GIB == 0 {
            write!(f, "{}GiB", b / GIB)
        } else if b >= MIB && b % MIB == 0 {
            write!(f, "{}MiB", b / MIB)
        } else if b >= KIB && b % KIB == 0 {
            write!(f, "{}KiB", b / KIB)
        } else {
            write!(f, "{b}B")
        }
    }
}

/// Error type for parsing byte size strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseByteSizeError {
    /// The input string that failed to parse.
    pub input: String,
}

impl fmt::Display for ParseByteSizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid byte size: '{}'", self.input)
    }
}

impl std::error::Error for ParseByteSizeError {}

impl FromStr for ByteSize {
    type Err = ParseByteSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseByteSizeError {
            input: s.to_string(),
        };

        // Longest suffixes first so "kib" is not read as "b"
        const UNITS: [(&str, u64); 7] = [
            ("gib", GIB),
            ("mib", MIB),
            ("kib", KIB),
            ("gb", 1_000_000_000),
            ("mb", 1_000_000),
            ("kb", 1_000),
            ("b", 1),
        ];

        let lower = s.to_ascii_lowercase();
        for (suffix, scale) in UNITS {
            if let Some(num) = lower.strip_suffix(suffix) {
                let val: f64 = num.trim().parse().map_err(|_| err())?;
                if !val.is_finite() || val < 0.0 {
                    return Err(err());
                }
                return Ok(ByteSize((val * scale as f64).round() as u64));
            }
        }

        let val: u64 = s.parse().map_err(|_| err())?;
        Ok(ByteSize(val))
    }
}

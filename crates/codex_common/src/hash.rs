//! Content hashing for cache identity.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

use crate::array::FeatureArray;

/// A 160-bit SHA-1 digest identifying an array by its content.
///
/// Two arrays with the same `ContentHash` are assumed to hold identical
/// canonical bytes. The digest is not meant to resist adversarial collisions;
/// it only has to keep distinct analytics arrays apart.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 20]);

impl ContentHash {
    /// Computes a content hash from a byte slice using SHA-1.
    pub fn from_bytes(data: &[u8]) -> Self {
        let digest = Sha1::digest(data);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Computes the content hash of an array over its canonical byte form.
    ///
    /// The canonical form is the row-major sequence of little-endian `f64`
    /// values, independent of the array's in-memory layout.
    pub fn of_array(array: &FeatureArray) -> Self {
        let mut hasher = Sha1::new();
        for value in array.iter() {
            hasher.update(value.to_le_bytes());
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, ..] = self.0;
        write!(f, "ContentHash({a:02x}{b:02x}{c:02x}..)")
    }
}

/// Error type for parsing a hex digest string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content hash: '{input}'")]
pub struct ParseHashError {
    /// The input string that failed to parse.
    pub input: String,
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseHashError {
            input: s.to_string(),
        };
        if s.len() != 40 || !s.is_ascii() {
            return Err(err());
        }

        let mut out = [0u8; 20];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[2 * i..2 * i + 2], 16).map_err(|_| err())?;
        }
        Ok(Self(out))
    }
}

//! Whole-session snapshots and their on-disk blobs.
//!
//! A session blob is laid out as a 4-byte little-endian header length, a
//! bincode-encoded header, and a gzip-compressed bincode payload
//! holding the [`SessionSnapshot`]. The header carries magic bytes, a format
//! version, and an xxh3-128 checksum of the compressed payload. Callers treat
//! the blob as opaque.
//!
//! Saved sessions live at `<dir>/sessions/<name>/session.bin`.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::entry::{CacheEntry, Category};
use crate::error::CacheError;
use crate::eviction::EvictionManager;
use crate::probe::MemoryProbe;
use crate::store::{CacheStore, Partitions, SentinelValues};

/// Session name that may always be overwritten.
pub const AUTOSAVE_SESSION: &str = "AUTOSAVE";

/// Magic bytes identifying a session blob.
const SESSION_MAGIC: [u8; 4] = *b"CDXS";

/// Current blob format version. Increment on breaking changes to the header
/// or payload.
const SESSION_FORMAT_VERSION: u32 = 1;

const SESSIONS_SUBDIR: &str = "sessions";
const SESSION_FILE: &str = "session.bin";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionHeader {
    magic: [u8; 4],
    format_version: u32,
    checksum: u128,
}

/// Everything needed to rebuild a store's contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Every entry, grouped by category in partition order, insertion order
    /// within a category.
    pub entries: Vec<CacheEntry>,
    /// Next insertion counter value.
    pub next_seq: u64,
    /// Remembered replacement codes for non-finite values.
    pub sentinels: SentinelValues,
}

impl CacheStore {
    /// Copies the store's contents into a snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        let parts = self.lock();
        SessionSnapshot {
            entries: parts.lists.iter().flatten().cloned().collect(),
            next_seq: parts.next_seq,
            sentinels: parts.sentinels,
        }
    }
}

impl SessionSnapshot {
    /// Entries of the snapshot in `category`, in insertion order.
    pub fn entries_in(&self, category: Category) -> impl Iterator<Item = &CacheEntry> + '_ {
        self.entries.iter().filter(move |e| e.category == category)
    }

    fn into_partitions(self) -> Partitions {
        let mut parts = Partitions {
            next_seq: self.next_seq,
            sentinels: self.sentinels,
            ..Partitions::default()
        };
        for entry in self.entries {
            let next = entry.seq + 1;
            parts.lists[entry.category.index()].push(entry);
            parts.next_seq = parts.next_seq.max(next);
        }
        parts
    }
}

/// Encodes the store's contents as a session blob.
pub fn serialize(store: &CacheStore) -> Result<Vec<u8>, CacheError> {
    let snapshot = store.snapshot();
    let encoded = bincode::serde::encode_to_vec(&snapshot, bincode::config::standard())
        .map_err(serialization)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&encoded).map_err(serialization)?;
    let payload = encoder.finish().map_err(serialization)?;

    let header = SessionHeader {
        magic: SESSION_MAGIC,
        format_version: SESSION_FORMAT_VERSION,
        checksum: xxhash_rust::xxh3::xxh3_128(&payload),
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(serialization)?;

    let header_len = header_bytes.len() as u32;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(&payload);
    Ok(output)
}

/// Decodes the snapshot held in a session blob, validating its header.
pub fn decode_snapshot(bytes: &[u8]) -> Result<SessionSnapshot, CacheError> {
    if bytes.len() < 4 {
        return Err(CacheError::InvalidHeader {
            reason: "blob too short for header length".to_string(),
        });
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[..4]);
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_end = 4 + header_len;
    let size = bytes.len();
    if header_end > size {
        return Err(CacheError::InvalidHeader {
            reason: format!("header length {header_len} exceeds blob size {size}"),
        });
    }

    let (header, _): (SessionHeader, usize) =
        bincode::serde::decode_from_slice(&bytes[4..header_end], bincode::config::standard())
            .map_err(|e| CacheError::InvalidHeader {
                reason: e.to_string(),
            })?;

    if header.magic != SESSION_MAGIC {
        return Err(CacheError::InvalidHeader {
            reason: format!("bad magic bytes {:?}", header.magic),
        });
    }
    if header.format_version != SESSION_FORMAT_VERSION {
        return Err(CacheError::VersionMismatch {
            found: header.format_version,
            supported: SESSION_FORMAT_VERSION,
        });
    }

    let payload = &bytes[header_end..];
    let actual = xxhash_rust::xxh3::xxh3_128(payload);
    if actual != header.checksum {
        return Err(CacheError::ChecksumMismatch {
            recorded: header.checksum,
            computed: actual,
        });
    }

    let mut encoded = Vec::new();
    GzDecoder::new(payload)
        .read_to_end(&mut encoded)
        .map_err(serialization)?;
    let (snapshot, _): (SessionSnapshot, usize) =
        bincode::serde::decode_from_slice(&encoded, bincode::config::standard())
            .map_err(serialization)?;
    Ok(snapshot)
}

fn serialization(e: impl std::fmt::Display) -> CacheError {
    CacheError::Serialization {
        reason: e.to_string(),
    }
}

/// Rebuilds a store from a session blob.
///
/// The restored store uses the given clock, probe and eviction bounds; entry
/// creation stamps are kept as saved.
pub fn deserialize(
    bytes: &[u8],
    clock: Arc<dyn Clock>,
    probe: Arc<dyn MemoryProbe>,
    eviction: EvictionManager,
) -> Result<CacheStore, CacheError> {
    let snapshot = decode_snapshot(bytes)?;
    Ok(CacheStore::from_parts(
        snapshot.into_partitions(),
        clock,
        probe,
        eviction,
    ))
}

fn validate_name(name: &str) -> Result<(), CacheError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(CacheError::invalid(format!("invalid session name '{name}'")));
    }
    Ok(())
}

fn session_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(SESSIONS_SUBDIR).join(name).join(SESSION_FILE)
}

/// Writes the store to `<dir>/sessions/<name>/session.bin`.
///
/// An existing session is only replaced when `overwrite` is set or the name
/// is [`AUTOSAVE_SESSION`].
pub fn save_session(
    dir: &Path,
    name: &str,
    store: &CacheStore,
    overwrite: bool,
) -> Result<PathBuf, CacheError> {
    validate_name(name)?;
    let path = session_path(dir, name);
    if path.exists() && !overwrite && name != AUTOSAVE_SESSION {
        return Err(CacheError::SessionExists {
            name: name.to_string(),
        });
    }

    let blob = serialize(store)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(&path, &blob).map_err(|e| CacheError::Io {
        path: path.clone(),
        source: e,
    })?;
    info!(
        session = name,
        bytes = blob.len(),
        entries = store.len(),
        "saved session"
    );
    Ok(path)
}

/// Reads a saved session into a new store.
///
/// The new store shares `like`'s clock, probe and eviction bounds.
pub fn load_session(dir: &Path, name: &str, like: &CacheStore) -> Result<CacheStore, CacheError> {
    validate_name(name)?;
    let path = session_path(dir, name);
    let blob = std::fs::read(&path).map_err(|e| CacheError::Io {
        path: path.clone(),
        source: e,
    })?;
    let store = deserialize(
        &blob,
        Arc::clone(like.clock()),
        Arc::clone(like.probe_handle()),
        *like.eviction(),
    )?;
    info!(session = name, entries = store.len(), "loaded session");
    Ok(store)
}

/// Names of the sessions saved under `dir`, sorted.
///
/// A missing sessions directory means no sessions.
pub fn list_sessions(dir: &Path) -> Result<Vec<String>, CacheError> {
    let root = dir.join(SESSIONS_SUBDIR);
    let read = match std::fs::read_dir(&root) {
        Ok(read) => read,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(CacheError::Io { path: root, source }),
    };

    let mut names = Vec::new();
    for item in read {
        let item = item.map_err(|e| CacheError::Io {
            path: root.clone(),
            source: e,
        })?;
        if !item.path().join(SESSION_FILE).is_file() {
            continue;
        }
        if let Some(name) = item.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

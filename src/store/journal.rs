//! Version journal - durable append-only log of chain mutations
//!
//! Every `create_initial` and `commit_transition` is one record. A record
//! is framed as:
//!
//! ```text
//! [body_len: u32 LE][crc32(body): u32 LE][body: JSON JournalEntry]
//! ```
//!
//! Rules:
//! - A record is fsynced before the store publishes the change in memory
//! - A transition (new version + superseded old version) is ONE record, so
//!   replay sees both halves or neither
//! - A failed append is rolled back by truncating to the last good length;
//!   if that is impossible the journal is poisoned and refuses writes
//! - Replay has zero tolerance: any checksum or framing error is fatal

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use super::errors::{StoreError, StoreResult};
use crate::version::{Version, VersionId};

/// Header size: body length + checksum.
const HEADER_LEN: usize = 8;

/// Journal directory under the data directory.
pub const JOURNAL_DIR: &str = "journal";

/// Journal file name.
pub const JOURNAL_FILE: &str = "versions.log";

/// Location of the journal under a data directory.
pub fn journal_path(data_dir: &Path) -> PathBuf {
    data_dir.join(JOURNAL_DIR).join(JOURNAL_FILE)
}

/// One durable chain mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
    /// Version 1 of a new chain.
    Initial { version: Version },
    /// `version` supersedes `superseded`.
    Transition {
        superseded: VersionId,
        version: Version,
    },
}

impl JournalEntry {
    /// Encodes the entry with its frame header.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let body = serde_json::to_vec(self)
            .map_err(|e| StoreError::Transient(format!("Failed to encode journal entry: {}", e)))?;
        let len = u32::try_from(body.len()).map_err(|_| {
            StoreError::Transient(format!("Journal entry too large: {} bytes", body.len()))
        })?;

        let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&checksum(&body).to_le_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }
}

/// CRC32 (IEEE) over a record body.
pub fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Journal writer.
pub struct JournalWriter {
    path: PathBuf,
    file: File,
    /// Length of the file up to the last fully synced record.
    committed_len: u64,
    fsync: bool,
    poisoned: bool,
}

impl JournalWriter {
    /// Opens or creates `<data_dir>/journal/versions.log`.
    pub fn open(data_dir: &Path, fsync: bool) -> StoreResult<Self> {
        let dir = data_dir.join(JOURNAL_DIR);
        fs::create_dir_all(&dir).map_err(|e| {
            StoreError::Fatal(format!(
                "Failed to create journal directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let path = journal_path(data_dir);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                StoreError::Fatal(format!("Failed to open journal {}: {}", path.display(), e))
            })?;
        let committed_len = file
            .metadata()
            .map_err(|e| StoreError::Fatal(format!("Failed to stat journal: {}", e)))?
            .len();

        Ok(Self {
            path,
            file,
            committed_len,
            fsync,
            poisoned: false,
        })
    }

    /// Returns the journal path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry and makes it durable.
    ///
    /// On a write failure the partial frame is truncated away and
    /// `Transient` is returned. A failed fsync or failed rollback poisons
    /// the writer.
    pub fn append(&mut self, entry: &JournalEntry) -> StoreResult<()> {
        if self.poisoned {
            return Err(StoreError::Fatal(format!(
                "Journal {} is poisoned by an earlier failure",
                self.path.display()
            )));
        }

        let frame = entry.encode()?;

        if let Err(e) = self.file.write_all(&frame) {
            return match self.file.set_len(self.committed_len) {
                Ok(()) => Err(StoreError::Transient(format!(
                    "Journal append failed: {}",
                    e
                ))),
                Err(trunc) => {
                    self.poisoned = true;
                    Err(StoreError::Fatal(format!(
                        "Journal append failed ({}) and rollback failed ({})",
                        e, trunc
                    )))
                }
            };
        }

        if self.fsync {
            if let Err(e) = self.file.sync_all() {
                self.poisoned = true;
                return Err(StoreError::Fatal(format!("Journal fsync failed: {}", e)));
            }
        }

        self.committed_len += frame.len() as u64;
        Ok(())
    }
}

/// Reads every entry from a journal file, validating each frame.
///
/// A missing file is an empty journal.
pub fn read_journal(path: &Path) -> StoreResult<Vec<JournalEntry>> {
    let mut bytes = Vec::new();
    match File::open(path) {
        Ok(mut file) => {
            file.read_to_end(&mut bytes).map_err(|e| {
                StoreError::Corruption(format!("Failed to read {}: {}", path.display(), e))
            })?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(StoreError::Corruption(format!(
                "Failed to open {}: {}",
                path.display(),
                e
            )))
        }
    }

    decode_all(&bytes)
}

/// Decodes a sequence of frames.
pub fn decode_all(bytes: &[u8]) -> StoreResult<Vec<JournalEntry>> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        if remaining < HEADER_LEN {
            return Err(StoreError::Corruption(format!(
                "Truncated header at byte {}: {} bytes remaining",
                offset, remaining
            )));
        }

        let mut len_buf = [0u8; 4];
        len_buf.copy_from_slice(&bytes[offset..offset + 4]);
        let mut crc_buf = [0u8; 4];
        crc_buf.copy_from_slice(&bytes[offset + 4..offset + 8]);
        let body_len = u32::from_le_bytes(len_buf) as usize;
        let expected_crc = u32::from_le_bytes(crc_buf);

        let body_start = offset + HEADER_LEN;
        if body_len > bytes.len() - body_start {
            return Err(StoreError::Corruption(format!(
                "Record at byte {} declares {} body bytes, only {} remain",
                offset,
                body_len,
                bytes.len() - body_start
            )));
        }

        let body = &bytes[body_start..body_start + body_len];
        if checksum(body) != expected_crc {
            return Err(StoreError::Corruption(format!(
                "Checksum mismatch for record at byte {}",
                offset
            )));
        }

        let entry: JournalEntry = serde_json::from_slice(body).map_err(|e| {
            StoreError::Corruption(format!("Undecodable record at byte {}: {}", offset, e))
        })?;
        entries.push(entry);
        offset = body_start + body_len;
    }

    Ok(entries)
}

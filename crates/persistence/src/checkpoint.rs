//! Checkpoint Record: the durable marker naming the snapshot the host is
//! converging to.
//!
//! # File Format
//! ```text
//! [Header: 20 bytes][JSON body]
//! ```
//! Header: magic `MCDC`, version u32, body length u32, CRC64 of body u64,
//! all little-endian.

use crate::error::{PersistenceError, Result};
use byteorder::{ByteOrder, LittleEndian};
use crc64fast::Digest;
use mcd_core::snapshot::SnapshotIdentity;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Well-known location of the record on a host.
pub const DEFAULT_CHECKPOINT_PATH: &str = "/etc/machine-config-daemon/currentconfig";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub identity: SnapshotIdentity,
    pub written_at_unix: u64,
}

impl CheckpointRecord {
    pub fn new(identity: SnapshotIdentity) -> Self {
        let written_at_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self { identity, written_at_unix }
    }
}

/// Read/write of the single checkpoint record.
///
/// `write` must be durable before it returns: a crash right after must still
/// leave the new record visible to the boot-time verifier.
pub trait CheckpointStore {
    fn read(&self) -> Result<Option<CheckpointRecord>>;
    fn write(&mut self, record: &CheckpointRecord) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub body_len: u32,
    pub checksum: u64,
}

impl CheckpointHeader {
    pub const SIZE: usize = 4 + 4 + 4 + 8; // 20 bytes
    pub const MAGIC: [u8; 4] = *b"MCDC";
    pub const VERSION: u32 = 1;

    pub fn for_body(body: &[u8]) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            body_len: body.len() as u32,
            checksum: crc64(body),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        LittleEndian::write_u32(&mut buf[4..8], self.version);
        LittleEndian::write_u32(&mut buf[8..12], self.body_len);
        LittleEndian::write_u64(&mut buf[12..20], self.checksum);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(PersistenceError::InvalidFormat(format!(
                "header truncated: {} of {} bytes",
                buf.len(),
                Self::SIZE
            )));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        if magic != Self::MAGIC {
            return Err(PersistenceError::InvalidMagic);
        }
        let version = LittleEndian::read_u32(&buf[4..8]);
        if version != Self::VERSION {
            return Err(PersistenceError::UnsupportedVersion(version));
        }
        Ok(Self {
            magic,
            version,
            body_len: LittleEndian::read_u32(&buf[8..12]),
            checksum: LittleEndian::read_u64(&buf[12..20]),
        })
    }
}

pub fn crc64(data: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(data);
    digest.sum64()
}

pub fn encode_record(record: &CheckpointRecord) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(record)
        .map_err(|e| PersistenceError::InvalidFormat(e.to_string()))?;
    let header = CheckpointHeader::for_body(&body);
    let mut out = Vec::with_capacity(CheckpointHeader::SIZE + body.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn decode_record(buffer: &[u8]) -> Result<CheckpointRecord> {
    let header = CheckpointHeader::from_bytes(buffer)?;
    let body = &buffer[CheckpointHeader::SIZE..];
    if body.len() != header.body_len as usize {
        return Err(PersistenceError::InvalidFormat(format!(
            "header claims {} body bytes, found {}",
            header.body_len,
            body.len()
        )));
    }
    let found = crc64(body);
    if found != header.checksum {
        return Err(PersistenceError::ChecksumMismatch {
            expected: header.checksum,
            found,
        });
    }
    serde_json::from_slice(body).map_err(|e| PersistenceError::InvalidFormat(e.to_string()))
}

/// Checkpoint record kept in a single file.
///
/// Writes go to a sibling temp file which is fsync'd, renamed over the
/// record, and followed by an fsync of the directory so the rename itself
/// survives power loss.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileCheckpointStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_PATH)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn read(&self) -> Result<Option<CheckpointRecord>> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        decode_record(&buffer).map(Some)
    }

    fn write(&mut self, record: &CheckpointRecord) -> Result<()> {
        let bytes = encode_record(record)?;
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        File::open(&dir)?.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(name: &str) -> CheckpointRecord {
        CheckpointRecord {
            identity: SnapshotIdentity { name: name.into(), hash: "ab".repeat(32) },
            written_at_unix: 1_700_000_000,
        }
    }

    #[test]
    fn test_missing_record_reads_none() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("currentconfig"));
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn test_write_then_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("etc/mcd/currentconfig");
        let mut store = FileCheckpointStore::new(&path);

        store.write(&record("rendered-1")).unwrap();
        assert_eq!(store.read().unwrap(), Some(record("rendered-1")));

        store.write(&record("rendered-2")).unwrap();
        assert_eq!(store.read().unwrap().unwrap().identity.name, "rendered-2");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("currentconfig");
        let mut store = FileCheckpointStore::new(&path);
        store.write(&record("rendered-1")).unwrap();

        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        fs::write(&path, &data).unwrap();
        assert!(matches!(store.read(), Err(PersistenceError::ChecksumMismatch { .. })));

        data.truncate(data.len() / 2);
        fs::write(&path, &data).unwrap();
        assert!(matches!(store.read(), Err(PersistenceError::InvalidFormat(_))));
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = encode_record(&record("x")).unwrap();
        bytes[0..4].copy_from_slice(b"BADM");
        assert!(matches!(decode_record(&bytes), Err(PersistenceError::InvalidMagic)));
    }
}

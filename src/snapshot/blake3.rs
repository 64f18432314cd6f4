// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Canonical BLAKE3 hashing of snapshots.
//!
//! Same snapshot → same hash. `serde_json` maps are ordered by key, so the
//! JSON encoding of a snapshot is canonical without extra normalization.

use super::Snapshot;

/// Compute the BLAKE3 hash of a snapshot's canonical JSON encoding.
pub fn hash_snapshot(snapshot: &Snapshot) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    // Serializing plain data into a Vec cannot fail.
    if let Ok(bytes) = serde_json::to_vec(snapshot) {
        hasher.update(&bytes);
    }
    *hasher.finalize().as_bytes()
}

pub fn snapshot_hash_hex(snapshot: &Snapshot) -> String {
    hash_snapshot(snapshot)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

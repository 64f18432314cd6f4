//! Boot-time convergence check against the checkpoint record.

use crate::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::error::Result;
use mcd_core::snapshot::SnapshotIdentity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    /// The record names the expected snapshot.
    Converged,
    /// The record names something else; the host has not reached `expected`.
    Pending { current: CheckpointRecord },
    /// No record has ever been written.
    Missing,
}

/// Compare the persisted record with the snapshot the host should be on.
///
/// Both the name and the content hash must match, so a snapshot re-rendered
/// under the same name is not mistaken for the one on disk.
pub fn verify_convergence(
    store: &dyn CheckpointStore,
    expected: &SnapshotIdentity,
) -> Result<Convergence> {
    Ok(match store.read()? {
        None => Convergence::Missing,
        Some(record) if &record.identity == expected => Convergence::Converged,
        Some(current) => Convergence::Pending { current },
    })
}

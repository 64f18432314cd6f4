// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Rollback Ledger
//!
//! Append-only list of compensations recorded after each forward step
//! succeeds. On failure it is consumed newest-first; on success it is
//! discarded. Never persisted: after a crash the checkpoint record and the
//! boot-time verifier take over.

use crate::errors::{RollbackError, RollbackFailure};
use crate::mutate::StepKind;
use mcd_persistence::CheckpointRecord;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Re-run step `index` of the step list with old and new swapped.
    Revert { index: usize, kind: StepKind },
    /// Put the checkpoint record back.
    RestoreCheckpoint(CheckpointRecord),
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compensation::Revert { kind, .. } => write!(f, "{}", kind),
            Compensation::RestoreCheckpoint(record) => {
                write!(f, "current config on disk (back to {})", record.identity)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RollbackLedger {
    entries: Vec<Compensation>,
}

impl RollbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: Compensation) {
        tracing::debug!("Registered compensation: {}", entry);
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Compensation] {
        &self.entries
    }

    /// Drop every entry without running it.
    pub fn discard(self) {
        tracing::debug!("Discarding {} compensation(s)", self.entries.len());
    }

    /// Run every entry in reverse registration order.
    ///
    /// A failing compensation does not stop the ones registered before it;
    /// all failures are returned together.
    pub fn unwind<F>(self, mut compensate: F) -> Vec<RollbackFailure>
    where
        F: FnMut(&Compensation) -> Result<(), RollbackError>,
    {
        let mut failures = Vec::new();
        for entry in self.entries.iter().rev() {
            tracing::info!("Rolling back {}", entry);
            if let Err(error) = compensate(entry) {
                tracing::error!("Rollback of {} failed: {}", entry, error);
                failures.push(RollbackFailure { target: entry.to_string(), error });
            }
        }
        failures
    }
}

//! In-memory checkpoint store for tests and dry runs.

use crate::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::error::{PersistenceError, Result};
use std::collections::BTreeSet;
use std::io;

#[derive(Debug, Default, Clone)]
pub struct MemoryCheckpointStore {
    record: Option<CheckpointRecord>,
    writes: usize,
    failing_writes: BTreeSet<usize>,
    history: Vec<CheckpointRecord>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: CheckpointRecord) -> Self {
        Self { record: Some(record), ..Self::default() }
    }

    /// Make the `nth` write attempt (1-based) fail with an IO error.
    pub fn fail_on_write(mut self, nth: usize) -> Self {
        self.failing_writes.insert(nth);
        self
    }

    pub fn current(&self) -> Option<&CheckpointRecord> {
        self.record.as_ref()
    }

    /// Every record successfully written, oldest first.
    pub fn history(&self) -> &[CheckpointRecord] {
        &self.history
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn read(&self) -> Result<Option<CheckpointRecord>> {
        Ok(self.record.clone())
    }

    fn write(&mut self, record: &CheckpointRecord) -> Result<()> {
        self.writes += 1;
        if self.failing_writes.contains(&self.writes) {
            return Err(PersistenceError::IoError(io::Error::new(
                io::ErrorKind::Other,
                format!("injected failure on write #{}", self.writes),
            )));
        }
        self.record = Some(record.clone());
        self.history.push(record.clone());
        Ok(())
    }
}

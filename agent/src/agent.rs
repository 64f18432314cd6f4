// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Run-once entry point: one update, driven by whoever decides it is time.

use crate::collab::{ConfigSource, DriftMonitor};
use crate::errors::TransactionError;
use crate::transaction::{Outcome, UpdateOptions, UpdateTransaction};

pub struct Agent<'a> {
    source: &'a dyn ConfigSource,
    drift: Option<&'a mut dyn DriftMonitor>,
}

impl<'a> Agent<'a> {
    pub fn new(source: &'a dyn ConfigSource) -> Self {
        Self { source, drift: None }
    }

    /// Stop `monitor` before every update.
    pub fn with_drift_monitor(mut self, monitor: &'a mut dyn DriftMonitor) -> Self {
        self.drift = Some(monitor);
        self
    }

    /// Fetch both snapshots and run `transaction` from the current to the
    /// desired one.
    pub fn run_once(
        &mut self,
        mut transaction: UpdateTransaction<'_>,
        options: UpdateOptions,
    ) -> Result<Outcome, TransactionError> {
        // The host drifts from the applied config while it is being updated.
        if let Some(drift) = self.drift.as_deref_mut() {
            tracing::info!("Stopping config drift monitor for the update");
            drift.stop();
        }

        let old = self.source.old()?;
        let new = self.source.new()?;
        transaction.run(old, new, options)
    }
}

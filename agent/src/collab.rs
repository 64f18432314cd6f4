// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Cluster-side collaborators: where snapshots come from, how the node is
//! drained, and where status goes.

use crate::errors::{DrainError, SourceError, StatusError};
use mcd_core::snapshot::Snapshot;
use std::fmt;

/// Supplies the currently applied and the target snapshot.
pub trait ConfigSource {
    fn old(&self) -> Result<Snapshot, SourceError>;
    fn new(&self) -> Result<Snapshot, SourceError>;
}

/// Removes workloads from the node. Blocks until done or failed.
pub trait DrainClient {
    fn drain(&mut self) -> Result<(), DrainError>;
}

/// Node-level state as last published by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Done,
    Working,
    Degraded,
    Unreconcilable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Normal => write!(f, "Normal"),
            EventKind::Warning => write!(f, "Warning"),
        }
    }
}

pub trait StatusReporter {
    fn daemon_state(&self) -> Result<Option<DaemonState>, StatusError>;
    fn set_working(&mut self) -> Result<(), StatusError>;
    /// Best effort; delivery problems are the reporter's to log.
    fn emit_event(&mut self, kind: EventKind, reason: &str, message: &str);
}

/// Watches the host for drift from the applied configuration.
pub trait DriftMonitor {
    fn stop(&mut self);
}

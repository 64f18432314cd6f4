// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::mutate::StepKind;
use mcd_core::error::{ParseError, Unreconcilable};
use mcd_core::plan::PostAction;
use mcd_persistence::PersistenceError;
use std::fmt;
use thiserror::Error;

/// Failure of a single host primitive.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command `{command}` failed: {detail}")]
    Command { command: String, detail: String },
    #[error("{0}")]
    Rejected(String),
}

impl HostError {
    pub fn io(path: impl fmt::Display, source: std::io::Error) -> Self {
        HostError::Io { path: path.to_string(), source }
    }
}

pub type HostResult<T> = std::result::Result<T, HostError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("drain failed: {0}")]
pub struct DrainError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("status update failed: {0}")]
pub struct StatusError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("config source failed: {0}")]
pub struct SourceError(pub String);

/// Which of the two snapshots a parse error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Old,
    New,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Old => write!(f, "old"),
            Side::New => write!(f, "new"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RollbackError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Checkpoint(#[from] PersistenceError),
}

/// A compensating action that itself failed while unwinding.
#[derive(Error, Debug)]
#[error("error rolling back {target}: {error}")]
pub struct RollbackFailure {
    pub target: String,
    #[source]
    pub error: RollbackError,
}

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("config source failed: {0}")]
    Source(#[from] SourceError),

    #[error("error setting node's state to Working: {0}")]
    Status(#[from] StatusError),

    #[error("parsing {side} config failed: {source}")]
    Parse {
        side: Side,
        #[source]
        source: ParseError,
    },

    #[error("can't reconcile config {old} with {new}: {reason}")]
    Unreconcilable {
        old: String,
        new: String,
        #[source]
        reason: Unreconcilable,
    },

    #[error(transparent)]
    DrainFailed(#[from] DrainError),

    #[error("{step} failed: {source}")]
    MutationFailed {
        step: StepKind,
        #[source]
        source: HostError,
    },

    #[error("writing checkpoint record failed: {0}")]
    PersistFailed(#[source] PersistenceError),

    #[error("post-update action {action} failed: {source}")]
    PostActionFailed {
        action: PostAction,
        #[source]
        source: HostError,
    },

    /// The host state is unknown: some compensation did not run cleanly.
    #[error("{trigger}; rollback incomplete: {}", join_failures(.failures))]
    RollbackFailed {
        trigger: Box<TransactionError>,
        failures: Vec<RollbackFailure>,
    },
}

fn join_failures(failures: &[RollbackFailure]) -> String {
    failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; ")
}

impl TransactionError {
    /// The caller should mark the node degraded rather than retry.
    pub fn is_degraded(&self) -> bool {
        matches!(self, TransactionError::RollbackFailed { .. })
    }

    pub fn is_unreconcilable(&self) -> bool {
        matches!(self, TransactionError::Unreconcilable { .. })
    }

    /// The error that started the failure, looking through rollback wrapping.
    pub fn trigger(&self) -> &TransactionError {
        match self {
            TransactionError::RollbackFailed { trigger, .. } => trigger.trigger(),
            other => other,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransactionError::Source(_) => "source",
            TransactionError::Status(_) => "status",
            TransactionError::Parse { .. } => "parse",
            TransactionError::Unreconcilable { .. } => "unreconcilable",
            TransactionError::DrainFailed(_) => "drain_failed",
            TransactionError::MutationFailed { .. } => "mutation_failed",
            TransactionError::PersistFailed(_) => "persist_failed",
            TransactionError::PostActionFailed { .. } => "post_action_failed",
            TransactionError::RollbackFailed { .. } => "rollback_failed",
        }
    }
}

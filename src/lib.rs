// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! mcd-core: the pure half of the node configuration agent.
//!
//! Everything here is side-effect free: snapshot model, document expansion,
//! diff classification, file-set diffing, post-update action planning and
//! the drain decision. The agent crate drives host mutation on top of it.

pub mod config;
pub mod error;
pub mod types;
pub mod snapshot;
pub mod parse;
pub mod diff;
pub mod fileset;
pub mod policy;
pub mod plan;
pub mod drain;

pub use diff::{classify, ConfigDiff};
pub use error::{ParseError, Unreconcilable};
pub use fileset::{diff_files, FileChange, FileChangeKind, FileSetDiff};
pub use parse::{ConfigParser, DocumentParser};
pub use plan::{plan_actions, ActionSet, PostAction};
pub use policy::ActionPolicy;
pub use snapshot::{Snapshot, SnapshotIdentity, SnapshotSpec};
pub use types::ExpandedConfig;

#[cfg(test)]
pub mod tests;

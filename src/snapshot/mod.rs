// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration snapshots: the immutable desired-state documents an update
//! moves between.

pub mod blake3;

use crate::config::{CURRENT_DOC_VERSION, EMPTY_SNAPSHOT_NAME};
use serde::{Deserialize, Serialize};

/// A named declaration of desired host state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub spec: SnapshotSpec,
}

/// The declaration body. `config` is an opaque document handed to a
/// [`ConfigParser`](crate::parse::ConfigParser); the remaining fields are
/// OS-level settings carried beside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSpec {
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default, rename = "osImageURL")]
    pub os_image_url: String,
    #[serde(default)]
    pub kernel_arguments: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub kernel_type: String,
    #[serde(default)]
    pub fips: bool,
}

/// What the checkpoint record stores to name a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotIdentity {
    pub name: String,
    pub hash: String,
}

impl Snapshot {
    pub fn new(name: impl Into<String>, spec: SnapshotSpec) -> Self {
        Self { name: name.into(), spec }
    }

    /// The canonical empty snapshot.
    pub fn empty() -> Self {
        Self {
            name: EMPTY_SNAPSHOT_NAME.to_string(),
            spec: SnapshotSpec {
                config: serde_json::json!({ "version": CURRENT_DOC_VERSION }),
                ..SnapshotSpec::default()
            },
        }
    }

    /// A snapshot without a name stands for "nothing applied yet" and is
    /// replaced by [`Snapshot::empty`] before any comparison.
    pub fn canonicalize_empty(self) -> Self {
        if self.name.is_empty() {
            Self::empty()
        } else {
            self
        }
    }

    pub fn is_empty_snapshot(&self) -> bool {
        self.name == EMPTY_SNAPSHOT_NAME
    }

    pub fn identity(&self) -> SnapshotIdentity {
        SnapshotIdentity {
            name: self.name.clone(),
            hash: self::blake3::snapshot_hash_hex(self),
        }
    }
}

impl std::fmt::Display for SnapshotIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short = self.hash.get(..12).unwrap_or(&self.hash);
        write!(f, "{}@{}", self.name, short)
    }
}

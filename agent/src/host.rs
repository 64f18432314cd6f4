// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Host primitives the mutators are built from.

use crate::errors::HostResult;
use mcd_core::types::{ExpandedConfig, FileEntry, Unit};

/// OS-level settings the image applier moves between.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsSettings {
    pub image: String,
    pub extensions: Vec<String>,
    pub kernel_type: String,
}

impl From<&ExpandedConfig> for OsSettings {
    fn from(cfg: &ExpandedConfig) -> Self {
        Self {
            image: cfg.os_image.clone(),
            extensions: cfg.extensions.clone(),
            kernel_type: cfg.kernel_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsChange {
    pub from: OsSettings,
    pub to: OsSettings,
}

/// Synchronous host primitives. Each call either fully succeeds or returns
/// an error; nothing beyond that is promised about partial effects.
pub trait HostOps {
    /// What is at `path` now, or `None` when nothing is.
    fn read_file(&self, path: &str) -> HostResult<Option<FileEntry>>;
    /// Write unconditionally. `file.overwrite` is the caller's to honor.
    fn write_file(&mut self, file: &FileEntry) -> HostResult<()>;
    fn remove_file(&mut self, path: &str) -> HostResult<()>;
    /// Write the unit file (if it has contents) and apply enablement/masking.
    fn write_unit(&mut self, unit: &Unit) -> HostResult<()>;
    fn remove_unit(&mut self, name: &str) -> HostResult<()>;
    /// Replace the managed SSH keys of `user`. An empty slice removes them.
    fn set_ssh_keys(&mut self, user: &str, keys: &[String]) -> HostResult<()>;
    /// `None` locks the password.
    fn set_password_hash(&mut self, user: &str, hash: Option<&str>) -> HostResult<()>;
    fn write_kernel_args(&mut self, args: &[String]) -> HostResult<()>;
    fn apply_os_image(&mut self, change: &OsChange) -> HostResult<()>;
    fn reload_units(&mut self) -> HostResult<()>;
    fn reboot(&mut self, rationale: &str) -> HostResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsVariant {
    /// Image-based OS whose root is managed as a whole.
    CoreOs,
    /// Package-managed enterprise distribution.
    Rhel,
    Unknown,
}

/// What kind of host the agent runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostDescription {
    pub variant: OsVariant,
}

impl HostDescription {
    pub fn new(variant: OsVariant) -> Self {
        Self { variant }
    }

    pub fn supports_os_management(&self) -> bool {
        self.variant == OsVariant::CoreOs
    }
}

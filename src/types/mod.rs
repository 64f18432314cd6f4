// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Expanded configuration: the enumerable view of a snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One file the snapshot wants on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub contents: String,
    pub mode: u32,
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
}

fn default_overwrite() -> bool {
    true
}

/// A passwd user declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub ssh_authorized_keys: Vec<String>,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default)]
    pub shell: Option<String>,
}

/// A systemd unit declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    #[serde(default)]
    pub contents: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub mask: bool,
}

/// A snapshot expanded into files, users, units and OS-level settings.
///
/// Maps are keyed by path or name, so every path appears at most once and
/// iteration order is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedConfig {
    pub version: String,
    pub files: BTreeMap<String, FileEntry>,
    pub users: BTreeMap<String, User>,
    pub units: BTreeMap<String, Unit>,
    pub disks: Vec<serde_json::Value>,
    pub filesystems: Vec<serde_json::Value>,
    pub raid: Vec<serde_json::Value>,
    pub kernel_args: Vec<String>,
    pub os_image: String,
    pub extensions: Vec<String>,
    pub kernel_type: String,
    pub fips: bool,
}

impl ExpandedConfig {
    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }

    /// Major component of the document version, if it parses.
    pub fn major_version(&self) -> Option<u64> {
        self.version.split('.').next()?.parse().ok()
    }
}

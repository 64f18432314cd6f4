// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Snapshot expansion.
//!
//! [`ConfigParser`] is the seam to whatever understands the snapshot's
//! configuration document. [`DocumentParser`] handles the JSON document
//! format the agent ships with.

use crate::config::{CURRENT_DOC_VERSION, DEFAULT_FILE_MODE};
use crate::error::{ParseError, ParseResult};
use crate::snapshot::Snapshot;
use crate::types::{ExpandedConfig, FileEntry, Unit, User};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Turns a snapshot into its enumerable files, users, units and OS settings.
pub trait ConfigParser {
    fn expand(&self, snapshot: &Snapshot) -> ParseResult<ExpandedConfig>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentParser;

#[derive(Deserialize, Default)]
#[serde(default)]
struct Document {
    version: Option<String>,
    storage: Storage,
    passwd: Passwd,
    systemd: Systemd,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Storage {
    files: Vec<RawFile>,
    disks: Vec<serde_json::Value>,
    filesystems: Vec<serde_json::Value>,
    raid: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawFile {
    path: String,
    #[serde(default)]
    contents: String,
    mode: Option<u32>,
    overwrite: Option<bool>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Passwd {
    users: Vec<User>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Systemd {
    units: Vec<Unit>,
}

impl ConfigParser for DocumentParser {
    fn expand(&self, snapshot: &Snapshot) -> ParseResult<ExpandedConfig> {
        let doc = match &snapshot.spec.config {
            serde_json::Value::Null => Document::default(),
            v @ serde_json::Value::Object(_) => Document::deserialize(v).map_err(|e| {
                ParseError::Malformed {
                    field: "config".to_string(),
                    reason: e.to_string(),
                }
            })?,
            other => return Err(ParseError::NotAnObject(json_kind(other))),
        };

        let version = doc.version.unwrap_or_else(|| CURRENT_DOC_VERSION.to_string());
        validate_version(&version)?;

        let mut files = BTreeMap::new();
        for raw in doc.storage.files {
            if !raw.path.starts_with('/') {
                return Err(ParseError::RelativePath(raw.path));
            }
            let entry = FileEntry {
                path: raw.path.clone(),
                contents: raw.contents,
                mode: raw.mode.unwrap_or(DEFAULT_FILE_MODE),
                overwrite: raw.overwrite.unwrap_or(true),
            };
            if files.insert(raw.path.clone(), entry).is_some() {
                return Err(ParseError::Duplicate { kind: "file", name: raw.path });
            }
        }

        let mut users = BTreeMap::new();
        for user in doc.passwd.users {
            let name = user.name.clone();
            if users.insert(name.clone(), user).is_some() {
                return Err(ParseError::Duplicate { kind: "user", name });
            }
        }

        let mut units = BTreeMap::new();
        for unit in doc.systemd.units {
            let name = unit.name.clone();
            if units.insert(name.clone(), unit).is_some() {
                return Err(ParseError::Duplicate { kind: "unit", name });
            }
        }

        let spec = &snapshot.spec;
        Ok(ExpandedConfig {
            version,
            files,
            users,
            units,
            disks: doc.storage.disks,
            filesystems: doc.storage.filesystems,
            raid: doc.storage.raid,
            kernel_args: spec.kernel_arguments.clone(),
            os_image: spec.os_image_url.clone(),
            extensions: spec.extensions.clone(),
            kernel_type: spec.kernel_type.clone(),
            fips: spec.fips,
        })
    }
}

fn validate_version(version: &str) -> ParseResult<()> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return Err(ParseError::InvalidVersion(version.to_string()));
    }
    Ok(())
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Config Diff Classifier.
//!
//! Compares two expanded configurations section by section and reports
//! which categories changed, or refuses the transition outright when it
//! cannot be applied as an in-place patch.

use crate::config::PERMITTED_USER;
use crate::error::Unreconcilable;
use crate::types::{ExpandedConfig, User};
use serde::Serialize;
use std::fmt;

/// Which categories of configuration differ between old and new.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfigDiff {
    pub os_update: bool,
    pub kargs: bool,
    pub fips: bool,
    pub passwd: bool,
    pub files: bool,
    pub units: bool,
    pub kernel_type: bool,
    pub extensions: bool,
}

impl ConfigDiff {
    pub fn is_empty(&self) -> bool {
        *self == ConfigDiff::default()
    }

    /// True when the OS-image mutator has anything to do.
    pub fn touches_os(&self) -> bool {
        self.os_update || self.kernel_type || self.extensions
    }
}

impl fmt::Display for ConfigDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            ("osUpdate", self.os_update),
            ("kargs", self.kargs),
            ("fips", self.fips),
            ("passwd", self.passwd),
            ("files", self.files),
            ("units", self.units),
            ("kernelType", self.kernel_type),
            ("extensions", self.extensions),
        ];
        let changed: Vec<&str> = flags.iter().filter(|(_, v)| *v).map(|(k, _)| *k).collect();
        if changed.is_empty() {
            write!(f, "no changes")
        } else {
            write!(f, "{}", changed.join(","))
        }
    }
}

/// Classify the transition from `old` to `new`.
///
/// Pure and deterministic: the same pair always yields the same answer.
pub fn classify(old: &ExpandedConfig, new: &ExpandedConfig) -> Result<ConfigDiff, Unreconcilable> {
    // 1. Document format
    if old.major_version() != new.major_version() {
        return Err(Unreconcilable::VersionChange {
            old: old.version.clone(),
            new: new.version.clone(),
        });
    }

    // 2. Storage layout is fixed at provisioning time
    if old.disks != new.disks {
        return Err(Unreconcilable::Storage("disks"));
    }
    if old.filesystems != new.filesystems {
        return Err(Unreconcilable::Storage("filesystems"));
    }
    if old.raid != new.raid {
        return Err(Unreconcilable::Storage("raid"));
    }

    // 3. FIPS
    if old.fips != new.fips {
        return Err(Unreconcilable::Fips);
    }

    // 4. Users
    let passwd = classify_passwd(old, new)?;

    Ok(ConfigDiff {
        os_update: old.os_image != new.os_image,
        kargs: old.kernel_args != new.kernel_args,
        fips: false,
        passwd,
        files: old.files != new.files,
        units: old.units != new.units,
        kernel_type: old.kernel_type != new.kernel_type,
        extensions: old.extensions != new.extensions,
    })
}

fn classify_passwd(old: &ExpandedConfig, new: &ExpandedConfig) -> Result<bool, Unreconcilable> {
    if old.users == new.users {
        return Ok(false);
    }
    for name in old.users.keys().chain(new.users.keys()) {
        if name != PERMITTED_USER {
            // An unchanged, pre-existing foreign user is tolerated.
            if old.users.get(name) != new.users.get(name) {
                return Err(Unreconcilable::UnsupportedUser(name.clone()));
            }
        }
    }
    if let (Some(o), Some(n)) = (old.user(PERMITTED_USER), new.user(PERMITTED_USER)) {
        check_user_fields(o, n)?;
    }
    Ok(true)
}

fn check_user_fields(old: &User, new: &User) -> Result<(), Unreconcilable> {
    let field = if old.groups != new.groups {
        Some("groups")
    } else if old.uid != new.uid {
        Some("uid")
    } else if old.shell != new.shell {
        Some("shell")
    } else {
        None
    };
    match field {
        Some(field) => Err(Unreconcilable::UserField {
            user: new.name.clone(),
            field,
        }),
        None => Ok(()),
    }
}

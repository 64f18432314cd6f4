// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Mutators
//!
//! Each mutator moves one category of host state from `from` to `to`.
//! They are symmetric: `apply(X, Y)` followed by `apply(Y, X)` puts the
//! host back where it was, which is what the rollback ledger relies on.
//!
//! The order the orchestrator runs them in is [`update_steps`]:
//! files → SSH keys → password hash → OS image → kernel arguments.

use crate::errors::HostResult;
use crate::host::{HostDescription, HostOps, OsChange, OsSettings};
use crate::transaction::UpdateOptions;
use mcd_core::diff::ConfigDiff;
use mcd_core::fileset::diff_files;
use mcd_core::policy::ActionPolicy;
use mcd_core::types::{ExpandedConfig, FileEntry};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Files,
    SshKeys,
    PasswordHash,
    OsImage,
    KernelArgs,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::Files => "updating files",
            StepKind::SshKeys => "updating SSH keys",
            StepKind::PasswordHash => "setting password hash",
            StepKind::OsImage => "applying OS changes",
            StepKind::KernelArgs => "updating kernel arguments",
        };
        write!(f, "{}", name)
    }
}

/// Whether a successful step registers its inverse with the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackPolicy {
    Inverse,
    /// Applied but never compensated.
    None,
}

/// Everything a mutator may consult besides the two configurations.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext<'a> {
    pub diff: &'a ConfigDiff,
    pub host: HostDescription,
    pub options: UpdateOptions,
    pub policy: &'a ActionPolicy,
}

pub trait Mutator {
    fn kind(&self) -> StepKind;

    fn applies(&self, _ctx: &UpdateContext<'_>) -> bool {
        true
    }

    fn rollback(&self) -> RollbackPolicy {
        RollbackPolicy::Inverse
    }

    fn apply(
        &self,
        host: &mut dyn HostOps,
        from: &ExpandedConfig,
        to: &ExpandedConfig,
        ctx: &UpdateContext<'_>,
    ) -> HostResult<()>;
}

/// The fixed update order.
pub fn update_steps() -> Vec<Box<dyn Mutator>> {
    vec![
        Box::new(FileWriter::new()),
        Box::new(SshKeyUpdater),
        Box::new(PasswordHashUpdater),
        Box::new(OsImageApplier),
        Box::new(KernelArgTuner),
    ]
}

/// What a path held before [`FileWriter`] touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Prior {
    /// Left alone: `overwrite` was off and the path already existed.
    Kept,
    Absent,
    Present(FileEntry),
}

/// Writes, rewrites and removes files and systemd units.
///
/// Files are restored from what the host held before the forward pass,
/// not from the old configuration: a pass over a path this writer has
/// already touched puts back its prior contents. Units are restored from
/// the configuration.
#[derive(Debug, Default)]
pub struct FileWriter {
    priors: RefCell<BTreeMap<String, Prior>>,
}

impl FileWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn restore(&self, host: &mut dyn HostOps, path: &str, prior: Prior) -> HostResult<()> {
        match prior {
            Prior::Kept => {
                tracing::debug!("{} was never written; leaving it", path);
                Ok(())
            }
            Prior::Absent => {
                tracing::debug!("Removing {}", path);
                host.remove_file(path)
            }
            Prior::Present(entry) => {
                tracing::debug!("Restoring {}", path);
                host.write_file(&entry)
            }
        }
    }
}

impl Mutator for FileWriter {
    fn kind(&self) -> StepKind {
        StepKind::Files
    }

    fn apply(
        &self,
        host: &mut dyn HostOps,
        from: &ExpandedConfig,
        to: &ExpandedConfig,
        ctx: &UpdateContext<'_>,
    ) -> HostResult<()> {
        let mut priors = self.priors.borrow_mut();
        for change in diff_files(from, to).iter() {
            if ctx.options.skip_certificate_write && ctx.policy.is_certificate(&change.path) {
                tracing::debug!("Skipping certificate {}", change.path);
                continue;
            }
            if let Some(prior) = priors.remove(&change.path) {
                self.restore(host, &change.path, prior)?;
                continue;
            }

            let current = host.read_file(&change.path)?;
            match &change.contents {
                Some(entry) if !entry.overwrite && current.is_some() => {
                    tracing::debug!("{} exists and overwrite is off; leaving it", entry.path);
                    priors.insert(change.path.clone(), Prior::Kept);
                }
                Some(entry) => {
                    tracing::debug!("Writing file {}", entry.path);
                    host.write_file(entry)?;
                    priors.insert(change.path.clone(), current.map_or(Prior::Absent, Prior::Present));
                }
                None => {
                    tracing::debug!("Removing stale file {}", change.path);
                    host.remove_file(&change.path)?;
                    priors.insert(change.path.clone(), current.map_or(Prior::Absent, Prior::Present));
                }
            }
        }

        for (name, unit) in &to.units {
            if from.units.get(name) != Some(unit) {
                tracing::debug!("Writing systemd unit {}", name);
                host.write_unit(unit)?;
            }
        }
        for name in from.units.keys() {
            if !to.units.contains_key(name) {
                tracing::debug!("Removing systemd unit {}", name);
                host.remove_unit(name)?;
            }
        }
        Ok(())
    }
}

/// Rewrites SSH authorized keys. Runs only when passwd changed.
pub struct SshKeyUpdater;

impl Mutator for SshKeyUpdater {
    fn kind(&self) -> StepKind {
        StepKind::SshKeys
    }

    fn applies(&self, ctx: &UpdateContext<'_>) -> bool {
        ctx.diff.passwd
    }

    fn apply(
        &self,
        host: &mut dyn HostOps,
        from: &ExpandedConfig,
        to: &ExpandedConfig,
        _ctx: &UpdateContext<'_>,
    ) -> HostResult<()> {
        for name in user_names(from, to) {
            let keys = to
                .user(name)
                .map(|u| u.ssh_authorized_keys.as_slice())
                .unwrap_or(&[]);
            tracing::debug!("Writing {} SSH key(s) for {}", keys.len(), name);
            host.set_ssh_keys(name, keys)?;
        }
        Ok(())
    }
}

/// Sets password hashes. Always runs, whatever the passwd flag says, so a
/// host that missed its first-boot hash still converges.
pub struct PasswordHashUpdater;

impl Mutator for PasswordHashUpdater {
    fn kind(&self) -> StepKind {
        StepKind::PasswordHash
    }

    fn apply(
        &self,
        host: &mut dyn HostOps,
        from: &ExpandedConfig,
        to: &ExpandedConfig,
        _ctx: &UpdateContext<'_>,
    ) -> HostResult<()> {
        for name in user_names(from, to) {
            let hash = to.user(name).and_then(|u| u.password_hash.as_deref());
            host.set_password_hash(name, hash)?;
        }
        Ok(())
    }
}

/// Rebases the OS image and switches extensions or kernel type.
///
/// A no-op on hosts without OS management.
pub struct OsImageApplier;

impl Mutator for OsImageApplier {
    fn kind(&self) -> StepKind {
        StepKind::OsImage
    }

    fn apply(
        &self,
        host: &mut dyn HostOps,
        from: &ExpandedConfig,
        to: &ExpandedConfig,
        ctx: &UpdateContext<'_>,
    ) -> HostResult<()> {
        if !ctx.host.supports_os_management() {
            tracing::info!("Updating the OS on {:?} hosts is not supported", ctx.host.variant);
            return Ok(());
        }
        if !ctx.diff.touches_os() {
            return Ok(());
        }
        let change = OsChange {
            from: OsSettings::from(from),
            to: OsSettings::from(to),
        };
        tracing::info!("Applying OS image {:?}", change.to.image);
        host.apply_os_image(&change)
    }
}

/// Rewrites the kernel command-line file.
///
/// Deliberately left out of rollback: a failure after this step leaves the
/// new arguments in place, to be corrected by the next transaction.
pub struct KernelArgTuner;

impl Mutator for KernelArgTuner {
    fn kind(&self) -> StepKind {
        StepKind::KernelArgs
    }

    fn rollback(&self) -> RollbackPolicy {
        RollbackPolicy::None
    }

    fn apply(
        &self,
        host: &mut dyn HostOps,
        _from: &ExpandedConfig,
        to: &ExpandedConfig,
        _ctx: &UpdateContext<'_>,
    ) -> HostResult<()> {
        host.write_kernel_args(&to.kernel_args)
    }
}

fn user_names<'a>(from: &'a ExpandedConfig, to: &'a ExpandedConfig) -> BTreeSet<&'a str> {
    from.users
        .keys()
        .chain(to.users.keys())
        .map(String::as_str)
        .collect()
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-memory collaborators for tests and dry runs.

use crate::collab::{ConfigSource, DaemonState, DrainClient, DriftMonitor, EventKind, StatusReporter};
use crate::errors::{DrainError, HostError, HostResult, SourceError, StatusError};
use crate::host::{HostOps, OsChange, OsSettings};
use mcd_core::snapshot::Snapshot;
use mcd_core::types::{ExpandedConfig, FileEntry, Unit};
use std::collections::BTreeMap;

/// One attempted host primitive, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    WriteFile(String),
    RemoveFile(String),
    WriteUnit(String),
    RemoveUnit(String),
    SetSshKeys(String),
    SetPasswordHash(String),
    WriteKernelArgs,
    ApplyOsImage(String),
    ReloadUnits,
    Reboot,
}

/// Everything observable on a [`MemoryHost`] besides its call log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostState {
    pub files: BTreeMap<String, FileEntry>,
    pub units: BTreeMap<String, Unit>,
    pub ssh_keys: BTreeMap<String, Vec<String>>,
    pub password_hashes: BTreeMap<String, String>,
    pub kernel_args: Vec<String>,
    pub os: OsSettings,
}

struct FailRule {
    matches: Box<dyn Fn(&HostOp) -> bool>,
    skip: usize,
}

#[derive(Default)]
pub struct MemoryHost {
    pub files: BTreeMap<String, FileEntry>,
    pub units: BTreeMap<String, Unit>,
    pub ssh_keys: BTreeMap<String, Vec<String>>,
    pub password_hashes: BTreeMap<String, String>,
    pub kernel_args: Vec<String>,
    pub os: OsSettings,
    pub reboots: Vec<String>,
    pub reloads: usize,
    calls: Vec<HostOp>,
    rules: Vec<FailRule>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call matching `matches`.
    pub fn fail_on(&mut self, matches: impl Fn(&HostOp) -> bool + 'static) -> &mut Self {
        self.fail_on_after(matches, 0)
    }

    /// Let the first `skip` matching calls through, then fail the rest.
    pub fn fail_on_after(&mut self, matches: impl Fn(&HostOp) -> bool + 'static, skip: usize) -> &mut Self {
        self.rules.push(FailRule { matches: Box::new(matches), skip });
        self
    }

    pub fn calls(&self) -> &[HostOp] {
        &self.calls
    }

    pub fn state(&self) -> HostState {
        HostState {
            files: self.files.clone(),
            units: self.units.clone(),
            ssh_keys: self.ssh_keys.clone(),
            password_hashes: self.password_hashes.clone(),
            kernel_args: self.kernel_args.clone(),
            os: self.os.clone(),
        }
    }

    fn record(&mut self, op: HostOp) -> HostResult<()> {
        let mut fail = false;
        for rule in &mut self.rules {
            if (rule.matches)(&op) {
                if rule.skip == 0 {
                    fail = true;
                } else {
                    rule.skip -= 1;
                }
            }
        }
        let result = if fail {
            Err(HostError::Rejected(format!("injected failure: {:?}", op)))
        } else {
            Ok(())
        };
        self.calls.push(op);
        result
    }
}

/// Make `host` look like `cfg` has already been applied, without logging
/// any calls.
pub fn materialize(host: &mut MemoryHost, cfg: &ExpandedConfig) {
    host.files = cfg.files.clone();
    host.units = cfg.units.clone();
    host.ssh_keys = cfg
        .users
        .values()
        .filter(|u| !u.ssh_authorized_keys.is_empty())
        .map(|u| (u.name.clone(), u.ssh_authorized_keys.clone()))
        .collect();
    host.password_hashes = cfg
        .users
        .values()
        .filter_map(|u| u.password_hash.clone().map(|h| (u.name.clone(), h)))
        .collect();
    host.kernel_args = cfg.kernel_args.clone();
    host.os = OsSettings::from(cfg);
}

impl HostOps for MemoryHost {
    fn read_file(&self, path: &str) -> HostResult<Option<FileEntry>> {
        Ok(self.files.get(path).cloned())
    }

    fn write_file(&mut self, file: &FileEntry) -> HostResult<()> {
        self.record(HostOp::WriteFile(file.path.clone()))?;
        self.files.insert(file.path.clone(), file.clone());
        Ok(())
    }

    fn remove_file(&mut self, path: &str) -> HostResult<()> {
        self.record(HostOp::RemoveFile(path.to_string()))?;
        self.files.remove(path);
        Ok(())
    }

    fn write_unit(&mut self, unit: &Unit) -> HostResult<()> {
        self.record(HostOp::WriteUnit(unit.name.clone()))?;
        self.units.insert(unit.name.clone(), unit.clone());
        Ok(())
    }

    fn remove_unit(&mut self, name: &str) -> HostResult<()> {
        self.record(HostOp::RemoveUnit(name.to_string()))?;
        self.units.remove(name);
        Ok(())
    }

    fn set_ssh_keys(&mut self, user: &str, keys: &[String]) -> HostResult<()> {
        self.record(HostOp::SetSshKeys(user.to_string()))?;
        if keys.is_empty() {
            self.ssh_keys.remove(user);
        } else {
            self.ssh_keys.insert(user.to_string(), keys.to_vec());
        }
        Ok(())
    }

    fn set_password_hash(&mut self, user: &str, hash: Option<&str>) -> HostResult<()> {
        self.record(HostOp::SetPasswordHash(user.to_string()))?;
        match hash {
            Some(h) => self.password_hashes.insert(user.to_string(), h.to_string()),
            None => self.password_hashes.remove(user),
        };
        Ok(())
    }

    fn write_kernel_args(&mut self, args: &[String]) -> HostResult<()> {
        self.record(HostOp::WriteKernelArgs)?;
        self.kernel_args = args.to_vec();
        Ok(())
    }

    fn apply_os_image(&mut self, change: &OsChange) -> HostResult<()> {
        self.record(HostOp::ApplyOsImage(change.to.image.clone()))?;
        self.os = change.to.clone();
        Ok(())
    }

    fn reload_units(&mut self) -> HostResult<()> {
        self.record(HostOp::ReloadUnits)?;
        self.reloads += 1;
        Ok(())
    }

    fn reboot(&mut self, rationale: &str) -> HostResult<()> {
        self.record(HostOp::Reboot)?;
        self.reboots.push(rationale.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingDrain {
    pub calls: usize,
    pub fail_with: Option<String>,
}

impl DrainClient for RecordingDrain {
    fn drain(&mut self) -> Result<(), DrainError> {
        self.calls += 1;
        match &self.fail_with {
            Some(reason) => Err(DrainError(reason.clone())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RecordingStatus {
    pub state: Option<DaemonState>,
    pub working_calls: usize,
    pub events: Vec<RecordedEvent>,
    pub fail_set_working: bool,
}

impl RecordingStatus {
    pub fn in_state(state: DaemonState) -> Self {
        Self { state: Some(state), ..Self::default() }
    }
}

impl StatusReporter for RecordingStatus {
    fn daemon_state(&self) -> Result<Option<DaemonState>, StatusError> {
        Ok(self.state)
    }

    fn set_working(&mut self) -> Result<(), StatusError> {
        self.working_calls += 1;
        if self.fail_set_working {
            return Err(StatusError("node update rejected".into()));
        }
        self.state = Some(DaemonState::Working);
        Ok(())
    }

    fn emit_event(&mut self, kind: EventKind, reason: &str, message: &str) {
        self.events.push(RecordedEvent {
            kind,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}

/// Serves a fixed pair of snapshots.
#[derive(Debug, Clone)]
pub struct StaticSource {
    pub old: Snapshot,
    pub new: Snapshot,
}

impl ConfigSource for StaticSource {
    fn old(&self) -> Result<Snapshot, SourceError> {
        Ok(self.old.clone())
    }

    fn new(&self) -> Result<Snapshot, SourceError> {
        Ok(self.new.clone())
    }
}

#[derive(Debug, Default)]
pub struct CountingMonitor {
    pub stops: usize,
}

impl DriftMonitor for CountingMonitor {
    fn stop(&mut self) {
        self.stops += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injected_failure_leaves_state_untouched() {
        let mut host = MemoryHost::new();
        host.fail_on_after(|op| matches!(op, HostOp::WriteFile(_)), 1);
        let entry = FileEntry { path: "/etc/a".into(), contents: "1".into(), mode: 0o644, overwrite: true };

        host.write_file(&entry).unwrap();
        let before = host.state();
        let second = FileEntry { path: "/etc/b".into(), ..entry };
        assert!(host.write_file(&second).is_err());
        assert_eq!(host.state(), before);
        assert_eq!(host.calls().len(), 2);
    }
}

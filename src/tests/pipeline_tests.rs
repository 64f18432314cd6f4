// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! classify → diff_files → plan_actions → is_drain_required on whole
//! snapshots, the way the agent strings them together.

use crate::diff::classify;
use crate::drain::is_drain_required;
use crate::fileset::{diff_files, FileChangeKind};
use crate::parse::{ConfigParser, DocumentParser};
use crate::plan::{plan_actions, PostAction};
use crate::policy::ActionPolicy;
use crate::snapshot::{Snapshot, SnapshotSpec};
use crate::error::Unreconcilable;
use serde_json::json;

fn snapshot(name: &str, config: serde_json::Value) -> Snapshot {
    Snapshot::new(name, SnapshotSpec { config, ..SnapshotSpec::default() })
}

#[test]
fn empty_to_two_files_needs_no_drain_or_reboot() {
    let old = Snapshot::default().canonicalize_empty();
    let new = snapshot("rendered-1", json!({
        "version": "3.4.0",
        "storage": { "files": [
            { "path": "/etc/motd", "contents": "welcome\n" },
            { "path": "/etc/issue", "contents": "node\n" }
        ]}
    }));
    let parser = DocumentParser;
    let (o, n) = (parser.expand(&old).unwrap(), parser.expand(&new).unwrap());

    let diff = classify(&o, &n).unwrap();
    assert!(diff.files && !diff.units && !diff.passwd);

    let files = diff_files(&o, &n);
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|c| c.kind == FileChangeKind::Added));

    let policy = ActionPolicy::default();
    let actions = plan_actions(&diff, &files, &policy);
    assert!(actions.is_none());
    assert!(!is_drain_required(&actions, &files, &o, &n, &policy));
}

#[test]
fn kernel_argument_change_reboots_and_drains() {
    let mut old = snapshot("rendered-1", json!({ "version": "3.4.0" }));
    old.spec.kernel_arguments = vec!["quiet".into()];
    let mut new = old.clone();
    new.name = "rendered-2".into();
    new.spec.kernel_arguments.push("nosmt".into());

    let (o, n) = (DocumentParser.expand(&old).unwrap(), DocumentParser.expand(&new).unwrap());
    let diff = classify(&o, &n).unwrap();
    assert!(diff.kargs);

    let files = diff_files(&o, &n);
    assert!(files.is_empty());
    let policy = ActionPolicy::default();
    let actions = plan_actions(&diff, &files, &policy);
    assert!(actions.contains(PostAction::Reboot));
    assert!(is_drain_required(&actions, &files, &o, &n, &policy));
}

#[test]
fn storage_change_stops_at_classification() {
    let old = snapshot("a", json!({ "version": "3.4.0" }));
    let new = snapshot("b", json!({
        "version": "3.4.0",
        "storage": { "filesystems": [{ "device": "/dev/disk/by-label/var", "format": "xfs" }] }
    }));
    let (o, n) = (DocumentParser.expand(&old).unwrap(), DocumentParser.expand(&new).unwrap());
    assert_eq!(classify(&o, &n), Err(Unreconcilable::Storage("filesystems")));
}

#[test]
fn unit_change_plans_reload() {
    let old = snapshot("a", json!({ "systemd": { "units": [{ "name": "chronyd.service", "enabled": true }] } }));
    let new = snapshot("b", json!({ "systemd": { "units": [{ "name": "chronyd.service", "enabled": false }] } }));
    let (o, n) = (DocumentParser.expand(&old).unwrap(), DocumentParser.expand(&new).unwrap());
    let diff = classify(&o, &n).unwrap();
    let files = diff_files(&o, &n);
    let actions = plan_actions(&diff, &files, &ActionPolicy::default());
    assert!(actions.contains(PostAction::ReloadUnits));
    assert!(!actions.requires_reboot());
}

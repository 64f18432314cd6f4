// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use mcd_agent::agent::Agent;
use mcd_agent::collab::{DaemonState, EventKind, StatusReporter};
use mcd_agent::errors::{StatusError, TransactionError};
use mcd_agent::fixtures::{
    materialize, CountingMonitor, HostOp, MemoryHost, RecordingDrain, RecordingStatus, StaticSource,
};
use mcd_agent::guard::{TerminationDecision, TerminationGate};
use mcd_agent::mutate::StepKind;
use mcd_agent::{Collaborators, HostDescription, Outcome, OsVariant, TransactionState, UpdateOptions, UpdateTransaction};
use mcd_core::parse::{ConfigParser, DocumentParser};
use mcd_core::plan::PostAction;
use mcd_core::policy::ActionPolicy;
use mcd_core::snapshot::{Snapshot, SnapshotSpec};
use mcd_persistence::{CheckpointRecord, MemoryCheckpointStore};
use serde_json::{json, Value};

fn snapshot(name: &str, config: Value) -> Snapshot {
    Snapshot::new(name, SnapshotSpec { config, ..SnapshotSpec::default() })
}

fn files_doc(files: &[(&str, &str)]) -> Value {
    let files: Vec<Value> = files.iter().map(|(p, c)| json!({ "path": p, "contents": c })).collect();
    json!({ "version": "3.4.0", "storage": { "files": files } })
}

struct Harness {
    host: MemoryHost,
    drain: RecordingDrain,
    status: RecordingStatus,
    store: MemoryCheckpointStore,
    gate: TerminationGate,
    policy: ActionPolicy,
    variant: OsVariant,
}

impl Harness {
    fn new() -> Self {
        Self {
            host: MemoryHost::new(),
            drain: RecordingDrain::default(),
            status: RecordingStatus::default(),
            store: MemoryCheckpointStore::new(),
            gate: TerminationGate::new(),
            policy: ActionPolicy::default(),
            variant: OsVariant::CoreOs,
        }
    }

    /// Put the host and the checkpoint where `old` leaves them.
    fn applied(mut self, old: &Snapshot) -> Self {
        let cfg = DocumentParser.expand(&old.clone().canonicalize_empty()).unwrap();
        materialize(&mut self.host, &cfg);
        self.store = MemoryCheckpointStore::with_record(CheckpointRecord::new(old.identity()));
        self
    }

    fn run(
        &mut self,
        old: &Snapshot,
        new: &Snapshot,
        options: UpdateOptions,
    ) -> (Result<Outcome, TransactionError>, Vec<TransactionState>) {
        let mut txn = UpdateTransaction::new(
            Collaborators {
                parser: &DocumentParser,
                host: &mut self.host,
                drain: &mut self.drain,
                status: Some(&mut self.status),
                checkpoint: &mut self.store,
                gate: &self.gate,
            },
            HostDescription::new(self.variant),
            &self.policy,
        );
        let result = txn.run(old.clone(), new.clone(), options);
        (result, txn.trail().to_vec())
    }

    fn checkpoint_name(&self) -> Option<String> {
        self.store.current().map(|r| r.identity.name.clone())
    }
}

#[test]
fn test_empty_to_two_files_commits_without_drain() {
    let mut h = Harness::new();
    let old = Snapshot::default();
    let new = snapshot("rendered-1", files_doc(&[("/etc/motd", "hi\n"), ("/etc/issue", "node\n")]));

    let (result, trail) = h.run(&old, &new, UpdateOptions::default());
    let outcome = result.unwrap();

    assert!(!outcome.reboot_required);
    assert!(!outcome.drained);
    assert!(outcome.actions.is_none());
    assert_eq!(h.drain.calls, 0);
    assert_eq!(h.host.files.len(), 2);
    assert_eq!(h.host.files["/etc/motd"].contents, "hi\n");
    assert_eq!(h.store.current().unwrap().identity, new.identity());
    assert_eq!(
        trail,
        vec![
            TransactionState::Idle,
            TransactionState::Reconciling,
            TransactionState::Mutating,
            TransactionState::Persisting,
            TransactionState::Committed,
        ]
    );
    assert_eq!(h.status.working_calls, 1);
    assert!(!h.gate.is_guarded());
}

#[test]
fn test_kernel_arg_failure_leaves_checkpoint_untouched() {
    let mut old = snapshot("rendered-1", files_doc(&[]));
    old.spec.kernel_arguments = vec!["quiet".into()];
    let mut new = old.clone();
    new.name = "rendered-2".into();
    new.spec.kernel_arguments.push("nosmt".into());

    let mut h = Harness::new().applied(&old);
    h.host.fail_on(|op| *op == HostOp::WriteKernelArgs);
    let (result, trail) = h.run(&old, &new, UpdateOptions::default());

    let err = result.unwrap_err();
    assert!(matches!(err, TransactionError::MutationFailed { step: StepKind::KernelArgs, .. }), "{err}");
    assert!(!err.is_degraded());
    assert_eq!(h.drain.calls, 1);
    assert_eq!(h.checkpoint_name().as_deref(), Some("rendered-1"));
    assert!(h.store.history().is_empty());
    assert!(h.host.reboots.is_empty());
    assert!(trail.contains(&TransactionState::Draining));
    assert_eq!(trail.last(), Some(&TransactionState::Failed));
}

#[test]
fn test_ssh_key_failure_reverts_files() {
    let user = |key: &str| json!({ "name": "core", "sshAuthorizedKeys": [key] });
    let mut old_doc = files_doc(&[("/etc/a", "1"), ("/etc/b", "1"), ("/etc/c", "1")]);
    old_doc["passwd"] = json!({ "users": [user("ssh-ed25519 OLD")] });
    let mut new_doc = files_doc(&[("/etc/a", "2"), ("/etc/b", "2"), ("/etc/c", "2")]);
    new_doc["passwd"] = json!({ "users": [user("ssh-ed25519 NEW")] });
    let old = snapshot("rendered-1", old_doc);
    let new = snapshot("rendered-2", new_doc);

    let mut h = Harness::new().applied(&old);
    let before = h.host.state();
    h.host.fail_on(|op| matches!(op, HostOp::SetSshKeys(_)));

    let (result, trail) = h.run(&old, &new, UpdateOptions::default());
    let err = result.unwrap_err();
    assert!(matches!(err, TransactionError::MutationFailed { step: StepKind::SshKeys, .. }), "{err}");
    assert_eq!(h.host.state(), before);
    assert!(h.store.history().is_empty());
    assert!(trail.contains(&TransactionState::RollingBack));

    // Three forward writes, then three reverting writes.
    let writes = h.host.calls().iter().filter(|op| matches!(op, HostOp::WriteFile(_))).count();
    assert_eq!(writes, 6);
}

#[test]
fn test_skip_reboot_reports_reboot_for_os_change() {
    let mut old = snapshot("rendered-1", files_doc(&[]));
    old.spec.os_image_url = "quay.io/os@sha256:1".into();
    let mut new = old.clone();
    new.name = "rendered-2".into();
    new.spec.os_image_url = "quay.io/os@sha256:2".into();

    let mut h = Harness::new().applied(&old);
    let options = UpdateOptions { skip_reboot: true, ..UpdateOptions::default() };
    let (result, _) = h.run(&old, &new, options);

    let outcome = result.unwrap();
    assert!(outcome.reboot_required);
    assert!(outcome.actions.contains(PostAction::Reboot));
    assert!(h.host.reboots.is_empty());
    assert!(!h.host.calls().contains(&HostOp::Reboot));
    assert_eq!(h.host.os.image, "quay.io/os@sha256:2");
    assert_eq!(h.store.current().unwrap().identity, new.identity());
}

#[test]
fn test_os_change_on_unmanaged_host_still_commits() {
    let mut old = snapshot("rendered-1", files_doc(&[]));
    old.spec.os_image_url = "quay.io/os@sha256:1".into();
    let mut new = old.clone();
    new.name = "rendered-2".into();
    new.spec.os_image_url = "quay.io/os@sha256:2".into();

    let mut h = Harness::new().applied(&old);
    h.variant = OsVariant::Rhel;
    let (result, _) = h.run(&old, &new, UpdateOptions::default());

    assert!(result.unwrap().reboot_required);
    assert_eq!(h.host.os.image, "quay.io/os@sha256:1");
    assert_eq!(h.host.reboots.len(), 1);
}

#[test]
fn test_unreconcilable_makes_no_host_calls() {
    let old = snapshot("rendered-1", files_doc(&[]));
    let mut new_doc = files_doc(&[("/etc/motd", "x")]);
    new_doc["storage"]["filesystems"] = json!([{ "device": "/dev/sdb", "format": "xfs" }]);
    let new = snapshot("rendered-2", new_doc);

    let mut h = Harness::new().applied(&old);
    let (result, trail) = h.run(&old, &new, UpdateOptions::default());

    let err = result.unwrap_err();
    assert!(err.is_unreconcilable());
    assert!(err.to_string().contains("can't reconcile config rendered-1 with rendered-2"));
    assert!(h.host.calls().is_empty());
    assert_eq!(h.drain.calls, 0);
    assert_eq!(h.checkpoint_name().as_deref(), Some("rendered-1"));
    assert!(!trail.contains(&TransactionState::Mutating));

    assert_eq!(h.status.events.len(), 1);
    assert_eq!(h.status.events[0].kind, EventKind::Warning);
    assert_eq!(h.status.events[0].reason, "FailedToReconcile");
}

#[test]
fn test_drain_failure_stops_before_mutation() {
    let mut old = snapshot("rendered-1", files_doc(&[]));
    old.spec.kernel_type = "default".into();
    let mut new = old.clone();
    new.name = "rendered-2".into();
    new.spec.kernel_type = "realtime".into();

    let mut h = Harness::new().applied(&old);
    h.drain.fail_with = Some("pod disruption budget".into());
    let (result, trail) = h.run(&old, &new, UpdateOptions::default());

    assert!(matches!(result, Err(TransactionError::DrainFailed(_))));
    assert!(h.host.calls().is_empty());
    assert!(!trail.contains(&TransactionState::RollingBack));
}

#[test]
fn test_persist_failure_rolls_back_mutations() {
    let old = snapshot("rendered-1", files_doc(&[("/etc/a", "1")]));
    let new = snapshot("rendered-2", files_doc(&[("/etc/a", "2"), ("/etc/b", "2")]));

    let mut h = Harness::new();
    let cfg = DocumentParser.expand(&old).unwrap();
    materialize(&mut h.host, &cfg);
    h.store = MemoryCheckpointStore::new().fail_on_write(1);
    let before = h.host.state();

    let (result, _) = h.run(&old, &new, UpdateOptions::default());
    assert!(matches!(result, Err(TransactionError::PersistFailed(_))));
    assert_eq!(h.host.state(), before);
    assert!(h.store.current().is_none());
}

#[test]
fn test_reboot_failure_restores_checkpoint() {
    let mut old = snapshot("rendered-1", files_doc(&[]));
    old.spec.kernel_arguments = vec!["quiet".into()];
    let mut new = old.clone();
    new.name = "rendered-2".into();
    new.spec.kernel_arguments = vec![];

    let mut h = Harness::new().applied(&old);
    h.host.fail_on(|op| *op == HostOp::Reboot);
    let (result, _) = h.run(&old, &new, UpdateOptions::default());

    let err = result.unwrap_err();
    assert!(matches!(err, TransactionError::PostActionFailed { action: PostAction::Reboot, .. }), "{err}");
    let names: Vec<&str> = h.store.history().iter().map(|r| r.identity.name.as_str()).collect();
    assert_eq!(names, vec!["rendered-2", "rendered-1"]);
    assert_eq!(h.checkpoint_name().as_deref(), Some("rendered-1"));
    // Kernel arguments are never rolled back.
    assert!(h.host.kernel_args.is_empty());
}

#[test]
fn test_rollback_without_prior_record_restores_old_identity() {
    let mut old = snapshot("rendered-1", files_doc(&[]));
    old.spec.kernel_arguments = vec!["quiet".into()];
    let mut new = old.clone();
    new.name = "rendered-2".into();
    new.spec.kernel_arguments = vec![];

    let mut h = Harness::new();
    materialize(&mut h.host, &DocumentParser.expand(&old).unwrap());
    assert!(h.store.current().is_none());
    h.host.fail_on(|op| *op == HostOp::Reboot);

    let (result, _) = h.run(&old, &new, UpdateOptions::default());
    assert!(result.is_err());
    assert_eq!(h.store.current().unwrap().identity, old.identity());
}

#[test]
fn test_failed_compensation_is_reported_as_degraded() {
    let old = snapshot("rendered-1", files_doc(&[("/etc/a", "1")]));
    let new = snapshot("rendered-2", files_doc(&[("/etc/a", "2")]));

    let mut h = Harness::new().applied(&old);
    h.host.fail_on(|op| *op == HostOp::WriteKernelArgs);
    h.host.fail_on_after(|op| matches!(op, HostOp::WriteFile(_)), 1);

    let (result, trail) = h.run(&old, &new, UpdateOptions::default());
    let err = result.unwrap_err();
    assert!(err.is_degraded());
    assert!(matches!(err.trigger(), TransactionError::MutationFailed { step: StepKind::KernelArgs, .. }));
    let TransactionError::RollbackFailed { failures, .. } = &err else { unreachable!() };
    assert_eq!(failures.len(), 1);
    assert!(err.to_string().contains("error rolling back updating files"));
    assert_eq!(h.checkpoint_name().as_deref(), Some("rendered-1"));
    assert_eq!(trail.last(), Some(&TransactionState::Failed));
}

#[test]
fn test_unit_change_reloads_unless_skipped() {
    let unit = |body: &str| json!({ "version": "3.4.0", "systemd": { "units": [{ "name": "a.service", "contents": body }] } });
    let old = snapshot("rendered-1", unit("[Unit]\n"));
    let new = snapshot("rendered-2", unit("[Unit]\nDescription=a\n"));

    let mut h = Harness::new().applied(&old);
    let outcome = h.run(&old, &new, UpdateOptions::default()).0.unwrap();
    assert!(outcome.actions.contains(PostAction::ReloadUnits));
    assert!(!outcome.reboot_required);
    assert_eq!(h.host.reloads, 1);

    let mut h = Harness::new().applied(&old);
    let options = UpdateOptions { skip_reboot: true, ..UpdateOptions::default() };
    assert!(!h.run(&old, &new, options).0.unwrap().reboot_required);
    assert_eq!(h.host.reloads, 0);
}

#[test]
fn test_degraded_node_is_not_marked_working() {
    let old = snapshot("rendered-1", files_doc(&[]));
    let new = snapshot("rendered-2", files_doc(&[("/etc/motd", "x")]));

    let mut h = Harness::new().applied(&old);
    h.status = RecordingStatus::in_state(DaemonState::Degraded);
    h.run(&old, &new, UpdateOptions::default()).0.unwrap();
    assert_eq!(h.status.working_calls, 0);
    assert_eq!(h.status.state, Some(DaemonState::Degraded));

    let mut h = Harness::new().applied(&old);
    h.status.fail_set_working = true;
    let (result, _) = h.run(&old, &new, UpdateOptions::default());
    assert!(matches!(result, Err(TransactionError::Status(_))));
    assert!(h.host.calls().is_empty());
}

#[test]
fn test_termination_is_deferred_during_update() {
    let old = snapshot("rendered-1", files_doc(&[]));
    let new = snapshot("rendered-2", files_doc(&[("/etc/motd", "x")]));

    let mut h = Harness::new().applied(&old);
    let gate = h.gate.clone();
    h.host.fail_on(move |op| {
        if matches!(op, HostOp::WriteFile(_)) {
            assert_eq!(gate.request_termination(), TerminationDecision::Deferred);
        }
        false
    });

    h.run(&old, &new, UpdateOptions::default()).0.unwrap();
    assert!(!h.gate.is_guarded());
    assert!(h.gate.take_pending());
}

#[test]
fn test_run_once_stops_drift_monitor() {
    let source = StaticSource {
        old: Snapshot::default(),
        new: snapshot("rendered-1", files_doc(&[("/etc/motd", "x")])),
    };
    let mut monitor = CountingMonitor::default();
    let mut h = Harness::new();

    let mut agent = Agent::new(&source).with_drift_monitor(&mut monitor);
    let txn = UpdateTransaction::new(
        Collaborators {
            parser: &DocumentParser,
            host: &mut h.host,
            drain: &mut h.drain,
            status: None,
            checkpoint: &mut h.store,
            gate: &h.gate,
        },
        HostDescription::new(OsVariant::CoreOs),
        &h.policy,
    );
    let outcome = agent.run_once(txn, UpdateOptions::default()).unwrap();
    assert!(!outcome.reboot_required);
    drop(agent);

    assert_eq!(monitor.stops, 1);
    assert_eq!(h.checkpoint_name().as_deref(), Some("rendered-1"));
}

/// Reports whether the gate was held when the node was marked Working.
struct GateWatchingStatus {
    gate: TerminationGate,
    guarded_when_working: Option<bool>,
}

impl StatusReporter for GateWatchingStatus {
    fn daemon_state(&self) -> Result<Option<DaemonState>, StatusError> {
        Ok(Some(DaemonState::Done))
    }

    fn set_working(&mut self) -> Result<(), StatusError> {
        self.guarded_when_working = Some(self.gate.is_guarded());
        Ok(())
    }

    fn emit_event(&mut self, _kind: EventKind, _reason: &str, _message: &str) {}
}

#[test]
fn test_guard_covers_status_update() {
    let old = snapshot("rendered-1", files_doc(&[]));
    let new = snapshot("rendered-2", files_doc(&[("/etc/motd", "x")]));
    let mut h = Harness::new().applied(&old);
    let mut status = GateWatchingStatus { gate: h.gate.clone(), guarded_when_working: None };

    let mut txn = UpdateTransaction::new(
        Collaborators {
            parser: &DocumentParser,
            host: &mut h.host,
            drain: &mut h.drain,
            status: Some(&mut status),
            checkpoint: &mut h.store,
            gate: &h.gate,
        },
        HostDescription::new(OsVariant::CoreOs),
        &h.policy,
    );
    txn.run(old, new, UpdateOptions::default()).unwrap();
    drop(txn);

    assert_eq!(status.guarded_when_working, Some(true));
    assert!(!h.gate.is_guarded());
}

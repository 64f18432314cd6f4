// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Update Transaction - old snapshot to new, all or nothing
//!
//! # Protocol
//! ```text
//! Idle
//! ↓
//! Reconciling   parse both snapshots, classify, plan, decide drain
//! ↓
//! Draining      only when required; failure ends here, nothing to undo
//! ↓
//! Mutating      files → SSH keys → password hash → OS → kernel args
//! ↓
//! Persisting    checkpoint record := new snapshot; then post-update action
//! ↓
//! Committed
//! ```
//! Any failure from Mutating on → RollingBack (ledger, newest first) →
//! Failed. The kernel-argument step is applied but never compensated.

use crate::collab::{DaemonState, DrainClient, EventKind, StatusReporter};
use crate::errors::{RollbackError, Side, TransactionError};
use crate::guard::TerminationGate;
use crate::host::{HostDescription, HostOps};
use crate::ledger::{Compensation, RollbackLedger};
use crate::mutate::{update_steps, Mutator, RollbackPolicy, UpdateContext};
use mcd_core::diff::{classify, ConfigDiff};
use mcd_core::drain::is_drain_required;
use mcd_core::fileset::diff_files;
use mcd_core::parse::ConfigParser;
use mcd_core::plan::{plan_actions, ActionSet, PostAction};
use mcd_core::policy::ActionPolicy;
use mcd_core::snapshot::Snapshot;
use mcd_core::types::ExpandedConfig;
use mcd_persistence::{CheckpointRecord, CheckpointStore};
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Leave policy certificate paths untouched.
    pub skip_certificate_write: bool,
    /// Report a required reboot instead of triggering it, and leave unit
    /// reloads to the caller.
    pub skip_reboot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Reconciling,
    Draining,
    Mutating,
    Persisting,
    Committed,
    RollingBack,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub reboot_required: bool,
    pub actions: ActionSet,
    pub drained: bool,
    pub diff: ConfigDiff,
}

/// The external parties one transaction talks to.
pub struct Collaborators<'a> {
    pub parser: &'a dyn ConfigParser,
    pub host: &'a mut dyn HostOps,
    pub drain: &'a mut dyn DrainClient,
    pub status: Option<&'a mut dyn StatusReporter>,
    pub checkpoint: &'a mut dyn CheckpointStore,
    pub gate: &'a TerminationGate,
}

/// One update attempt. Not retried internally; run a fresh transaction to
/// try again.
pub struct UpdateTransaction<'a> {
    parser: &'a dyn ConfigParser,
    host: &'a mut dyn HostOps,
    drain: &'a mut dyn DrainClient,
    status: Option<&'a mut dyn StatusReporter>,
    checkpoint: &'a mut dyn CheckpointStore,
    gate: &'a TerminationGate,
    description: HostDescription,
    policy: &'a ActionPolicy,
    steps: Vec<Box<dyn Mutator>>,
    trail: Vec<TransactionState>,
}

/// Both expanded configs plus what was derived from them.
struct Plan {
    old: ExpandedConfig,
    new: ExpandedConfig,
    diff: ConfigDiff,
    actions: ActionSet,
    drain: bool,
}

impl<'a> UpdateTransaction<'a> {
    pub fn new(
        collab: Collaborators<'a>,
        description: HostDescription,
        policy: &'a ActionPolicy,
    ) -> Self {
        Self {
            parser: collab.parser,
            host: collab.host,
            drain: collab.drain,
            status: collab.status,
            checkpoint: collab.checkpoint,
            gate: collab.gate,
            description,
            policy,
            steps: update_steps(),
            trail: vec![TransactionState::Idle],
        }
    }

    /// Every state entered so far, in order.
    pub fn trail(&self) -> &[TransactionState] {
        &self.trail
    }

    pub fn state(&self) -> TransactionState {
        self.trail.last().copied().unwrap_or(TransactionState::Idle)
    }

    /// Run the transaction and report only whether a reboot is required.
    pub fn run_transaction(
        &mut self,
        old: Snapshot,
        new: Snapshot,
        options: UpdateOptions,
    ) -> Result<bool, TransactionError> {
        self.run(old, new, options).map(|o| o.reboot_required)
    }

    pub fn run(
        &mut self,
        old: Snapshot,
        new: Snapshot,
        options: UpdateOptions,
    ) -> Result<Outcome, TransactionError> {
        let start = Instant::now();
        metrics::increment_counter!("mcd_transactions_total");

        let result = self.execute(old, new, options);

        metrics::histogram!("mcd_transaction_duration_seconds", start.elapsed().as_secs_f64());
        match &result {
            Ok(outcome) => tracing::info!(
                "Update committed (actions: {}, reboot required: {})",
                outcome.actions,
                outcome.reboot_required
            ),
            Err(e) => {
                metrics::increment_counter!("mcd_transaction_failures_total", "kind" => e.kind());
                if e.is_degraded() {
                    tracing::error!("Update failed and rollback was incomplete; host state unknown: {}", e);
                } else {
                    tracing::warn!("Update failed: {}", e);
                }
            }
        }
        result
    }

    fn enter(&mut self, state: TransactionState) {
        tracing::debug!("Transaction state: {:?} -> {:?}", self.state(), state);
        self.trail.push(state);
    }

    fn execute(
        &mut self,
        old: Snapshot,
        new: Snapshot,
        options: UpdateOptions,
    ) -> Result<Outcome, TransactionError> {
        // Held until this function returns, on every path.
        let _guard = self.gate.guard();
        let old = old.canonicalize_empty();
        // Steps remember what they overwrote; start every run clean.
        self.steps = update_steps();

        if let Err(e) = self.set_working() {
            self.enter(TransactionState::Failed);
            return Err(e);
        }

        self.enter(TransactionState::Reconciling);
        let plan = match self.reconcile(&old, &new) {
            Ok(plan) => plan,
            Err(e) => {
                self.enter(TransactionState::Failed);
                return Err(e);
            }
        };

        if plan.drain {
            self.enter(TransactionState::Draining);
            if let Err(e) = self.drain.drain() {
                self.enter(TransactionState::Failed);
                return Err(e.into());
            }
        } else {
            tracing::info!("Changes do not require drain, skipping.");
        }

        let ctx = UpdateContext {
            diff: &plan.diff,
            host: self.description,
            options,
            policy: self.policy,
        };
        let mut ledger = RollbackLedger::new();

        match self.apply(&old, &new, &plan, &ctx, &mut ledger) {
            Ok(reboot_required) => {
                ledger.discard();
                self.enter(TransactionState::Committed);
                Ok(Outcome {
                    reboot_required,
                    actions: plan.actions,
                    drained: plan.drain,
                    diff: plan.diff,
                })
            }
            Err(trigger) => {
                self.enter(TransactionState::RollingBack);
                metrics::increment_counter!("mcd_rollbacks_total");
                let failures = self.unwind(ledger, &plan, &ctx);
                self.enter(TransactionState::Failed);
                if failures.is_empty() {
                    Err(trigger)
                } else {
                    Err(TransactionError::RollbackFailed {
                        trigger: Box::new(trigger),
                        failures,
                    })
                }
            }
        }
    }

    /// Mark the node Working unless it is already flagged for attention.
    fn set_working(&mut self) -> Result<(), TransactionError> {
        let Some(status) = self.status.as_deref_mut() else {
            return Ok(());
        };
        match status.daemon_state()? {
            Some(DaemonState::Degraded) | Some(DaemonState::Unreconcilable) => Ok(()),
            _ => status.set_working().map_err(TransactionError::from),
        }
    }

    fn reconcile(&mut self, old: &Snapshot, new: &Snapshot) -> Result<Plan, TransactionError> {
        let old_cfg = self
            .parser
            .expand(old)
            .map_err(|source| TransactionError::Parse { side: Side::Old, source })?;
        let new_cfg = self
            .parser
            .expand(new)
            .map_err(|source| TransactionError::Parse { side: Side::New, source })?;

        tracing::info!("Checking Reconcilable for config {} to {}", old.name, new.name);
        let diff = match classify(&old_cfg, &new_cfg) {
            Ok(diff) => diff,
            Err(reason) => {
                let err = TransactionError::Unreconcilable {
                    old: old.name.clone(),
                    new: new.name.clone(),
                    reason,
                };
                if let Some(status) = self.status.as_deref_mut() {
                    status.emit_event(EventKind::Warning, "FailedToReconcile", &err.to_string());
                }
                return Err(err);
            }
        };
        tracing::info!("Starting update from {} to {}: {}", old.name, new.name, diff);

        let files = diff_files(&old_cfg, &new_cfg);
        let actions = plan_actions(&diff, &files, self.policy);
        let drain = is_drain_required(&actions, &files, &old_cfg, &new_cfg, self.policy);
        tracing::info!(
            "{} file change(s); post-update actions: {}; drain required: {}",
            files.len(),
            actions,
            drain
        );

        Ok(Plan { old: old_cfg, new: new_cfg, diff, actions, drain })
    }

    /// Mutating → Persisting. Every success that can be undone lands in
    /// `ledger` before the next step starts.
    fn apply(
        &mut self,
        old: &Snapshot,
        new: &Snapshot,
        plan: &Plan,
        ctx: &UpdateContext<'_>,
        ledger: &mut RollbackLedger,
    ) -> Result<bool, TransactionError> {
        self.enter(TransactionState::Mutating);
        for (index, step) in self.steps.iter().enumerate() {
            let kind = step.kind();
            if !step.applies(ctx) {
                tracing::debug!("Skipping {}", kind);
                continue;
            }
            tracing::info!("Step: {}", kind);
            step.apply(&mut *self.host, &plan.old, &plan.new, ctx)
                .map_err(|source| TransactionError::MutationFailed { step: kind, source })?;
            match step.rollback() {
                RollbackPolicy::Inverse => ledger.push(Compensation::Revert { index, kind }),
                RollbackPolicy::None => tracing::debug!("{} is not rolled back", kind),
            }
        }

        self.enter(TransactionState::Persisting);
        let restore = self.restore_record(old);
        self.checkpoint
            .write(&CheckpointRecord::new(new.identity()))
            .map_err(TransactionError::PersistFailed)?;
        ledger.push(Compensation::RestoreCheckpoint(restore));

        self.finish(&plan.actions, ctx, &new.name)
    }

    /// What the checkpoint should read after a rollback: the record as it
    /// was before this transaction, or the old snapshot when there was none.
    fn restore_record(&self, old: &Snapshot) -> CheckpointRecord {
        match self.checkpoint.read() {
            Ok(Some(record)) => record,
            Ok(None) => CheckpointRecord::new(old.identity()),
            Err(e) => {
                tracing::warn!("Unreadable checkpoint record ({}); rollback will restore {}", e, old.name);
                CheckpointRecord::new(old.identity())
            }
        }
    }

    /// Post-update action. Returns whether a reboot is (still) required.
    fn finish(
        &mut self,
        actions: &ActionSet,
        ctx: &UpdateContext<'_>,
        new_name: &str,
    ) -> Result<bool, TransactionError> {
        if actions.requires_reboot() {
            if ctx.options.skip_reboot {
                tracing::info!("Reboot required for {}; leaving it to the caller", new_name);
                return Ok(true);
            }
            let rationale = format!("Node will reboot into config {}", new_name);
            self.host
                .reboot(&rationale)
                .map_err(|source| TransactionError::PostActionFailed { action: PostAction::Reboot, source })?;
            return Ok(true);
        }
        if actions.contains(PostAction::ReloadUnits) {
            if ctx.options.skip_reboot {
                tracing::info!("Unit reload left to the caller");
            } else {
                self.host
                    .reload_units()
                    .map_err(|source| TransactionError::PostActionFailed { action: PostAction::ReloadUnits, source })?;
            }
        }
        Ok(false)
    }

    fn unwind(
        &mut self,
        ledger: RollbackLedger,
        plan: &Plan,
        ctx: &UpdateContext<'_>,
    ) -> Vec<crate::errors::RollbackFailure> {
        let steps = &self.steps;
        let host = &mut *self.host;
        let checkpoint = &mut *self.checkpoint;
        ledger.unwind(|entry| match entry {
            Compensation::Revert { index, .. } => steps[*index]
                .apply(&mut *host, &plan.new, &plan.old, ctx)
                .map_err(RollbackError::from),
            Compensation::RestoreCheckpoint(record) => {
                checkpoint.write(record).map_err(RollbackError::from)
            }
        })
    }
}

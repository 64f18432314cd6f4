// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Termination Guard
//!
//! While any [`TerminationGuard`] is alive, termination requests are held
//! back instead of acted on. Dropping the last guard releases them, so an
//! update is never interrupted between two host mutations.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

type TerminateHook = Arc<dyn Fn() + Send + Sync>;

/// Guard count and the deferred request, changed together under one lock
/// so a request can never land between the last release and its check.
#[derive(Debug, Default)]
struct GateState {
    active: usize,
    pending: bool,
}

#[derive(Default)]
struct GateInner {
    state: Mutex<GateState>,
    hook: Mutex<Option<TerminateHook>>,
}

impl GateInner {
    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hook(&self) -> Option<TerminateHook> {
        self.hook.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Outcome of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationDecision {
    /// No update running; terminate now.
    Proceed,
    /// An update is running; the request is queued until it ends.
    Deferred,
}

#[derive(Clone, Default)]
pub struct TerminationGate {
    inner: Arc<GateInner>,
}

impl std::fmt::Debug for TerminationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state();
        f.debug_struct("TerminationGate")
            .field("active", &state.active)
            .field("pending", &state.pending)
            .finish()
    }
}

impl TerminationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a guarded window.
    pub fn guard(&self) -> TerminationGuard {
        self.inner.state().active += 1;
        TerminationGuard { inner: Arc::clone(&self.inner) }
    }

    pub fn is_guarded(&self) -> bool {
        self.inner.state().active > 0
    }

    /// Called on SIGTERM (or any other stop request).
    pub fn request_termination(&self) -> TerminationDecision {
        let mut state = self.inner.state();
        if state.active == 0 {
            return TerminationDecision::Proceed;
        }
        state.pending = true;
        drop(state);
        tracing::warn!("Got termination request, but actively updating; deferring");
        TerminationDecision::Deferred
    }

    /// Consume a request deferred by a guard that has since been released.
    pub fn take_pending(&self) -> bool {
        let mut state = self.inner.state();
        if state.active > 0 || !state.pending {
            return false;
        }
        state.pending = false;
        true
    }

    /// Run `hook` when a deferred request is released.
    pub fn on_release(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.inner.hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }
}

/// Scoped suppression of termination. Release is unconditional on drop.
#[must_use = "termination is only deferred while the guard is alive"]
pub struct TerminationGuard {
    inner: Arc<GateInner>,
}

impl Drop for TerminationGuard {
    fn drop(&mut self) {
        let mut state = self.inner.state();
        state.active = state.active.saturating_sub(1);
        if state.active > 0 || !state.pending {
            return;
        }
        // Without a hook the request stays queued for `take_pending`.
        let Some(hook) = self.inner.hook() else {
            return;
        };
        state.pending = false;
        drop(state);
        tracing::info!("Update finished; acting on deferred termination request");
        hook();
    }
}

/// Route SIGTERM through `gate`, calling `terminate` immediately when no
/// update is running and after the update otherwise.
pub fn install_sigterm_listener(
    gate: &TerminationGate,
    terminate: impl Fn() + Send + Sync + 'static,
) -> std::io::Result<JoinHandle<()>> {
    use signal_hook::consts::SIGTERM;
    use signal_hook::iterator::Signals;

    let terminate: TerminateHook = Arc::new(terminate);
    let on_release = Arc::clone(&terminate);
    gate.on_release(move || on_release());

    let mut signals = Signals::new([SIGTERM])?;
    let gate = gate.clone();
    Ok(std::thread::spawn(move || {
        for _ in signals.forever() {
            if gate.request_termination() == TerminationDecision::Proceed {
                tracing::info!("Got SIGTERM, shutting down");
                terminate();
            }
        }
    }))
}

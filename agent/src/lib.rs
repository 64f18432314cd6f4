// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod host;
pub mod collab;
pub mod guard;
pub mod mutate;
pub mod ledger;
pub mod transaction;
pub mod agent;
pub mod local;
pub mod fixtures;

pub use errors::{HostError, TransactionError};
pub use guard::{TerminationGate, TerminationGuard};
pub use host::{HostDescription, HostOps, OsVariant};
pub use transaction::{Collaborators, Outcome, TransactionState, UpdateOptions, UpdateTransaction};

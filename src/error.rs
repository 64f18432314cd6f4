// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

/// A configuration document that cannot be expanded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("config document must be a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("invalid document version {0:?}")]
    InvalidVersion(String),
    #[error("malformed field `{field}`: {reason}")]
    Malformed { field: String, reason: String },
    #[error("file path {0:?} must be absolute")]
    RelativePath(String),
    #[error("duplicate {kind} entry {name:?}")]
    Duplicate { kind: &'static str, name: String },
}

/// Why a transition cannot be applied as an in-place patch.
///
/// Surfaced as its own error kind so the caller can mark the node as needing
/// manual intervention rather than retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Unreconcilable {
    #[error("document major version changed from {old} to {new}")]
    VersionChange { old: String, new: String },
    #[error("changes to storage {0} are not reconcilable")]
    Storage(&'static str),
    #[error("FIPS mode cannot be toggled on a provisioned host")]
    Fips,
    #[error("passwd user {0:?} is not permitted; only {perm:?} may be managed", perm = crate::config::PERMITTED_USER)]
    UnsupportedUser(String),
    #[error("passwd user {user:?} changed field `{field}`; only ssh keys and password hash may change")]
    UserField { user: String, field: &'static str },
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration constants.

/// Document version written into the canonical empty snapshot.
pub const CURRENT_DOC_VERSION: &str = "3.4.0";

/// Name given to a snapshot that arrived without one.
pub const EMPTY_SNAPSHOT_NAME: &str = "mcd-empty-snapshot";

/// Mode applied to files whose declaration omits one.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// The only passwd user that may be reconciled in place.
pub const PERMITTED_USER: &str = "core";

/// Directory holding systemd unit files on the host.
pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";

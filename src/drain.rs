// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Drain Decider.

use crate::fileset::FileSetDiff;
use crate::plan::ActionSet;
use crate::policy::ActionPolicy;
use crate::types::ExpandedConfig;

/// Whether workloads must leave the node before the update proceeds.
///
/// Any reboot drains. Otherwise only changes known to disturb running
/// workloads do: policy drain paths, and units flipping between masked and
/// unmasked.
pub fn is_drain_required(
    actions: &ActionSet,
    files: &FileSetDiff,
    old: &ExpandedConfig,
    new: &ExpandedConfig,
    policy: &ActionPolicy,
) -> bool {
    if actions.requires_reboot() {
        return true;
    }
    if files.paths().any(|p| policy.requires_drain(p)) {
        return true;
    }
    new.units.iter().any(|(name, unit)| {
        let was_masked = old.units.get(name).map(|u| u.mask).unwrap_or(false);
        was_masked != unit.mask
    }) || old
        .units
        .iter()
        .any(|(name, unit)| unit.mask && !new.units.contains_key(name))
}

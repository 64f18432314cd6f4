// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Action Planner: what must happen after the new configuration is on disk.

use crate::diff::ConfigDiff;
use crate::fileset::FileSetDiff;
use crate::policy::ActionPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostAction {
    ReloadUnits,
    Reboot,
}

/// Required post-update operations. The empty set means "none".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionSet(BTreeSet<PostAction>);

impl ActionSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, action: PostAction) {
        self.0.insert(action);
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, action: PostAction) -> bool {
        self.0.contains(&action)
    }

    pub fn requires_reboot(&self) -> bool {
        self.contains(PostAction::Reboot)
    }

    pub fn iter(&self) -> impl Iterator<Item = PostAction> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<PostAction> for ActionSet {
    fn from_iter<I: IntoIterator<Item = PostAction>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for PostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostAction::ReloadUnits => write!(f, "reload-units"),
            PostAction::Reboot => write!(f, "reboot"),
        }
    }
}

impl fmt::Display for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        let names: Vec<String> = self.iter().map(|a| a.to_string()).collect();
        write!(f, "{}", names.join(","))
    }
}

/// Map a classified diff and its file changes to post-update actions.
///
/// An empty diff plans nothing; the caller still runs the whole pipeline so
/// the checkpoint is written the same way every time.
pub fn plan_actions(diff: &ConfigDiff, files: &FileSetDiff, policy: &ActionPolicy) -> ActionSet {
    let mut actions = ActionSet::none();

    if diff.os_update || diff.kargs || diff.kernel_type || diff.extensions {
        actions.insert(PostAction::Reboot);
    }
    if diff.units {
        actions.insert(PostAction::ReloadUnits);
    }
    for path in files.paths() {
        if let Some(action) = policy.action_for(path) {
            actions.insert(action);
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileset::diff_files;
    use crate::types::{ExpandedConfig, FileEntry};

    fn with_file(path: &str) -> ExpandedConfig {
        let mut c = ExpandedConfig::default();
        c.files.insert(
            path.into(),
            FileEntry { path: path.into(), contents: "x".into(), mode: 0o644, overwrite: true },
        );
        c
    }

    #[test]
    fn empty_diff_plans_nothing() {
        let actions = plan_actions(&ConfigDiff::default(), &FileSetDiff::default(), &ActionPolicy::default());
        assert!(actions.is_none());
        assert_eq!(actions.to_string(), "none");
    }

    #[test]
    fn os_level_changes_force_reboot() {
        for diff in [
            ConfigDiff { os_update: true, ..ConfigDiff::default() },
            ConfigDiff { kargs: true, ..ConfigDiff::default() },
            ConfigDiff { kernel_type: true, ..ConfigDiff::default() },
            ConfigDiff { extensions: true, ..ConfigDiff::default() },
        ] {
            assert!(plan_actions(&diff, &FileSetDiff::default(), &ActionPolicy::default()).requires_reboot());
        }
    }

    #[test]
    fn file_rules_drive_actions() {
        let policy = ActionPolicy::default();
        let diff = ConfigDiff { files: true, ..ConfigDiff::default() };

        let plain = diff_files(&ExpandedConfig::default(), &with_file("/etc/motd"));
        assert!(plan_actions(&diff, &plain, &policy).is_none());

        let unit_conf = diff_files(&ExpandedConfig::default(), &with_file("/etc/systemd/system.conf"));
        let actions = plan_actions(&diff, &unit_conf, &policy);
        assert!(actions.contains(PostAction::ReloadUnits));
        assert!(!actions.requires_reboot());

        let modprobe = diff_files(&ExpandedConfig::default(), &with_file("/etc/modprobe.d/x.conf"));
        assert!(plan_actions(&diff, &modprobe, &policy).requires_reboot());
    }

    #[test]
    fn passwd_alone_needs_nothing() {
        let diff = ConfigDiff { passwd: true, ..ConfigDiff::default() };
        assert!(plan_actions(&diff, &FileSetDiff::default(), &ActionPolicy::default()).is_none());
    }
}

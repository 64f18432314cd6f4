// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Path policy shared by the planner, the drain decider and the file writer.

use crate::plan::PostAction;
use serde::{Deserialize, Serialize};

/// What a changed file under `prefix` requires once it is on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRule {
    pub prefix: String,
    /// `None` means the change takes effect without any follow-up.
    pub action: Option<PostAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionPolicy {
    /// Checked in order; first matching prefix wins.
    pub file_rules: Vec<FileRule>,
    /// Paths whose change disturbs running workloads even without a reboot.
    pub drain_paths: Vec<String>,
    /// Paths left alone when the caller asks to skip certificate writes.
    pub certificate_paths: Vec<String>,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self {
            file_rules: vec![
                FileRule { prefix: "/etc/systemd/".into(), action: Some(PostAction::ReloadUnits) },
                FileRule { prefix: "/etc/modprobe.d/".into(), action: Some(PostAction::Reboot) },
                FileRule { prefix: "/etc/dracut.conf.d/".into(), action: Some(PostAction::Reboot) },
            ],
            drain_paths: vec![
                "/etc/containers/registries.conf".into(),
                "/etc/kubernetes/kubelet.conf".into(),
            ],
            certificate_paths: vec![
                "/etc/kubernetes/kubelet-ca.crt".into(),
                "/etc/pki/ca-trust/source/anchors/".into(),
            ],
        }
    }
}

impl ActionPolicy {
    pub fn action_for(&self, path: &str) -> Option<PostAction> {
        self.file_rules
            .iter()
            .find(|r| path.starts_with(&r.prefix))
            .and_then(|r| r.action)
    }

    pub fn requires_drain(&self, path: &str) -> bool {
        self.drain_paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn is_certificate(&self, path: &str) -> bool {
        self.certificate_paths.iter().any(|p| path.starts_with(p.as_str()))
    }
}

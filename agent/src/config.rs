// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use mcd_core::policy::ActionPolicy;
use mcd_persistence::DEFAULT_CHECKPOINT_PATH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Where the checkpoint record lives.
    pub checkpoint_path: PathBuf,
    /// Filesystem root host mutations are applied under.
    pub host_root: PathBuf,
    pub policy: ActionPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            host_root: PathBuf::from("/"),
            policy: ActionPolicy::default(),
        }
    }
}

impl AgentConfig {
    /// Load a JSON config file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.json");
        std::fs::write(&path, r#"{ "host_root": "/sysroot" }"#).unwrap();

        let cfg = AgentConfig::load(&path).unwrap();
        assert_eq!(cfg.host_root, PathBuf::from("/sysroot"));
        assert_eq!(cfg.checkpoint_path, PathBuf::from(DEFAULT_CHECKPOINT_PATH));
        assert_eq!(cfg.policy, ActionPolicy::default());
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = AgentConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
        assert!(matches!(AgentConfig::load(dir.path().join("absent.json")), Err(ConfigError::Io { .. })));
    }
}

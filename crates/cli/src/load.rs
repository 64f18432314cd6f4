use anyhow::Context;
use mcd_agent::config::AgentConfig;
use mcd_core::snapshot::Snapshot;
use std::path::Path;

/// Read a snapshot from a JSON file.
pub fn snapshot(path: &Path) -> anyhow::Result<Snapshot> {
    let data = std::fs::read(path).with_context(|| format!("reading snapshot {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parsing snapshot {}", path.display()))
}

/// The agent config at `path`, or the defaults.
pub fn agent_config(path: Option<&Path>) -> anyhow::Result<AgentConfig> {
    match path {
        Some(p) => Ok(AgentConfig::load(p)?),
        None => Ok(AgentConfig::default()),
    }
}

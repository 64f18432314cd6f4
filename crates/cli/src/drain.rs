use mcd_agent::collab::DrainClient;
use mcd_agent::errors::DrainError;
use std::process::Command;

/// Drains by running an operator-supplied shell command.
///
/// Without a command any drain request fails, so an update that needs one
/// never proceeds with workloads still on the node.
#[derive(Debug, Clone, Default)]
pub struct CommandDrain {
    pub command: Option<String>,
}

impl DrainClient for CommandDrain {
    fn drain(&mut self) -> Result<(), DrainError> {
        let Some(command) = &self.command else {
            return Err(DrainError("drain required but no --drain-command given".into()));
        };
        tracing::info!("Draining node: {}", command);
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .map_err(|e| DrainError(format!("{}: {}", command, e)))?;
        if status.success() {
            Ok(())
        } else {
            Err(DrainError(format!("{} exited with {}", command, status)))
        }
    }
}

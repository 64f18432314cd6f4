use clap::{Parser, Subcommand};
use mcd_agent::telemetry::init_telemetry;
use mcd_cli::commands::apply::ApplyArgs;
use mcd_cli::commands::{apply, checkpoint, diff};
use mcd_persistence::DEFAULT_CHECKPOINT_PATH;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mcd")]
#[command(about = "Node configuration update agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update the host from the current snapshot to the desired one.
    Apply {
        /// Snapshot currently applied (JSON). An unnamed snapshot means nothing is.
        current: PathBuf,
        /// Snapshot to move to (JSON).
        desired: PathBuf,

        /// Agent config file (JSON)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Filesystem root to apply under (overrides the config)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Checkpoint record path (overrides the config)
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Shell command that drains the node when the update needs it
        #[arg(long)]
        drain_command: Option<String>,

        /// Report a required reboot instead of rebooting
        #[arg(long)]
        skip_reboot: bool,

        /// Leave certificate files alone
        #[arg(long)]
        skip_certificate_write: bool,

        /// Apply to an in-memory host and print the operations
        #[arg(long)]
        dry_run: bool,

        /// Print Prometheus metrics after the update
        #[arg(long)]
        metrics: bool,
    },
    /// Show what an update would change, which actions follow and whether it drains.
    Diff {
        current: PathBuf,
        desired: PathBuf,

        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Inspect the checkpoint record
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointCommand,
    },
}

#[derive(Subcommand)]
enum CheckpointCommand {
    /// Print header and contents
    Show {
        #[arg(long, default_value = DEFAULT_CHECKPOINT_PATH)]
        path: PathBuf,
    },
    /// Check the record against a snapshot
    Verify {
        snapshot: PathBuf,

        #[arg(long, default_value = DEFAULT_CHECKPOINT_PATH)]
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    init_telemetry();
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            current,
            desired,
            config,
            root,
            checkpoint,
            drain_command,
            skip_reboot,
            skip_certificate_write,
            dry_run,
            metrics,
        } => {
            let args = ApplyArgs {
                current,
                desired,
                config,
                root,
                checkpoint,
                drain_command,
                skip_reboot,
                skip_certificate_write,
                dry_run,
            };
            let result = apply::run(&args);
            if metrics {
                println!("{}", mcd_agent::telemetry::render_metrics());
            }
            result.map(|_| ())
        }
        Commands::Diff { current, desired, config } => diff::run(&current, &desired, config.as_deref()),
        Commands::Checkpoint { action } => match action {
            CheckpointCommand::Show { path } => checkpoint::show(&path),
            CheckpointCommand::Verify { snapshot, path } => checkpoint::verify(&path, &snapshot).map(|_| ()),
        },
    }
}

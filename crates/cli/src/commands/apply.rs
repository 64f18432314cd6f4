use crate::drain::CommandDrain;
use crate::load;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use mcd_agent::fixtures::{materialize, MemoryHost};
use mcd_agent::guard::install_sigterm_listener;
use mcd_agent::local::{detect_os_variant, LocalHost};
use mcd_agent::{Collaborators, HostDescription, HostOps, Outcome, TerminationGate, TransactionError, UpdateOptions, UpdateTransaction};
use mcd_core::parse::{ConfigParser, DocumentParser};
use mcd_core::policy::ActionPolicy;
use mcd_core::snapshot::Snapshot;
use mcd_persistence::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct ApplyArgs {
    pub current: PathBuf,
    pub desired: PathBuf,
    pub config: Option<PathBuf>,
    /// Overrides the config's host root.
    pub root: Option<PathBuf>,
    /// Overrides the config's checkpoint path.
    pub checkpoint: Option<PathBuf>,
    pub drain_command: Option<String>,
    pub skip_reboot: bool,
    pub skip_certificate_write: bool,
    /// Run against an in-memory copy of the current snapshot.
    pub dry_run: bool,
}

pub fn run(args: &ApplyArgs) -> anyhow::Result<Outcome> {
    let cfg = load::agent_config(args.config.as_deref())?;
    let old = load::snapshot(&args.current)?;
    let new = load::snapshot(&args.desired)?;
    let root = args.root.clone().unwrap_or(cfg.host_root.clone());
    let options = UpdateOptions {
        skip_certificate_write: args.skip_certificate_write,
        skip_reboot: args.skip_reboot,
    };

    let gate = TerminationGate::new();
    let mut drain = CommandDrain { command: args.drain_command.clone() };
    let description = HostDescription::new(detect_os_variant(&root));

    let (result, calls) = if args.dry_run {
        let mut host = MemoryHost::new();
        materialize(&mut host, &DocumentParser.expand(&old.clone().canonicalize_empty())?);
        let mut store = MemoryCheckpointStore::new();
        let result = execute(&mut host, &mut drain, &mut store, &gate, description, &cfg.policy, old, new, options);
        let calls: Vec<String> = host.calls().iter().map(|op| format!("{:?}", op)).collect();
        (result, calls)
    } else {
        let _listener = install_sigterm_listener(&gate, || std::process::exit(143))?;
        let mut host = LocalHost::new(&root);
        let mut store = FileCheckpointStore::new(args.checkpoint.clone().unwrap_or(cfg.checkpoint_path.clone()));
        let result = execute(&mut host, &mut drain, &mut store, &gate, description, &cfg.policy, old, new, options);
        (result, Vec::new())
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Property", "Value"]);
    table.add_row(vec!["Host", &format!("{:?} at {}", description.variant, root.display())]);

    match &result {
        Ok(outcome) => {
            table.add_row(vec!["Status", "COMMITTED"]);
            table.add_row(vec!["Changed", &outcome.diff.to_string()]);
            table.add_row(vec!["Actions", &outcome.actions.to_string()]);
            table.add_row(vec!["Drained", &outcome.drained.to_string()]);
            table.add_row(vec!["Reboot Required", &outcome.reboot_required.to_string()]);
        }
        Err(e) if e.is_degraded() => {
            table.add_row(vec!["Status".to_string(), "DEGRADED".to_string()]);
            table.add_row(vec!["Error".to_string(), e.to_string()]);
        }
        Err(e) => {
            table.add_row(vec!["Status".to_string(), "FAILED".to_string()]);
            table.add_row(vec!["Error".to_string(), e.to_string()]);
        }
    }

    println!("\nUpdate Result");
    println!("-------------");
    println!("{table}\n");

    if !calls.is_empty() {
        println!("Host operations (dry run):");
        for call in &calls {
            println!("  {}", call);
        }
        println!();
    }

    Ok(result?)
}

#[allow(clippy::too_many_arguments)]
fn execute(
    host: &mut dyn HostOps,
    drain: &mut CommandDrain,
    store: &mut dyn CheckpointStore,
    gate: &TerminationGate,
    description: HostDescription,
    policy: &ActionPolicy,
    old: Snapshot,
    new: Snapshot,
    options: UpdateOptions,
) -> Result<Outcome, TransactionError> {
    let mut txn = UpdateTransaction::new(
        Collaborators {
            parser: &DocumentParser,
            host,
            drain,
            status: None,
            checkpoint: store,
            gate,
        },
        description,
        policy,
    );
    txn.run(old, new, options)
}

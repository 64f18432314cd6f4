use crate::load;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use mcd_core::diff::classify;
use mcd_core::drain::is_drain_required;
use mcd_core::fileset::{diff_files, FileChangeKind};
use mcd_core::parse::{ConfigParser, DocumentParser};
use mcd_core::plan::plan_actions;
use std::path::Path;

/// What an update from `current` to `desired` would do, without doing it.
pub fn run(current: &Path, desired: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let cfg = load::agent_config(config)?;
    let old = load::snapshot(current)?.canonicalize_empty();
    let new = load::snapshot(desired)?;

    let old_cfg = DocumentParser.expand(&old)?;
    let new_cfg = DocumentParser.expand(&new)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Property", "Value"]);
    table.add_row(vec!["From", &old.identity().to_string()]);
    table.add_row(vec!["To", &new.identity().to_string()]);

    let diff = match classify(&old_cfg, &new_cfg) {
        Ok(diff) => diff,
        Err(reason) => {
            table.add_row(vec!["Status".to_string(), format!("UNRECONCILABLE: {}", reason)]);
            println!("\nUpdate Plan");
            println!("-----------");
            println!("{table}\n");
            return Err(reason.into());
        }
    };

    let files = diff_files(&old_cfg, &new_cfg);
    let actions = plan_actions(&diff, &files, &cfg.policy);
    let drain = is_drain_required(&actions, &files, &old_cfg, &new_cfg, &cfg.policy);

    table.add_row(vec!["Status", if diff.is_empty() { "IDENTICAL" } else { "CHANGED" }]);
    table.add_row(vec!["Changed", &diff.to_string()]);
    table.add_row(vec!["Actions", &actions.to_string()]);
    table.add_row(vec!["Drain", if drain { "required" } else { "not required" }]);

    println!("\nUpdate Plan");
    println!("-----------");
    println!("{table}\n");

    if !files.is_empty() {
        let mut changes = Table::new();
        changes
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Path", "Change", "Action"]);
        for change in &files {
            let kind = match change.kind {
                FileChangeKind::Added => "added",
                FileChangeKind::Removed => "removed",
                FileChangeKind::Modified => "modified",
            };
            let action = cfg
                .policy
                .action_for(&change.path)
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string());
            changes.add_row(vec![change.path.clone(), kind.to_string(), action]);
        }
        println!("File Changes\n");
        println!("{changes}\n");
    }

    Ok(())
}

use crate::load;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use mcd_persistence::checkpoint::{decode_record, CheckpointHeader};
use mcd_persistence::{verify_convergence, Convergence, FileCheckpointStore};
use std::path::Path;

/// Print the record header and body at `path`.
pub fn show(path: &Path) -> anyhow::Result<()> {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Field", "Value"]);

    if !path.exists() {
        table.add_row(vec!["Record", "MISSING"]);
        println!("\nCheckpoint Record ({})\n", path.display());
        println!("{table}\n");
        return Ok(());
    }

    let data = std::fs::read(path)?;
    let header = CheckpointHeader::from_bytes(&data)?;
    table.add_row(vec!["Magic", std::str::from_utf8(&header.magic).unwrap_or("BAD")]);
    table.add_row(vec!["Version", &header.version.to_string()]);
    table.add_row(vec!["Body", &format!("{} bytes", header.body_len)]);
    table.add_row(vec!["CRC64", &format!("{:016x}", header.checksum)]);

    let status = match decode_record(&data) {
        Ok(record) => {
            let written = chrono::DateTime::from_timestamp(record.written_at_unix as i64, 0)
                .unwrap_or_default()
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
            table.add_row(vec!["Snapshot", &record.identity.name]);
            table.add_row(vec!["Hash", &record.identity.hash]);
            table.add_row(vec!["Written", &written]);
            Ok(())
        }
        Err(e) => {
            table.add_row(vec!["Status".to_string(), format!("CORRUPT: {}", e)]);
            Err(e)
        }
    };

    println!("\nCheckpoint Record ({})\n", path.display());
    println!("{table}\n");
    Ok(status?)
}

/// Check whether the record at `path` names the snapshot in `snapshot`.
pub fn verify(path: &Path, snapshot: &Path) -> anyhow::Result<Convergence> {
    let expected = load::snapshot(snapshot)?.identity();
    let store = FileCheckpointStore::new(path);
    let convergence = verify_convergence(&store, &expected)?;

    match &convergence {
        Convergence::Converged => {
            println!("\nCONVERGED\n");
            println!("Snapshot: {}\n", expected);
        }
        Convergence::Pending { current } => {
            println!("\nPENDING\n");
            println!("Expected: {}", expected);
            println!("On disk:  {}\n", current.identity);
        }
        Convergence::Missing => {
            println!("\nMISSING\n");
            println!("No checkpoint record at {}\n", path.display());
        }
    }
    Ok(convergence)
}

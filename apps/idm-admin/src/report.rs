//! CSV and console output.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use idm_client::{InventoryReport, InventoryRow, MachineUser};

/// RFC 4180 writer: CRLF line ends, fields quoted only when needed.
fn csv_writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(out)
}

/// Flush and hand back the underlying writer.
fn finish<W: Write>(wtr: csv::Writer<W>) -> csv::Result<W> {
    wtr.into_inner().map_err(|e| e.into_error().into())
}

/// Write inventory rows with a header line.
///
/// # Errors
///
/// Propagates write failures.
pub fn write_inventory<W: Write>(out: W, rows: &[InventoryRow]) -> csv::Result<W> {
    let mut wtr = csv_writer(out);
    wtr.write_record(InventoryRow::COLUMNS)?;
    for row in rows {
        wtr.write_record(row.cells())?;
    }
    finish(wtr)
}

/// Write the inventory CSV to `path`.
///
/// # Errors
///
/// Fails when the file cannot be created or written.
pub fn save_inventory(path: &Path, report: &InventoryReport) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    write_inventory(BufWriter::new(file), &report.rows)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

/// Console summary of an inventory or bulk rotation.
pub fn print_summary(path: &Path, report: &InventoryReport) {
    let failed = report.rows.iter().filter(|r| r.rotation.is_failure()).count();
    println!("# wrote {} rows to {}", report.rows.len(), path.display());
    println!("# rotated: {}, failed: {failed}", report.rotated().count());
    for warning in &report.warnings {
        println!("# warn: {warning}");
    }
    for row in report.rows.iter().filter(|r| r.rotation.is_failure()) {
        println!(
            "# failed: {} {} ({}): {}",
            row.scope,
            row.resource_id,
            row.name,
            row.rotation.report_value()
        );
    }
}

/// Machine users as CSV on `out`.
///
/// # Errors
///
/// Propagates write failures.
pub fn write_machine_users<W: Write>(out: W, users: &[MachineUser]) -> csv::Result<W> {
    let mut wtr = csv_writer(out);
    wtr.write_record(["user_id", "username", "display_name", "client_id", "owner"])?;
    for user in users {
        wtr.write_record([
            &user.user_id,
            &user.username,
            &user.display_name,
            &user.client_id,
            &user.owner,
        ])?;
    }
    finish(wtr)
}

//! CSV Output
//!
//! Header row, then one record per table row. Nulls are written as empty
//! fields.

use std::fs;
use std::io::Write;
use std::path::Path;
use tabular::Table;

fn write_records<W: Write>(table: &Table, writer: &mut csv::Writer<W>) -> csv::Result<()> {
    writer.write_record(table.column_names())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a table as CSV
pub fn write_table<W: Write>(table: &Table, out: W) -> csv::Result<()> {
    write_records(table, &mut csv::Writer::from_writer(out))
}

/// Write a table to a CSV file, creating parent directories
pub fn write_table_file(table: &Table, path: &Path) -> csv::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_records(table, &mut csv::Writer::from_path(path)?)
}

// src/export/csv_out.rs

//! CSV reading and writing
//!
//! Exports are written as a header row followed by one row per campaign,
//! with missing values left empty. Update input files are read back as flat
//! label → value rows.

use crate::api::uid::file_safe;
use crate::error::Result;
use crate::metadata::FlatInput;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use super::campaign::ExportTable;

/// File name of a license's campaign export
pub fn export_file_name(license_uid: &str) -> String {
    format!("{}_campaign_export.csv", file_safe(license_uid))
}

/// Write a table as CSV
pub fn write_table<W: Write>(table: &ExportTable, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(&table.headers)?;
    for cells in table.cells() {
        csv.write_record(cells.iter().map(|c| c.unwrap_or_default()))?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_table_to_path(table: &ExportTable, path: &Path) -> Result<()> {
    write_table(table, File::create(path)?)
}

/// Read CSV rows keyed by header
///
/// Blank cells are kept as empty strings so that they clear values.
pub fn read_flat_rows<R: Read>(reader: R) -> Result<Vec<FlatInput>> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers = csv.headers()?.clone();
    let mut rows = Vec::new();
    for record in csv.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

pub fn read_flat_rows_from_path(path: &Path) -> Result<Vec<FlatInput>> {
    read_flat_rows(File::open(path)?)
}

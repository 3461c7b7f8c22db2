// src/export/mod.rs

//! Campaign exports
//!
//! This module provides:
//! - Formatters for the standard campaign fields
//! - The export driver producing an `ExportTable`
//! - CSV output (and CSV input for metadata updates)
//! - A batched, idempotent loader into a SQLite analytics table

mod campaign;
mod csv_out;
mod format;
mod warehouse;

pub use campaign::{CampaignExport, ExportOptions, ExportRow, ExportTable, Since, TOPICS_METADATA_LABEL};
pub use csv_out::{
    export_file_name, read_flat_rows, read_flat_rows_from_path, write_table, write_table_to_path,
};
pub use format::{
    format_budget, format_date, format_text, CampaignFormatter, FormatKind, NameCache, StandardField,
    CAMPAIGN_ID_HEADER, STANDARD_FIELDS, STANDARD_HEADERS,
};
pub use warehouse::{
    get_schema_version, migrate, table_cells, LoadSummary, WarehouseCell, WarehouseLoader,
    EXPORT_TABLE, SCHEMA_VERSION,
};

// src/export/warehouse.rs

//! Analytics table sink
//!
//! Export tables are loaded into a local SQLite table in long layout: one
//! row per (campaign, run date, column). A load first deletes the rows of
//! the same campaigns and run date, then inserts in batches, so reloading a
//! run replaces it instead of duplicating it.
//!
//! Rows inside the streaming-buffer window (loaded less than
//! `streaming_buffer_minutes` ago) cannot be deleted; such a reload fails
//! with `Error::StreamingBuffer`. A locked database is a concurrent-update
//! conflict and is retried with increasing backoff.

use crate::api::{Sleeper, ThreadSleeper};
use crate::config::WarehouseConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::campaign::ExportTable;
use super::format::CAMPAIGN_ID_HEADER;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Name of the analytics table
pub const EXPORT_TABLE: &str = "campaign_export";

/// Column holding the license of a campaign
const SCOPE_HEADER: &str = "License ID";

fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;
    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);
    Ok(version)
}

/// Apply pending migrations
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    if current_version >= SCHEMA_VERSION {
        debug!("Warehouse schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying warehouse migration to version {}", version);
        match version {
            1 => migrate_v1(conn)?,
            _ => return Err(Error::Config(format!("unknown warehouse schema version {version}"))),
        }
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    }
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE campaign_export (
            record_id TEXT NOT NULL,
            run_date TEXT NOT NULL,
            scope_id TEXT,
            column_name TEXT NOT NULL,
            value TEXT,
            loaded_at TEXT NOT NULL,
            PRIMARY KEY (record_id, run_date, column_name)
        );

        CREATE INDEX idx_campaign_export_run_date ON campaign_export(run_date);
        ",
    )?;
    Ok(())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_conflict(error: &Error) -> bool {
    matches!(
        error,
        Error::Database(rusqlite::Error::SqliteFailure(e, _))
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Run `op`, retrying lock conflicts with a backoff of 1 s, 2 s, ...
fn with_conflict_retry<T>(
    conn: &mut Connection,
    sleeper: &dyn Sleeper,
    max_attempts: u32,
    mut op: impl FnMut(&mut Connection) -> Result<T>,
) -> Result<T> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(conn) {
            Err(e) if is_conflict(&e) => {
                if attempt >= max_attempts {
                    return Err(Error::WarehouseConflict {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                let delay = Duration::from_secs(u64::from(attempt));
                warn!(
                    "Warehouse table busy (attempt {}/{}), retrying in {:?}",
                    attempt, max_attempts, delay
                );
                sleeper.sleep(delay);
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// One cell of the long layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseCell {
    pub record_id: String,
    pub scope_id: Option<String>,
    pub column_name: String,
    pub value: Option<String>,
}

/// Counts of one load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub records: usize,
    pub deleted: usize,
    pub inserted: usize,
}

/// Flatten a table into cells; rows without a campaign id are skipped
pub fn table_cells(table: &ExportTable) -> Vec<WarehouseCell> {
    let mut cells = Vec::new();
    for row in &table.rows {
        let Some(record_id) = row.value(CAMPAIGN_ID_HEADER) else {
            warn!("Skipping export row without {}", CAMPAIGN_ID_HEADER);
            continue;
        };
        for header in &table.headers {
            cells.push(WarehouseCell {
                record_id: record_id.to_string(),
                scope_id: row.value(SCOPE_HEADER).map(str::to_string),
                column_name: header.clone(),
                value: row.value(header).map(str::to_string),
            });
        }
    }
    cells
}

/// Loads export tables into the analytics table
pub struct WarehouseLoader {
    conn: Connection,
    config: WarehouseConfig,
    sleeper: Box<dyn Sleeper>,
}

impl WarehouseLoader {
    /// Open (and migrate) the database at `path`
    pub fn open(path: &Path, config: WarehouseConfig) -> Result<Self> {
        Self::from_connection(Connection::open(path)?, config)
    }

    pub fn open_in_memory(config: WarehouseConfig) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, config)
    }

    fn from_connection(conn: Connection, config: WarehouseConfig) -> Result<Self> {
        migrate(&conn)?;
        // Lock conflicts go through the retry policy rather than SQLite's busy handler
        conn.busy_timeout(Duration::ZERO)?;
        Ok(Self {
            conn,
            config,
            sleeper: Box::new(ThreadSleeper),
        })
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Load `table` as the run of `run_timestamp`'s date
    pub fn load(&mut self, table: &ExportTable, run_timestamp: DateTime<Utc>) -> Result<LoadSummary> {
        self.load_at(table, run_timestamp, Utc::now())
    }

    /// Load with an explicit wall-clock time
    pub fn load_at(
        &mut self,
        table: &ExportTable,
        run_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<LoadSummary> {
        let run_date = run_timestamp.date_naive().to_string();
        let cells = table_cells(table);
        let record_ids: BTreeSet<&str> = cells.iter().map(|c| c.record_id.as_str()).collect();
        let window = self.config.streaming_buffer_minutes;
        let max_attempts = self.config.max_conflict_retries;
        let loaded_at = timestamp(now);

        let deleted = with_conflict_retry(&mut self.conn, self.sleeper.as_ref(), max_attempts, |conn| {
            let tx = conn.transaction()?;
            if window > 0 {
                let threshold = timestamp(now - ChronoDuration::minutes(window));
                for record_id in &record_ids {
                    let recent: i64 = tx.query_row(
                        "SELECT COUNT(*) FROM campaign_export
                         WHERE record_id = ?1 AND run_date = ?2 AND loaded_at > ?3",
                        params![record_id, run_date, threshold],
                        |row| row.get(0),
                    )?;
                    if recent > 0 {
                        return Err(Error::StreamingBuffer(format!(
                            "rows of {record_id} for {run_date} were loaded less than {window} minutes ago"
                        )));
                    }
                }
            }
            let mut deleted = 0;
            for record_id in &record_ids {
                deleted += tx.execute(
                    "DELETE FROM campaign_export WHERE record_id = ?1 AND run_date = ?2",
                    params![record_id, run_date],
                )?;
            }
            tx.commit()?;
            Ok(deleted)
        })?;
        debug!("Deleted {} existing cells for {}", deleted, run_date);

        let mut inserted = 0;
        for batch in cells.chunks(self.config.batch_size.max(1)) {
            inserted += with_conflict_retry(&mut self.conn, self.sleeper.as_ref(), max_attempts, |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO campaign_export
                            (record_id, run_date, scope_id, column_name, value, loaded_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )?;
                    for cell in batch {
                        stmt.execute(params![
                            cell.record_id,
                            run_date,
                            cell.scope_id,
                            cell.column_name,
                            cell.value,
                            loaded_at,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(batch.len())
            })?;
        }

        info!(
            "Loaded {} campaigns ({} cells) for {}",
            record_ids.len(),
            inserted,
            run_date
        );
        Ok(LoadSummary {
            records: record_ids.len(),
            deleted,
            inserted,
        })
    }

    /// Stored cells of one campaign and run date, by column name
    pub fn record(&self, record_id: &str, run_date: &str) -> Result<Vec<(String, Option<String>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name, value FROM campaign_export
             WHERE record_id = ?1 AND run_date = ?2
             ORDER BY column_name",
        )?;
        let rows = stmt
            .query_map(params![record_id, run_date], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Number of stored cells
    pub fn cell_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM campaign_export", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// tests/warehouse.rs

//! Warehouse tests: loading exported tables into the SQLite analytics table.

mod common;

use chrono::{Duration, TimeZone, Utc};
use cms_export::api::mock::MockTransport;
use cms_export::api::Method;
use cms_export::config::WarehouseConfig;
use cms_export::export::{CampaignExport, ExportOptions, WarehouseLoader};
use cms_export::progress::SilentProgress;
use cms_export::Error;
use common::{campaign, client, page, script_license, script_records, LICENSE};
use serde_json::json;

fn exported_table() -> cms_export::export::ExportTable {
    let mock = MockTransport::new();
    script_license(&mock);
    mock.respond(
        Method::Get,
        "/v5/campaign/",
        200,
        page(json!([
            campaign("campaign:1", "Winter", "2024-01-02T00:00:00Z"),
            campaign("campaign:2", "Spring", "2024-02-02T00:00:00Z")
        ])),
    );
    script_records(&mock, "campaign:1", json!([]));
    script_records(&mock, "campaign:2", json!([]));
    let client = client(&mock);
    CampaignExport::new(&client)
        .build_table(LICENSE, &ExportOptions::default(), &SilentProgress::new())
        .unwrap()
}

#[test]
fn test_load_export_into_file_database() {
    let table = exported_table();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("warehouse.db");
    let config = WarehouseConfig {
        batch_size: 5,
        streaming_buffer_minutes: 90,
        max_conflict_retries: 2,
    };
    let run = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
    let cells_per_run = table.rows.len() * table.headers.len();

    let mut loader = WarehouseLoader::open(&db_path, config.clone()).unwrap();
    let summary = loader.load_at(&table, run, run).unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.inserted, cells_per_run);
    drop(loader);

    // Reloading the same run within the buffer window is refused
    let mut loader = WarehouseLoader::open(&db_path, config).unwrap();
    let err = loader
        .load_at(&table, run, run + Duration::minutes(30))
        .unwrap_err();
    assert!(matches!(err, Error::StreamingBuffer(_)));
    assert_eq!(loader.cell_count().unwrap(), cells_per_run);

    // Once the window has passed the run is replaced, not duplicated
    let summary = loader
        .load_at(&table, run, run + Duration::minutes(120))
        .unwrap();
    assert_eq!(summary.deleted, cells_per_run);
    assert_eq!(loader.cell_count().unwrap(), cells_per_run);

    let stored = loader.record("campaign:2", "2024-05-01").unwrap();
    assert!(stored.contains(&("Title".to_string(), Some("Spring".to_string()))));
    assert!(stored.contains(&("End At".to_string(), None)));
}

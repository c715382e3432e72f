//! Pipeline runs against real SQLite stores
//!
//! Repeated runs over the same codes must not duplicate rows or documents.

mod helpers;

use helpers::*;
use pcr_ingest::db::{SqliteAddressStore, SqliteDocumentStore};
use pcr_ingest::{FetchError, Pipeline};
use std::sync::Arc;
use tempfile::TempDir;

fn sqlite_url(dir: &TempDir, name: &str) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join(name).display())
}

#[tokio::test]
async fn test_repeated_runs_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");

    let mut config = test_config(4);
    config.rate_per_sec = 1000.0;
    config.relational_url = sqlite_url(&dir, "addresses.db");
    config.document_url = sqlite_url(&dir, "documents.db");

    let codes = ["01001000", "20040-020", "30130010"];

    // First run creates everything
    let first = Pipeline::new(config.clone(), &out)
        .with_lookup_factory(Arc::new(ScriptedLookups::new()))
        .run(codes)
        .await
        .unwrap();
    assert_eq!(first.succeeded, 3);
    assert_eq!(first.relational.unwrap().inserted, 3);
    assert_eq!(first.relational_rows, Some(3));
    assert_eq!(first.document.unwrap().upserted, 3);

    // Second run ignores rows and replaces documents
    let second = Pipeline::new(config.clone(), &out)
        .with_lookup_factory(Arc::new(ScriptedLookups::new()))
        .run(codes)
        .await
        .unwrap();
    let relational = second.relational.unwrap();
    assert_eq!(relational.inserted, 0);
    assert_eq!(relational.ignored, 3);
    assert_eq!(second.relational_rows, Some(3));
    let document = second.document.unwrap();
    assert_eq!(document.upserted, 0);
    assert_eq!(document.updated, 3);

    let addresses = SqliteAddressStore::connect(&config.relational_url).await.unwrap();
    let row = addresses.load("20040020").await.unwrap().unwrap();
    assert_eq!(row.street, "Rua 20040020");

    let documents = SqliteDocumentStore::connect(&config.document_url, 1).await.unwrap();
    assert_eq!(documents.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_artifacts_written() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(2);
    config.rate_per_sec = 1000.0;
    config.checkpoint_every = 2;

    let lookups = ScriptedLookups::new().fail("99999999", FetchError::NotFound);
    let summary = Pipeline::new(config, dir.path())
        .with_lookup_factory(Arc::new(lookups))
        .run(["01001000", "99999999", "20040020", "30130010", "40010000"])
        .await
        .unwrap();

    assert_eq!(summary.checkpointed_records, 4);
    assert_eq!(read_json_snapshot(dir.path()).len(), 4);

    let xml = std::fs::read_to_string(dir.path().join("addresses.xml")).unwrap();
    assert!(xml.starts_with("<?xml"));
    assert_eq!(xml.matches("<address>").count(), 4);
    assert!(xml.contains("<code>01001000</code>"));

    let export = std::fs::read_to_string(dir.path().join("lookup_errors.csv")).unwrap();
    assert_eq!(export.lines().count(), 2);

    // No temp files left next to the snapshots
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}

#[tokio::test]
async fn test_unopenable_relational_url_degrades_to_files() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(1);
    config.rate_per_sec = 1000.0;
    config.relational_url = format!(
        "sqlite://{}?mode=ro",
        dir.path().join("missing").join("nope.db").display()
    );

    let summary = Pipeline::new(config, dir.path())
        .with_lookup_factory(Arc::new(ScriptedLookups::new()))
        .run(["01001000"])
        .await
        .unwrap();

    assert!(summary.relational.is_none());
    assert_eq!(summary.succeeded, 1);
    assert_eq!(read_json_snapshot(dir.path()).len(), 1);

    let export = std::fs::read_to_string(dir.path().join("lookup_errors.csv")).unwrap();
    assert!(export.contains("relational connect: "));
}

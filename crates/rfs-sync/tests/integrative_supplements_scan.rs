use std::path::{Path, PathBuf};

use rfs_adapters::JsonBatchSource;
use rfs_storage::FindingStore;
use rfs_sync::{load_scoring_rules, open_store, ScanConfig, ScanPipeline};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn config(scratch: &Path) -> ScanConfig {
    ScanConfig {
        database: scratch.join("health.db").display().to_string(),
        rules_path: workspace_root().join("rules/scoring.yaml"),
        batch_path: workspace_root().join("fixtures/integrative-supplements/batch.json"),
        archive_dir: Some(scratch.join("artifacts")),
        reports_dir: None,
        report_limit: 10,
    }
}

#[tokio::test]
async fn fixture_scan_is_idempotent_and_ranked() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let config = config(scratch.path());
    let rules = load_scoring_rules(&config.rules_path).expect("rules");
    let source = JsonBatchSource::new(config.batch_path.clone());
    let pipeline = ScanPipeline::new(config.clone(), rules);

    let first = pipeline.run_once(&source).await.expect("first scan");
    assert_eq!(first.batch_label, "integrative-supplements");
    assert_eq!(first.ingest.searches_completed, 6);
    assert_eq!(first.ingest.total_seen, 20);
    assert_eq!(first.ingest.newly_stored, 14);
    assert_eq!(first.ingest.discarded, 6);
    assert_eq!(first.ingest.duplicates, 0);
    assert!(!first.ingest.has_failures());
    assert_eq!(first.database_total, 14);
    assert_eq!(
        first.collected_at.map(|t| t.to_rfc3339()).as_deref(),
        Some("2026-02-14T09:00:00+00:00")
    );

    let top = &first.top_findings;
    assert_eq!(top.len(), 10);
    assert_eq!(top[0].relevance_score, 5);
    assert!(top[0].record.url.contains("kff.org"));
    assert!(top.windows(2).all(|w| w[0].relevance_score >= w[1].relevance_score));

    let second = pipeline.run_once(&source).await.expect("second scan");
    assert_eq!(second.ingest.total_seen, 20);
    assert_eq!(second.ingest.newly_stored, 0);
    assert_eq!(second.ingest.duplicates, 14);
    assert_eq!(second.batch_sha256, first.batch_sha256);
    assert_eq!(second.database_total, 14);

    let store = open_store(&config.database).await.expect("reopen");
    assert_eq!(store.count_entries().await.expect("count"), 14);
    store.close().await;
}

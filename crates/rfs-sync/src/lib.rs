//! Scan pipeline orchestration: schema, ingestion, ranking, and run reports.

pub mod ingest;
pub mod report;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rfs_adapters::BatchSource;
use rfs_core::{RelevanceScorer, ScoringRules, StoredEntry};
use rfs_storage::{BatchArchive, FindingStore, SqliteStore};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub use ingest::{FailureKind, IngestSummary, Ingestor, RecordFailure, RecordOutcome, TermCounts};

pub const CRATE_NAME: &str = "rfs-sync";

pub const DEFAULT_REPORT_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File path, or a `sqlite:` url.
    pub database: String,
    pub rules_path: PathBuf,
    pub batch_path: PathBuf,
    pub archive_dir: Option<PathBuf>,
    pub reports_dir: Option<PathBuf>,
    pub report_limit: usize,
}

impl ScanConfig {
    pub fn from_env() -> Self {
        Self {
            database: std::env::var("RFS_DATABASE_PATH")
                .unwrap_or_else(|_| "./data/health.db".to_string()),
            rules_path: std::env::var("RFS_RULES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./rules/scoring.yaml")),
            batch_path: std::env::var("RFS_BATCH_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./fixtures/integrative-supplements/batch.json")),
            archive_dir: optional_dir("RFS_ARCHIVE_DIR", "./artifacts"),
            reports_dir: optional_dir("RFS_REPORTS_DIR", "./reports"),
            report_limit: std::env::var("RFS_REPORT_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_REPORT_LIMIT),
        }
    }
}

/// Unset means the default; set to an empty string means disabled.
fn optional_dir(var: &str, default: &str) -> Option<PathBuf> {
    match std::env::var(var) {
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(PathBuf::from(v)),
        Err(_) => Some(PathBuf::from(default)),
    }
}

/// Load scoring rules, falling back to the built-in vocabulary when the file is absent.
pub fn load_scoring_rules(path: &Path) -> Result<ScoringRules> {
    if !path.exists() {
        warn!(path = %path.display(), "scoring rules not found; using built-in vocabulary");
        return Ok(ScoringRules::default());
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub async fn open_store(database: &str) -> Result<SqliteStore> {
    let store = if database.starts_with("sqlite:") {
        SqliteStore::open_url(database).await
    } else {
        SqliteStore::open(database).await
    };
    store.with_context(|| format!("opening findings store {database}"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub batch_label: String,
    #[serde(default)]
    pub collected_at: Option<DateTime<Utc>>,
    pub batch_sha256: Option<String>,
    pub database: String,
    /// Rows in the findings table after ingestion, across all search terms.
    #[serde(default)]
    pub database_total: u64,
    pub ingest: IngestSummary,
    pub top_findings: Vec<StoredEntry>,
    pub reports_dir: Option<String>,
    /// Set when the report files could not be written. The scan itself still counts.
    #[serde(default)]
    pub report_error: Option<String>,
}

pub struct ScanPipeline {
    config: ScanConfig,
    scorer: RelevanceScorer,
    archive: Option<BatchArchive>,
}

impl ScanPipeline {
    pub fn new(config: ScanConfig, rules: ScoringRules) -> Self {
        let archive = config.archive_dir.clone().map(BatchArchive::new);
        Self {
            config,
            scorer: RelevanceScorer::new(rules),
            archive,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Open the configured store, run one scan, and close the store whatever the outcome.
    pub async fn run_once(&self, source: &dyn BatchSource) -> Result<ScanRunSummary> {
        let store = open_store(&self.config.database).await?;
        let result = self.run_with_store(&store, source).await;
        store.close().await;
        result
    }

    pub async fn run_with_store(
        &self,
        store: &dyn FindingStore,
        source: &dyn BatchSource,
    ) -> Result<ScanRunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("scan", %run_id, batch = source.label());
        self.scan(run_id, store, source).instrument(span).await
    }

    async fn scan(
        &self,
        run_id: Uuid,
        store: &dyn FindingStore,
        source: &dyn BatchSource,
    ) -> Result<ScanRunSummary> {
        let started_at = Utc::now();

        store
            .ensure_schema()
            .await
            .context("ensuring findings schema")?;

        let batch = source
            .load()
            .await
            .with_context(|| format!("loading batch {}", source.label()))?;
        let search_terms = batch.search_terms();

        let batch_sha256 = match (&self.archive, &batch.raw) {
            (Some(archive), Some(raw)) => {
                let archived = archive
                    .archive(&batch.label, raw)
                    .await
                    .context("archiving raw batch")?;
                if archived.already_archived {
                    info!(sha256 = %archived.sha256, "identical batch was archived by an earlier run");
                }
                Some(archived.sha256)
            }
            (None, Some(raw)) => Some(BatchArchive::sha256_hex(raw)),
            _ => None,
        };

        let label = batch.label.clone();
        let collected_at = batch.collected_at;
        let ingest = Ingestor::new(&self.scorer, store).ingest(batch.groups).await;
        info!(
            searches = ingest.searches_completed,
            seen = ingest.total_seen,
            stored = ingest.newly_stored,
            duplicates = ingest.duplicates,
            discarded = ingest.discarded,
            malformed = ingest.malformed,
            write_failures = ingest.write_failures,
            "ingestion finished"
        );

        let database_total = store
            .count_entries()
            .await
            .context("counting stored findings")?;

        let top_findings = store
            .query_top_by_score(&search_terms, self.config.report_limit)
            .await
            .context("querying top findings")?;

        let mut summary = ScanRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            batch_label: label,
            collected_at,
            batch_sha256,
            database: self.config.database.clone(),
            database_total,
            ingest,
            top_findings,
            reports_dir: None,
            report_error: None,
        };

        if let Some(reports_root) = &self.config.reports_dir {
            match write_reports(reports_root, &summary).await {
                Ok(dir) => summary.reports_dir = Some(dir.display().to_string()),
                Err(err) => {
                    let message = format!("{err:#}");
                    warn!(error = %message, "scan reports not written; stored findings are unaffected");
                    summary.report_error = Some(message);
                }
            }
        }

        Ok(summary)
    }
}

async fn write_reports(reports_root: &Path, summary: &ScanRunSummary) -> Result<PathBuf> {
    let dir = reports_root.join(summary.run_id.to_string());
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    fs::write(dir.join("scan_brief.md"), report::render_markdown_brief(summary))
        .await
        .context("writing scan_brief.md")?;

    let json = serde_json::to_vec_pretty(summary).context("serializing scan summary")?;
    fs::write(dir.join("scan_summary.json"), json)
        .await
        .context("writing scan_summary.json")?;

    Ok(dir)
}

/// Markdown listing of the most recent runs under `reports_root`, newest first.
pub fn report_recent_runs(runs: usize, reports_root: &Path) -> Result<String> {
    let mut dirs = std::fs::read_dir(reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .filter(|entry| entry.path().join("scan_summary.json").exists())
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# Research Feed Scan Runs".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let summary_path = dir.path().join("scan_summary.json");
        let summary: ScanRunSummary = serde_json::from_str(
            &std::fs::read_to_string(&summary_path)
                .with_context(|| format!("reading {}", summary_path.display()))?,
        )
        .with_context(|| format!("parsing {}", summary_path.display()))?;

        lines.push(format!("## Run `{}` ({})", summary.run_id, summary.batch_label));
        lines.push(format!("- started: {}", summary.started_at));
        lines.push(format!(
            "- seen: {}, stored: {}, duplicates: {}, failures: {}",
            summary.ingest.total_seen,
            summary.ingest.newly_stored,
            summary.ingest.duplicates,
            summary.ingest.malformed + summary.ingest.write_failures
        ));
        if let Some(top) = summary.top_findings.first() {
            lines.push(format!("- top finding: [{} pts] {}", top.relevance_score, top.record.title));
        }
        let brief = dir.path().join("scan_brief.md");
        if brief.exists() {
            lines.push(format!("- brief: `{}`", brief.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfs_adapters::StaticBatchSource;
    use rfs_core::{RecordDraft, SearchGroup};
    use tempfile::tempdir;

    fn config(root: &Path) -> ScanConfig {
        ScanConfig {
            database: root.join("data").join("health.db").display().to_string(),
            rules_path: root.join("rules").join("scoring.yaml"),
            batch_path: root.join("batch.json"),
            archive_dir: Some(root.join("artifacts")),
            reports_dir: Some(root.join("reports")),
            report_limit: DEFAULT_REPORT_LIMIT,
        }
    }

    fn source() -> StaticBatchSource {
        StaticBatchSource::new(
            "inline",
            vec![SearchGroup {
                search_term: "X".into(),
                results: vec![RecordDraft {
                    title: Some("Phase 3 FDA Approval Trial".into()),
                    url: Some("https://a.test/phase3".into()),
                    snippet: Some("bladder cancer survival benefit".into()),
                    source: None,
                    published_date: Some("2026".into()),
                }],
            }],
        )
    }

    #[test]
    fn missing_rules_file_uses_defaults() {
        let dir = tempdir().expect("tempdir");
        let rules = load_scoring_rules(&dir.path().join("absent.yaml")).expect("rules");
        assert_eq!(rules, ScoringRules::default());
    }

    #[test]
    fn broken_rules_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("scoring.yaml");
        std::fs::write(&path, "buckets: [oops").expect("write");
        assert!(load_scoring_rules(&path).is_err());
    }

    #[tokio::test]
    async fn run_once_writes_reports_and_lists_them() {
        let dir = tempdir().expect("tempdir");
        let pipeline = ScanPipeline::new(config(dir.path()), ScoringRules::default());

        let summary = pipeline.run_once(&source()).await.expect("scan");
        assert_eq!(summary.ingest.newly_stored, 1);
        assert_eq!(summary.top_findings.len(), 1);
        assert_eq!(summary.top_findings[0].relevance_score, 8);
        assert!(summary.batch_sha256.is_none());
        assert_eq!(summary.database_total, 1);
        assert!(summary.report_error.is_none());

        let reports_dir = PathBuf::from(summary.reports_dir.expect("reports dir"));
        assert!(reports_dir.join("scan_brief.md").exists());
        assert!(reports_dir.join("scan_summary.json").exists());

        let listing = report_recent_runs(5, &dir.path().join("reports")).expect("listing");
        assert!(listing.contains(&summary.run_id.to_string()));
        assert!(listing.contains("top finding: [8 pts] Phase 3 FDA Approval Trial"));
    }

    #[tokio::test]
    async fn report_write_failure_keeps_scan_counts() {
        let dir = tempdir().expect("tempdir");
        let not_a_dir = dir.path().join("reports");
        std::fs::write(&not_a_dir, b"regular file").expect("write");
        let mut cfg = config(dir.path());
        cfg.reports_dir = Some(not_a_dir);

        let summary = ScanPipeline::new(cfg.clone(), ScoringRules::default())
            .run_once(&source())
            .await
            .expect("scan still succeeds");
        assert_eq!(summary.ingest.newly_stored, 1);
        assert_eq!(summary.database_total, 1);
        assert!(summary.reports_dir.is_none());
        assert!(summary.report_error.is_some());

        let store = open_store(&cfg.database).await.expect("reopen");
        assert_eq!(store.count_entries().await.expect("count"), 1);
        store.close().await;
    }

    #[tokio::test]
    async fn sqlite_url_database_is_accepted() {
        let dir = tempdir().expect("tempdir");
        let mut cfg = config(dir.path());
        cfg.database = format!("sqlite://{}", dir.path().join("url.db").display());
        cfg.reports_dir = None;

        let summary = ScanPipeline::new(cfg, ScoringRules::default())
            .run_once(&source())
            .await
            .expect("scan");
        assert_eq!(summary.ingest.newly_stored, 1);
        assert!(dir.path().join("url.db").exists());
    }

    #[tokio::test]
    async fn unavailable_store_aborts_before_ingestion() {
        let dir = tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").expect("write");
        let mut cfg = config(dir.path());
        cfg.database = blocker.join("health.db").display().to_string();
        cfg.reports_dir = Some(dir.path().join("reports"));

        let err = ScanPipeline::new(cfg, ScoringRules::default())
            .run_once(&source())
            .await
            .expect_err("store cannot open");
        assert!(format!("{err:#}").contains("opening findings store"));
        assert!(!dir.path().join("reports").exists());
    }
}

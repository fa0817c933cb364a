//! Durable storage for RFS: the keyed findings table and the raw batch archive.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rfs_core::{Record, ScoredRecord, StoredEntry};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

pub use sqlx::Error as SqlxError;

pub const CRATE_NAME: &str = "rfs-storage";

pub const FINDINGS_TABLE: &str = "news_feed";

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS news_feed (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    snippet TEXT,
    source TEXT,
    published_date TEXT,
    search_term TEXT,
    relevance_score INTEGER,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)
"#;

const CREATE_TERM_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_news_feed_term_score
    ON news_feed (search_term, relevance_score DESC)
"#;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store at {location} is unavailable: {source}")]
    SchemaUnavailable { location: String, source: BoxError },
    #[error("writing {url} failed: {source}")]
    WriteFailure { url: String, source: sqlx::Error },
    #[error("store query failed: {0}")]
    Query(#[from] sqlx::Error),
}

impl StoreError {
    /// Errors after which no further store work makes sense.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::SchemaUnavailable { .. })
    }
}

/// Keyed table of scored findings. `url` is unique; rows are never updated.
#[async_trait]
pub trait FindingStore: Send + Sync {
    /// Create the table if absent. Safe to call on every start.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Insert `scored` unless a row with the same url exists. Returns whether a row was written.
    async fn insert_if_absent(&self, scored: &ScoredRecord) -> Result<bool, StoreError>;

    /// Rows whose search term is in `search_terms`, highest score first, ties in insertion order.
    async fn query_top_by_score(
        &self,
        search_terms: &[String],
        limit: usize,
    ) -> Result<Vec<StoredEntry>, StoreError>;

    async fn count_entries(&self) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    location: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path` over a single connection.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let location = path.display().to_string();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| StoreError::SchemaUnavailable {
                    location: location.clone(),
                    source: Box::new(err),
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        Self::connect(options, location).await
    }

    /// Open from a sqlx url such as `sqlite://data/health.db`.
    pub async fn open_url(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|err| StoreError::SchemaUnavailable {
                location: url.to_string(),
                source: Box::new(err),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        Self::connect(options, url.to_string()).await
    }

    async fn connect(options: SqliteConnectOptions, location: String) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|err| StoreError::SchemaUnavailable {
                location: location.clone(),
                source: Box::new(err),
            })?;
        debug!(%location, "opened findings store");
        Ok(Self { pool, location })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Release the connection. Pending statements have already committed.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl FindingStore for SqliteStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in [CREATE_TABLE, CREATE_TERM_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|err| StoreError::SchemaUnavailable {
                    location: self.location.clone(),
                    source: Box::new(err),
                })?;
        }
        Ok(())
    }

    async fn insert_if_absent(&self, scored: &ScoredRecord) -> Result<bool, StoreError> {
        let record = &scored.record;
        let result = sqlx::query(
            r#"
            INSERT INTO news_feed
                (title, url, snippet, source, published_date, search_term, relevance_score)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&record.title)
        .bind(&record.url)
        .bind(&record.snippet)
        .bind(&record.source)
        .bind(record.published_date.as_deref())
        .bind(&record.search_term)
        .bind(i64::from(scored.relevance_score))
        .execute(&self.pool)
        .await
        .map_err(|source| StoreError::WriteFailure {
            url: record.url.clone(),
            source,
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn query_top_by_score(
        &self,
        search_terms: &[String],
        limit: usize,
    ) -> Result<Vec<StoredEntry>, StoreError> {
        if search_terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, title, url, snippet, source, published_date, search_term, \
             relevance_score, created_at FROM news_feed WHERE search_term IN (",
        );
        let mut terms = query.separated(", ");
        for term in search_terms {
            terms.push_bind(term.clone());
        }
        terms.push_unseparated(") ORDER BY relevance_score DESC, id ASC LIMIT ");
        query.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn count_entries(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news_feed")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<StoredEntry, StoreError> {
    let score: Option<i64> = row.try_get("relevance_score")?;
    let created_at: NaiveDateTime = row.try_get("created_at")?;
    Ok(StoredEntry {
        id: row.try_get("id")?,
        record: Record {
            title: row.try_get("title")?,
            url: row.try_get("url")?,
            snippet: row.try_get::<Option<String>, _>("snippet")?.unwrap_or_default(),
            source: row.try_get::<Option<String>, _>("source")?.unwrap_or_default(),
            published_date: row.try_get("published_date")?,
            search_term: row.try_get::<Option<String>, _>("search_term")?.unwrap_or_default(),
        },
        relevance_score: u32::try_from(score.unwrap_or(0)).unwrap_or(0),
        created_at: created_at.and_utc(),
    })
}

#[derive(Debug, Clone)]
pub struct ArchivedBatch {
    pub sha256: String,
    pub path: PathBuf,
    pub byte_size: usize,
    pub already_archived: bool,
}

/// Raw batch payloads kept as `<root>/<label>/<sha256>.json`, one file per distinct payload.
#[derive(Debug, Clone)]
pub struct BatchArchive {
    root: PathBuf,
}

impl BatchArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    pub fn path_for(&self, label: &str, sha256: &str) -> PathBuf {
        self.root.join(archive_label(label)).join(format!("{sha256}.json"))
    }

    /// Keep `payload` unless an identical one is already archived under `label`.
    /// The file only appears under its final name once fully written.
    pub async fn archive(&self, label: &str, payload: &[u8]) -> anyhow::Result<ArchivedBatch> {
        let sha256 = Self::sha256_hex(payload);
        let path = self.path_for(label, &sha256);

        let already_archived = fs::try_exists(&path)
            .await
            .with_context(|| format!("looking up archived batch {}", path.display()))?;

        if already_archived {
            debug!(label, %sha256, "batch payload seen before");
        } else {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("preparing batch archive {}", dir.display()))?;
            }
            let partial = path.with_extension(format!("{}.partial", Uuid::new_v4().simple()));
            fs::write(&partial, payload)
                .await
                .with_context(|| format!("staging batch {}", partial.display()))?;
            if let Err(err) = fs::rename(&partial, &path).await {
                let _ = fs::remove_file(&partial).await;
                return Err(err).with_context(|| format!("publishing batch {}", path.display()));
            }
            debug!(label, %sha256, bytes = payload.len(), "archived batch payload");
        }

        Ok(ArchivedBatch {
            sha256,
            path,
            byte_size: payload.len(),
            already_archived,
        })
    }
}

/// Directory name for a batch label: ascii alphanumerics, `-`, `_` and `.`; anything else becomes `-`.
fn archive_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "batch".to_string(),
        name => name.to_string(),
    }
}

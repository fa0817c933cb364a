//! Core domain model for RFS: search-result records, their validation, and relevance scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod scoring;

pub use scoring::{default_strip_markers, BucketHit, KeywordBucket, RecencyTier, RelevanceScorer, ScoreBreakdown, ScoringRules};

pub const CRATE_NAME: &str = "rfs-core";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record is missing required field `{field}`")]
    MissingField { field: &'static str },
}

/// Search result as handed over by a collector, before required fields are checked.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordDraft {
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub source: Option<String>,
    #[serde(alias = "published")]
    pub published_date: Option<String>,
}

impl RecordDraft {
    /// Promote the draft into a [`Record`] produced by `search_term`, stripping the
    /// [`DEFAULT_STRIP_MARKERS`] from title and snippet.
    pub fn validate(self, search_term: &str) -> Result<Record, RecordError> {
        self.validate_with(search_term, DEFAULT_STRIP_MARKERS)
    }

    /// Like [`RecordDraft::validate`] with an explicit marker list.
    ///
    /// `title` and `url` must be present and non-blank; the title is checked after markers
    /// are removed. A blank publication date is treated as absent.
    pub fn validate_with<S: AsRef<str>>(
        self,
        search_term: &str,
        markers: &[S],
    ) -> Result<Record, RecordError> {
        let title = non_blank(self.title.map(|t| strip_markers(&t, markers)))
            .ok_or(RecordError::MissingField { field: "title" })?;
        let url = non_blank(self.url)
            .map(|u| u.trim().to_string())
            .ok_or(RecordError::MissingField { field: "url" })?;

        Ok(Record {
            title,
            url,
            snippet: self
                .snippet
                .map(|s| strip_markers(&s, markers))
                .unwrap_or_default(),
            source: self.source.unwrap_or_default(),
            published_date: non_blank(self.published_date),
            search_term: search_term.to_string(),
        })
    }
}

/// Wrapper text some collectors put around fetched page content.
pub const DEFAULT_STRIP_MARKERS: &[&str] = &[
    "<<<EXTERNAL_UNTRUSTED_CONTENT>>>",
    "<<<END_EXTERNAL_UNTRUSTED_CONTENT>>>",
    "Source: Web Search",
    "---",
    "<strong>",
    "</strong>",
];

/// Remove every occurrence of each marker, then trim.
pub fn strip_markers<S: AsRef<str>>(text: &str, markers: &[S]) -> String {
    let mut out = text.to_string();
    for marker in markers.iter().map(AsRef::as_ref).filter(|m| !m.is_empty()) {
        if out.contains(marker) {
            out = out.replace(marker, "");
        }
    }
    out.trim().to_string()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// One search term together with the results it produced, in collector order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchGroup {
    pub search_term: String,
    #[serde(default)]
    pub results: Vec<RecordDraft>,
}

/// Validated search result. `url` is the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
    pub published_date: Option<String>,
    pub search_term: String,
}

impl Record {
    pub fn new(title: impl Into<String>, url: impl Into<String>, search_term: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: String::new(),
            source: String::new(),
            published_date: None,
            search_term: search_term.into(),
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_published_date(mut self, published_date: impl Into<String>) -> Self {
        self.published_date = Some(published_date.into());
        self
    }
}

/// Record plus the score it was given. A zero score means the record is not worth storing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: Record,
    pub relevance_score: u32,
}

impl ScoredRecord {
    pub fn is_storable(&self) -> bool {
        self.relevance_score > 0
    }
}

/// Persisted record. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: i64,
    #[serde(flatten)]
    pub record: Record,
    pub relevance_score: u32,
    pub created_at: DateTime<Utc>,
}

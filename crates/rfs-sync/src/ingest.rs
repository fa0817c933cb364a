//! Deduplicating ingestion: score every record, store each url at most once.

use std::collections::BTreeMap;

use rfs_core::{Record, RelevanceScorer, ScoredRecord, SearchGroup};
use rfs_storage::{FindingStore, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOutcome {
    Stored,
    Duplicate,
    /// Scored zero; never offered to the store.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Malformed,
    StoreWrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub kind: FailureKind,
    pub search_term: String,
    pub url: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermCounts {
    pub seen: usize,
    pub stored: usize,
}

/// Counts for one ingestion pass. `total_seen` covers every input record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub searches_completed: usize,
    pub total_seen: usize,
    pub newly_stored: usize,
    pub duplicates: usize,
    pub discarded: usize,
    pub malformed: usize,
    pub write_failures: usize,
    pub per_term: BTreeMap<String, TermCounts>,
    pub failures: Vec<RecordFailure>,
}

impl IngestSummary {
    pub fn has_failures(&self) -> bool {
        self.malformed > 0 || self.write_failures > 0
    }
}

pub struct Ingestor<'a> {
    scorer: &'a RelevanceScorer,
    store: &'a dyn FindingStore,
}

impl<'a> Ingestor<'a> {
    pub fn new(scorer: &'a RelevanceScorer, store: &'a dyn FindingStore) -> Self {
        Self { scorer, store }
    }

    pub fn score(&self, record: Record) -> ScoredRecord {
        let breakdown = self.scorer.explain(
            &record.title,
            &record.snippet,
            record.published_date.as_deref(),
            &record.search_term,
        );
        let matched: Vec<&str> = breakdown.matched.iter().map(|h| h.phrase.as_str()).collect();
        debug!(
            url = %record.url,
            score = breakdown.total,
            recency = breakdown.recency,
            ?matched,
            "scored record"
        );
        ScoredRecord {
            record,
            relevance_score: breakdown.total,
        }
    }

    /// Score one record and store it if it earned a score and its url is new.
    pub async fn ingest_record(&self, record: Record) -> Result<RecordOutcome, StoreError> {
        let scored = self.score(record);
        if !scored.is_storable() {
            return Ok(RecordOutcome::Discarded);
        }
        if self.store.insert_if_absent(&scored).await? {
            Ok(RecordOutcome::Stored)
        } else {
            debug!(url = %scored.record.url, "url already stored; skipping");
            Ok(RecordOutcome::Duplicate)
        }
    }

    /// Process groups in order. Per-record failures are counted and the pass continues.
    pub async fn ingest<I>(&self, groups: I) -> IngestSummary
    where
        I: IntoIterator<Item = SearchGroup>,
    {
        let mut summary = IngestSummary::default();

        for group in groups {
            let term = group.search_term;
            for draft in group.results {
                summary.total_seen += 1;
                summary.per_term.entry(term.clone()).or_default().seen += 1;

                let url = draft.url.clone();
                let record = match draft.validate_with(&term, &self.scorer.rules().strip_markers) {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(search_term = %term, url = ?url, error = %err, "rejecting malformed record");
                        summary.malformed += 1;
                        summary.failures.push(RecordFailure {
                            kind: FailureKind::Malformed,
                            search_term: term.clone(),
                            url,
                            message: err.to_string(),
                        });
                        continue;
                    }
                };

                let url = record.url.clone();
                match self.ingest_record(record).await {
                    Ok(RecordOutcome::Stored) => {
                        summary.newly_stored += 1;
                        summary.per_term.entry(term.clone()).or_default().stored += 1;
                    }
                    Ok(RecordOutcome::Duplicate) => summary.duplicates += 1,
                    Ok(RecordOutcome::Discarded) => summary.discarded += 1,
                    Err(err) => {
                        warn!(search_term = %term, %url, error = %err, "store write failed; continuing");
                        summary.write_failures += 1;
                        summary.failures.push(RecordFailure {
                            kind: FailureKind::StoreWrite,
                            search_term: term.clone(),
                            url: Some(url),
                            message: err.to_string(),
                        });
                    }
                }
            }
            summary.searches_completed += 1;
        }

        summary
    }
}

//! Batch source contracts + file-backed and in-memory batch sources.
//!
//! Collection of search results happens elsewhere; a source only hands over a finished
//! batch of search-term groups in collector order.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rfs_core::SearchGroup;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "rfs-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// On-disk batch layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFile {
    pub label: String,
    #[serde(default)]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    pub searches: Vec<SearchGroup>,
}

/// A loaded batch plus the raw bytes it came from, if any.
#[derive(Debug, Clone)]
pub struct CollectedBatch {
    pub label: String,
    pub collected_at: Option<DateTime<Utc>>,
    pub groups: Vec<SearchGroup>,
    pub raw: Option<Vec<u8>>,
}

impl CollectedBatch {
    pub fn search_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            if !terms.contains(&group.search_term) {
                terms.push(group.search_term.clone());
            }
        }
        terms
    }

    pub fn record_count(&self) -> usize {
        self.groups.iter().map(|g| g.results.len()).sum()
    }
}

#[async_trait]
pub trait BatchSource: Send + Sync {
    fn label(&self) -> &str;

    async fn load(&self) -> Result<CollectedBatch, AdapterError>;
}

/// Reads a [`BatchFile`] JSON document.
#[derive(Debug, Clone)]
pub struct JsonBatchSource {
    path: PathBuf,
    label: String,
}

impl JsonBatchSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = default_label(&path);
        Self { path, label }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn default_label(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .or_else(|| path.file_stem())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "batch".to_string())
}

#[async_trait]
impl BatchSource for JsonBatchSource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn load(&self) -> Result<CollectedBatch, AdapterError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let file = parse_batch(&raw).with_context(|| format!("parsing {}", self.path.display()))?;
        if file.searches.is_empty() {
            return Err(AdapterError::Message(format!(
                "{} contains no searches",
                self.path.display()
            )));
        }
        Ok(CollectedBatch {
            label: file.label,
            collected_at: file.collected_at,
            groups: file.searches,
            raw: Some(raw),
        })
    }
}

pub fn parse_batch(bytes: &[u8]) -> anyhow::Result<BatchFile> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Batch already held in memory, e.g. handed over by an embedding collector.
#[derive(Debug, Clone)]
pub struct StaticBatchSource {
    label: String,
    groups: Vec<SearchGroup>,
}

impl StaticBatchSource {
    pub fn new(label: impl Into<String>, groups: impl IntoIterator<Item = SearchGroup>) -> Self {
        Self {
            label: label.into(),
            groups: groups.into_iter().collect(),
        }
    }
}

#[async_trait]
impl BatchSource for StaticBatchSource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn load(&self) -> Result<CollectedBatch, AdapterError> {
        Ok(CollectedBatch {
            label: self.label.clone(),
            collected_at: None,
            groups: self.groups.clone(),
            raw: None,
        })
    }
}

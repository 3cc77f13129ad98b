//! Contract between generated scraper modules and the system that runs them.
//!
//! Generated code fetches through [`SourceFetcher`], extracts with
//! [`FetchedDocument`] and [`SelectedNode`], cleans values with
//! [`sanitize_text`] and [`normalize_url`], and hands records to an
//! [`ArticleStore`]. The runner owns scheduling, storage and deduplication.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::utils::StringUtils;

/// One extracted article. Only headline-level metadata is ever carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub url: String,
    pub published: Option<String>,
    pub summary: Option<String>,
    pub source: String,
    pub language: String,
    pub content_type: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Page source handed to generated scrapers
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str, user_agent: &str, timeout: Duration) -> Result<FetchedDocument, ScrapeError>;
}

/// Storage collaborator: deduplication plus batched writes
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn is_duplicate(&self, url: &str) -> bool;

    async fn begin_batch(&self, source: &str) -> Result<(), ScrapeError>;

    async fn write(&self, record: &ArticleRecord) -> Result<(), ScrapeError>;

    async fn commit_batch(&self) -> Result<(), ScrapeError>;

    async fn rollback_batch(&self);
}

/// A fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    html: String,
}

impl FetchedDocument {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    /// Every element matching `selector`, in document order. Invalid selectors match nothing.
    pub fn select(&self, selector: &str) -> Vec<SelectedNode> {
        let Ok(selector) = Selector::parse(selector) else {
            return Vec::new();
        };
        let document = Html::parse_document(&self.html);
        document
            .select(&selector)
            .map(|element| SelectedNode { html: element.html() })
            .collect()
    }
}

/// One matched container, queried with selectors relative to itself
#[derive(Debug, Clone)]
pub struct SelectedNode {
    html: String,
}

impl SelectedNode {
    /// Text of the first descendant matching `selector`
    pub fn text(&self, selector: &str) -> Option<String> {
        let selector = Selector::parse(selector).ok()?;
        let fragment = Html::parse_fragment(&self.html);
        let element = fragment.select(&selector).next()?;
        Some(element.text().collect::<String>())
    }

    /// Attribute `name` of the first descendant matching `selector`
    pub fn attr(&self, selector: &str, name: &str) -> Option<String> {
        let selector = Selector::parse(selector).ok()?;
        let fragment = Html::parse_fragment(&self.html);
        let element = fragment.select(&selector).next()?;
        element.value().attr(name).map(str::to_string)
    }
}

/// Strip control characters and collapse whitespace runs
pub fn sanitize_text(raw: &str) -> String {
    StringUtils::sanitize(raw)
}

/// Resolve `href` against `base`; only http(s) results are kept
pub fn normalize_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let base = url::Url::parse(base).ok()?;
    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed,
}

/// What one scraper run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub source: String,
    pub outcome: RunOutcome,
    pub extracted: usize,
    pub written: usize,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn completed(source: &str, extracted: usize, written: usize) -> Self {
        Self {
            source: source.to_string(),
            outcome: RunOutcome::Completed,
            extracted,
            written,
            error: None,
        }
    }

    pub fn failed(source: &str, error: ScrapeError) -> Self {
        Self {
            source: source.to_string(),
            outcome: RunOutcome::Failed,
            extracted: 0,
            written: 0,
            error: Some(error.to_string()),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "{}: failed ({})", self.source, error),
            None => write!(f, "{}: {} extracted, {} written", self.source, self.extracted, self.written),
        }
    }
}

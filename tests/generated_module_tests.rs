use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scraper_forge::analysis::{CmsType, DetectedSelectors, SiteStructure};
use scraper_forge::runtime::{
    ArticleRecord, ArticleStore, FetchedDocument, RunOutcome, ScrapeError, SourceFetcher,
};
use scraper_forge::templates::{EmbeddedAssets, GenerationParams, ScraperTemplateEngine};
use scraper_forge::testing::dry_run::{build_fixture, RecordingStore, DUPLICATE_HREF};

#[allow(dead_code)]
#[path = "fixtures/example_blog_scraper.rs"]
mod example_blog_scraper;

const RENDERED: &str = include_str!("fixtures/example_blog_scraper.rs");

/// Serves one listing page and remembers what it was asked for
struct ListingFetcher {
    html: Option<String>,
    requests: std::sync::Mutex<Vec<(String, String, Duration)>>,
}

impl ListingFetcher {
    fn serving(html: String) -> Self {
        Self {
            html: Some(html),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn unreachable() -> Self {
        Self {
            html: None,
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SourceFetcher for ListingFetcher {
    async fn fetch(&self, url: &str, user_agent: &str, timeout: Duration) -> Result<FetchedDocument, ScrapeError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), user_agent.to_string(), timeout));
        match &self.html {
            Some(html) => Ok(FetchedDocument::new(html.clone())),
            None => Err(ScrapeError::Fetch {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// Accepts the first `accept` writes, then fails
struct FlakyStore {
    accept: usize,
    writes: AtomicUsize,
    rollbacks: AtomicUsize,
    commits: AtomicUsize,
}

#[async_trait]
impl ArticleStore for FlakyStore {
    async fn is_duplicate(&self, _url: &str) -> bool {
        false
    }

    async fn begin_batch(&self, _source: &str) -> Result<(), ScrapeError> {
        Ok(())
    }

    async fn write(&self, _record: &ArticleRecord) -> Result<(), ScrapeError> {
        if self.writes.fetch_add(1, Ordering::SeqCst) >= self.accept {
            return Err(ScrapeError::Storage("disk full".to_string()));
        }
        Ok(())
    }

    async fn commit_batch(&self) -> Result<(), ScrapeError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback_batch(&self) {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
    }
}

fn listing_html() -> String {
    let engine = ScraperTemplateEngine::new(Arc::new(EmbeddedAssets), "https", 15);
    let generated = engine
        .generate(&example_blog(), &GenerationParams::default())
        .unwrap();
    build_fixture(generated.selectors()).unwrap()
}

fn example_blog() -> SiteStructure {
    SiteStructure {
        domain: "example-blog.com".to_string(),
        cms_type: CmsType::Wordpress,
        navigation: vec!["Home".to_string()],
        detected_selectors: DetectedSelectors::default(),
        complexity_score: 0.0,
        fetched_at: Utc::now(),
        load_error: None,
    }
}

#[test]
fn test_compiled_module_is_the_current_render() {
    let engine = ScraperTemplateEngine::new(Arc::new(EmbeddedAssets), "https", 15);
    let generated = engine
        .generate(&example_blog(), &GenerationParams::default())
        .unwrap();

    assert_eq!(generated.source_text(), RENDERED);
    assert_eq!(example_blog_scraper::CRAWL_DELAY_SECONDS, 2);
    assert_eq!(example_blog_scraper::USER_AGENT, scraper_forge::IDENTIFYING_USER_AGENT);
}

#[tokio::test]
async fn test_rendered_run_extracts_and_stores_new_articles() {
    let fetcher = ListingFetcher::serving(listing_html());
    let duplicate = format!("https://example-blog.com{}", DUPLICATE_HREF);
    let store = RecordingStore::seeded([duplicate.clone()]);

    let summary = example_blog_scraper::run(&fetcher, &store).await;

    assert_eq!(summary.outcome, RunOutcome::Completed, "{}", summary);
    assert_eq!(summary.extracted, 3);
    assert_eq!(summary.written, 3);
    assert_eq!(store.commits(), 1);
    assert_eq!(store.rollbacks(), 0);
    assert_eq!(store.duplicate_checks(), 4);

    let requests = fetcher.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec![(
            "https://example-blog.com/".to_string(),
            scraper_forge::IDENTIFYING_USER_AGENT.to_string(),
            Duration::from_secs(15)
        )]
    );

    let written = store.written().await;
    let urls: Vec<_> = written.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://example-blog.com/news/story-1",
            "https://example-blog.com/story-2?ref=home",
            "https://example-blog.com/archive/story-3",
        ]
    );
    assert!(!urls.contains(&duplicate.as_str()));

    let first = &written[0];
    assert_eq!(first.title, "Headline 1 story");
    assert_eq!(first.published.as_deref(), Some("2024-03-01"));
    assert_eq!(first.summary.as_deref(), Some("Summary for story 1"));
    assert_eq!(first.source, "example-blog.com");
    assert_eq!(first.language, "en");
    assert_eq!(first.content_type, "summary");
}

#[tokio::test]
async fn test_rendered_run_reports_fetch_failure_without_a_batch() {
    let fetcher = ListingFetcher::unreachable();
    let store = RecordingStore::default();

    let summary = example_blog_scraper::run(&fetcher, &store).await;

    assert_eq!(summary.outcome, RunOutcome::Failed);
    assert!(summary.error.as_deref().unwrap().contains("connection refused"));
    assert_eq!(store.batches(), 0);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_rendered_run_rolls_back_a_failed_write() {
    let fetcher = ListingFetcher::serving(listing_html());
    let store = FlakyStore {
        accept: 1,
        writes: AtomicUsize::new(0),
        rollbacks: AtomicUsize::new(0),
        commits: AtomicUsize::new(0),
    };

    let summary = example_blog_scraper::run(&fetcher, &store).await;

    assert_eq!(summary.outcome, RunOutcome::Failed);
    assert!(summary.error.as_deref().unwrap().contains("disk full"));
    assert_eq!(store.writes.load(Ordering::SeqCst), 2);
    assert_eq!(store.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(store.commits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rendered_extraction_respects_the_article_cap() {
    let mut items = String::new();
    for n in 0..60 {
        items.push_str(&format!(
            r#"<article class="post"><h2 class="entry-title"><a href="/p/{n}">Post {n}</a></h2></article>"#
        ));
    }
    let document = FetchedDocument::new(format!("<html><body>{}</body></html>", items));
    let store = RecordingStore::default();

    let records = example_blog_scraper::extract_records(&document, &store).await;

    assert_eq!(records.len(), example_blog_scraper::MAX_ARTICLES);
    assert_eq!(records[0].url, "https://example-blog.com/p/0");
    assert_eq!(records[0].published, None);
}

//! Generated news scraper. Regenerate instead of editing by hand.

use std::time::{Duration, Instant};

use scraper_forge::runtime::{
    self, ArticleRecord, ArticleStore, FetchedDocument, RunSummary, SourceFetcher,
};

pub const SOURCE_DOMAIN: &str = "example-blog.com";
pub const BASE_URL: &str = "https://example-blog.com/";
pub const TEMPLATE: &str = "wordpress";
pub const LANGUAGE: &str = "en";
pub const CONTENT_TYPE: &str = "summary";
pub const MAX_ARTICLES: usize = 50;

pub const USER_AGENT: &str = "ScraperForgeBot/1.0 (+automated news indexing; honours robots.txt)";
pub const CRAWL_DELAY_SECONDS: u64 = 2;
pub const REQUEST_TIMEOUT_SECONDS: u64 = 15;
pub const FAIR_USE_BASIS: &str = "Fair use: headline, link and short summary only, with attribution to the source";

/// Sleep until CRAWL_DELAY_SECONDS have passed since the previous request.
pub async fn enforce_min_delay(last_request: &mut Option<Instant>) {
    let min_delay = Duration::from_secs(CRAWL_DELAY_SECONDS);
    if let Some(previous) = *last_request {
        let elapsed = previous.elapsed();
        if elapsed < min_delay {
            tokio::time::sleep(min_delay - elapsed).await;
        }
    }
    *last_request = Some(Instant::now());
}

pub const ARTICLE_SELECTOR: &str = "article.post";
pub const TITLE_SELECTOR: &str = "h2.entry-title";
pub const LINK_SELECTOR: &str = "h2.entry-title a";
pub const DATE_SELECTOR: &str = "time.entry-date";
pub const SUMMARY_SELECTOR: &str = "div.entry-summary";
pub const DATE_FORMAT_HINT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Turn article containers into records, skipping incomplete and already stored ones.
pub async fn extract_records(document: &FetchedDocument, store: &dyn ArticleStore) -> Vec<ArticleRecord> {
    let mut records = Vec::new();

    for node in document.select(ARTICLE_SELECTOR).into_iter().take(MAX_ARTICLES) {
        let title = match node.text(TITLE_SELECTOR) {
            Some(raw) => runtime::sanitize_text(&raw),
            None => continue,
        };
        let url = match node
            .attr(LINK_SELECTOR, "href")
            .and_then(|href| runtime::normalize_url(BASE_URL, &href))
        {
            Some(url) => url,
            None => continue,
        };
        if title.is_empty() {
            continue;
        }
        if store.is_duplicate(&url).await {
            continue;
        }

        records.push(ArticleRecord {
            title,
            url,
            published: node.text(DATE_SELECTOR).map(|raw| runtime::sanitize_text(&raw)),
            summary: node.text(SUMMARY_SELECTOR).map(|raw| runtime::sanitize_text(&raw)),
            source: SOURCE_DOMAIN.to_string(),
            language: LANGUAGE.to_string(),
            content_type: CONTENT_TYPE.to_string(),
        });
    }

    records
}

/// Fetch the listing page once and store new records in a single batch.
pub async fn run(fetcher: &dyn SourceFetcher, store: &dyn ArticleStore) -> RunSummary {
    let mut last_request: Option<Instant> = None;
    enforce_min_delay(&mut last_request).await;

    let document = match fetcher
        .fetch(BASE_URL, USER_AGENT, Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
        .await
    {
        Ok(document) => document,
        Err(error) => return RunSummary::failed(SOURCE_DOMAIN, error),
    };

    let records = extract_records(&document, store).await;

    if let Err(error) = store.begin_batch(SOURCE_DOMAIN).await {
        return RunSummary::failed(SOURCE_DOMAIN, error);
    }

    let mut written = 0;
    for record in &records {
        if let Err(error) = store.write(record).await {
            store.rollback_batch().await;
            return RunSummary::failed(SOURCE_DOMAIN, error);
        }
        written += 1;
    }

    if let Err(error) = store.commit_batch().await {
        store.rollback_batch().await;
        return RunSummary::failed(SOURCE_DOMAIN, error);
    }

    RunSummary::completed(SOURCE_DOMAIN, records.len(), written)
}

//! Dry run of a generated extraction contract against a synthetic listing page.
//!
//! The fixture is derived from the selector constants of the generated module.
//! Extraction follows what the module's own functions call: each field is read
//! through the selector const its code actually passes, and values are only
//! sanitized, normalized, deduplicated or written when the generated code does
//! so, which keeps the data-quality checks honest.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::inspect::{FnFacts, SourceFacts};
use crate::runtime::{self, ArticleRecord, ArticleStore, FetchedDocument, ScrapeError};
use crate::templates::SelectorSet;

/// Href of the fixture item the store already holds
pub const DUPLICATE_HREF: &str = "/news/already-stored";

const FIXTURE_HREFS: [&str; 4] = ["/news/story-1", "story-2?ref=home", "../archive/story-3", DUPLICATE_HREF];

/// Storage collaborator that records every hook invocation
#[derive(Debug, Default)]
pub struct RecordingStore {
    known: Mutex<HashSet<String>>,
    written: Mutex<Vec<ArticleRecord>>,
    duplicate_checks: AtomicUsize,
    writes: AtomicUsize,
    batches: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl RecordingStore {
    pub fn seeded(known: impl IntoIterator<Item = String>) -> Self {
        Self {
            known: Mutex::new(known.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn duplicate_checks(&self) -> usize {
        self.duplicate_checks.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub async fn written(&self) -> Vec<ArticleRecord> {
        self.written.lock().await.clone()
    }
}

#[async_trait]
impl ArticleStore for RecordingStore {
    async fn is_duplicate(&self, url: &str) -> bool {
        self.duplicate_checks.fetch_add(1, Ordering::SeqCst);
        self.known.lock().await.contains(url)
    }

    async fn begin_batch(&self, _source: &str) -> Result<(), ScrapeError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, record: &ArticleRecord) -> Result<(), ScrapeError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.written.lock().await.push(record.clone());
        Ok(())
    }

    async fn commit_batch(&self) -> Result<(), ScrapeError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback_batch(&self) {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.written.lock().await.clear();
    }
}

/// What the dry run observed
#[derive(Debug, Clone, Default)]
pub struct DryRunReport {
    /// Why no fixture could be built, if it could not
    pub fixture_error: Option<String>,
    pub fixture_items: usize,
    pub records: Vec<ArticleRecord>,
    /// Absolute URL the store was seeded with
    pub seeded_duplicate: Option<String>,
    pub duplicate_checks: usize,
    pub writes: usize,
    pub commits: usize,
}

/// Run the extraction contract described by `facts` against a fixture page
pub async fn execute(facts: &SourceFacts) -> DryRunReport {
    let selectors = match selector_consts(facts) {
        Ok(selectors) => selectors,
        Err(e) => return DryRunReport::failed(e),
    };
    let Some(base_url) = facts.const_str("BASE_URL") else {
        return DryRunReport::failed("BASE_URL constant is missing".to_string());
    };
    let html = match build_fixture(&selectors) {
        Ok(html) => html,
        Err(e) => return DryRunReport::failed(e),
    };

    let empty = FnFacts::default();
    let extract = facts.function("extract_records").unwrap_or(&empty);
    let entry = facts.function("run").unwrap_or(&empty);

    let seeded_duplicate = runtime::normalize_url(base_url, DUPLICATE_HREF);
    let store = RecordingStore::seeded(seeded_duplicate.clone());

    let records = extract_like(facts, extract, base_url, &html, &store).await;

    if entry.calls("begin_batch") && store.begin_batch(facts.const_str("SOURCE_DOMAIN").unwrap_or_default()).await.is_ok() {
        let mut failed = false;
        if entry.calls("write") {
            for record in &records {
                if store.write(record).await.is_err() {
                    failed = true;
                    break;
                }
            }
        }
        if failed || (entry.calls("commit_batch") && store.commit_batch().await.is_err()) {
            store.rollback_batch().await;
        }
    }

    DryRunReport {
        fixture_error: None,
        fixture_items: FIXTURE_HREFS.len(),
        records,
        seeded_duplicate,
        duplicate_checks: store.duplicate_checks(),
        writes: store.writes(),
        commits: store.commits(),
    }
}

impl DryRunReport {
    fn failed(reason: String) -> Self {
        Self {
            fixture_error: Some(reason),
            ..Self::default()
        }
    }
}

async fn extract_like(
    facts: &SourceFacts,
    extract: &FnFacts,
    base_url: &str,
    html: &str,
    store: &RecordingStore,
) -> Vec<ArticleRecord> {
    let lookup = |field: &str| {
        extract
            .field_selector(field)
            .and_then(|name| facts.const_str(name))
    };
    let container = match extract.select_args.first().and_then(|name| facts.const_str(name)) {
        Some(container) => container,
        None => return Vec::new(),
    };
    let (Some(title_selector), Some(link_selector)) = (lookup("title"), lookup("url")) else {
        return Vec::new();
    };
    let date_selector = lookup("published");
    let summary_selector = lookup("summary");

    let sanitize = |field: &str, raw: String| {
        if extract.field_calls(field, "sanitize_text") {
            runtime::sanitize_text(&raw)
        } else {
            raw
        }
    };
    let normalizes = extract.field_calls("url", "normalize_url");
    let deduplicates = extract.calls("is_duplicate");
    let limit = match facts.const_int("MAX_ARTICLES") {
        Some(max) if !extract.take_args.is_empty() => max as usize,
        _ => usize::MAX,
    };

    let document = FetchedDocument::new(html);
    let mut records = Vec::new();

    for node in document.select(container).into_iter().take(limit) {
        let Some(title) = node.text(title_selector).map(|raw| sanitize("title", raw)) else {
            continue;
        };
        let Some(href) = node.attr(link_selector, "href") else {
            continue;
        };
        let url = if normalizes {
            match runtime::normalize_url(base_url, &href) {
                Some(url) => url,
                None => continue,
            }
        } else {
            href
        };
        if title.is_empty() {
            continue;
        }
        if deduplicates && store.is_duplicate(&url).await {
            continue;
        }

        records.push(ArticleRecord {
            title,
            url,
            published: date_selector
                .and_then(|selector| node.text(selector))
                .map(|raw| sanitize("published", raw)),
            summary: summary_selector
                .and_then(|selector| node.text(selector))
                .map(|raw| sanitize("summary", raw)),
            source: facts.const_str("SOURCE_DOMAIN").unwrap_or_default().to_string(),
            language: facts.const_str("LANGUAGE").unwrap_or_default().to_string(),
            content_type: facts.const_str("CONTENT_TYPE").unwrap_or_default().to_string(),
        });
    }

    records
}

fn selector_consts(facts: &SourceFacts) -> Result<SelectorSet, String> {
    let get = |name: &str| {
        facts
            .const_str(name)
            .map(str::to_string)
            .ok_or_else(|| format!("{} constant is missing", name))
    };
    Ok(SelectorSet {
        article: get("ARTICLE_SELECTOR")?,
        title: get("TITLE_SELECTOR")?,
        link: get("LINK_SELECTOR")?,
        date: get("DATE_SELECTOR")?,
        summary: get("SUMMARY_SELECTOR")?,
    })
}

/// One simple selector: optional tag plus id, classes and attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, String)>,
}

impl Compound {
    fn parse(raw: &str) -> Result<Self, String> {
        let mut compound = Self::default();
        let mut chars = raw.chars().peekable();

        let read_name = |chars: &mut std::iter::Peekable<std::str::Chars<'_>>| {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            name
        };

        if chars.peek() == Some(&'*') {
            chars.next();
        } else if chars.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            compound.tag = Some(read_name(&mut chars).to_ascii_lowercase());
        }

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    let class = read_name(&mut chars);
                    if class.is_empty() {
                        return Err(format!("empty class in selector '{}'", raw));
                    }
                    compound.classes.push(class);
                }
                '#' => compound.id = Some(read_name(&mut chars)),
                '[' => {
                    let body: String = chars.by_ref().take_while(|&c| c != ']').collect();
                    let (name, value) = match body.split_once('=') {
                        Some((name, value)) => (name.trim(), value.trim().trim_matches(|c| c == '"' || c == '\'')),
                        None => (body.trim(), ""),
                    };
                    if name.is_empty() || name.ends_with(['~', '|', '^', '$', '*']) {
                        return Err(format!("unsupported attribute selector in '{}'", raw));
                    }
                    compound.attrs.push((name.to_string(), value.to_string()));
                }
                other => return Err(format!("unsupported selector syntax '{}' in '{}'", other, raw)),
            }
        }

        Ok(compound)
    }

    fn render(&self, default_tag: &str, inner: &str, href: Option<&str>) -> String {
        let tag = self.tag.as_deref().unwrap_or(default_tag);
        let mut open = format!("<{}", tag);
        if let Some(id) = &self.id {
            open.push_str(&format!(" id=\"{}\"", id));
        }
        if !self.classes.is_empty() {
            open.push_str(&format!(" class=\"{}\"", self.classes.join(" ")));
        }
        for (name, value) in &self.attrs {
            open.push_str(&format!(" {}=\"{}\"", name, value.replace('"', "&quot;")));
        }
        if let Some(href) = href {
            open.push_str(&format!(" href=\"{}\"", href));
        }
        format!("{}>{}</{}>", open, inner, tag)
    }
}

fn parse_chain(selector: &str) -> Result<Vec<Compound>, String> {
    if selector.contains([',', '>', '+', '~', ':']) {
        return Err(format!("selector '{}' uses combinators or pseudo-classes", selector));
    }
    let chain = selector
        .split_whitespace()
        .map(Compound::parse)
        .collect::<Result<Vec<_>, _>>()?;
    if chain.is_empty() {
        return Err("empty selector".to_string());
    }
    Ok(chain)
}

/// Nest `chain` outermost first; `href` lands on the innermost element
fn nest(chain: &[Compound], default_tag: &str, text: &str, href: Option<&str>) -> String {
    let mut html = text.to_string();
    for (depth, compound) in chain.iter().enumerate().rev() {
        let is_innermost = depth == chain.len() - 1;
        let tag = if is_innermost { default_tag } else { "div" };
        html = compound.render(tag, &html, if is_innermost { href } else { None });
    }
    html
}

/// Listing page with one container per fixture href. Values carry control
/// characters and padding, and hrefs are relative.
pub fn build_fixture(selectors: &SelectorSet) -> Result<String, String> {
    let article = parse_chain(&selectors.article)?;
    let title = parse_chain(&selectors.title)?;
    let link = parse_chain(&selectors.link)?;
    let date = parse_chain(&selectors.date)?;
    let summary = parse_chain(&selectors.summary)?;

    let link_in_title = link.len() > title.len() && link[..title.len()] == title[..];
    let (container_ancestors, container) = article.split_at(article.len() - 1);

    let items: String = FIXTURE_HREFS
        .iter()
        .enumerate()
        .map(|(i, href)| {
            let n = i + 1;
            let headline = format!("  Headline\u{0007} {}\n\t story  ", n);

            let heading = if link_in_title {
                nest(&title, "h2", &nest(&link[title.len()..], "a", &headline, Some(href)), None)
            } else {
                format!(
                    "{}{}",
                    nest(&title, "h2", &headline, None),
                    nest(&link, "a", "Read more", Some(href))
                )
            };

            let body = format!(
                "{}{}{}",
                heading,
                nest(&date, "time", &format!("\n 2024-03-0{}\u{0001} ", n), None),
                nest(&summary, "p", &format!(" Summary \u{000B} for\n\n story {} ", n), None),
            );
            nest(container, "div", &body, None)
        })
        .collect();

    Ok(format!(
        "<html><body>{}</body></html>",
        nest(container_ancestors, "div", &items, None)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::registry::TEMPLATES;

    fn selectors(article: &str, title: &str, link: &str, date: &str, summary: &str) -> SelectorSet {
        SelectorSet {
            article: article.to_string(),
            title: title.to_string(),
            link: link.to_string(),
            date: date.to_string(),
            summary: summary.to_string(),
        }
    }

    #[test]
    fn test_fixture_matches_its_own_selectors() {
        for definition in TEMPLATES {
            let set = definition.default_selectors();
            let html = build_fixture(&set).unwrap();
            let document = FetchedDocument::new(html);
            let nodes = document.select(&set.article);

            assert_eq!(nodes.len(), 4, "{}", definition.name);
            assert!(nodes[0].text(&set.title).unwrap().contains("Headline"), "{}", definition.name);
            assert_eq!(nodes[1].attr(&set.link, "href").as_deref(), Some("story-2?ref=home"));
            assert!(nodes[0].text(&set.date).unwrap().contains("2024-03-01"));
            assert!(nodes[0].text(&set.summary).unwrap().contains("Summary"));
        }
    }

    #[test]
    fn test_link_nested_in_title() {
        let set = selectors("article.post", "h2.entry-title", "h2.entry-title a", "time", "p");
        let html = build_fixture(&set).unwrap();
        assert!(html.contains(r#"<h2 class="entry-title"><a href="/news/story-1">"#));
    }

    #[test]
    fn test_container_ancestors_wrap_listing() {
        let set = selectors("main.feed li.item", "h3", "a", "time", "p");
        let html = build_fixture(&set).unwrap();
        let document = FetchedDocument::new(html);
        assert_eq!(document.select(&set.article).len(), 4);
    }

    #[test]
    fn test_unsupported_selectors_are_reported() {
        assert!(build_fixture(&selectors("ul > li", "h3", "a", "time", "p")).is_err());
        assert!(build_fixture(&selectors("article", "h2:first-child", "a", "time", "p")).is_err());
        assert!(build_fixture(&selectors("article", "h2", "a[href^=http]", "time", "p")).is_err());
    }

    fn listing_source(title_lookup: &str) -> String {
        format!(
            r#"
            pub const BASE_URL: &str = "https://example-blog.com/";
            pub const ARTICLE_SELECTOR: &str = "article.post";
            pub const TITLE_SELECTOR: &str = "h2.entry-title";
            pub const LINK_SELECTOR: &str = "h2.entry-title a";
            pub const DATE_SELECTOR: &str = "time";
            pub const SUMMARY_SELECTOR: &str = "div.entry-summary";

            pub async fn extract_records(document: &FetchedDocument, store: &dyn ArticleStore) -> Vec<ArticleRecord> {{
                let mut records = Vec::new();
                for node in document.select(ARTICLE_SELECTOR) {{
                    let title = match node.text({title_lookup}) {{
                        Some(raw) => raw,
                        None => continue,
                    }};
                    let url = match node.attr(LINK_SELECTOR, "href") {{
                        Some(url) => url,
                        None => continue,
                    }};
                    records.push(ArticleRecord {{
                        title,
                        url,
                        published: node.text(DATE_SELECTOR),
                        summary: None,
                    }});
                }}
                records
            }}
            "#
        )
    }

    #[tokio::test]
    async fn test_fields_read_through_the_consts_they_pass() {
        let facts = SourceFacts::inspect(&listing_source("TITLE_SELECTOR")).unwrap();
        let report = execute(&facts).await;

        assert_eq!(report.records.len(), 4);
        assert!(report.records[0].title.contains("Headline"));
        assert!(report.records[0].published.as_deref().unwrap().contains("2024-03-01"));
        assert_eq!(report.records[0].summary, None);

        let swapped = SourceFacts::inspect(&listing_source("SUMMARY_SELECTOR")).unwrap();
        let report = execute(&swapped).await;
        assert_eq!(report.records.len(), 4);
        assert!(report.records[0].title.contains("Summary"));
    }

    #[tokio::test]
    async fn test_link_read_from_title_heading_yields_nothing() {
        let source = listing_source("TITLE_SELECTOR").replace("node.attr(LINK_SELECTOR", "node.attr(TITLE_SELECTOR");
        let facts = SourceFacts::inspect(&source).unwrap();

        assert!(execute(&facts).await.records.is_empty());
    }

    #[tokio::test]
    async fn test_recording_store_counts_hooks() {
        let store = RecordingStore::seeded(["https://a.example/x".to_string()]);
        assert!(store.is_duplicate("https://a.example/x").await);
        assert!(!store.is_duplicate("https://a.example/y").await);
        store.begin_batch("a.example").await.unwrap();
        store
            .write(&ArticleRecord {
                title: "t".to_string(),
                url: "https://a.example/y".to_string(),
                published: None,
                summary: None,
                source: "a.example".to_string(),
                language: "en".to_string(),
                content_type: "summary".to_string(),
            })
            .await
            .unwrap();
        store.commit_batch().await.unwrap();

        assert_eq!(store.duplicate_checks(), 2);
        assert_eq!(store.writes(), 1);
        assert_eq!(store.batches(), 1);
        assert_eq!(store.commits(), 1);
        assert_eq!(store.written().await.len(), 1);

        store.rollback_batch().await;
        assert_eq!(store.rollbacks(), 1);
        assert!(store.written().await.is_empty());
    }
}

//! Raw observations taken from a loaded root page.

use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;

use crate::utils::StringUtils;

const JS_FRAMEWORK_MARKERS: &[&str] = &[
    "__next_data__",
    "data-reactroot",
    "ng-version",
    "data-v-app",
    "__nuxt",
    "ember-application",
    "data-svelte",
    "react-dom",
    "vue.runtime",
    "angular.min.js",
];

const SCROLL_MARKERS: &[&str] = &[
    "infinite-scroll",
    "infinite_scroll",
    "data-infinite",
    "load-more",
    "loadmore",
    "rel=\"next\"",
    "class=\"pagination",
    "next-page",
];

/// Cap on elements visited when sampling DOM depth
const DEPTH_SAMPLE_LIMIT: usize = 5000;

/// Everything the analyzer needs from the page, extracted in one parse
#[derive(Debug, Clone, Default)]
pub struct PageSignals {
    /// Lowercased document source
    pub markup: String,
    /// Lowercased `<meta name="generator">` content
    pub generator: Option<String>,
    pub navigation: Vec<String>,
    pub js_framework: bool,
    pub external_origins: usize,
    pub max_depth: usize,
    pub scroll_or_pagination: bool,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

impl PageSignals {
    pub fn from_html(html: &str, max_navigation_items: usize) -> Self {
        let document = Html::parse_document(html);
        let markup = html.to_lowercase();

        let generator = selector("meta[name=generator]").and_then(|sel| {
            document
                .select(&sel)
                .filter_map(|meta| meta.value().attr("content"))
                .map(|content| content.to_lowercase())
                .next()
        });

        let js_framework = JS_FRAMEWORK_MARKERS.iter().any(|marker| markup.contains(marker));
        let scroll_or_pagination = SCROLL_MARKERS.iter().any(|marker| markup.contains(marker));

        Self {
            navigation: navigation_texts(&document, max_navigation_items),
            external_origins: external_origins(&document),
            max_depth: sampled_depth(&document),
            generator,
            js_framework,
            scroll_or_pagination,
            markup,
        }
    }

    pub fn generator_contains(&self, needle: &str) -> bool {
        self.generator.as_deref().is_some_and(|g| g.contains(needle))
    }

    pub fn markup_contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| self.markup.contains(needle))
    }
}

/// Distinct link texts across every `<nav>` in document order. `<header>`
/// links are used only when no nav link has text.
fn navigation_texts(document: &Html, limit: usize) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut texts = Vec::new();

    for css in ["nav a", "header a"] {
        let Some(sel) = selector(css) else { continue };
        for link in document.select(&sel) {
            let text = StringUtils::sanitize(&link.text().collect::<String>());
            if text.is_empty() || !seen.insert(text.clone()) {
                continue;
            }
            texts.push(text);
            if texts.len() >= limit {
                return texts;
            }
        }
        if !texts.is_empty() {
            break;
        }
    }

    texts
}

/// Distinct hosts serving scripts and stylesheets
fn external_origins(document: &Html) -> usize {
    let mut origins = BTreeSet::new();
    let sources = [("script[src]", "src"), ("link[rel=stylesheet][href]", "href")];

    for (css, attr) in sources {
        let Some(sel) = selector(css) else { continue };
        for element in document.select(&sel) {
            let Some(value) = element.value().attr(attr) else { continue };
            let absolute = if value.starts_with("//") {
                format!("https:{}", value)
            } else {
                value.to_string()
            };
            if let Ok(url) = url::Url::parse(&absolute) {
                if let Some(host) = url.host_str() {
                    origins.insert(host.to_lowercase());
                }
            }
        }
    }

    origins.len()
}

fn sampled_depth(document: &Html) -> usize {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .take(DEPTH_SAMPLE_LIMIT)
        .map(|element| element.ancestors().count())
        .max()
        .unwrap_or(0)
}

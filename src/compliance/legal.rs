//! Legal-page probing and terms-of-service scanning.

use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

use crate::config::ComplianceConfig;
use crate::net::{site_url, PageFetcher};
use crate::utils::StringUtils;

/// Outcome of probing the candidate legal paths
#[derive(Debug, Clone, Default)]
pub struct LegalProbe {
    pub found: Vec<String>,
    /// First restrictive phrase and the page it was found on
    pub restriction: Option<TermsRestriction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsRestriction {
    pub path: String,
    pub phrase: String,
}

/// Probe each candidate path in order. Any fetch failure, non-2xx status,
/// redirect overflow or oversized body counts as "not found".
pub async fn probe_legal_pages(
    fetcher: &dyn PageFetcher,
    scheme: &str,
    domain: &str,
    config: &ComplianceConfig,
    timeout: Duration,
) -> LegalProbe {
    let mut probe = LegalProbe::default();

    for path in &config.legal_paths {
        let Ok(url) = site_url(scheme, domain, path) else {
            continue;
        };

        let page = match fetcher.fetch(&url, timeout).await {
            Ok(page) if page.is_success() => page,
            Ok(page) => {
                debug!("Legal page {} answered HTTP {}", url, page.status);
                continue;
            }
            Err(e) => {
                debug!("Legal page {} unavailable: {}", url, e);
                continue;
            }
        };

        probe.found.push(path.clone());

        if probe.restriction.is_none() && config.terms_paths.iter().any(|p| p == path) {
            if let Some(phrase) = find_restrictive_phrase(&page.body, &config.restrictive_phrases) {
                probe.restriction = Some(TermsRestriction {
                    path: path.clone(),
                    phrase,
                });
            }
        }
    }

    probe
}

/// Visible text of an HTML document, lowercased with whitespace collapsed
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let text = match Selector::parse("body") {
        Ok(body) => match document.select(&body).next() {
            Some(body) => body.text().collect::<Vec<_>>().join(" "),
            None => document.root_element().text().collect::<Vec<_>>().join(" "),
        },
        Err(_) => document.root_element().text().collect::<Vec<_>>().join(" "),
    };
    StringUtils::fold_for_matching(&text)
}

/// First blocklisted phrase present in the page text
pub fn find_restrictive_phrase(html: &str, phrases: &[String]) -> Option<String> {
    let text = visible_text(html);
    phrases
        .iter()
        .find(|phrase| {
            let folded = StringUtils::fold_for_matching(phrase);
            !folded.is_empty() && text.contains(&folded)
        })
        .cloned()
}

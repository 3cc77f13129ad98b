use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ForgeResult;
use crate::net::BrowserPage;

/// Selectors found on the page. Empty means "use template defaults".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedSelectors {
    /// Matched article container
    pub article: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub date: Option<String>,
    pub summary: Option<String>,
}

impl DetectedSelectors {
    pub fn is_empty(&self) -> bool {
        self.article.is_none()
            && self.title.is_none()
            && self.link.is_none()
            && self.date.is_none()
            && self.summary.is_none()
    }
}

/// One candidate layout: a container and slot selectors relative to it
#[derive(Debug, Clone, Copy)]
pub struct CandidateGroup {
    pub article: &'static str,
    pub title: &'static str,
    pub link: &'static str,
    pub date: &'static str,
    pub summary: &'static str,
}

/// Tried in order; specific layouts come before catch-alls
pub const CANDIDATE_GROUPS: &[CandidateGroup] = &[
    CandidateGroup {
        article: "article.post",
        title: "h2.entry-title",
        link: "h2.entry-title a",
        date: "time.entry-date",
        summary: "div.entry-summary",
    },
    CandidateGroup {
        article: "div.views-row",
        title: "span.field-content",
        link: "span.field-content a",
        date: "time",
        summary: "div.views-field-body",
    },
    CandidateGroup {
        article: "div.news-item",
        title: "h3.headline",
        link: "h3.headline a",
        date: "time",
        summary: "p.standfirst",
    },
    CandidateGroup {
        article: "div.post",
        title: "h2.post-title",
        link: "h2.post-title a",
        date: "span.post-date",
        summary: "div.post-excerpt",
    },
    CandidateGroup {
        article: "li.article",
        title: "h3",
        link: "a",
        date: "time",
        summary: "p",
    },
    CandidateGroup {
        article: "article",
        title: "h2",
        link: "a",
        date: "time",
        summary: "p",
    },
];

/// Keep the first group whose container matches at least `threshold` times
pub async fn detect(page: &dyn BrowserPage, threshold: usize) -> ForgeResult<DetectedSelectors> {
    for group in CANDIDATE_GROUPS {
        let matches = page.count_matching(group.article).await?;
        debug!("Candidate {} matched {} containers", group.article, matches);
        if matches < threshold {
            continue;
        }

        let mut detected = DetectedSelectors {
            article: Some(group.article.to_string()),
            ..DetectedSelectors::default()
        };

        for (slot, css) in [
            (&mut detected.title, group.title),
            (&mut detected.link, group.link),
            (&mut detected.date, group.date),
            (&mut detected.summary, group.summary),
        ] {
            let scoped = format!("{} {}", group.article, css);
            if page.count_matching(&scoped).await? > 0 {
                *slot = Some(css.to_string());
            }
        }

        return Ok(detected);
    }

    Ok(DetectedSelectors::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForgeError;
    use crate::net::browser::count_in_html;
    use async_trait::async_trait;

    struct HtmlPage(String);

    #[async_trait]
    impl BrowserPage for HtmlPage {
        async fn content(&self) -> ForgeResult<String> {
            Ok(self.0.clone())
        }

        async fn count_matching(&self, selector: &str) -> ForgeResult<usize> {
            count_in_html(&self.0, selector)
        }

        async fn close(self: Box<Self>) -> ForgeResult<()> {
            Ok(())
        }
    }

    fn repeat(item: &str, n: usize) -> String {
        format!("<html><body>{}</body></html>", item.repeat(n))
    }

    #[tokio::test]
    async fn test_first_qualifying_group_wins() {
        let item = r#"<div class="news-item"><h3 class="headline"><a href="/a">A</a></h3><time>today</time></div>"#;
        let page = HtmlPage(repeat(item, 3));

        let detected = detect(&page, 3).await.unwrap();
        assert_eq!(detected.article.as_deref(), Some("div.news-item"));
        assert_eq!(detected.title.as_deref(), Some("h3.headline"));
        assert_eq!(detected.link.as_deref(), Some("h3.headline a"));
        assert_eq!(detected.date.as_deref(), Some("time"));
        assert_eq!(detected.summary, None);
    }

    #[tokio::test]
    async fn test_below_threshold_stays_empty() {
        let page = HtmlPage(repeat("<article><h2>x</h2></article>", 2));
        let detected = detect(&page, 3).await.unwrap();
        assert!(detected.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_is_configurable() {
        let page = HtmlPage(repeat("<article><h2>x</h2><a href='/x'>x</a></article>", 2));
        let detected = detect(&page, 2).await.unwrap();
        assert_eq!(detected.article.as_deref(), Some("article"));
        assert_eq!(detected.link.as_deref(), Some("a"));
    }

    #[test]
    fn test_candidate_selectors_parse() {
        for group in CANDIDATE_GROUPS {
            for css in [group.article, group.title, group.link, group.date, group.summary] {
                assert!(
                    !matches!(count_in_html("<p></p>", css), Err(ForgeError::InvalidSelector { .. })),
                    "{css} must be a valid selector"
                );
            }
        }
    }
}

//! Site-structure analysis through the browser capability.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub mod cms;
pub mod complexity;
pub mod selectors;
pub mod signals;

pub use cms::CmsType;
pub use selectors::DetectedSelectors;

use crate::config::{AnalysisConfig, NetworkConfig};
use crate::error::{ForgeError, ForgeResult};
use crate::logging::{LogContext, PerformanceLogger};
use crate::net::{site_url, BrowserDriver, BrowserPage, ScopedPage};
use crate::storage::{CacheFill, CacheStats, Clock, TtlCache};
use crate::utils::normalize_domain;
use crate::log_warn;
use signals::PageSignals;

/// Classification of a site's root page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStructure {
    pub domain: String,
    pub cms_type: CmsType,
    pub navigation: Vec<String>,
    pub detected_selectors: DetectedSelectors,
    pub complexity_score: f64,
    pub fetched_at: DateTime<Utc>,
    /// Why the page could not be loaded, when it could not
    pub load_error: Option<String>,
}

impl SiteStructure {
    /// Pessimistic structure for a page that never loaded
    pub fn unavailable(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            cms_type: CmsType::Unknown,
            navigation: Vec::new(),
            detected_selectors: DetectedSelectors::default(),
            complexity_score: complexity::UNREACHABLE_COMPLEXITY,
            fetched_at: Utc::now(),
            load_error: Some(reason.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.load_error.is_none()
    }
}

/// Probes a domain's root page and classifies it
pub struct SiteStructureAnalyzer {
    browser: Arc<dyn BrowserDriver>,
    config: AnalysisConfig,
    scheme: String,
    cache: TtlCache<SiteStructure>,
}

impl SiteStructureAnalyzer {
    pub fn new(
        browser: Arc<dyn BrowserDriver>,
        config: &AnalysisConfig,
        network: &NetworkConfig,
        cache_ttl: ChronoDuration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            browser,
            config: config.clone(),
            scheme: network.scheme.clone(),
            cache: TtlCache::new("structure", cache_ttl, clock),
        }
    }

    /// Analyze `domain`. Never fails; load failures yield [`SiteStructure::unavailable`].
    #[instrument(skip(self), fields(component = "analysis"))]
    pub async fn analyze(&self, domain: &str) -> SiteStructure {
        let domain = match normalize_domain(domain) {
            Ok(domain) => domain,
            Err(e) => return SiteStructure::unavailable(domain, e.to_string()),
        };

        let key = domain.as_str();
        self.cache
            .get_or_fetch(key, || async move {
                let structure = self.load(key).await;
                if structure.is_available() {
                    CacheFill::Store(structure)
                } else {
                    CacheFill::Transient(structure)
                }
            })
            .await
    }

    /// Fresh cached structure for `domain`, if any
    pub async fn cached(&self, domain: &str) -> Option<SiteStructure> {
        let domain = normalize_domain(domain).ok()?;
        self.cache.peek(&domain).await.map(|entry| entry.value)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn browser_name(&self) -> &'static str {
        self.browser.name()
    }

    async fn load(&self, domain: &str) -> SiteStructure {
        let perf = PerformanceLogger::new(LogContext::new("analysis", "analyze").with_domain(domain));

        match self.load_inner(domain).await {
            Ok(structure) => {
                perf.finish_with_status("Structure analysis finished", structure.cms_type.as_str());
                structure
            }
            Err(e) => {
                let context = LogContext::new("analysis", "analyze")
                    .with_domain(domain)
                    .with_error_category(e.category());
                log_warn!(context, format!("Root page unavailable: {}", e));
                SiteStructure::unavailable(domain, e.to_string())
            }
        }
    }

    async fn load_inner(&self, domain: &str) -> ForgeResult<SiteStructure> {
        let url = site_url(&self.scheme, domain, "/")?;
        let timeout = Duration::from_secs(self.config.page_timeout_seconds);

        let scoped = tokio::time::timeout(timeout, ScopedPage::acquire(self.browser.as_ref(), &url, timeout))
            .await
            .map_err(|_| ForgeError::Timeout { url: url.to_string() })??;

        let outcome = match scoped.page() {
            Ok(page) => tokio::time::timeout(timeout, self.probe(page, domain))
                .await
                .unwrap_or_else(|_| Err(ForgeError::Timeout { url: url.to_string() })),
            Err(e) => Err(e),
        };

        scoped.release().await;
        outcome
    }

    async fn probe(&self, page: &dyn BrowserPage, domain: &str) -> ForgeResult<SiteStructure> {
        let html = page.content().await?;
        let signals = PageSignals::from_html(&html, self.config.max_navigation_items);

        let detected_selectors = selectors::detect(page, self.config.article_match_threshold).await?;

        Ok(SiteStructure {
            domain: domain.to_string(),
            cms_type: cms::detect(&signals),
            navigation: signals.navigation.clone(),
            detected_selectors,
            complexity_score: complexity::score(&signals),
            fetched_at: Utc::now(),
            load_error: None,
        })
    }
}

//! Legal and ethical gate run before any structural probing of a site.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub mod legal;

use crate::config::{ComplianceConfig, NetworkConfig};
use crate::logging::LogContext;
use crate::net::{site_url, PageFetcher, RobotsRules};
use crate::storage::{CacheFill, CacheStats, Clock, TtlCache};
use crate::utils::normalize_domain;
use crate::{log_info, log_warn, AGENT_TOKEN, FAIR_USE_BASIS};

/// Verdict of the compliance gate for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceValidationResult {
    pub domain: String,
    pub is_compliant: bool,
    pub robots_allowed: bool,
    pub crawl_delay_seconds: u64,
    pub legal_contact_found: bool,
    pub tos_restrictive: bool,
    pub fair_use_basis: String,
    pub data_minimization: bool,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    pub legal_pages_found: Vec<String>,
    pub robots_fetched: bool,
    pub checked_at: DateTime<Utc>,
}

impl ComplianceValidationResult {
    /// Non-compliant result carrying a single violation
    pub fn rejected(domain: impl Into<String>, violation: impl Into<String>, crawl_delay_seconds: u64) -> Self {
        Self {
            domain: domain.into(),
            is_compliant: false,
            robots_allowed: false,
            crawl_delay_seconds,
            legal_contact_found: false,
            tos_restrictive: false,
            fair_use_basis: FAIR_USE_BASIS.to_string(),
            data_minimization: true,
            violations: vec![violation.into()],
            warnings: Vec::new(),
            legal_pages_found: Vec::new(),
            robots_fetched: false,
            checked_at: Utc::now(),
        }
    }
}

/// Robots cache payload: the parsed rules that matter plus the full verdict
#[derive(Debug, Clone)]
pub struct RobotsRecord {
    pub domain: String,
    pub crawl_delay_seconds: u64,
    pub allowed_paths: Vec<String>,
    pub disallowed_paths: Vec<String>,
    pub validation: ComplianceValidationResult,
}

enum RobotsFetch {
    Parsed(RobotsRules),
    Missing(u16),
    Unreachable(String),
}

/// Runs the robots.txt check, legal-page detection and terms scan
pub struct ComplianceValidator {
    fetcher: Arc<dyn PageFetcher>,
    config: ComplianceConfig,
    scheme: String,
    timeout: Duration,
    cache: TtlCache<RobotsRecord>,
}

impl ComplianceValidator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        config: &ComplianceConfig,
        network: &NetworkConfig,
        cache_ttl: ChronoDuration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fetcher,
            config: config.clone(),
            scheme: network.scheme.clone(),
            timeout: Duration::from_secs(network.request_timeout_seconds),
            cache: TtlCache::new("robots", cache_ttl, clock),
        }
    }

    /// Validate `domain`. Never fails: every problem becomes a violation or warning.
    #[instrument(skip(self), fields(component = "compliance"))]
    pub async fn validate(&self, domain: &str) -> ComplianceValidationResult {
        let domain = match normalize_domain(domain) {
            Ok(domain) => domain,
            Err(e) => {
                let context = LogContext::new("compliance", "validate")
                    .with_domain(domain)
                    .with_error_category(e.category());
                log_warn!(context, "Rejecting malformed domain");
                return ComplianceValidationResult::rejected(
                    domain,
                    format!("invalid domain: {}", e),
                    self.config.default_crawl_delay_seconds,
                );
            }
        };

        let key = domain.as_str();
        let record = self
            .cache
            .get_or_fetch(key, || async move {
                let (record, degraded) = self.check(key).await;
                if degraded {
                    CacheFill::Transient(record)
                } else {
                    CacheFill::Store(record)
                }
            })
            .await;

        record.validation
    }

    /// Cached robots record for `domain`, if fresh
    pub async fn cached_record(&self, domain: &str) -> Option<RobotsRecord> {
        let domain = normalize_domain(domain).ok()?;
        self.cache.peek(&domain).await.map(|entry| entry.value)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn fetch_robots(&self, domain: &str) -> RobotsFetch {
        let url = match site_url(&self.scheme, domain, "/robots.txt") {
            Ok(url) => url,
            Err(e) => return RobotsFetch::Unreachable(e.to_string()),
        };

        match self.fetcher.fetch(&url, self.timeout).await {
            Ok(page) if page.is_success() => RobotsFetch::Parsed(RobotsRules::parse(&page.body)),
            Ok(page) => RobotsFetch::Missing(page.status),
            Err(e) => RobotsFetch::Unreachable(e.to_string()),
        }
    }

    /// Full network check. The flag marks a degraded verdict that must not be cached.
    async fn check(&self, domain: &str) -> (RobotsRecord, bool) {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();
        let mut degraded = false;

        let (rules, robots_fetched) = match self.fetch_robots(domain).await {
            RobotsFetch::Parsed(rules) => (rules, true),
            RobotsFetch::Missing(status) => {
                warnings.push(format!(
                    "robots.txt not available (HTTP {}); treating all paths as allowed",
                    status
                ));
                (RobotsRules::default(), false)
            }
            RobotsFetch::Unreachable(reason) => {
                degraded = true;
                warnings.push(format!(
                    "robots.txt unreachable ({}); treating all paths as allowed",
                    reason
                ));
                (RobotsRules::default(), false)
            }
        };

        let listing_path = self.config.listing_path.as_str();
        let robots_allowed = rules.is_allowed(listing_path, AGENT_TOKEN);
        if !robots_allowed {
            violations.push(format!(
                "robots.txt disallows {} for {}",
                listing_path, AGENT_TOKEN
            ));
        }

        let crawl_delay_seconds = rules
            .crawl_delay_seconds(AGENT_TOKEN)
            .unwrap_or(self.config.default_crawl_delay_seconds);

        let probe =
            legal::probe_legal_pages(self.fetcher.as_ref(), &self.scheme, domain, &self.config, self.timeout)
                .await;

        let legal_contact_found = !probe.found.is_empty();
        if !legal_contact_found {
            warnings.push("no legal or contact page found".to_string());
        }

        let tos_restrictive = probe.restriction.is_some();
        if let Some(restriction) = &probe.restriction {
            violations.push(format!(
                "terms of service at {} restrict automated access: \"{}\"",
                restriction.path, restriction.phrase
            ));
        }

        let is_compliant = robots_allowed && !tos_restrictive;

        let context = LogContext::new("compliance", "validate")
            .with_domain(domain)
            .with_status(if is_compliant { "compliant" } else { "rejected" })
            .with_bool_field("robots_fetched", robots_fetched)
            .with_field("crawl_delay_seconds", serde_json::json!(crawl_delay_seconds));
        log_info!(context, "Compliance check finished");

        let validation = ComplianceValidationResult {
            domain: domain.to_string(),
            is_compliant,
            robots_allowed,
            crawl_delay_seconds,
            legal_contact_found,
            tos_restrictive,
            fair_use_basis: FAIR_USE_BASIS.to_string(),
            data_minimization: true,
            violations,
            warnings,
            legal_pages_found: probe.found,
            robots_fetched,
            checked_at: Utc::now(),
        };

        let record = RobotsRecord {
            domain: domain.to_string(),
            crawl_delay_seconds,
            allowed_paths: rules.allowed_paths(AGENT_TOKEN),
            disallowed_paths: rules.disallowed_paths(AGENT_TOKEN),
            validation,
        };

        (record, degraded)
    }
}

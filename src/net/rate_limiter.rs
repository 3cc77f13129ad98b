use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Per-host courtesy interval between consecutive requests
pub struct RateLimiter {
    domain_limits: Arc<RwLock<HashMap<String, DomainLimiter>>>,
    default_delay: Duration,
}

/// Per-domain rate limiting state
struct DomainLimiter {
    next_slot: Instant,
    request_count: usize,
}

/// Snapshot of the courtesy limiter for health reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateLimiterStats {
    pub interval_ms: u64,
    /// Requests admitted per host, sorted by host
    pub requests_by_domain: BTreeMap<String, usize>,
}

impl RateLimiter {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            domain_limits: Arc::new(RwLock::new(HashMap::new())),
            default_delay,
        }
    }

    /// Wait for rate limit before making request to domain
    pub async fn wait_for_domain(&self, domain: &str) {
        let now = Instant::now();
        let required_delay = {
            let mut limits = self.domain_limits.write().await;
            let limiter = limits.entry(domain.to_string()).or_insert_with(|| DomainLimiter {
                next_slot: now,
                request_count: 0,
            });

            let required_delay = limiter.next_slot.saturating_duration_since(now);

            // Reserve the slot before releasing the lock so concurrent callers queue up
            limiter.next_slot = now + required_delay + self.default_delay;
            limiter.request_count += 1;

            required_delay
        };

        if !required_delay.is_zero() {
            debug!("Rate limiting: waiting {}ms for domain {}", required_delay.as_millis(), domain);
            tokio::time::sleep(required_delay).await;
        }
    }

    pub async fn stats(&self) -> RateLimiterStats {
        let limits = self.domain_limits.read().await;
        RateLimiterStats {
            interval_ms: self.default_delay.as_millis() as u64,
            requests_by_domain: limits
                .iter()
                .map(|(domain, limiter)| (domain.clone(), limiter.request_count))
                .collect(),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

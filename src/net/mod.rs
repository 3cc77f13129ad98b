//! Network plumbing: the page fetcher seam, the reqwest-backed client,
//! robots.txt parsing and the browser capability used for structure probing.

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::error::{ForgeError, ForgeResult};

pub mod browser;
pub mod http_client;
pub mod rate_limiter;
pub mod robots;

pub use browser::{BrowserDriver, BrowserPage, ScopedPage, StaticPageDriver};
#[cfg(feature = "browser")]
pub use browser::PlaywrightDriver;
pub use http_client::{HttpClient, HttpPerformanceStats};
pub use rate_limiter::{RateLimiter, RateLimiterStats};
pub use robots::RobotsRules;

/// A response body together with the final URL and status
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: Url,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network layer consumed by the validator and the static browser driver.
///
/// Implementations must honour `timeout`, bound redirects and bound body size.
/// Non-2xx responses are returned as pages, not errors.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, timeout: Duration) -> ForgeResult<FetchedPage>;
}

/// Build an absolute URL for `path` on `domain`
pub fn site_url(scheme: &str, domain: &str, path: &str) -> ForgeResult<Url> {
    let raw = format!("{}://{}{}", scheme, domain, path);
    Url::parse(&raw).map_err(|_| ForgeError::InvalidDomain {
        domain: domain.to_string(),
    })
}

use async_trait::async_trait;
use reqwest::{header::{HeaderMap, HeaderValue}, Client};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::rate_limiter::{RateLimiter, RateLimiterStats};
use super::{FetchedPage, PageFetcher};
use crate::config::NetworkConfig;
use crate::error::{ForgeError, ForgeResult};

/// HTTP client wrapper with bounded redirects, bounded bodies and performance monitoring.
///
/// Requests are never retried; a failure is reported once and the caller
/// decides the pessimistic default.
pub struct HttpClient {
    client: Client,
    config: NetworkConfig,
    user_agent: String,
    rate_limiter: RateLimiter,
    performance_metrics: Arc<RwLock<HttpPerformanceMetrics>>,
}

/// Performance metrics for HTTP operations
#[derive(Debug, Default)]
struct HttpPerformanceMetrics {
    request_durations: Vec<Duration>,
    success_count: u64,
    error_count: u64,
    total_bytes_transferred: u64,
}

impl HttpClient {
    /// Create new HTTP client identifying itself with `user_agent`
    pub fn new(config: &NetworkConfig, user_agent: &str) -> ForgeResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static("text/html,application/xhtml+xml,text/plain;q=0.9,*/*;q=0.8"),
        );
        headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .default_headers(headers)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ForgeError::config(format!("HTTP client: {}", e)))?;

        info!(
            "HTTP client initialized (redirects <= {}, body <= {} bytes)",
            config.max_redirects, config.max_response_bytes
        );

        Ok(Self {
            client,
            config: config.clone(),
            user_agent: user_agent.to_string(),
            rate_limiter: RateLimiter::new(Duration::from_millis(config.min_request_interval_ms)),
            performance_metrics: Arc::new(RwLock::new(HttpPerformanceMetrics::default())),
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Per-host courtesy interval bookkeeping
    pub async fn courtesy_stats(&self) -> RateLimiterStats {
        self.rate_limiter.stats().await
    }

    /// Record performance metrics for a request
    async fn record_request_metrics(&self, duration: Duration, success: bool, bytes: u64) {
        let mut metrics = self.performance_metrics.write().await;

        metrics.request_durations.push(duration);
        if success {
            metrics.success_count += 1;
        } else {
            metrics.error_count += 1;
        }
        metrics.total_bytes_transferred += bytes;

        // Keep only last 1000 durations to prevent memory growth
        if metrics.request_durations.len() > 1000 {
            metrics.request_durations.drain(0..500);
        }
    }

    /// Get performance statistics
    pub async fn get_performance_stats(&self) -> HttpPerformanceStats {
        let metrics = self.performance_metrics.read().await;

        let avg_duration = if !metrics.request_durations.is_empty() {
            metrics.request_durations.iter().sum::<Duration>() / metrics.request_durations.len() as u32
        } else {
            Duration::from_secs(0)
        };

        let total = metrics.success_count + metrics.error_count;
        let success_rate = if total > 0 {
            metrics.success_count as f64 / total as f64
        } else {
            0.0
        };

        HttpPerformanceStats {
            total_requests: total,
            success_count: metrics.success_count,
            error_count: metrics.error_count,
            success_rate,
            avg_response_time_ms: avg_duration.as_millis() as u64,
            total_bytes_transferred: metrics.total_bytes_transferred,
        }
    }

    /// Single GET with a byte-bounded body read
    async fn get_bounded(&self, url: &Url) -> ForgeResult<FetchedPage> {
        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let limit = self.config.max_response_bytes;

        if let Some(length) = response.content_length() {
            if length as usize > limit {
                return Err(ForgeError::ResponseTooLarge {
                    url: url.to_string(),
                    limit,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| map_reqwest_error(url, e))? {
            if body.len() + chunk.len() > limit {
                return Err(ForgeError::ResponseTooLarge {
                    url: url.to_string(),
                    limit,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedPage {
            url: final_url,
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &Url, timeout: Duration) -> ForgeResult<FetchedPage> {
        let host = url.host_str().unwrap_or("unknown").to_string();
        self.rate_limiter.wait_for_domain(&host).await;

        let start_time = Instant::now();
        debug!("HTTP GET {}", url);

        let result = match tokio::time::timeout(timeout, self.get_bounded(url)).await {
            Ok(result) => result,
            Err(_) => Err(ForgeError::Timeout { url: url.to_string() }),
        };

        let duration = start_time.elapsed();
        match &result {
            Ok(page) => {
                self.record_request_metrics(duration, page.is_success(), page.body.len() as u64)
                    .await;
            }
            Err(e) => {
                warn!("HTTP GET {} failed: {}", url, e);
                self.record_request_metrics(duration, false, 0).await;
            }
        }

        result
    }
}

fn map_reqwest_error(url: &Url, error: reqwest::Error) -> ForgeError {
    if error.is_timeout() {
        ForgeError::Timeout { url: url.to_string() }
    } else if error.is_redirect() {
        ForgeError::TooManyRedirects { url: url.to_string() }
    } else {
        ForgeError::network(url.as_str(), error.to_string())
    }
}

/// HTTP performance statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct HttpPerformanceStats {
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub avg_response_time_ms: u64,
    pub total_bytes_transferred: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_client_has_empty_stats() {
        let client = HttpClient::new(&NetworkConfig::default(), crate::IDENTIFYING_USER_AGENT).unwrap();
        let stats = client.get_performance_stats().await;
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(client.user_agent(), crate::IDENTIFYING_USER_AGENT);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let config = NetworkConfig {
            scheme: "http".to_string(),
            min_request_interval_ms: 0,
            ..NetworkConfig::default()
        };
        let client = HttpClient::new(&config, crate::IDENTIFYING_USER_AGENT).unwrap();
        // Port 9 on loopback (discard) is closed in test environments
        let url = Url::parse("http://127.0.0.1:9/robots.txt").unwrap();

        let err = client.fetch(&url, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ForgeError::Network { .. } | ForgeError::Timeout { .. }));

        let stats = client.get_performance_stats().await;
        assert_eq!(stats.error_count, 1);
    }
}

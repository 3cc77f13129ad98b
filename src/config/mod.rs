use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ForgeError, ForgeResult};
pub use crate::logging::LoggingConfig;
use crate::testing::{CategoryThresholds, ScoreWeights, DEFAULT_DEPLOYMENT_THRESHOLD};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub compliance: ComplianceConfig,
    pub analysis: AnalysisConfig,
    pub generation: GenerationConfig,
    pub testing: TestingConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Scheme used to reach a bare domain; tests point this at plain http
    pub scheme: String,
    pub request_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub max_redirects: usize,
    pub max_response_bytes: usize,
    /// Courtesy interval between requests to the same host
    pub min_request_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            request_timeout_seconds: 15,
            connect_timeout_seconds: 10,
            max_redirects: 5,
            max_response_bytes: 2 * 1024 * 1024,
            min_request_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub listing_path: String,
    pub default_crawl_delay_seconds: u64,
    pub legal_paths: Vec<String>,
    /// Subset of `legal_paths` whose content is scanned for restrictive terms
    pub terms_paths: Vec<String>,
    pub restrictive_phrases: Vec<String>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            listing_path: "/".to_string(),
            default_crawl_delay_seconds: 2,
            legal_paths: ["/privacy", "/terms", "/contact", "/legal", "/about"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            terms_paths: ["/terms", "/legal"].iter().map(|s| s.to_string()).collect(),
            restrictive_phrases: [
                "no scraping",
                "scraping is prohibited",
                "automated access is prohibited",
                "no automated access",
                "may not use any robot",
                "prohibits the use of bots",
                "no crawling",
                "data mining is prohibited",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    /// Renders the raw HTML delivered by the page fetcher
    Static,
    /// Drives Chromium through Playwright; needs the `browser` feature
    Playwright,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub page_timeout_seconds: u64,
    pub article_match_threshold: usize,
    pub max_navigation_items: usize,
    pub complexity_delay_bonus_seconds: u64,
    pub browser: BrowserKind,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            page_timeout_seconds: 30,
            article_match_threshold: 3,
            max_navigation_items: 20,
            complexity_delay_bonus_seconds: 3,
            browser: BrowserKind::Static,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub default_max_articles: usize,
    pub default_language: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_max_articles: 50,
            default_language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestingConfig {
    pub weights: ScoreWeights,
    pub deployment_threshold: f64,
    pub category_thresholds: CategoryThresholds,
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            deployment_threshold: DEFAULT_DEPLOYMENT_THRESHOLD,
            category_thresholds: CategoryThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub workers: usize,
    pub max_domains: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_domains: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Append-only JSON lines file; audit records go to tracing when unset
    pub jsonl_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from default locations
    pub async fn load() -> ForgeResult<Self> {
        let config_path = get_config_path();

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from specific file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ForgeResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ForgeError::FileSystem {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let config: AppConfig = toml::from_str(&content).map_err(|e| ForgeError::InvalidConfig {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Save configuration to the given file
    pub async fn save_to<P: AsRef<Path>>(&self, path: P) -> ForgeResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ForgeError::Serialization { message: e.to_string() })?;
        tokio::fs::write(path, content).await.map_err(|e| ForgeError::FileSystem {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Save configuration to default location
    pub async fn save(&self) -> ForgeResult<()> {
        self.save_to(get_config_path()).await
    }

    /// Validate configuration values
    pub fn validate(&self) -> ForgeResult<()> {
        if !matches!(self.network.scheme.as_str(), "http" | "https") {
            return Err(ForgeError::config("network.scheme must be http or https"));
        }

        if !(1..=60).contains(&self.network.request_timeout_seconds) {
            return Err(ForgeError::config("network.request_timeout_seconds must be within 1..=60"));
        }

        if self.network.max_response_bytes == 0 {
            return Err(ForgeError::config("network.max_response_bytes must be > 0"));
        }

        if !self.compliance.listing_path.starts_with('/') {
            return Err(ForgeError::config("compliance.listing_path must start with '/'"));
        }

        if self.compliance.legal_paths.is_empty() {
            return Err(ForgeError::config("compliance.legal_paths must not be empty"));
        }

        if !(1..=60).contains(&self.analysis.page_timeout_seconds) {
            return Err(ForgeError::config("analysis.page_timeout_seconds must be within 1..=60"));
        }

        if self.analysis.article_match_threshold == 0 {
            return Err(ForgeError::config("analysis.article_match_threshold must be > 0"));
        }

        if self.generation.default_max_articles == 0 {
            return Err(ForgeError::config("generation.default_max_articles must be > 0"));
        }

        self.testing.weights.validate()?;

        if !(0.0..=1.0).contains(&self.testing.deployment_threshold) {
            return Err(ForgeError::config("testing.deployment_threshold must be within [0, 1]"));
        }

        self.testing.category_thresholds.validate()?;

        if self.batch.workers == 0 {
            return Err(ForgeError::config("batch.workers must be > 0"));
        }

        if self.batch.max_domains == 0 {
            return Err(ForgeError::config("batch.max_domains must be > 0"));
        }

        if self.cache.ttl_hours == 0 {
            return Err(ForgeError::config("cache.ttl_hours must be > 0"));
        }

        Ok(())
    }
}

/// Get the configuration file path
pub fn get_config_path() -> PathBuf {
    directories::ProjectDirs::from("com", "scraperforge", "scraper-forge")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("config.toml"))
}

/// Environment-based configuration overrides
pub struct ConfigOverrides;

impl ConfigOverrides {
    /// Apply environment variable overrides to configuration
    pub fn apply(config: &mut AppConfig) {
        Self::apply_from(config, |key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup, used by tests
    pub fn apply_from<F>(config: &mut AppConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(scheme) = lookup("FORGE_NETWORK_SCHEME") {
            config.network.scheme = scheme;
        }

        if let Some(timeout) = lookup("FORGE_REQUEST_TIMEOUT").and_then(|v| v.parse().ok()) {
            config.network.request_timeout_seconds = timeout;
        }

        if let Some(delay) = lookup("FORGE_DEFAULT_CRAWL_DELAY").and_then(|v| v.parse().ok()) {
            config.compliance.default_crawl_delay_seconds = delay;
        }

        if let Some(workers) = lookup("FORGE_BATCH_WORKERS").and_then(|v| v.parse().ok()) {
            config.batch.workers = workers;
        }

        if let Some(threshold) = lookup("FORGE_DEPLOYMENT_THRESHOLD").and_then(|v| v.parse().ok()) {
            config.testing.deployment_threshold = threshold;
        }

        if let Some(ttl) = lookup("FORGE_CACHE_TTL_HOURS").and_then(|v| v.parse().ok()) {
            config.cache.ttl_hours = ttl;
        }

        if let Some(path) = lookup("FORGE_AUDIT_PATH") {
            config.audit.jsonl_path = Some(PathBuf::from(path));
        }

        if let Some(level) = lookup("FORGE_LOG_LEVEL") {
            config.logging.level = level;
        }
    }
}

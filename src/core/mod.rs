//! Pipeline orchestration: compliance gate, structure analysis, generation,
//! testing and the deployment decision for each domain.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

pub mod orchestrator;
pub mod pipeline;

pub use orchestrator::BatchControl;
pub use pipeline::{DeploymentStatus, PipelineState, ScraperResult, StageTransition};

use crate::analysis::{complexity, SiteStructure, SiteStructureAnalyzer};
use crate::compliance::{ComplianceValidationResult, ComplianceValidator};
use crate::config::{AppConfig, BrowserKind};
use crate::error::{ContextualError, ErrorContext, ForgeError, ForgeResult};
use crate::logging::{LogContext, PerformanceLogger, RunIdGenerator};
use crate::monitoring::{
    AuditRecord, AuditSink, DeploymentHealth, DeploymentMonitor, InMemoryDeploymentMonitor, JsonLinesAuditSink,
    TracingAuditSink,
};
use crate::net::{BrowserDriver, HttpClient, HttpPerformanceStats, PageFetcher, RateLimiterStats, StaticPageDriver};
use crate::storage::{CacheStats, Clock, GenerationHistory, GenerationStats, HistoryEntry, SystemClock};
use crate::templates::{EmbeddedAssets, GenerationParams, ScraperTemplateEngine, TemplateAssets, TemplateInfo};
use crate::testing::AutomatedTestingFramework;
use crate::utils::normalize_domain;
use crate::{log_info, log_warn, IDENTIFYING_USER_AGENT};
use pipeline::PipelineTracker;

/// Snapshot of the generator's collaborators
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub missing_template_assets: Vec<String>,
    pub browser: String,
    pub http: Option<HttpPerformanceStats>,
    /// Courtesy limiter of the production HTTP client
    pub courtesy: Option<RateLimiterStats>,
    pub caches: Vec<CacheStats>,
    pub history_entries: usize,
    pub active_batches: usize,
    pub checked_at: DateTime<Utc>,
}

/// Builder for [`ScraperGenerator`]. Unset collaborators get production defaults.
pub struct ScraperGeneratorBuilder {
    config: AppConfig,
    fetcher: Option<Arc<dyn PageFetcher>>,
    browser: Option<Arc<dyn BrowserDriver>>,
    assets: Option<Arc<dyn TemplateAssets>>,
    audit: Option<Arc<dyn AuditSink>>,
    monitor: Option<Arc<dyn DeploymentMonitor>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ScraperGeneratorBuilder {
    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn browser(mut self, browser: Arc<dyn BrowserDriver>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn assets(mut self, assets: Arc<dyn TemplateAssets>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn deployment_monitor(mut self, monitor: Arc<dyn DeploymentMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub async fn build(self) -> ForgeResult<ScraperGenerator> {
        let config = self.config;
        config.validate()?;

        let (fetcher, http) = match self.fetcher {
            Some(fetcher) => (fetcher, None),
            None => {
                let client = Arc::new(HttpClient::new(&config.network, IDENTIFYING_USER_AGENT)?);
                (client.clone() as Arc<dyn PageFetcher>, Some(client))
            }
        };

        let browser = match self.browser {
            Some(browser) => browser,
            None => default_browser(&config, fetcher.clone()).await?,
        };

        let audit: Arc<dyn AuditSink> = match (self.audit, &config.audit.jsonl_path) {
            (Some(audit), _) => audit,
            (None, Some(path)) => Arc::new(JsonLinesAuditSink::new(path)),
            (None, None) => Arc::new(TracingAuditSink),
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ttl = ChronoDuration::hours(config.cache.ttl_hours as i64);

        info!("Initializing scraper generator with {} browser", browser.name());

        Ok(ScraperGenerator {
            validator: ComplianceValidator::new(fetcher, &config.compliance, &config.network, ttl, clock.clone()),
            analyzer: SiteStructureAnalyzer::new(browser, &config.analysis, &config.network, ttl, clock),
            engine: ScraperTemplateEngine::new(
                self.assets.unwrap_or_else(|| Arc::new(EmbeddedAssets)),
                config.network.scheme.clone(),
                config.network.request_timeout_seconds,
            ),
            framework: AutomatedTestingFramework::new(&config.testing),
            history: GenerationHistory::new(),
            audit,
            monitor: self.monitor.unwrap_or_else(|| Arc::new(InMemoryDeploymentMonitor::new())),
            http,
            active_batches: DashMap::new(),
            config,
        })
    }
}

async fn default_browser(config: &AppConfig, fetcher: Arc<dyn PageFetcher>) -> ForgeResult<Arc<dyn BrowserDriver>> {
    match config.analysis.browser {
        BrowserKind::Static => Ok(Arc::new(StaticPageDriver::new(fetcher))),
        #[cfg(feature = "browser")]
        BrowserKind::Playwright => Ok(Arc::new(crate::net::PlaywrightDriver::new(IDENTIFYING_USER_AGENT).await?)),
        #[cfg(not(feature = "browser"))]
        BrowserKind::Playwright => Err(ForgeError::config(
            "analysis.browser = \"playwright\" requires building with the `browser` feature",
        )),
    }
}

/// Runs the generation pipeline for single domains and batches
pub struct ScraperGenerator {
    config: AppConfig,
    validator: ComplianceValidator,
    analyzer: SiteStructureAnalyzer,
    engine: ScraperTemplateEngine,
    framework: AutomatedTestingFramework,
    history: GenerationHistory,
    audit: Arc<dyn AuditSink>,
    monitor: Arc<dyn DeploymentMonitor>,
    http: Option<Arc<HttpClient>>,
    active_batches: DashMap<String, BatchControl>,
}

impl ScraperGenerator {
    pub fn builder(config: AppConfig) -> ScraperGeneratorBuilder {
        ScraperGeneratorBuilder {
            config,
            fetcher: None,
            browser: None,
            assets: None,
            audit: None,
            monitor: None,
            clock: None,
        }
    }

    /// Generator with every production default
    pub async fn new(config: AppConfig) -> ForgeResult<Self> {
        Self::builder(config).build().await
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Parameters used when the caller does not supply any
    pub fn default_params(&self) -> GenerationParams {
        GenerationParams::from_config(&self.config.generation, self.config.compliance.default_crawl_delay_seconds)
    }

    /// Run the full pipeline for `domain`.
    ///
    /// Only configuration errors are returned; every other failure becomes a
    /// rejected result carrying the failure as a violation.
    pub async fn generate_scraper(&self, domain: &str, params: &GenerationParams) -> ForgeResult<ScraperResult> {
        let run_id = RunIdGenerator::generate();
        match self.run_pipeline(&run_id, domain, params).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_configuration() => Err(e),
            Err(e) => Ok(self.finish(self.failure_result(&run_id, domain, e, "generate_scraper")).await),
        }
    }

    /// Structure of `domain`. The analyzer only runs for compliant domains.
    pub async fn analyze_domain(&self, domain: &str) -> SiteStructure {
        let compliance = self.validator.validate(domain).await;
        if !compliance.is_compliant {
            return SiteStructure::unavailable(
                compliance.domain.clone(),
                format!("not analyzed: {}", compliance.violations.join("; ")),
            );
        }
        self.analyzer.analyze(&compliance.domain).await
    }

    pub async fn validate_compliance(&self, domain: &str) -> ComplianceValidationResult {
        self.validator.validate(domain).await
    }

    /// Re-run the testing framework on a result's unchanged source
    pub async fn retest(&self, result: &ScraperResult) -> ForgeResult<ScraperResult> {
        let (Some(generated), Some(structure)) = (&result.generated, &result.structure) else {
            return Err(ForgeError::invalid_input(format!(
                "{} has no generated scraper to retest",
                result.domain
            )));
        };

        let tests = self.framework.run(generated, structure, &result.compliance).await;
        let state = if result.compliance.is_compliant && tests.deployment_ready {
            PipelineState::DeploymentReady
        } else {
            PipelineState::NeedsReview
        };

        let retested = ScraperResult {
            run_id: RunIdGenerator::generate(),
            deployment_status: state.deployment_status().unwrap_or(DeploymentStatus::NeedsReview),
            state,
            test_results: Some(tests),
            timestamp: Utc::now(),
            ..result.clone()
        };
        Ok(self.finish(retested).await)
    }

    pub async fn get_stats(&self) -> GenerationStats {
        self.history.stats().await
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.snapshot().await
    }

    pub fn list_templates(&self) -> Vec<TemplateInfo> {
        self.engine.list_templates()
    }

    /// Drop every cached robots and structure entry
    pub fn clear_cache(&self) {
        self.validator.clear_cache();
        self.analyzer.clear_cache();
        info!("Compliance and structure caches cleared");
    }

    pub async fn poll_deployment(&self, run_id: &str) -> DeploymentHealth {
        self.monitor.poll_health(run_id).await
    }

    pub async fn health_check(&self) -> HealthReport {
        let missing_template_assets = self.engine.missing_assets();
        let (http, courtesy) = match &self.http {
            Some(client) => (
                Some(client.get_performance_stats().await),
                Some(client.courtesy_stats().await),
            ),
            None => (None, None),
        };

        HealthReport {
            healthy: missing_template_assets.is_empty(),
            missing_template_assets,
            browser: self.analyzer.browser_name().to_string(),
            http,
            courtesy,
            caches: vec![self.validator.cache_stats(), self.analyzer.cache_stats()],
            history_entries: self.history.len().await,
            active_batches: self.active_batches.len(),
            checked_at: Utc::now(),
        }
    }

    #[instrument(skip(self, params), fields(component = "orchestrator"))]
    async fn run_pipeline(&self, run_id: &str, domain: &str, params: &GenerationParams) -> ForgeResult<ScraperResult> {
        params.validate()?;
        let perf = PerformanceLogger::new(LogContext::new("orchestrator", "generate").with_run_id(run_id).with_domain(domain));
        let mut tracker = PipelineTracker::new();

        tracker.advance(PipelineState::ValidatingCompliance)?;
        let compliance = self.validator.validate(domain).await;
        if !compliance.is_compliant {
            tracker.advance(PipelineState::RejectedCompliance)?;
            let result = ScraperResult::rejected(run_id, compliance, tracker.into_transitions());
            perf.finish_with_status("Domain rejected by compliance gate", DeploymentStatus::RejectedCompliance.as_str());
            return Ok(self.finish(result).await);
        }

        tracker.advance(PipelineState::AnalyzingStructure)?;
        let structure = self.analyzer.analyze(&compliance.domain).await;

        tracker.advance(PipelineState::GeneratingCode)?;
        let effective = params
            .clone()
            .with_crawl_delay(self.effective_crawl_delay(params.crawl_delay_seconds, &compliance, &structure));
        let generated = match self.engine.generate(&structure, &effective) {
            Ok(generated) => generated,
            Err(e) => {
                perf.finish_with_error("Template rendering failed", &e);
                return Err(e);
            }
        };

        tracker.advance(PipelineState::Testing)?;
        let tests = self.framework.run(&generated, &structure, &compliance).await;

        let terminal = if compliance.is_compliant && tests.deployment_ready {
            PipelineState::DeploymentReady
        } else {
            PipelineState::NeedsReview
        };
        tracker.advance(terminal)?;
        let deployment_status = terminal
            .deployment_status()
            .ok_or_else(|| ForgeError::internal("terminal state without a deployment status"))?;

        perf.finish_with_status("Pipeline finished", deployment_status.as_str());

        let result = ScraperResult {
            run_id: run_id.to_string(),
            domain: compliance.domain.clone(),
            compliance,
            structure: Some(structure),
            generated: Some(generated),
            test_results: Some(tests),
            deployment_status,
            state: terminal,
            transitions: tracker.into_transitions(),
            timestamp: Utc::now(),
        };
        Ok(self.finish(result).await)
    }

    /// max(requested, robots) plus a bonus that grows with page complexity
    fn effective_crawl_delay(
        &self,
        requested: u64,
        compliance: &ComplianceValidationResult,
        structure: &SiteStructure,
    ) -> u64 {
        let bonus = complexity::delay_bonus_seconds(
            structure.complexity_score,
            self.config.analysis.complexity_delay_bonus_seconds,
        );
        requested.max(compliance.crawl_delay_seconds).saturating_add(bonus)
    }

    fn failure_result(&self, run_id: &str, domain: &str, error: ForgeError, operation: &str) -> ScraperResult {
        let violation = match error {
            ForgeError::Cancelled => "batch cancelled before this domain was launched".to_string(),
            error => {
                let context = ErrorContext::new(operation, "orchestrator")
                    .with_data("category", error.category())
                    .with_request_id(run_id);
                format!("pipeline failed: {}", ContextualError::new(error, context))
            }
        };
        let domain = normalize_domain(domain).unwrap_or_else(|_| domain.to_string());
        let compliance =
            ComplianceValidationResult::rejected(domain, violation, self.config.compliance.default_crawl_delay_seconds);

        let transition = StageTransition {
            from: PipelineState::Pending,
            to: PipelineState::RejectedCompliance,
            at: Utc::now(),
            elapsed_ms: 0,
        };
        ScraperResult::rejected(run_id, compliance, vec![transition])
    }

    /// Record a terminal result in history, audit and deployment
    async fn finish(&self, result: ScraperResult) -> ScraperResult {
        self.history
            .append(HistoryEntry {
                run_id: result.run_id.clone(),
                domain: result.domain.clone(),
                template_used: result.template_used().map(str::to_string),
                overall_score: result.overall_score(),
                deployment_status: result.deployment_status,
                timestamp: result.timestamp,
            })
            .await;

        let context = LogContext::new("orchestrator", "finish")
            .with_run_id(&result.run_id)
            .with_domain(&result.domain)
            .with_status(result.deployment_status.as_str());

        if let Err(e) = self.audit.record(&AuditRecord::from(&result)).await {
            log_warn!(context.clone().with_error_category(e.category()), format!("Audit record not written: {}", e));
        }

        if result.is_ready() {
            if let Err(e) = self.monitor.register(&result).await {
                log_warn!(context.clone().with_error_category(e.category()), format!("Deployment registration failed: {}", e));
            }
        }

        log_info!(context, "Pipeline reached a terminal state");
        result
    }
}

//! Multi-category automated testing of generated scrapers.
//!
//! Generated source is inspected statically with `syn` and its extraction
//! contract is dry-run against a synthetic listing page. Each category scores
//! the fraction of its checks that passed; the overall score is a fixed
//! weighted sum that gates deployment.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub mod categories;
pub mod dry_run;
pub mod inspect;

pub use categories::{CheckOutcome, TestCategory};

use crate::analysis::SiteStructure;
use crate::compliance::ComplianceValidationResult;
use crate::config::TestingConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::log_info;
use crate::logging::LogContext;
use crate::templates::GeneratedScraper;
use inspect::SourceFacts;

/// Minimum overall score for deployment
pub const DEFAULT_DEPLOYMENT_THRESHOLD: f64 = 0.80;

/// Tolerance applied when comparing scores against thresholds
pub const SCORE_EPSILON: f64 = 1e-9;

/// Category weights of the overall score. Must sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub compliance: f64,
    pub functionality: f64,
    pub code_quality: f64,
    pub error_handling: f64,
    pub performance: f64,
    pub data_quality: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            compliance: 0.25,
            functionality: 0.25,
            code_quality: 0.15,
            error_handling: 0.15,
            performance: 0.10,
            data_quality: 0.10,
        }
    }
}

impl ScoreWeights {
    pub fn weight(&self, category: TestCategory) -> f64 {
        match category {
            TestCategory::CodeQuality => self.code_quality,
            TestCategory::Compliance => self.compliance,
            TestCategory::Functionality => self.functionality,
            TestCategory::Performance => self.performance,
            TestCategory::DataQuality => self.data_quality,
            TestCategory::ErrorHandling => self.error_handling,
        }
    }

    pub fn validate(&self) -> ForgeResult<()> {
        if TestCategory::ALL.iter().any(|&c| self.weight(c) < 0.0) {
            return Err(ForgeError::config("testing.weights must not be negative"));
        }
        let total: f64 = TestCategory::ALL.iter().map(|&c| self.weight(c)).sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(ForgeError::config(format!("testing.weights must sum to 1, got {:.4}", total)));
        }
        Ok(())
    }
}

/// Per-category pass thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryThresholds {
    pub code_quality: f64,
    pub compliance: f64,
    pub functionality: f64,
    pub performance: f64,
    pub data_quality: f64,
    pub error_handling: f64,
}

impl Default for CategoryThresholds {
    fn default() -> Self {
        Self {
            code_quality: 0.75,
            compliance: 1.0,
            functionality: 1.0,
            performance: 0.66,
            data_quality: 0.75,
            error_handling: 0.75,
        }
    }
}

impl CategoryThresholds {
    pub fn threshold(&self, category: TestCategory) -> f64 {
        match category {
            TestCategory::CodeQuality => self.code_quality,
            TestCategory::Compliance => self.compliance,
            TestCategory::Functionality => self.functionality,
            TestCategory::Performance => self.performance,
            TestCategory::DataQuality => self.data_quality,
            TestCategory::ErrorHandling => self.error_handling,
        }
    }

    pub fn validate(&self) -> ForgeResult<()> {
        for category in TestCategory::ALL {
            if !(0.0..=1.0).contains(&self.threshold(category)) {
                return Err(ForgeError::config(format!(
                    "testing.category_thresholds.{} must be within [0, 1]",
                    category
                )));
            }
        }
        Ok(())
    }
}

/// One score in [0, 1] per category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub code_quality: f64,
    pub compliance: f64,
    pub functionality: f64,
    pub performance: f64,
    pub data_quality: f64,
    pub error_handling: f64,
}

impl CategoryScores {
    pub fn get(&self, category: TestCategory) -> f64 {
        match category {
            TestCategory::CodeQuality => self.code_quality,
            TestCategory::Compliance => self.compliance,
            TestCategory::Functionality => self.functionality,
            TestCategory::Performance => self.performance,
            TestCategory::DataQuality => self.data_quality,
            TestCategory::ErrorHandling => self.error_handling,
        }
    }

    pub fn set(&mut self, category: TestCategory, score: f64) {
        let slot = match category {
            TestCategory::CodeQuality => &mut self.code_quality,
            TestCategory::Compliance => &mut self.compliance,
            TestCategory::Functionality => &mut self.functionality,
            TestCategory::Performance => &mut self.performance,
            TestCategory::DataQuality => &mut self.data_quality,
            TestCategory::ErrorHandling => &mut self.error_handling,
        };
        *slot = score.clamp(0.0, 1.0);
    }

    /// Weighted sum, clamped to [0, 1]
    pub fn overall(&self, weights: &ScoreWeights) -> f64 {
        TestCategory::ALL
            .iter()
            .map(|&c| weights.weight(c) * self.get(c))
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }
}

pub fn is_deployment_ready(overall_score: f64, threshold: f64) -> bool {
    overall_score + SCORE_EPSILON >= threshold
}

/// Outcome of testing one generated scraper
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResults {
    pub category_scores: CategoryScores,
    pub overall_score: f64,
    pub deployment_ready: bool,
    /// Failed checks and categories below their threshold, in category order
    pub reasons: Vec<String>,
    pub failing_categories: Vec<TestCategory>,
    pub checks: Vec<(TestCategory, CheckOutcome)>,
}

/// Scores generated scrapers
#[derive(Debug, Clone)]
pub struct AutomatedTestingFramework {
    weights: ScoreWeights,
    deployment_threshold: f64,
    category_thresholds: CategoryThresholds,
}

impl Default for AutomatedTestingFramework {
    fn default() -> Self {
        Self::new(&TestingConfig::default())
    }
}

impl AutomatedTestingFramework {
    pub fn new(config: &TestingConfig) -> Self {
        Self {
            weights: config.weights.clone(),
            deployment_threshold: config.deployment_threshold,
            category_thresholds: config.category_thresholds.clone(),
        }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn deployment_threshold(&self) -> f64 {
        self.deployment_threshold
    }

    /// Test `generated`. Never fails; unparseable source scores 0 everywhere.
    #[instrument(skip_all, fields(component = "testing", domain = %generated.domain()))]
    pub async fn run(
        &self,
        generated: &GeneratedScraper,
        structure: &SiteStructure,
        compliance: &ComplianceValidationResult,
    ) -> TestResults {
        let facts = match SourceFacts::inspect(generated.source_text()) {
            Ok(facts) => facts,
            Err(e) => return self.unparseable(&e.to_string()),
        };
        let dry_run = dry_run::execute(&facts).await;
        debug!(
            "Dry run extracted {} record(s), {} write(s)",
            dry_run.records.len(),
            dry_run.writes
        );

        let checks_by_category = [
            (TestCategory::CodeQuality, categories::code_quality(&facts)),
            (TestCategory::Compliance, categories::compliance(&facts, generated, compliance)),
            (
                TestCategory::Functionality,
                categories::functionality(&facts, &dry_run, generated, structure),
            ),
            (TestCategory::Performance, categories::performance(&facts)),
            (TestCategory::DataQuality, categories::data_quality(&dry_run)),
            (TestCategory::ErrorHandling, categories::error_handling(&facts)),
        ];

        let mut scores = CategoryScores::default();
        for (category, checks) in &checks_by_category {
            scores.set(*category, categories::score(checks));
        }

        let checks = checks_by_category
            .into_iter()
            .flat_map(|(category, checks)| checks.into_iter().map(move |check| (category, check)))
            .collect();

        let results = self.assemble(scores, checks);
        let context = LogContext::new("testing", "run")
            .with_domain(generated.domain())
            .with_status(if results.deployment_ready { "ready" } else { "not_ready" })
            .with_field("overall_score", serde_json::json!(results.overall_score));
        log_info!(context, "Generated scraper tested");

        results
    }

    /// Score a set of category scores with this framework's weights and thresholds
    pub fn evaluate(&self, scores: CategoryScores) -> TestResults {
        self.assemble(scores, Vec::new())
    }

    fn unparseable(&self, message: &str) -> TestResults {
        let mut results = self.assemble(CategoryScores::default(), Vec::new());
        results
            .reasons
            .insert(0, format!("code_quality: source does not parse as Rust: {}", message));
        results
    }

    fn assemble(&self, scores: CategoryScores, checks: Vec<(TestCategory, CheckOutcome)>) -> TestResults {
        let overall_score = scores.overall(&self.weights);

        let mut reasons = Vec::new();
        let mut failing_categories = Vec::new();
        for category in TestCategory::ALL {
            reasons.extend(
                checks
                    .iter()
                    .filter(|(c, _)| *c == category)
                    .filter_map(|(_, check)| check.reason.as_ref())
                    .map(|reason| format!("{}: {}", category, reason)),
            );

            let score = scores.get(category);
            let threshold = self.category_thresholds.threshold(category);
            if score + SCORE_EPSILON < threshold {
                failing_categories.push(category);
                reasons.push(format!(
                    "{}: scored {:.2}, below its threshold of {:.2}",
                    category, score, threshold
                ));
            }
        }

        TestResults {
            deployment_ready: is_deployment_ready(overall_score, self.deployment_threshold),
            category_scores: scores,
            overall_score,
            reasons,
            failing_categories,
            checks,
        }
    }
}

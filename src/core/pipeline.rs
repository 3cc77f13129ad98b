use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::debug;

use crate::analysis::SiteStructure;
use crate::compliance::ComplianceValidationResult;
use crate::error::{ForgeError, ForgeResult};
use crate::templates::GeneratedScraper;
use crate::testing::TestResults;

/// Stage of one domain's generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Pending,
    ValidatingCompliance,
    RejectedCompliance,
    AnalyzingStructure,
    GeneratingCode,
    Testing,
    DeploymentReady,
    NeedsReview,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::ValidatingCompliance => "VALIDATING_COMPLIANCE",
            Self::RejectedCompliance => "REJECTED_COMPLIANCE",
            Self::AnalyzingStructure => "ANALYZING_STRUCTURE",
            Self::GeneratingCode => "GENERATING_CODE",
            Self::Testing => "TESTING",
            Self::DeploymentReady => "DEPLOYMENT_READY",
            Self::NeedsReview => "NEEDS_REVIEW",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RejectedCompliance | Self::DeploymentReady | Self::NeedsReview)
    }

    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Pending, ValidatingCompliance)
                | (Pending, RejectedCompliance)
                | (ValidatingCompliance, RejectedCompliance)
                | (ValidatingCompliance, AnalyzingStructure)
                | (AnalyzingStructure, GeneratingCode)
                | (GeneratingCode, Testing)
                | (Testing, DeploymentReady)
                | (Testing, NeedsReview)
        )
    }

    /// Status reported for a terminal state
    pub fn deployment_status(&self) -> Option<DeploymentStatus> {
        match self {
            Self::RejectedCompliance => Some(DeploymentStatus::RejectedCompliance),
            Self::DeploymentReady => Some(DeploymentStatus::Ready),
            Self::NeedsReview => Some(DeploymentStatus::NeedsReview),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final decision for a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    RejectedCompliance,
    NeedsReview,
    Ready,
}

impl DeploymentStatus {
    pub const ALL: [DeploymentStatus; 3] = [Self::RejectedCompliance, Self::NeedsReview, Self::Ready];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RejectedCompliance => "rejected_compliance",
            Self::NeedsReview => "needs_review",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTransition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub at: DateTime<Utc>,
    /// Time spent in `from`
    pub elapsed_ms: u64,
}

/// Validated state machine for one run
#[derive(Debug)]
pub struct PipelineTracker {
    state: PipelineState,
    entered_at: Instant,
    transitions: Vec<StageTransition>,
}

impl Default for PipelineTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineTracker {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Pending,
            entered_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn advance(&mut self, next: PipelineState) -> ForgeResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ForgeError::InvalidState {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        let elapsed_ms = self.entered_at.elapsed().as_millis() as u64;
        debug!("Pipeline {} -> {} after {}ms", self.state, next, elapsed_ms);
        self.transitions.push(StageTransition {
            from: self.state,
            to: next,
            at: Utc::now(),
            elapsed_ms,
        });
        self.state = next;
        self.entered_at = Instant::now();
        Ok(())
    }

    pub fn into_transitions(self) -> Vec<StageTransition> {
        self.transitions
    }
}

/// Everything known about one domain's generation run
#[derive(Debug, Clone, Serialize)]
pub struct ScraperResult {
    pub run_id: String,
    pub domain: String,
    pub compliance: ComplianceValidationResult,
    pub structure: Option<SiteStructure>,
    pub generated: Option<GeneratedScraper>,
    pub test_results: Option<TestResults>,
    pub deployment_status: DeploymentStatus,
    pub state: PipelineState,
    pub transitions: Vec<StageTransition>,
    pub timestamp: DateTime<Utc>,
}

impl ScraperResult {
    /// Rejected result with no downstream fields
    pub fn rejected(run_id: impl Into<String>, compliance: ComplianceValidationResult, transitions: Vec<StageTransition>) -> Self {
        Self {
            run_id: run_id.into(),
            domain: compliance.domain.clone(),
            compliance,
            structure: None,
            generated: None,
            test_results: None,
            deployment_status: DeploymentStatus::RejectedCompliance,
            state: PipelineState::RejectedCompliance,
            transitions,
            timestamp: Utc::now(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.deployment_status == DeploymentStatus::Ready
    }

    pub fn violations(&self) -> &[String] {
        &self.compliance.violations
    }

    pub fn template_used(&self) -> Option<&str> {
        self.generated.as_ref().map(|g| g.template_used())
    }

    pub fn overall_score(&self) -> Option<f64> {
        self.test_results.as_ref().map(|t| t.overall_score)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::core::pipeline::ScraperResult;
use crate::error::{ForgeError, ForgeResult};
use crate::log_info;
use crate::logging::LogContext;

/// Health of a registered scraper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentHealth {
    Registered,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub run_id: String,
    pub domain: String,
    pub template_used: String,
    pub content_hash: String,
    pub registered_at: DateTime<Utc>,
}

/// Where ready scrapers go after the pipeline approves them
#[async_trait]
pub trait DeploymentMonitor: Send + Sync {
    async fn register(&self, result: &ScraperResult) -> ForgeResult<DeploymentRecord>;

    async fn poll_health(&self, run_id: &str) -> DeploymentHealth;
}

/// Registry kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryDeploymentMonitor {
    deployments: DashMap<String, DeploymentRecord>,
}

impl InMemoryDeploymentMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered scrapers, oldest first
    pub fn registered(&self) -> Vec<DeploymentRecord> {
        let mut records: Vec<_> = self.deployments.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then_with(|| a.run_id.cmp(&b.run_id)));
        records
    }

    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }
}

#[async_trait]
impl DeploymentMonitor for InMemoryDeploymentMonitor {
    async fn register(&self, result: &ScraperResult) -> ForgeResult<DeploymentRecord> {
        if !result.is_ready() {
            return Err(ForgeError::invalid_input(format!(
                "{} is {} and cannot be deployed",
                result.domain, result.deployment_status
            )));
        }
        let generated = result
            .generated
            .as_ref()
            .ok_or_else(|| ForgeError::internal("ready result without generated source"))?;

        let record = DeploymentRecord {
            run_id: result.run_id.clone(),
            domain: result.domain.clone(),
            template_used: generated.template_used().to_string(),
            content_hash: generated.content_hash().to_string(),
            registered_at: Utc::now(),
        };
        self.deployments.insert(record.run_id.clone(), record.clone());

        let context = LogContext::new("monitoring", "register")
            .with_run_id(&record.run_id)
            .with_domain(&record.domain)
            .with_string_field("content_hash", &record.content_hash);
        log_info!(context, "Scraper registered for deployment");

        Ok(record)
    }

    async fn poll_health(&self, run_id: &str) -> DeploymentHealth {
        if self.deployments.contains_key(run_id) {
            DeploymentHealth::Registered
        } else {
            DeploymentHealth::Unknown
        }
    }
}

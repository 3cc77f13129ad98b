use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::pipeline::{DeploymentStatus, ScraperResult};
use crate::error::{ForgeError, ForgeResult};
use crate::testing::CategoryScores;

/// One terminal decision, as seen by auditors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub run_id: String,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
    pub decision: DeploymentStatus,
    pub category_scores: Option<CategoryScores>,
    pub violations: Vec<String>,
}

impl From<&ScraperResult> for AuditRecord {
    fn from(result: &ScraperResult) -> Self {
        Self {
            run_id: result.run_id.clone(),
            domain: result.domain.clone(),
            timestamp: result.timestamp,
            decision: result.deployment_status,
            category_scores: result.test_results.as_ref().map(|t| t.category_scores.clone()),
            violations: result.compliance.violations.clone(),
        }
    }
}

/// Receives exactly one record per terminal pipeline run
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> ForgeResult<()>;
}

/// Emits audit records as structured log events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> ForgeResult<()> {
        info!(
            target: "audit",
            run_id = %record.run_id,
            domain = %record.domain,
            decision = %record.decision,
            violations = ?record.violations,
            "Pipeline decision"
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file
#[derive(Debug)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fs_error(&self, err: std::io::Error) -> ForgeError {
        ForgeError::FileSystem {
            path: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl AuditSink for JsonLinesAuditSink {
    async fn record(&self, record: &AuditRecord) -> ForgeResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.fs_error(e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.fs_error(e))?;
        file.write_all(line.as_bytes()).await.map_err(|e| self.fs_error(e))?;
        file.flush().await.map_err(|e| self.fs_error(e))?;
        Ok(())
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> ForgeResult<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(domain: &str, decision: DeploymentStatus) -> AuditRecord {
        AuditRecord {
            run_id: "run-1".to_string(),
            domain: domain.to_string(),
            timestamp: Utc::now(),
            decision,
            category_scores: None,
            violations: vec!["robots.txt disallows / for ScraperForgeBot".to_string()],
        }
    }

    #[tokio::test]
    async fn test_json_lines_sink_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit").join("decisions.jsonl");
        let sink = JsonLinesAuditSink::new(&path);

        sink.record(&record("a.example", DeploymentStatus::RejectedCompliance)).await.unwrap();
        sink.record(&record("b.example", DeploymentStatus::Ready)).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<AuditRecord> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].domain, "a.example");
        assert_eq!(lines[1].decision, DeploymentStatus::Ready);
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        sink.record(&record("a.example", DeploymentStatus::NeedsReview)).await.unwrap();
        sink.record(&record("b.example", DeploymentStatus::Ready)).await.unwrap();
        TracingAuditSink.record(&record("c.example", DeploymentStatus::Ready)).await.unwrap();

        let domains: Vec<_> = sink.records().await.into_iter().map(|r| r.domain).collect();
        assert_eq!(domains, vec!["a.example", "b.example"]);
    }
}

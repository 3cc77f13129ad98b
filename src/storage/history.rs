use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::core::pipeline::DeploymentStatus;

/// One terminal pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub run_id: String,
    pub domain: String,
    pub template_used: Option<String>,
    pub overall_score: Option<f64>,
    pub deployment_status: DeploymentStatus,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate view over the history
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationStats {
    pub total_runs: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_template: BTreeMap<String, usize>,
    pub average_score: Option<f64>,
}

/// Insertion-ordered, append-only record of terminal runs. Repeated domains are kept.
#[derive(Debug, Default)]
pub struct GenerationHistory {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl GenerationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, entry: HistoryEntry) {
        self.entries.write().await.push(entry);
    }

    pub async fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn stats(&self) -> GenerationStats {
        let entries = self.entries.read().await;
        let mut stats = GenerationStats {
            total_runs: entries.len(),
            ..GenerationStats::default()
        };

        for status in DeploymentStatus::ALL {
            stats.by_status.insert(status.as_str().to_string(), 0);
        }

        let mut score_sum = 0.0;
        let mut scored = 0usize;
        for entry in entries.iter() {
            *stats
                .by_status
                .entry(entry.deployment_status.as_str().to_string())
                .or_insert(0) += 1;

            if let Some(template) = &entry.template_used {
                *stats.by_template.entry(template.clone()).or_insert(0) += 1;
            }

            if let Some(score) = entry.overall_score {
                score_sum += score;
                scored += 1;
            }
        }

        if scored > 0 {
            stats.average_score = Some(score_sum / scored as f64);
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(domain: &str, template: Option<&str>, score: Option<f64>, status: DeploymentStatus) -> HistoryEntry {
        HistoryEntry {
            run_id: uuid::Uuid::new_v4().to_string(),
            domain: domain.to_string(),
            template_used: template.map(str::to_string),
            overall_score: score,
            deployment_status: status,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_history_keeps_order_and_duplicates() {
        let history = GenerationHistory::new();
        history.append(entry("a.com", Some("wordpress"), Some(0.9), DeploymentStatus::Ready)).await;
        history.append(entry("b.com", None, None, DeploymentStatus::RejectedCompliance)).await;
        history.append(entry("a.com", Some("wordpress"), Some(0.7), DeploymentStatus::NeedsReview)).await;

        let snapshot = history.snapshot().await;
        let domains: Vec<_> = snapshot.iter().map(|e| e.domain.as_str()).collect();
        assert_eq!(domains, vec!["a.com", "b.com", "a.com"]);
    }

    #[tokio::test]
    async fn test_stats_counts_by_status_and_template() {
        let history = GenerationHistory::new();
        history.append(entry("a.com", Some("wordpress"), Some(0.9), DeploymentStatus::Ready)).await;
        history.append(entry("b.com", Some("generic"), Some(0.7), DeploymentStatus::NeedsReview)).await;
        history.append(entry("c.com", None, None, DeploymentStatus::RejectedCompliance)).await;

        let stats = history.stats().await;
        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.by_status["ready"], 1);
        assert_eq!(stats.by_status["needs_review"], 1);
        assert_eq!(stats.by_status["rejected_compliance"], 1);
        assert_eq!(stats.by_template["wordpress"], 1);
        assert_eq!(stats.by_template.len(), 2);
        assert!((stats.average_score.unwrap() - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_history_stats() {
        let stats = GenerationHistory::new().stats().await;
        assert_eq!(stats.total_runs, 0);
        assert_eq!(stats.by_status.len(), 3);
        assert!(stats.average_score.is_none());
    }
}

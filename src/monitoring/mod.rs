//! Outbound boundaries for terminal pipeline results: audit records and
//! deployment registration.

pub mod audit;
pub mod deployment;

pub use audit::{AuditRecord, AuditSink, JsonLinesAuditSink, MemoryAuditSink, TracingAuditSink};
pub use deployment::{DeploymentHealth, DeploymentMonitor, DeploymentRecord, InMemoryDeploymentMonitor};

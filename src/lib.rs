//! Scraper Forge - compliance-gated generation of news scraper modules
//!
//! This library provides the scraper-generation pipeline:
//! - Compliance validation (robots.txt, legal pages, terms of service)
//! - Site-structure analysis through a headless-browser capability
//! - Deterministic template-based code generation
//! - Multi-category automated testing that gates deployment
//! - Orchestration with per-domain failure isolation and batch mode

pub mod analysis;
pub mod compliance;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod monitoring;
pub mod net;
pub mod runtime;
pub mod storage;
pub mod templates;
pub mod testing;
pub mod utils;

/// Token matched against robots.txt `User-agent` groups
pub const AGENT_TOKEN: &str = "ScraperForgeBot";

/// User agent sent by the pipeline and embedded in every generated scraper
pub const IDENTIFYING_USER_AGENT: &str =
    "ScraperForgeBot/1.0 (+automated news indexing; honours robots.txt)";

/// Legal basis attached to every compliance verdict
pub const FAIR_USE_BASIS: &str =
    "Fair use: headline, link and short summary only, with attribution to the source";

// Re-export main types for convenience
pub use crate::config::AppConfig;
pub use crate::core::ScraperGenerator;
pub use crate::error::{ContextualError, ForgeError, ForgeResult};

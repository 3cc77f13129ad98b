//! Deterministic rendering of scraper modules from embedded templates.
//!
//! A template is an ordered list of fragments from [`TemplateAssets`]. Every
//! `{{SLOT}}` in a fragment is replaced with a Rust literal, so rendering the
//! same structure with the same parameters always yields identical bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

pub mod assets;
pub mod registry;

pub use assets::{EmbeddedAssets, InMemoryAssets, TemplateAssets};
pub use registry::{SelectorSet, TemplateDefinition, TemplateInfo};

use crate::analysis::SiteStructure;
use crate::config::GenerationConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::{FAIR_USE_BASIS, IDENTIFYING_USER_AGENT};

const MAX_ARTICLES_LIMIT: usize = 500;

/// Caller-controlled generation knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_articles: usize,
    pub crawl_delay_seconds: u64,
    pub language: String,
    /// Registry entry to use instead of the detected CMS
    #[serde(default)]
    pub template_override: Option<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default(), 2)
    }
}

impl GenerationParams {
    pub fn from_config(config: &GenerationConfig, crawl_delay_seconds: u64) -> Self {
        Self {
            max_articles: config.default_max_articles,
            crawl_delay_seconds,
            language: config.default_language.clone(),
            template_override: None,
        }
    }

    pub fn with_crawl_delay(mut self, seconds: u64) -> Self {
        self.crawl_delay_seconds = seconds;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template_override = Some(template.into());
        self
    }

    pub fn validate(&self) -> ForgeResult<()> {
        if self.max_articles == 0 || self.max_articles > MAX_ARTICLES_LIMIT {
            return Err(ForgeError::invalid_input(format!(
                "max_articles must be between 1 and {}, got {}",
                MAX_ARTICLES_LIMIT, self.max_articles
            )));
        }

        let language_ok = (2..=8).contains(&self.language.len())
            && self.language.chars().all(|c| c.is_ascii_alphabetic() || c == '-');
        if !language_ok {
            return Err(ForgeError::invalid_input(format!(
                "language must be a short language tag, got '{}'",
                self.language
            )));
        }

        Ok(())
    }
}

/// Rendered scraper module. Read-only once produced.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedScraper {
    domain: String,
    source_text: String,
    template_used: String,
    selectors: SelectorSet,
    params: GenerationParams,
    char_count: usize,
    line_count: usize,
    content_hash: String,
    generated_at: DateTime<Utc>,
}

impl GeneratedScraper {
    fn new(domain: &str, source_text: String, template_used: &str, selectors: SelectorSet, params: GenerationParams) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source_text.as_bytes());
        let content_hash = format!("{:x}", hasher.finalize());

        Self {
            domain: domain.to_string(),
            char_count: source_text.chars().count(),
            line_count: source_text.lines().count(),
            source_text,
            template_used: template_used.to_string(),
            selectors,
            params,
            content_hash,
            generated_at: Utc::now(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn template_used(&self) -> &str {
        &self.template_used
    }

    pub fn selectors(&self) -> &SelectorSet {
        &self.selectors
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn char_count(&self) -> usize {
        self.char_count
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// SHA-256 of the source text, lowercase hex
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}

/// Renders scraper modules from the template registry
pub struct ScraperTemplateEngine {
    assets: Arc<dyn TemplateAssets>,
    scheme: String,
    request_timeout_seconds: u64,
}

impl ScraperTemplateEngine {
    pub fn new(assets: Arc<dyn TemplateAssets>, scheme: impl Into<String>, request_timeout_seconds: u64) -> Self {
        Self {
            assets,
            scheme: scheme.into(),
            request_timeout_seconds,
        }
    }

    /// Render a scraper for `structure`.
    ///
    /// Fails only on bad parameters or when a template fragment is missing or
    /// leaves a slot unfilled.
    #[instrument(skip_all, fields(component = "templates", domain = %structure.domain))]
    pub fn generate(&self, structure: &SiteStructure, params: &GenerationParams) -> ForgeResult<GeneratedScraper> {
        params.validate()?;

        let requested = params
            .template_override
            .as_deref()
            .unwrap_or_else(|| structure.cms_type.as_str());
        let definition = registry::resolve(requested);
        let selectors = SelectorSet::resolve(&structure.detected_selectors, &definition.default_selectors());
        debug!("Rendering template {} (requested {})", definition.name, requested);

        let slots = self.slot_values(structure, params, definition, &selectors);

        let mut source_text = String::new();
        for asset in definition.assets {
            let body = self.assets.get(asset).ok_or_else(|| {
                ForgeError::template(definition.name, format!("missing template asset '{}'", asset))
            })?;
            source_text.push_str(&render_fragment(definition.name, asset, &body, &slots)?);
        }

        Ok(GeneratedScraper::new(
            &structure.domain,
            source_text,
            definition.name,
            selectors,
            params.clone(),
        ))
    }

    pub fn list_templates(&self) -> Vec<TemplateInfo> {
        registry::TEMPLATES.iter().map(TemplateInfo::from).collect()
    }

    /// Every fragment referenced by the registry that cannot be loaded
    pub fn missing_assets(&self) -> Vec<String> {
        let mut missing: Vec<String> = registry::TEMPLATES
            .iter()
            .flat_map(|definition| definition.assets.iter())
            .filter(|asset| self.assets.get(asset).is_none())
            .map(|asset| asset.to_string())
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Fails with a template error naming the first missing fragment
    pub fn verify_assets(&self) -> ForgeResult<()> {
        match self.missing_assets().first() {
            Some(asset) => Err(ForgeError::template("registry", format!("missing template asset '{}'", asset))),
            None => Ok(()),
        }
    }

    fn slot_values(
        &self,
        structure: &SiteStructure,
        params: &GenerationParams,
        definition: &TemplateDefinition,
        selectors: &SelectorSet,
    ) -> BTreeMap<&'static str, String> {
        let base_url = format!("{}://{}/", self.scheme, structure.domain);

        BTreeMap::from([
            ("SOURCE_DOMAIN", literal(&structure.domain)),
            ("BASE_URL", literal(&base_url)),
            ("TEMPLATE", literal(definition.name)),
            ("LANGUAGE", literal(&params.language)),
            ("MAX_ARTICLES", params.max_articles.to_string()),
            ("USER_AGENT", literal(IDENTIFYING_USER_AGENT)),
            ("CRAWL_DELAY_SECONDS", params.crawl_delay_seconds.to_string()),
            ("REQUEST_TIMEOUT_SECONDS", self.request_timeout_seconds.to_string()),
            ("FAIR_USE_BASIS", literal(FAIR_USE_BASIS)),
            ("ARTICLE_SELECTOR", literal(&selectors.article)),
            ("TITLE_SELECTOR", literal(&selectors.title)),
            ("LINK_SELECTOR", literal(&selectors.link)),
            ("DATE_SELECTOR", literal(&selectors.date)),
            ("SUMMARY_SELECTOR", literal(&selectors.summary)),
            ("DATE_FORMAT_HINT", literal(definition.date_format_hint)),
        ])
    }
}

/// Rust string literal for `value`
fn literal(value: &str) -> String {
    format!("{:?}", value)
}

fn render_fragment(
    template: &str,
    asset: &str,
    body: &str,
    slots: &BTreeMap<&'static str, String>,
) -> ForgeResult<String> {
    let mut rendered = body.to_string();
    for (slot, value) in slots {
        rendered = rendered.replace(&format!("{{{{{}}}}}", slot), value);
    }

    if let Some(start) = rendered.find("{{") {
        let rest = &rendered[start + 2..];
        let slot = rest.split("}}").next().unwrap_or(rest);
        return Err(ForgeError::template(
            template,
            format!("fragment '{}' has unfilled slot '{}'", asset, slot),
        ));
    }

    Ok(rendered)
}

use serde::Serialize;

use crate::analysis::DetectedSelectors;

/// Selector slots with every value filled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorSet {
    pub article: String,
    pub title: String,
    pub link: String,
    pub date: String,
    pub summary: String,
}

impl SelectorSet {
    /// Detected slots where present, template defaults elsewhere.
    ///
    /// Without a detected container every slot comes from the defaults, since
    /// slot selectors are only meaningful relative to their container.
    pub fn resolve(detected: &DetectedSelectors, defaults: &SelectorSet) -> Self {
        let Some(article) = detected.article.clone() else {
            return defaults.clone();
        };

        Self {
            article,
            title: detected.title.clone().unwrap_or_else(|| defaults.title.clone()),
            link: detected.link.clone().unwrap_or_else(|| defaults.link.clone()),
            date: detected.date.clone().unwrap_or_else(|| defaults.date.clone()),
            summary: detected.summary.clone().unwrap_or_else(|| defaults.summary.clone()),
        }
    }
}

/// Registry entry
#[derive(Debug, Clone)]
pub struct TemplateDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub defaults: [&'static str; 5],
    pub date_format_hint: &'static str,
    pub assets: &'static [&'static str],
}

impl TemplateDefinition {
    pub fn default_selectors(&self) -> SelectorSet {
        let [article, title, link, date, summary] = self.defaults;
        SelectorSet {
            article: article.to_string(),
            title: title.to_string(),
            link: link.to_string(),
            date: date.to_string(),
            summary: summary.to_string(),
        }
    }
}

/// Template summary for listings
#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    pub name: String,
    pub description: String,
    pub default_selectors: SelectorSet,
    pub assets: Vec<String>,
}

impl From<&TemplateDefinition> for TemplateInfo {
    fn from(definition: &TemplateDefinition) -> Self {
        Self {
            name: definition.name.to_string(),
            description: definition.description.to_string(),
            default_selectors: definition.default_selectors(),
            assets: definition.assets.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Asset fragments concatenated in this order
pub const STANDARD_ASSETS: &[&str] = &["header", "compliance", "selectors", "extraction", "entrypoint"];

pub const FALLBACK_TEMPLATE: &str = "generic";

pub const TEMPLATES: &[TemplateDefinition] = &[
    TemplateDefinition {
        name: "wordpress",
        description: "WordPress themes with entry-title headings and entry-summary excerpts",
        defaults: ["article.post", "h2.entry-title", "h2.entry-title a", "time.entry-date", "div.entry-summary"],
        date_format_hint: "%Y-%m-%dT%H:%M:%S%:z",
        assets: STANDARD_ASSETS,
    },
    TemplateDefinition {
        name: "drupal",
        description: "Drupal views listings",
        defaults: ["div.views-row", "span.field-content", "span.field-content a", "time", "div.views-field-body"],
        date_format_hint: "%Y-%m-%dT%H:%M:%SZ",
        assets: STANDARD_ASSETS,
    },
    TemplateDefinition {
        name: "custom_medical",
        description: "Journal and clinical news portals with study listings",
        defaults: ["div.study", "h3.study-title", "h3.study-title a", "span.pub-date", "div.abstract"],
        date_format_hint: "%d %B %Y",
        assets: STANDARD_ASSETS,
    },
    TemplateDefinition {
        name: "news_site",
        description: "Newsroom front pages with headline and standfirst blocks",
        defaults: ["div.news-item", "h3.headline", "h3.headline a", "time", "p.standfirst"],
        date_format_hint: "%Y-%m-%d",
        assets: STANDARD_ASSETS,
    },
    TemplateDefinition {
        name: "generic_article",
        description: "Semantic article markup with linked headings",
        defaults: ["article", "h2", "h2 a", "time", "p"],
        date_format_hint: "%Y-%m-%d",
        assets: STANDARD_ASSETS,
    },
    TemplateDefinition {
        name: "generic",
        description: "Fallback for unknown or unclassified sites",
        defaults: ["article", "h2", "a", "time", "p"],
        date_format_hint: "%Y-%m-%d",
        assets: STANDARD_ASSETS,
    },
];

/// Exact-name lookup; anything unmatched resolves to the fallback
pub fn resolve(name: &str) -> &'static TemplateDefinition {
    TEMPLATES
        .iter()
        .find(|t| t.name == name)
        .or_else(|| TEMPLATES.iter().find(|t| t.name == FALLBACK_TEMPLATE))
        .unwrap_or(&TEMPLATES[TEMPLATES.len() - 1])
}

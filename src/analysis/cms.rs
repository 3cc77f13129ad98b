use serde::{Deserialize, Serialize};
use std::fmt;

use super::signals::PageSignals;

/// Content-management system classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmsType {
    Wordpress,
    Drupal,
    CustomMedical,
    Generic,
    Unknown,
}

impl CmsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wordpress => "wordpress",
            Self::Drupal => "drupal",
            Self::CustomMedical => "custom_medical",
            Self::Generic => "generic",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CmsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type CmsPredicate = fn(&PageSignals) -> bool;

/// Checked in order; the first predicate that holds decides
const CMS_CHECKS: &[(CmsType, CmsPredicate)] = &[
    (CmsType::Wordpress, is_wordpress),
    (CmsType::Drupal, is_drupal),
    (CmsType::CustomMedical, is_custom_medical),
];

fn is_wordpress(signals: &PageSignals) -> bool {
    signals.generator_contains("wordpress")
        || signals.markup_contains_any(&["/wp-content/", "/wp-includes/", "wp-json"])
}

fn is_drupal(signals: &PageSignals) -> bool {
    signals.generator_contains("drupal")
        || signals.markup_contains_any(&["/sites/default/files/", "data-drupal-", "drupal-settings-json"])
}

fn is_custom_medical(signals: &PageSignals) -> bool {
    signals.markup_contains_any(&[
        "pubmed.ncbi.nlm.nih.gov",
        "doi.org/",
        "clinicaltrials.gov",
        "citation_doi",
        "citation_journal_title",
        "medical-disclaimer",
    ])
}

/// Classify the page; never yields `Unknown`, which is reserved for load failures
pub fn detect(signals: &PageSignals) -> CmsType {
    CMS_CHECKS
        .iter()
        .find(|(_, predicate)| predicate(signals))
        .map(|(cms, _)| *cms)
        .unwrap_or(CmsType::Generic)
}

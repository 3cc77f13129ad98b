//! Check lists behind each scoring category.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::dry_run::DryRunReport;
use super::inspect::SourceFacts;
use crate::analysis::SiteStructure;
use crate::compliance::ComplianceValidationResult;
use crate::runtime;
use crate::templates::GeneratedScraper;
use crate::IDENTIFYING_USER_AGENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    CodeQuality,
    Compliance,
    Functionality,
    Performance,
    DataQuality,
    ErrorHandling,
}

impl TestCategory {
    pub const ALL: [TestCategory; 6] = [
        Self::CodeQuality,
        Self::Compliance,
        Self::Functionality,
        Self::Performance,
        Self::DataQuality,
        Self::ErrorHandling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeQuality => "code_quality",
            Self::Compliance => "compliance",
            Self::Functionality => "functionality",
            Self::Performance => "performance",
            Self::DataQuality => "data_quality",
            Self::ErrorHandling => "error_handling",
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one check; `reason` is set when it failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub reason: Option<String>,
}

impl CheckOutcome {
    fn expect(name: &'static str, passed: bool, reason: impl FnOnce() -> String) -> Self {
        Self {
            name,
            passed,
            reason: if passed { None } else { Some(reason()) },
        }
    }
}

/// Fraction of passing checks, 0 for an empty list
pub fn score(checks: &[CheckOutcome]) -> f64 {
    if checks.is_empty() {
        return 0.0;
    }
    checks.iter().filter(|c| c.passed).count() as f64 / checks.len() as f64
}

pub fn code_quality(facts: &SourceFacts) -> Vec<CheckOutcome> {
    let run = facts.function("run");
    let undelayed = facts.loops().filter(|l| l.is_unbounded() && !l.delayed).count();

    vec![
        CheckOutcome::expect("parses", true, String::new),
        CheckOutcome::expect("entry_point", run.is_some_and(|f| f.is_pub && f.is_async), || {
            "entry point `pub async fn run` is missing".to_string()
        }),
        CheckOutcome::expect("runtime_imports", facts.imports_runtime, || {
            "does not import the scraper_forge::runtime contract".to_string()
        }),
        CheckOutcome::expect("no_unsafe", !facts.has_unsafe, || "contains unsafe code".to_string()),
        CheckOutcome::expect("no_process_spawning", !facts.spawns_process, || {
            "spawns or references external processes".to_string()
        }),
        CheckOutcome::expect("loops_delayed", undelayed == 0, || {
            format!("{} unbounded loop(s) without a delay call", undelayed)
        }),
    ]
}

pub fn compliance(
    facts: &SourceFacts,
    generated: &GeneratedScraper,
    verdict: &ComplianceValidationResult,
) -> Vec<CheckOutcome> {
    let expected_delay = generated.params().crawl_delay_seconds;
    let delay = facts.const_int("CRAWL_DELAY_SECONDS");
    let user_agent = facts.const_str("USER_AGENT");
    let run = facts.function("run");

    let agent_sent = run.is_some_and(|f| {
        !f.fetch_calls.is_empty() && f.fetch_calls.iter().all(|c| c.args.idents.contains("USER_AGENT"))
    });
    let delay_helper = facts.function("enforce_min_delay").is_some_and(|f| f.calls("sleep"));
    let delay_enforced = run.is_some_and(|f| match (f.first_call("enforce_min_delay"), f.first_call("fetch")) {
        (Some(delay_at), Some(fetch_at)) => delay_at < fetch_at,
        _ => false,
    });
    let full_text = facts.string_literals.iter().any(|s| s == "full_text");

    vec![
        CheckOutcome::expect("exact_crawl_delay", delay == Some(expected_delay), || {
            format!("crawl delay is {:?}, expected {}s", delay, expected_delay)
        }),
        CheckOutcome::expect("robots_minimum", delay.is_some_and(|d| d >= verdict.crawl_delay_seconds), || {
            format!("crawl delay is below the robots.txt minimum of {}s", verdict.crawl_delay_seconds)
        }),
        CheckOutcome::expect(
            "identifying_user_agent",
            user_agent == Some(IDENTIFYING_USER_AGENT) && agent_sent,
            || "requests do not send the identifying user agent".to_string(),
        ),
        CheckOutcome::expect("delay_enforcement", delay_helper && delay_enforced, || {
            "minimum delay is not enforced before fetching".to_string()
        }),
        CheckOutcome::expect("summary_only", !full_text, || {
            "content type is set to \"full_text\"".to_string()
        }),
    ]
}

const FIELD_SELECTORS: [(&str, &str); 4] = [
    ("title", "TITLE_SELECTOR"),
    ("url", "LINK_SELECTOR"),
    ("published", "DATE_SELECTOR"),
    ("summary", "SUMMARY_SELECTOR"),
];

pub fn functionality(
    facts: &SourceFacts,
    dry_run: &DryRunReport,
    generated: &GeneratedScraper,
    structure: &SiteStructure,
) -> Vec<CheckOutcome> {
    let complete = dry_run
        .records
        .iter()
        .filter(|r| !r.title.is_empty() && is_absolute(&r.url))
        .count();

    let selectors = generated.selectors();
    let consts_agree = facts.const_str("ARTICLE_SELECTOR") == Some(selectors.article.as_str())
        && facts.const_str("TITLE_SELECTOR") == Some(selectors.title.as_str())
        && facts.const_str("LINK_SELECTOR") == Some(selectors.link.as_str())
        && facts.const_str("DATE_SELECTOR") == Some(selectors.date.as_str())
        && facts.const_str("SUMMARY_SELECTOR") == Some(selectors.summary.as_str());
    let extract = facts.function("extract_records");
    let wired = extract.is_some_and(|f| {
        f.select_args.first().map(String::as_str) == Some("ARTICLE_SELECTOR")
            && FIELD_SELECTORS
                .iter()
                .all(|(field, name)| f.field_selector(field) == Some(*name))
    });
    let follows_analysis = structure
        .detected_selectors
        .article
        .as_deref()
        .map_or(true, |detected| detected == selectors.article);

    vec![
        CheckOutcome::expect("fixture", dry_run.fixture_error.is_none(), || {
            format!(
                "no fixture could be built: {}",
                dry_run.fixture_error.as_deref().unwrap_or_default()
            )
        }),
        CheckOutcome::expect("records_extracted", complete > 0, || {
            "dry run produced no record with a title and an absolute url".to_string()
        }),
        CheckOutcome::expect("duplicate_hook", dry_run.duplicate_checks > 0, || {
            "duplicate detection was never consulted".to_string()
        }),
        CheckOutcome::expect("storage_hook", dry_run.writes > 0 && dry_run.commits > 0, || {
            "records were not written and committed to storage".to_string()
        }),
        CheckOutcome::expect("selectors_match_analysis", consts_agree && wired && follows_analysis, || {
            if wired {
                "selector constants disagree with the analyzed structure".to_string()
            } else {
                "record fields are not read through their selector constants".to_string()
            }
        }),
    ]
}

pub fn performance(facts: &SourceFacts) -> Vec<CheckOutcome> {
    let bounded = facts
        .function("extract_records")
        .is_some_and(|f| f.take_args.iter().any(|a| a.idents.contains("MAX_ARTICLES")));
    let fetches: Vec<_> = facts.fetch_calls().collect();
    let timeouts = !fetches.is_empty() && fetches.iter().all(|c| c.arg_count >= 3 && c.args.calls("from_secs"));
    let nested = facts.loops().filter(|l| l.is_unbounded() && l.nested_in_unbounded).count();

    vec![
        CheckOutcome::expect("bounded_iteration", bounded, || {
            "article iteration is not bounded by MAX_ARTICLES".to_string()
        }),
        CheckOutcome::expect("network_timeouts", timeouts, || {
            "fetch calls do not carry an explicit timeout".to_string()
        }),
        CheckOutcome::expect("no_nested_retries", nested == 0, || {
            format!("{} nested unbounded retry loop(s)", nested)
        }),
    ]
}

pub fn data_quality(dry_run: &DryRunReport) -> Vec<CheckOutcome> {
    let records = &dry_run.records;
    let has_records = !records.is_empty();
    let clean = |value: &str| !value.is_empty() && runtime::sanitize_text(value) == value;

    let titles_clean = has_records && records.iter().all(|r| clean(&r.title));
    let extras_clean = has_records
        && records
            .iter()
            .all(|r| r.published.as_deref().map_or(true, clean) && r.summary.as_deref().map_or(true, clean));
    let urls_absolute = has_records && records.iter().all(|r| is_absolute(&r.url));
    let duplicate_filtered = has_records
        && dry_run
            .seeded_duplicate
            .as_deref()
            .is_some_and(|dup| records.iter().all(|r| r.url != dup));

    vec![
        CheckOutcome::expect("titles_sanitized", titles_clean, || {
            "titles keep control characters or unnormalized whitespace".to_string()
        }),
        CheckOutcome::expect("fields_sanitized", extras_clean, || {
            "dates or summaries keep control characters or unnormalized whitespace".to_string()
        }),
        CheckOutcome::expect("urls_absolute", urls_absolute, || {
            "relative urls are not resolved against the source".to_string()
        }),
        CheckOutcome::expect("duplicates_skipped", duplicate_filtered, || {
            "an already stored article was emitted again".to_string()
        }),
    ]
}

pub fn error_handling(facts: &SourceFacts) -> Vec<CheckOutcome> {
    let run = facts.function("run");
    let fetches: Vec<_> = facts.fetch_calls().collect();

    let guarded = !fetches.is_empty() && fetches.iter().all(|c| c.guarded);
    let no_try = fetches.iter().all(|c| !c.under_try);
    let no_panics = run.is_some_and(|f| f.panicking_calls == 0);
    let rollback = run.is_some_and(|f| f.rollbacks_on_err > 0);

    vec![
        CheckOutcome::expect("fetch_guarded", guarded, || {
            "fetch failures are not handled with match or if let".to_string()
        }),
        CheckOutcome::expect("no_try_on_fetch", no_try, || {
            "fetch errors are propagated with `?` out of the entry point".to_string()
        }),
        CheckOutcome::expect("no_panics", no_panics, || {
            "entry point calls unwrap or expect".to_string()
        }),
        CheckOutcome::expect("rollback_on_failure", rollback, || {
            "no failure path rolls back the storage batch".to_string()
        }),
    ]
}

fn is_absolute(url: &str) -> bool {
    url::Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_fraction_passed() {
        let checks = vec![
            CheckOutcome::expect("a", true, String::new),
            CheckOutcome::expect("b", false, || "b failed".to_string()),
            CheckOutcome::expect("c", true, String::new),
        ];
        assert!((score(&checks) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(checks[1].reason.as_deref(), Some("b failed"));
        assert_eq!(score(&[]), 0.0);
    }

    #[test]
    fn test_loop_without_delay_fails_code_quality() {
        let facts = SourceFacts::inspect(
            r#"
            use scraper_forge::runtime::SourceFetcher;
            pub async fn run() { loop { poll().await; } }
            "#,
        )
        .unwrap();
        let checks = code_quality(&facts);
        let failed: Vec<_> = checks.iter().filter(|c| !c.passed).map(|c| c.name).collect();
        assert_eq!(failed, vec!["loops_delayed"]);
    }

    #[test]
    fn test_unguarded_fetch_fails_error_handling() {
        let facts = SourceFacts::inspect(
            r#"
            pub async fn run(f: &F) -> Result<(), E> {
                let doc = f.fetch(BASE_URL, USER_AGENT, Duration::from_secs(5)).await.unwrap();
                Ok(())
            }
            "#,
        )
        .unwrap();
        let checks = error_handling(&facts);
        assert!(checks.iter().all(|c| !c.passed || c.name == "no_try_on_fetch"));
        assert_eq!(score(&checks), 0.25);
    }
}

use chrono::Utc;
use std::sync::Arc;

use scraper_forge::analysis::{CmsType, DetectedSelectors, SiteStructure};
use scraper_forge::compliance::ComplianceValidationResult;
use scraper_forge::config::TestingConfig;
use scraper_forge::templates::{
    EmbeddedAssets, GeneratedScraper, GenerationParams, InMemoryAssets, ScraperTemplateEngine, TemplateAssets,
};
use scraper_forge::testing::{AutomatedTestingFramework, CategoryScores, ScoreWeights, TestCategory, TestResults};

fn blog_structure(cms_type: CmsType) -> SiteStructure {
    SiteStructure {
        domain: "example-blog.com".to_string(),
        cms_type,
        navigation: vec!["Home".to_string(), "News".to_string()],
        detected_selectors: DetectedSelectors::default(),
        complexity_score: 0.2,
        fetched_at: Utc::now(),
        load_error: None,
    }
}

fn compliant(crawl_delay_seconds: u64) -> ComplianceValidationResult {
    let mut verdict = ComplianceValidationResult::rejected("example-blog.com", "placeholder", crawl_delay_seconds);
    verdict.is_compliant = true;
    verdict.robots_allowed = true;
    verdict.violations.clear();
    verdict
}

fn render_with(assets: InMemoryAssets) -> GeneratedScraper {
    ScraperTemplateEngine::new(Arc::new(assets), "https", 15)
        .generate(&blog_structure(CmsType::Wordpress), &GenerationParams::default())
        .unwrap()
}

/// Embedded fragment `name` with `needle` replaced; panics if the needle is absent
fn mutated(name: &str, needle: &str, replacement: &str) -> InMemoryAssets {
    let body = EmbeddedAssets.get(name).unwrap();
    assert!(body.contains(needle), "fragment {} no longer contains {:?}", name, needle);
    InMemoryAssets::embedded_copy().with(name, body.replacen(needle, replacement, 1))
}

async fn score(generated: &GeneratedScraper) -> TestResults {
    AutomatedTestingFramework::default()
        .run(generated, &blog_structure(CmsType::Wordpress), &compliant(2))
        .await
}

fn has_reason(results: &TestResults, reason: &str) -> bool {
    results.reasons.iter().any(|r| r == reason)
}

#[tokio::test]
async fn test_unmodified_scraper_scores_full_marks() {
    let results = score(&render_with(InMemoryAssets::embedded_copy())).await;

    assert!((results.overall_score - 1.0).abs() < 1e-9, "reasons: {:?}", results.reasons);
    assert!(results.deployment_ready);
    assert!(results.reasons.is_empty());
    assert!(results.failing_categories.is_empty());
    assert_eq!(results.checks.len(), 27);
}

#[tokio::test]
async fn test_every_registry_template_is_deployable() {
    let engine = ScraperTemplateEngine::new(Arc::new(EmbeddedAssets), "https", 15);
    let framework = AutomatedTestingFramework::default();

    for info in engine.list_templates() {
        let params = GenerationParams::default().with_template(info.name.clone());
        let structure = blog_structure(CmsType::Unknown);
        let generated = engine.generate(&structure, &params).unwrap();
        assert_eq!(generated.template_used(), info.name);

        let results = framework.run(&generated, &structure, &compliant(2)).await;
        assert!(
            results.deployment_ready,
            "{} scored {}: {:?}",
            info.name, results.overall_score, results.reasons
        );
    }
}

#[tokio::test]
async fn test_overall_score_recomputes_from_weights() {
    let generated = render_with(mutated("compliance", "{{CRAWL_DELAY_SECONDS}}", "0"));
    let results = score(&generated).await;

    let weights = ScoreWeights::default();
    let recomputed: f64 = TestCategory::ALL
        .iter()
        .map(|c| weights.weight(*c) * results.category_scores.get(*c))
        .sum();
    assert!((results.overall_score - recomputed).abs() < 1e-12);
    assert!((results.overall_score - results.category_scores.overall(&weights)).abs() < 1e-12);
}

#[tokio::test]
async fn test_wrong_crawl_delay_fails_compliance_checks() {
    let results = score(&render_with(mutated("compliance", "{{CRAWL_DELAY_SECONDS}}", "0"))).await;

    assert!((results.category_scores.compliance - 0.6).abs() < 1e-9);
    assert!((results.overall_score - 0.9).abs() < 1e-9);
    assert!(has_reason(&results, "compliance: crawl delay is Some(0), expected 2s"));
    assert!(has_reason(&results, "compliance: crawl delay is below the robots.txt minimum of 2s"));
    assert_eq!(results.failing_categories, vec![TestCategory::Compliance]);
}

#[tokio::test]
async fn test_missing_delay_enforcement_is_reported() {
    let generated = render_with(mutated("entrypoint", "enforce_min_delay(&mut last_request).await;", ""));
    let results = score(&generated).await;

    assert!(results.overall_score < 1.0);
    assert!(has_reason(&results, "compliance: minimum delay is not enforced before fetching"));
}

#[tokio::test]
async fn test_unguarded_fetch_with_unwrap_is_penalised() {
    let anchor = "let records = extract_records(&document, store).await;";
    let replacement = "let records = extract_records(&document, store).await;\n    \
        let _again = fetcher.fetch(BASE_URL, USER_AGENT, Duration::from_secs(REQUEST_TIMEOUT_SECONDS)).await.unwrap();";
    let results = score(&render_with(mutated("entrypoint", anchor, replacement))).await;

    assert!((results.category_scores.error_handling - 0.5).abs() < 1e-9);
    assert!((results.overall_score - 0.95).abs() < 1e-9);
    assert!(has_reason(&results, "error_handling: fetch failures are not handled with match or if let"));
    assert!(has_reason(&results, "error_handling: entry point calls unwrap or expect"));
    assert!(results.deployment_ready);
}

#[tokio::test]
async fn test_unsanitized_titles_fail_data_quality() {
    let generated = render_with(mutated(
        "extraction",
        "Some(raw) => runtime::sanitize_text(&raw),",
        "Some(raw) => raw,",
    ));
    let results = score(&generated).await;

    assert!(results.category_scores.data_quality < 1.0);
    assert!(has_reason(
        &results,
        "data_quality: titles keep control characters or unnormalized whitespace"
    ));
}

#[tokio::test]
async fn test_link_read_from_the_title_selector_is_not_deployable() {
    let generated = render_with(mutated("extraction", ".attr(LINK_SELECTOR, \"href\")", ".attr(TITLE_SELECTOR, \"href\")"));
    let results = score(&generated).await;

    assert!(results.category_scores.functionality < 1.0);
    assert!(has_reason(&results, "functionality: dry run produced no record with a title and an absolute url"));
    assert!(has_reason(
        &results,
        "functionality: record fields are not read through their selector constants"
    ));
    assert!(!results.deployment_ready);
}

#[tokio::test]
async fn test_swapped_field_selector_fails_functionality() {
    let generated = render_with(mutated("extraction", "node.text(TITLE_SELECTOR)", "node.text(SUMMARY_SELECTOR)"));
    let results = score(&generated).await;

    assert!((results.category_scores.functionality - 0.8).abs() < 1e-9);
    assert!(has_reason(
        &results,
        "functionality: record fields are not read through their selector constants"
    ));
    assert_eq!(results.failing_categories, vec![TestCategory::Functionality]);
}

#[tokio::test]
async fn test_unparseable_source_scores_zero() {
    let body = EmbeddedAssets.get("entrypoint").unwrap();
    let assets = InMemoryAssets::embedded_copy().with("entrypoint", format!("{}\nfn broken( {{\n", body));
    let results = score(&render_with(assets)).await;

    assert_eq!(results.overall_score, 0.0);
    assert!(!results.deployment_ready);
    assert_eq!(results.failing_categories.len(), TestCategory::ALL.len());
    assert!(results.reasons[0].starts_with("code_quality: source does not parse as Rust:"));
}

#[test]
fn test_threshold_boundary_through_the_framework() {
    let config = TestingConfig {
        weights: ScoreWeights {
            code_quality: 1.0,
            compliance: 0.0,
            functionality: 0.0,
            performance: 0.0,
            data_quality: 0.0,
            error_handling: 0.0,
        },
        ..TestingConfig::default()
    };
    let framework = AutomatedTestingFramework::new(&config);

    let mut scores = CategoryScores::default();
    scores.set(TestCategory::CodeQuality, 0.79999);
    assert!(!framework.evaluate(scores.clone()).deployment_ready);

    scores.set(TestCategory::CodeQuality, 0.80000);
    assert!(framework.evaluate(scores).deployment_ready);
}

use super::signals::PageSignals;

const JS_FRAMEWORK_WEIGHT: f64 = 0.35;
const ORIGINS_WEIGHT: f64 = 0.25;
const DEPTH_WEIGHT: f64 = 0.20;
const SCROLL_WEIGHT: f64 = 0.20;

/// Origin count at which the origins term saturates
const ORIGINS_SATURATION: f64 = 10.0;
/// DOM depth at which the depth term saturates
const DEPTH_SATURATION: f64 = 32.0;

/// Score assigned when the page could not be loaded at all
pub const UNREACHABLE_COMPLEXITY: f64 = 1.0;

/// Weighted complexity in [0, 1]
pub fn score(signals: &PageSignals) -> f64 {
    let js = if signals.js_framework { 1.0 } else { 0.0 };
    let origins = (signals.external_origins as f64 / ORIGINS_SATURATION).min(1.0);
    let depth = (signals.max_depth as f64 / DEPTH_SATURATION).min(1.0);
    let scroll = if signals.scroll_or_pagination { 1.0 } else { 0.0 };

    let raw = JS_FRAMEWORK_WEIGHT * js + ORIGINS_WEIGHT * origins + DEPTH_WEIGHT * depth + SCROLL_WEIGHT * scroll;
    raw.clamp(0.0, 1.0)
}

/// Whole seconds added to the crawl delay for a site of this complexity
pub fn delay_bonus_seconds(complexity: f64, max_bonus_seconds: u64) -> u64 {
    (complexity.clamp(0.0, 1.0) * max_bonus_seconds as f64).floor() as u64
}

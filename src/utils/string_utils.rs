/// String utility functions
pub struct StringUtils;

impl StringUtils {
    /// Collapse every whitespace run into one space and trim the ends
    pub fn collapse_whitespace(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Replace control characters with spaces
    pub fn strip_control_chars(s: &str) -> String {
        s.chars().map(|c| if c.is_control() { ' ' } else { c }).collect()
    }

    /// Strip control characters, then collapse whitespace
    pub fn sanitize(s: &str) -> String {
        Self::collapse_whitespace(&Self::strip_control_chars(s))
    }

    /// Lowercased, whitespace-collapsed form used for phrase matching
    pub fn fold_for_matching(s: &str) -> String {
        Self::collapse_whitespace(&s.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(StringUtils::sanitize("  Breaking\u{0007}\n\tNews  "), "Breaking News");
        assert_eq!(StringUtils::sanitize("a\u{0000}b"), "a b");
    }

    #[test]
    fn test_fold_for_matching() {
        assert_eq!(
            StringUtils::fold_for_matching("No\n  Scraping   Allowed"),
            "no scraping allowed"
        );
    }
}

use rust_embed::RustEmbed;
use std::collections::HashMap;

/// Template fragments compiled into the binary
#[derive(RustEmbed)]
#[folder = "assets/templates/"]
struct EmbeddedTemplates;

/// File extension of every template fragment
pub const ASSET_EXTENSION: &str = ".rs.tmpl";

/// Source of template fragment bodies, keyed by fragment name
pub trait TemplateAssets: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Fragments shipped inside the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedAssets;

impl TemplateAssets for EmbeddedAssets {
    fn get(&self, name: &str) -> Option<String> {
        let file = EmbeddedTemplates::get(&format!("{}{}", name, ASSET_EXTENSION))?;
        String::from_utf8(file.data.into_owned()).ok()
    }
}

/// Fragments held in memory, for tests and for swapping bodies at runtime
#[derive(Debug, Clone, Default)]
pub struct InMemoryAssets {
    bodies: HashMap<String, String>,
}

impl InMemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every embedded fragment
    pub fn embedded_copy() -> Self {
        let bodies = EmbeddedTemplates::iter()
            .filter_map(|path| {
                let name = path.strip_suffix(ASSET_EXTENSION)?.to_string();
                let body = EmbeddedAssets.get(&name)?;
                Some((name, body))
            })
            .collect();
        Self { bodies }
    }

    pub fn with(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.bodies.insert(name.into(), body.into());
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.bodies.remove(name);
        self
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.bodies.keys().cloned().collect();
        names.sort();
        names
    }
}

impl TemplateAssets for InMemoryAssets {
    fn get(&self, name: &str) -> Option<String> {
        self.bodies.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::registry::STANDARD_ASSETS;

    #[test]
    fn test_every_standard_fragment_is_embedded() {
        for name in STANDARD_ASSETS {
            let body = EmbeddedAssets.get(name);
            assert!(body.is_some(), "missing fragment {name}");
        }
        assert!(EmbeddedAssets.get("nope").is_none());
    }

    #[test]
    fn test_in_memory_copy_matches_embedded() {
        let copy = InMemoryAssets::embedded_copy();
        assert_eq!(copy.names().len(), STANDARD_ASSETS.len());
        assert_eq!(copy.get("header"), EmbeddedAssets.get("header"));

        let trimmed = copy.without("extraction");
        assert!(trimmed.get("extraction").is_none());
        assert!(trimmed.get("entrypoint").is_some());
    }
}

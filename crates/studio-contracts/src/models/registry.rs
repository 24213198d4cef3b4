use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Image,
    Text,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Image => "image",
            Capability::Text => "text",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend model and the selector values that point at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    pub name: String,
    pub label: String,
    pub capability: Capability,
    pub aliases: Vec<String>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, label: impl Into<String>, capability: Capability) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            capability,
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    fn answers_to(&self, selector: &str) -> bool {
        self.name == selector || self.aliases.iter().any(|alias| alias == selector)
    }
}

/// Known models in registration order. The built-in set maps both chat UI
/// selectors (`2.5`, `3.0`) onto the one Imagen model.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::empty()
            .with_model(
                ModelSpec::new("imagen-3.0-generate-001", "Imagen 3.0", Capability::Image)
                    .with_aliases(["2.5", "3.0"]),
            )
            .with_model(ModelSpec::new("gemini-pro", "Gemini Pro", Capability::Text))
    }
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self {
            models: IndexMap::new(),
        }
    }

    pub fn with_model(mut self, spec: ModelSpec) -> Self {
        self.register(spec);
        self
    }

    /// Adds or replaces the entry keyed by `spec.name`.
    pub fn register(&mut self, spec: ModelSpec) {
        self.models.insert(spec.name.clone(), spec);
    }

    /// Adds a bare entry for a model named in configuration, unless the name
    /// already resolves. Returns whether anything was added.
    pub fn register_named(&mut self, name: &str, capability: Capability) -> bool {
        let name = strip_model_prefix(name);
        if name.is_empty() || self.resolve(name).is_some() {
            return false;
        }
        self.register(ModelSpec::new(name, name, capability));
        true
    }

    /// Name first, then aliases. Accepts the `models/` prefix used by the API.
    pub fn resolve(&self, selector: &str) -> Option<&ModelSpec> {
        let selector = strip_model_prefix(selector);
        self.models
            .get(selector)
            .or_else(|| self.models.values().find(|spec| spec.answers_to(selector)))
    }

    pub fn lookup(&self, selector: &str, capability: Capability) -> Option<&ModelSpec> {
        self.resolve(selector)
            .filter(|spec| spec.capability == capability)
    }

    pub fn first_for(&self, capability: Capability) -> Option<&ModelSpec> {
        self.iter().find(|spec| spec.capability == capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn strip_model_prefix(selector: &str) -> &str {
    let trimmed = selector.trim();
    trimmed.strip_prefix("models/").unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_ui_selectors_reach_imagen() {
        let registry = ModelRegistry::default();
        for selector in ["2.5", "3.0", "imagen-3.0-generate-001", "models/imagen-3.0-generate-001"] {
            let spec = registry.lookup(selector, Capability::Image);
            assert_eq!(
                spec.map(|spec| spec.name.as_str()),
                Some("imagen-3.0-generate-001"),
                "{selector}"
            );
        }
    }

    #[test]
    fn lookup_checks_capability() {
        let registry = ModelRegistry::default();
        assert!(registry.lookup("gemini-pro", Capability::Image).is_none());
        assert!(registry.lookup("gemini-pro", Capability::Text).is_some());
        assert!(registry.lookup("9.9", Capability::Image).is_none());
    }

    #[test]
    fn register_named_skips_known_selectors() {
        let mut registry = ModelRegistry::default();
        assert!(!registry.register_named("3.0", Capability::Text));
        assert!(!registry.register_named("  ", Capability::Text));
        assert!(registry.register_named("models/gemini-2.0-flash", Capability::Text));
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.lookup("gemini-2.0-flash", Capability::Text).map(|spec| spec.label.as_str()),
            Some("gemini-2.0-flash")
        );
    }

    #[test]
    fn first_for_follows_registration_order() {
        let registry = ModelRegistry::empty()
            .with_model(ModelSpec::new("b", "B", Capability::Text))
            .with_model(ModelSpec::new("a", "A", Capability::Text));
        assert_eq!(registry.first_for(Capability::Text).map(|spec| spec.name.as_str()), Some("b"));
        assert!(registry.first_for(Capability::Image).is_none());
    }
}

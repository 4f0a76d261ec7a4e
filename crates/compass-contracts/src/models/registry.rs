use indexmap::IndexMap;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProvider {
    Gemini,
    /// Offline canned reports, no credential needed.
    Dryrun,
}

impl ModelProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Dryrun => "dryrun",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: ModelProvider,
    /// Accepts an inline image part next to the prompt.
    pub vision: bool,
    pub input_token_limit: Option<u64>,
}

impl ModelSpec {
    /// A Gemini model, possibly one released after this registry was written.
    pub fn gemini(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            provider: ModelProvider::Gemini,
            vision: true,
            input_token_limit: None,
        }
    }

    fn with_limit(mut self, limit: u64) -> Self {
        self.input_token_limit = Some(limit);
        self
    }
}

/// Known models in preference order. The first vision model is the default.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: impl IntoIterator<Item = ModelSpec>) -> Self {
        Self {
            models: models
                .into_iter()
                .map(|model| (model.name.clone(), model))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn default_vision(&self) -> Option<&ModelSpec> {
        self.models.values().find(|model| model.vision)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new([
            ModelSpec::gemini(DEFAULT_MODEL).with_limit(1_048_576),
            ModelSpec::gemini("gemini-2.5-pro").with_limit(1_048_576),
            ModelSpec::gemini("gemini-2.0-flash").with_limit(1_048_576),
            ModelSpec {
                name: "dryrun-vision-1".to_string(),
                provider: ModelProvider::Dryrun,
                vision: true,
                input_token_limit: None,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::{ModelProvider, ModelRegistry, ModelSpec, DEFAULT_MODEL};

    #[test]
    fn default_registry_leads_with_flash() {
        let registry = ModelRegistry::default();
        let default = registry.default_vision().unwrap();
        assert_eq!(default.name, DEFAULT_MODEL);
        assert_eq!(default.provider, ModelProvider::Gemini);
        assert_eq!(default.input_token_limit, Some(1_048_576));
        assert_eq!(
            registry.get("dryrun-vision-1").map(|model| model.provider),
            Some(ModelProvider::Dryrun)
        );
    }

    #[test]
    fn default_skips_text_only_models() {
        let mut text_only = ModelSpec::gemini("gemini-text");
        text_only.vision = false;
        let registry = ModelRegistry::new([text_only, ModelSpec::gemini("gemini-eyes")]);
        assert_eq!(registry.default_vision().unwrap().name, "gemini-eyes");
        assert_eq!(registry.list().count(), 2);
    }
}

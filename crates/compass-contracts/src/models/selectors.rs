use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    /// Why the requested model was not used, if it was not.
    pub fallback_reason: Option<String>,
}

/// Resolves the configured model id to a vision model.
///
/// Registered vision models are used as is. Ids that look like Gemini models
/// but are not registered are passed through, so newer releases work before
/// the registry knows them. Anything else falls back to the default model.
#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }

    pub fn select(&self, requested: Option<&str>) -> Result<ModelSelection, String> {
        let default = self
            .registry
            .default_vision()
            .ok_or_else(|| "No vision models are registered.".to_string())?;
        let Some(requested) = requested.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(ModelSelection {
                model: default.clone(),
                requested: None,
                fallback_reason: Some("No model specified; using default.".to_string()),
            });
        };

        let reason = match self.registry.get(requested) {
            Some(model) if model.vision => return Ok(exact(model.clone())),
            Some(_) => format!("Model '{requested}' cannot read images."),
            None if requested.starts_with("gemini-") => {
                return Ok(exact(ModelSpec::gemini(requested)))
            }
            None => format!("Unknown model '{requested}'."),
        };
        Ok(ModelSelection {
            model: default.clone(),
            requested: Some(requested.to_string()),
            fallback_reason: Some(reason),
        })
    }
}

fn exact(model: ModelSpec) -> ModelSelection {
    ModelSelection {
        requested: Some(model.name.clone()),
        model,
        fallback_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::ModelSelector;
    use crate::models::{ModelProvider, ModelRegistry, ModelSpec};

    #[test]
    fn registered_model_is_used_verbatim() {
        let selection = ModelSelector::default()
            .select(Some(" gemini-2.5-pro "))
            .unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-pro");
        assert_eq!(selection.requested.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(selection.fallback_reason, None);
    }

    #[test]
    fn unknown_gemini_versions_pass_through() {
        let selection = ModelSelector::default()
            .select(Some("gemini-3-flash-preview"))
            .unwrap();
        assert_eq!(selection.model.name, "gemini-3-flash-preview");
        assert_eq!(selection.model.provider, ModelProvider::Gemini);
        assert_eq!(selection.fallback_reason, None);
    }

    #[test]
    fn unknown_model_falls_back_with_reason() {
        let selection = ModelSelector::default()
            .select(Some("gpt-vision-x"))
            .unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash");
        assert_eq!(selection.requested.as_deref(), Some("gpt-vision-x"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Unknown model 'gpt-vision-x'.")
        );
    }

    #[test]
    fn text_only_models_fall_back() {
        let mut text_only = ModelSpec::gemini("gemini-text");
        text_only.vision = false;
        let registry = ModelRegistry::new([ModelSpec::gemini("gemini-eyes"), text_only]);
        let selection = ModelSelector::new(registry)
            .select(Some("gemini-text"))
            .unwrap();
        assert_eq!(selection.model.name, "gemini-eyes");
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Model 'gemini-text' cannot read images.")
        );
    }

    #[test]
    fn no_request_uses_default_with_explanation() {
        let selection = ModelSelector::default().select(None).unwrap();
        assert_eq!(selection.model.name, "gemini-2.5-flash");
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("No model specified; using default.")
        );
    }

    #[test]
    fn errors_without_any_vision_model() {
        let mut text_only = ModelSpec::gemini("gemini-text");
        text_only.vision = false;
        let err = ModelSelector::new(ModelRegistry::new([text_only]))
            .select(Some("gemini-text"))
            .unwrap_err();
        assert_eq!(err, "No vision models are registered.");
    }
}

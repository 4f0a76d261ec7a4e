use std::sync::Arc;

use compass_contracts::analysis::{AnalysisError, AnalysisRequest, EncodedPayload};
use compass_contracts::models::{ModelSelector, ModelSpec};

use crate::config::EngineConfig;
use crate::providers::{build_provider, AnalysisProvider, FragmentStream};

/// Stateless bridge between an encoded image and a text stream.
///
/// Holds no per-analysis state, so one client can serve any number of
/// sequential analyses.
#[derive(Clone)]
pub struct AnalysisClient {
    provider: Arc<dyn AnalysisProvider>,
    model: ModelSpec,
    prompt: String,
    fallback_reason: Option<String>,
}

impl AnalysisClient {
    pub fn from_config(config: &EngineConfig) -> Result<Self, AnalysisError> {
        let selection = ModelSelector::default()
            .select(Some(&config.model))
            .map_err(AnalysisError::configuration)?;
        let provider = build_provider(&selection.model, config)?;
        Ok(Self {
            provider,
            model: selection.model,
            prompt: config.prompt.clone(),
            fallback_reason: selection.fallback_reason,
        })
    }

    pub fn with_provider(
        provider: Arc<dyn AnalysisProvider>,
        model: ModelSpec,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model,
            prompt: prompt.into(),
            fallback_reason: None,
        }
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Set when the configured model was unavailable and another was used.
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    /// Opens one streaming analysis. Fragments are produced as the caller
    /// pulls them.
    pub fn analyze(
        &self,
        payload: EncodedPayload,
        mime_type: &str,
    ) -> Result<FragmentStream, AnalysisError> {
        self.provider.stream(AnalysisRequest {
            model: self.model.name.clone(),
            mime_type: mime_type.to_string(),
            payload,
            prompt: self.prompt.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use compass_contracts::analysis::{AnalysisError, AnalysisRequest};
    use compass_contracts::models::ModelSpec;

    use super::AnalysisClient;
    use crate::config::EngineConfig;
    use crate::encoder::encode_bytes;
    use crate::providers::{AnalysisProvider, FragmentStream};

    #[derive(Default)]
    struct RecordingProvider {
        seen: Mutex<Vec<AnalysisRequest>>,
    }

    impl AnalysisProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn stream(&self, request: AnalysisRequest) -> Result<FragmentStream, AnalysisError> {
            self.seen.lock().unwrap().push(request);
            let fragments: Vec<Result<String, AnalysisError>> =
                vec![Ok("A".to_string()), Ok("B".to_string())];
            Ok(Box::new(fragments.into_iter()))
        }
    }

    #[test]
    fn analyze_forwards_model_prompt_and_payload() -> anyhow::Result<()> {
        let provider = Arc::new(RecordingProvider::default());
        let client = AnalysisClient::with_provider(
            provider.clone(),
            ModelSpec::gemini("gemini-2.5-flash"),
            "Describe it.",
        );

        let fragments: Vec<String> = client
            .analyze(encode_bytes(b"png"), "image/png")?
            .collect::<Result<_, _>>()?;
        assert_eq!(fragments, vec!["A", "B"]);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "gemini-2.5-flash");
        assert_eq!(seen[0].mime_type, "image/png");
        assert_eq!(seen[0].prompt, "Describe it.");
        assert_eq!(seen[0].payload.as_str(), "cG5n");
        Ok(())
    }

    #[test]
    fn from_config_reports_model_fallback() -> anyhow::Result<()> {
        let config = EngineConfig::default().with_model("dryrun-vision-1");
        let client = AnalysisClient::from_config(&config)?;
        assert_eq!(client.provider_name(), "dryrun");
        assert_eq!(client.fallback_reason(), None);

        let config = EngineConfig::default()
            .with_api_key("k")
            .with_model("not-a-model");
        let client = AnalysisClient::from_config(&config)?;
        assert_eq!(client.model().name, "gemini-2.5-flash");
        assert_eq!(client.provider_name(), "gemini");
        assert!(client
            .fallback_reason()
            .unwrap_or_default()
            .contains("not-a-model"));
        Ok(())
    }
}

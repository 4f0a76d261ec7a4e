use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use compass_contracts::models::DEFAULT_MODEL;

use crate::prompt::{load_prompt_file, DEFAULT_PROMPT};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Checked in order; the first non-empty value wins.
pub const CREDENTIAL_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

const DEFAULT_REQUEST_TIMEOUT_S: f64 = 300.0;
const MIN_REQUEST_TIMEOUT_S: f64 = 15.0;
const MAX_REQUEST_TIMEOUT_S: f64 = 900.0;

/// Process-wide settings, resolved once at startup and injected into the client.
#[derive(Clone)]
pub struct EngineConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub prompt: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("prompt_chars", &self.prompt.chars().count())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_S),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self {
            api_key: CREDENTIAL_ENV_VARS.iter().find_map(|key| non_empty(*key)),
            ..Self::default()
        };
        if let Some(api_base) = non_empty("GEMINI_API_BASE") {
            config = config.with_api_base(&api_base);
        }
        if let Some(model) = non_empty("COMPASS_MODEL") {
            config.model = model;
        }
        config.request_timeout = parse_timeout(non_empty("COMPASS_REQUEST_TIMEOUT").as_deref());
        if let Some(prompt_file) = non_empty("COMPASS_PROMPT_FILE") {
            config = config.with_prompt_file(Path::new(&prompt_file))?;
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: &str) -> Self {
        let trimmed = model.trim();
        if !trimmed.is_empty() {
            self.model = trimmed.to_string();
        }
        self
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        let trimmed = api_base.trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            self.api_base = trimmed.to_string();
        }
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        let trimmed = api_key.trim();
        self.api_key = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn with_prompt_file(mut self, path: &Path) -> Result<Self> {
        self.prompt = load_prompt_file(path)?;
        Ok(self)
    }

    pub fn credential(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

fn parse_timeout(raw: Option<&str>) -> Duration {
    let seconds = raw
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S)
        .clamp(MIN_REQUEST_TIMEOUT_S, MAX_REQUEST_TIMEOUT_S);
    Duration::from_secs_f64(seconds)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{EngineConfig, DEFAULT_API_BASE, DEFAULT_MODEL};
    use crate::prompt::DEFAULT_PROMPT;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_environment() -> anyhow::Result<()> {
        let config = EngineConfig::from_lookup(lookup(&[]))?;
        assert_eq!(config.credential(), None);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.prompt, DEFAULT_PROMPT);
        assert_eq!(config.request_timeout, Duration::from_secs(300));
        Ok(())
    }

    #[test]
    fn credential_precedence_skips_blank_values() -> anyhow::Result<()> {
        let config = EngineConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "  "),
            ("GOOGLE_API_KEY", "google-key"),
            ("API_KEY", "generic-key"),
        ]))?;
        assert_eq!(config.credential(), Some("google-key"));

        let generic = EngineConfig::from_lookup(lookup(&[("API_KEY", "generic-key")]))?;
        assert_eq!(generic.credential(), Some("generic-key"));
        Ok(())
    }

    #[test]
    fn overrides_are_normalized() -> anyhow::Result<()> {
        let config = EngineConfig::from_lookup(lookup(&[
            ("GEMINI_API_BASE", " http://127.0.0.1:9000/v1beta/ "),
            ("COMPASS_MODEL", "gemini-2.5-pro"),
            ("COMPASS_REQUEST_TIMEOUT", "5"),
        ]))?;
        assert_eq!(config.api_base, "http://127.0.0.1:9000/v1beta");
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.request_timeout, Duration::from_secs(15));

        let bad_timeout =
            EngineConfig::from_lookup(lookup(&[("COMPASS_REQUEST_TIMEOUT", "soon")]))?;
        assert_eq!(bad_timeout.request_timeout, Duration::from_secs(300));
        Ok(())
    }

    #[test]
    fn prompt_file_replaces_default_prompt() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("prompt.txt");
        std::fs::write(&path, "Summarize the compass.")?;
        let path_text = path.to_string_lossy().to_string();

        let config =
            EngineConfig::from_lookup(lookup(&[("COMPASS_PROMPT_FILE", path_text.as_str())]))?;
        assert_eq!(config.prompt, "Summarize the compass.");

        let missing = temp.path().join("missing.txt").to_string_lossy().to_string();
        let missing_config =
            EngineConfig::from_lookup(lookup(&[("COMPASS_PROMPT_FILE", missing.as_str())]));
        assert!(missing_config.is_err());
        Ok(())
    }

    #[test]
    fn debug_output_redacts_the_credential() {
        let config = EngineConfig::default().with_api_key("super-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}

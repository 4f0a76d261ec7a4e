use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use compass_contracts::analysis::{AnalysisError, AnalysisRequest};
use compass_contracts::models::{ModelProvider, ModelSpec};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::config::{EngineConfig, CREDENTIAL_ENV_VARS};
use crate::sse::{ended_early, parse_event, remote_error, SseFragmentStream};
use crate::{error_chain_text, truncate_text};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const ERROR_BODY_CHARS: usize = 512;

/// Lazily produced text fragments of one analysis. Dropping it closes the
/// underlying connection.
pub type FragmentStream = Box<dyn Iterator<Item = Result<String, AnalysisError>> + Send>;

pub trait AnalysisProvider: Send + Sync {
    fn name(&self) -> &str;
    fn stream(&self, request: AnalysisRequest) -> Result<FragmentStream, AnalysisError>;
}

/// Picks the provider that serves `model`.
pub fn build_provider(
    model: &ModelSpec,
    config: &EngineConfig,
) -> Result<Arc<dyn AnalysisProvider>, AnalysisError> {
    match model.provider {
        ModelProvider::Gemini => {
            let Some(api_key) = config.credential() else {
                return Err(AnalysisError::configuration(format!(
                    "{} not set",
                    credential_env_list()
                )));
            };
            Ok(Arc::new(GeminiProvider::new(
                api_key,
                &config.api_base,
                config.request_timeout,
            )?))
        }
        ModelProvider::Dryrun => Ok(Arc::new(DryrunProvider)),
    }
}

fn credential_env_list() -> String {
    match CREDENTIAL_ENV_VARS.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{}, or {last}", rest.join(", ")),
        Some((last, _)) => last.to_string(),
        None => String::new(),
    }
}

pub struct GeminiProvider {
    api_key: String,
    api_base: String,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(api_key: &str, api_base: &str, timeout: Duration) -> Result<Self, AnalysisError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|err| {
                AnalysisError::configuration(format!(
                    "failed building HTTP client: {}",
                    err.without_url()
                ))
            })?;
        Ok(Self::with_http(api_key, api_base, http))
    }

    pub(crate) fn with_http(api_key: &str, api_base: &str, http: HttpClient) -> Self {
        Self {
            api_key: api_key.trim().to_string(),
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!(
            "{}/{}:streamGenerateContent?alt=sse",
            self.api_base, model_path
        )
    }

    /// Image part first, instruction second.
    pub fn build_payload(request: AnalysisRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": request.mime_type,
                            "data": request.payload.into_string(),
                        }
                    },
                    { "text": request.prompt },
                ],
            }],
        })
    }
}

impl AnalysisProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn stream(&self, request: AnalysisRequest) -> Result<FragmentStream, AnalysisError> {
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request);
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .header(ACCEPT, "text/event-stream")
            .json(&payload)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = response.text().unwrap_or_default();
            return Err(status_error(code, &body));
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("application/json"))
            .unwrap_or(false);
        if is_json {
            // Some proxies ignore `alt=sse` and return the whole array at once.
            let body = response.text().map_err(transport_error)?;
            let chunk = parse_event(&body)?;
            if !chunk.finished {
                return Err(ended_early());
            }
            return Ok(Box::new(chunk.text.into_iter().map(Ok::<String, AnalysisError>)));
        }
        Ok(Box::new(SseFragmentStream::new(BufReader::new(response))))
    }
}

fn transport_error(err: reqwest::Error) -> AnalysisError {
    let err = err.without_url();
    if err.is_timeout() {
        return AnalysisError::transport("Gemini request timed out");
    }
    AnalysisError::transport(format!(
        "Gemini request failed: {}",
        error_chain_text(&anyhow::Error::new(err), ERROR_BODY_CHARS)
    ))
}

fn status_error(code: u16, body: &str) -> AnalysisError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|parsed| {
            let error = match &parsed {
                Value::Array(items) => items.first()?.get("error")?.clone(),
                other => other.get("error")?.clone(),
            };
            Some(remote_error(&error).message().to_string())
        })
        .unwrap_or_else(|| truncate_text(body.trim(), ERROR_BODY_CHARS));
    if detail.is_empty() {
        return AnalysisError::remote(format!("Gemini request failed ({code})"));
    }
    AnalysisError::remote(format!("Gemini request failed ({code}): {detail}"))
}

/// Offline provider. Streams a fixed report describing the request, one word
/// at a time.
pub struct DryrunProvider;

impl DryrunProvider {
    pub fn report_for(request: &AnalysisRequest) -> String {
        let digest = request.payload.sha256();
        let short_digest = &digest[..digest.len().min(12)];
        format!(
            "Dry-run analysis ({model})\n\
             Image: {mime}, {bytes} bytes, sha256 {short_digest}\n\
             Strengths: consistent ratings across the compass.\n\
             Weaknesses: none visible in dry-run mode.\n\
             Primary role: Coordinator. Secondary role: Implementer.\n\
             Recommendations: rerun with a Gemini model for a real assessment.",
            model = request.model,
            mime = request.mime_type,
            bytes = request.payload.byte_len(),
        )
    }
}

impl AnalysisProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn stream(&self, request: AnalysisRequest) -> Result<FragmentStream, AnalysisError> {
        let report = Self::report_for(&request);
        let fragments: Vec<String> = report.split_inclusive(' ').map(str::to_string).collect();
        Ok(Box::new(
            fragments.into_iter().map(Ok::<String, AnalysisError>),
        ))
    }
}

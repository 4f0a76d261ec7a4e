pub mod accumulator;
pub mod client;
pub mod config;
pub mod encoder;
pub mod prompt;
pub mod providers;
pub mod sse;

use std::path::{Path, PathBuf};

use anyhow::Result;
use compass_contracts::analysis::{AnalysisError, AnalysisResult, AnalysisState, ImageAsset};
use compass_contracts::events::{EventWriter, SessionEvent};
use compass_contracts::reports::{write_report, AnalysisSummary};
use serde_json::{json, Value};

pub use accumulator::{accumulate, apply_step, StepOutcome};
pub use client::AnalysisClient;
pub use config::EngineConfig;
pub use providers::{AnalysisProvider, DryrunProvider, FragmentStream, GeminiProvider};

const ERROR_CAUSE_CHARS: usize = 512;

/// One user's analysis workspace: the selected image, the current result, and
/// at most one open fragment stream.
///
/// Single-threaded. Every suspension happens inside [`AnalysisSession::step`],
/// which pulls the next fragment from the active stream.
pub struct AnalysisSession {
    client: AnalysisClient,
    events: EventWriter,
    asset: Option<ImageAsset>,
    result: AnalysisResult,
    active: Option<FragmentStream>,
    last_error: Option<AnalysisError>,
    last_payload_sha256: Option<String>,
}

impl AnalysisSession {
    pub fn new(client: AnalysisClient, events: EventWriter) -> Self {
        let session = Self {
            client,
            events,
            asset: None,
            result: AnalysisResult::new(),
            active: None,
            last_error: None,
            last_payload_sha256: None,
        };
        session.emit(
            SessionEvent::SessionStarted,
            json!({
                "model": session.client.model().name,
                "provider": session.client.provider_name(),
                "fallback_reason": session.client.fallback_reason(),
            }),
        );
        session
    }

    /// Replaces the selected image. Non-image types are rejected before any
    /// encoding and leave the current result untouched.
    pub fn select_image(&mut self, asset: ImageAsset) -> Result<(), AnalysisError> {
        if !asset.is_image() {
            let err = AnalysisError::validation(format!(
                "'{}' is not an image ({}). Please choose an image file.",
                asset.display_name(),
                asset.mime_type()
            ));
            return Err(self.reject_image(asset.display_name(), Some(asset.mime_type()), err));
        }

        self.supersede("image_selected");
        self.emit(
            SessionEvent::ImageSelected,
            json!({
                "image": asset.display_name(),
                "mime_type": asset.mime_type(),
                "path": asset.path().map(|path| path.to_string_lossy().to_string()),
            }),
        );
        self.asset = Some(asset);
        self.result = AnalysisResult::new();
        self.last_error = None;
        self.last_payload_sha256 = None;
        Ok(())
    }

    pub fn select_image_path(&mut self, path: &Path) -> Result<(), AnalysisError> {
        match encoder::image_asset_from_path(path) {
            Ok(asset) => self.select_image(asset),
            Err(err) => {
                let err = AnalysisError::validation(error_chain_text(&err, ERROR_CAUSE_CHARS));
                Err(self.reject_image(&path.to_string_lossy(), None, err))
            }
        }
    }

    fn reject_image(
        &mut self,
        image: &str,
        mime_type: Option<&str>,
        err: AnalysisError,
    ) -> AnalysisError {
        self.emit(
            SessionEvent::ImageRejected,
            json!({
                "image": image,
                "mime_type": mime_type,
                "reason": err.message(),
            }),
        );
        self.last_error = Some(err.clone());
        err
    }

    /// Clears the image and returns to an empty idle result, whatever the
    /// prior state.
    pub fn reset(&mut self) {
        self.supersede("reset");
        self.asset = None;
        self.result = AnalysisResult::new();
        self.last_error = None;
        self.last_payload_sha256 = None;
        self.emit(SessionEvent::SessionReset, Value::Null);
    }

    /// Swaps the client, e.g. after a model change. Any active stream is
    /// discarded.
    pub fn set_client(&mut self, client: AnalysisClient) {
        self.supersede("model_changed");
        self.client = client;
        self.emit(
            SessionEvent::ModelChanged,
            json!({
                "model": self.client.model().name,
                "provider": self.client.provider_name(),
                "fallback_reason": self.client.fallback_reason(),
            }),
        );
    }

    /// Starts a fresh analysis of the selected image, superseding any active
    /// one. Nothing is pulled from the stream yet.
    ///
    /// Validation errors leave the session untouched. Encoding and request
    /// failures fail the new result and are also returned.
    pub fn start_analysis(&mut self) -> Result<(), AnalysisError> {
        if self.asset.is_none() {
            let err = AnalysisError::validation("Please select an image first.");
            self.last_error = Some(err.clone());
            return Err(err);
        }

        self.supersede("retry");
        self.result = AnalysisResult::new();
        self.last_error = None;
        self.last_payload_sha256 = None;
        if let Err(err) = self.result.begin() {
            return Err(AnalysisError::validation(error_chain_text(
                &err,
                ERROR_CAUSE_CHARS,
            )));
        }

        let Some(asset) = self.asset.as_ref() else {
            return Err(AnalysisError::validation("Please select an image first."));
        };
        let image = asset.display_name().to_string();
        let mime_type = asset.mime_type().to_string();
        let encoded = encoder::encode_asset(asset);
        self.emit(
            SessionEvent::AnalysisStarted,
            json!({
                "model": self.client.model().name,
                "provider": self.client.provider_name(),
                "image": image,
                "mime_type": mime_type,
            }),
        );

        let payload = match encoded {
            Ok(payload) => payload,
            Err(err) => {
                let cause = AnalysisError::encoding(format!(
                    "Could not read {image}: {}",
                    error_chain_text(&err, ERROR_CAUSE_CHARS)
                ));
                return Err(self.fail_current(cause));
            }
        };
        self.last_payload_sha256 = Some(payload.sha256().to_string());

        match self.client.analyze(payload, &mime_type) {
            Ok(stream) => {
                self.active = Some(stream);
                Ok(())
            }
            Err(err) => Err(self.fail_current(err)),
        }
    }

    /// Pulls one fragment from the active stream and applies it.
    pub fn step(&mut self) -> Result<StepOutcome> {
        let Some(stream) = self.active.as_mut() else {
            return Ok(StepOutcome::Inactive);
        };
        let next = stream.next();
        let outcome = apply_step(&mut self.result, next)?;
        match &outcome {
            StepOutcome::Fragment(fragment) => {
                self.emit(
                    SessionEvent::AnalysisChunk,
                    json!({
                        "index": self.result.fragments(),
                        "chars": fragment.chars().count(),
                    }),
                );
            }
            StepOutcome::Completed => {
                self.active = None;
                self.emit(
                    SessionEvent::AnalysisCompleted,
                    json!({
                        "fragments": self.result.fragments(),
                        "chars": self.result.text().chars().count(),
                    }),
                );
            }
            StepOutcome::Failed(err) => {
                self.record_failure(err);
            }
            StepOutcome::Inactive => {
                self.active = None;
            }
        }
        Ok(outcome)
    }

    /// Steps until the active stream ends. `on_fragment` sees each fragment
    /// and the buffer after it was appended.
    pub fn run_to_end<F>(&mut self, mut on_fragment: F) -> Result<AnalysisState>
    where
        F: FnMut(&str, &AnalysisResult),
    {
        loop {
            match self.step()? {
                StepOutcome::Fragment(fragment) => on_fragment(&fragment, &self.result),
                _ => return Ok(self.result.state()),
            }
        }
    }

    /// Starts (or retries) an analysis and streams it to completion.
    ///
    /// Analysis failures are reported through the returned state and
    /// [`AnalysisSession::last_error`]; only validation problems are `Err`.
    pub fn analyze<F>(&mut self, on_fragment: F) -> Result<AnalysisState>
    where
        F: FnMut(&str, &AnalysisResult),
    {
        match self.start_analysis() {
            Ok(()) => self.run_to_end(on_fragment),
            Err(err) if err.is_analysis_failure() => Ok(self.result.state()),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the completed report. `Ok(None)` while the result is not
    /// complete.
    pub fn download(&self, target: &Path) -> Result<Option<PathBuf>> {
        if !self.can_download() {
            return Ok(None);
        }
        let written = write_report(target, &self.result)?;
        if let Some(path) = written.as_ref() {
            self.emit(
                SessionEvent::ReportExported,
                json!({
                    "path": path.to_string_lossy(),
                    "chars": self.result.text().chars().count(),
                }),
            );
        }
        Ok(written)
    }

    pub fn summary(&self) -> AnalysisSummary {
        let (image, mime_type) = match self.asset.as_ref() {
            Some(asset) => (asset.display_name(), asset.mime_type()),
            None => ("", ""),
        };
        AnalysisSummary::from_result(
            &self.result,
            &self.client.model().name,
            image,
            mime_type,
            self.last_payload_sha256.as_deref(),
        )
    }

    pub fn client(&self) -> &AnalysisClient {
        &self.client
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn asset(&self) -> Option<&ImageAsset> {
        self.asset.as_ref()
    }

    pub fn result(&self) -> &AnalysisResult {
        &self.result
    }

    pub fn last_error(&self) -> Option<&AnalysisError> {
        self.last_error.as_ref()
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some() && self.result.is_streaming()
    }

    pub fn can_download(&self) -> bool {
        self.result.is_exportable()
    }

    /// Drops the active stream, closing its transport. The streaming result it
    /// fed is discarded, so none of its later fragments are observable.
    fn supersede(&mut self, reason: &str) {
        let Some(stream) = self.active.take() else {
            return;
        };
        drop(stream);
        if self.result.is_streaming() {
            self.emit(
                SessionEvent::AnalysisSuperseded,
                json!({
                    "reason": reason,
                    "fragments": self.result.fragments(),
                }),
            );
            self.result = AnalysisResult::new();
        }
    }

    fn fail_current(&mut self, err: AnalysisError) -> AnalysisError {
        if !self.result.state().is_terminal() {
            if let Err(fail_err) = self.result.fail(err.clone()) {
                eprintln!("compass: {fail_err:#}");
            }
        }
        self.record_failure(&err);
        err
    }

    fn record_failure(&mut self, err: &AnalysisError) {
        self.active = None;
        self.last_error = Some(err.clone());
        self.emit(
            SessionEvent::AnalysisFailed,
            json!({
                "kind": err.kind().as_str(),
                "error": err.message(),
                "fragments": self.result.fragments(),
                "chars": self.result.text().chars().count(),
            }),
        );
    }

    /// Logs `event`, tagging analysis events with the current result id.
    /// Write failures are reported and never interrupt the session.
    fn emit(&self, event: SessionEvent, details: Value) {
        let analysis_id = event.is_analysis_scoped().then(|| self.result.id());
        if let Err(err) = self.events.emit(event, analysis_id, details) {
            eprintln!("compass: failed to write {} event: {err:#}", event.as_str());
        }
    }
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().map(String::as_str) == Some(trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

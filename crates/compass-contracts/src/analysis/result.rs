use anyhow::{bail, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AnalysisError;

/// `Idle -> Streaming -> {Complete | Failed}`. The last two are terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    Idle,
    Streaming,
    Complete,
    Failed,
}

impl AnalysisState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only report buffer for a single analysis.
///
/// Readable at any time, including mid-stream. A terminal result is never
/// revived; a new analysis starts from a new instance.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    id: String,
    text: String,
    state: AnalysisState,
    error: Option<AnalysisError>,
    fragments: u64,
    started_at: Option<String>,
    finished_at: Option<String>,
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisResult {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: String::new(),
            state: AnalysisState::Idle,
            error: None,
            fragments: 0,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn begin(&mut self) -> Result<()> {
        if self.state != AnalysisState::Idle {
            bail!(
                "analysis {} cannot start streaming from state '{}'",
                self.id,
                self.state
            );
        }
        self.state = AnalysisState::Streaming;
        self.started_at = Some(now_utc_iso());
        Ok(())
    }

    pub fn append(&mut self, fragment: &str) -> Result<()> {
        if self.state != AnalysisState::Streaming {
            bail!(
                "analysis {} cannot accept fragments in state '{}'",
                self.id,
                self.state
            );
        }
        self.text.push_str(fragment);
        self.fragments += 1;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        if self.state != AnalysisState::Streaming {
            bail!(
                "analysis {} cannot complete from state '{}'",
                self.id,
                self.state
            );
        }
        self.state = AnalysisState::Complete;
        self.finished_at = Some(now_utc_iso());
        Ok(())
    }

    /// Marks the analysis failed. Text received so far is kept.
    pub fn fail(&mut self, error: AnalysisError) -> Result<()> {
        if self.state.is_terminal() {
            bail!(
                "analysis {} already finished in state '{}'",
                self.id,
                self.state
            );
        }
        self.state = AnalysisState::Failed;
        self.error = Some(error);
        self.finished_at = Some(now_utc_iso());
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn state(&self) -> AnalysisState {
        self.state
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        self.error.as_ref()
    }

    pub fn fragments(&self) -> u64 {
        self.fragments
    }

    pub fn started_at(&self) -> Option<&str> {
        self.started_at.as_deref()
    }

    pub fn finished_at(&self) -> Option<&str> {
        self.finished_at.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.state == AnalysisState::Streaming
    }

    pub fn is_exportable(&self) -> bool {
        self.state == AnalysisState::Complete
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

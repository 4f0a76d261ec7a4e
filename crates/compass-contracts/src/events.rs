use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Everything an analysis session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted,
    ImageSelected,
    ImageRejected,
    SessionReset,
    ModelChanged,
    AnalysisStarted,
    /// Index and length of a fragment. The text itself is never logged.
    AnalysisChunk,
    AnalysisCompleted,
    AnalysisFailed,
    AnalysisSuperseded,
    ReportExported,
}

impl SessionEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::ImageSelected => "image_selected",
            Self::ImageRejected => "image_rejected",
            Self::SessionReset => "session_reset",
            Self::ModelChanged => "model_changed",
            Self::AnalysisStarted => "analysis_started",
            Self::AnalysisChunk => "analysis_chunk",
            Self::AnalysisCompleted => "analysis_completed",
            Self::AnalysisFailed => "analysis_failed",
            Self::AnalysisSuperseded => "analysis_superseded",
            Self::ReportExported => "report_exported",
        }
    }

    /// Events about one analysis, which must carry its id.
    pub fn is_analysis_scoped(self) -> bool {
        matches!(
            self,
            Self::AnalysisStarted
                | Self::AnalysisChunk
                | Self::AnalysisCompleted
                | Self::AnalysisFailed
                | Self::AnalysisSuperseded
                | Self::ReportExported
        )
    }
}

/// One line of `events.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub event: SessionEvent,
    pub session_id: String,
    /// Per-writer position, starting at 0 and without gaps.
    pub seq: u64,
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

const RESERVED_KEYS: &[&str] = &["type", "session_id", "seq", "ts", "analysis_id"];

/// Append-only JSONL log of one session.
///
/// Clones share the sequence counter and file lock, so lines from several
/// handles never interleave and `seq` stays ordered.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventLog>,
}

#[derive(Debug)]
struct EventLog {
    path: PathBuf,
    session_id: String,
    next_seq: Mutex<u64>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventLog {
                path: path.into(),
                session_id: session_id.into(),
                next_seq: Mutex::new(0),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Appends one event. `details` is a JSON object (or null) whose keys may
    /// not shadow the record's own fields.
    pub fn emit(
        &self,
        event: SessionEvent,
        analysis_id: Option<&str>,
        details: Value,
    ) -> Result<EventRecord> {
        if event.is_analysis_scoped() && analysis_id.is_none() {
            bail!("{} event needs an analysis id", event.as_str());
        }
        let details = match details {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => bail!(
                "{} details must be a JSON object, got {other}",
                event.as_str()
            ),
        };
        if let Some(key) = RESERVED_KEYS.iter().find(|key| details.contains_key(**key)) {
            bail!("{} details may not set '{key}'", event.as_str());
        }

        let mut next_seq = self
            .inner
            .next_seq
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let record = EventRecord {
            event,
            session_id: self.inner.session_id.clone(),
            seq: *next_seq,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            analysis_id: analysis_id.map(str::to_string),
            details,
        };
        self.append(&record)
            .with_context(|| format!("failed to append to {}", self.inner.path.display()))?;
        *next_seq += 1;
        Ok(record)
    }

    fn append(&self, record: &EventRecord) -> Result<()> {
        if let Some(parent) = self.inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::{EventRecord, EventWriter, SessionEvent};

    fn read_records(path: &std::path::Path) -> anyhow::Result<Vec<EventRecord>> {
        fs::read_to_string(path)?
            .lines()
            .map(|line| -> anyhow::Result<EventRecord> { Ok(serde_json::from_str(line)?) })
            .collect()
    }

    #[test]
    fn analysis_events_carry_their_id() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let emitted = writer.emit(
            SessionEvent::AnalysisChunk,
            Some("analysis-1"),
            json!({"index": 2, "chars": 14}),
        )?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let raw: Value = serde_json::from_str(line)?;
        assert_eq!(raw["type"], json!("analysis_chunk"));
        assert_eq!(raw["session_id"], json!("session-123"));
        assert_eq!(raw["analysis_id"], json!("analysis-1"));
        assert_eq!(raw["seq"], json!(0));
        assert_eq!(raw["chars"], json!(14));
        DateTime::parse_from_rfc3339(raw["ts"].as_str().unwrap_or(""))?;

        assert_eq!(read_records(&path)?, vec![emitted]);
        Ok(())
    }

    #[test]
    fn session_events_omit_the_analysis_id() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        writer.emit(SessionEvent::SessionReset, None, Value::Null)?;
        let raw: Value = serde_json::from_str(fs::read_to_string(&path)?.trim_end())?;
        assert_eq!(raw["type"], json!("session_reset"));
        assert!(raw.get("analysis_id").is_none());
        Ok(())
    }

    #[test]
    fn malformed_events_are_refused_without_writing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        assert!(writer
            .emit(SessionEvent::AnalysisCompleted, None, json!({}))
            .is_err());
        assert!(writer
            .emit(SessionEvent::ImageSelected, None, json!(["compass.png"]))
            .is_err());
        assert!(writer
            .emit(SessionEvent::ModelChanged, None, json!({"session_id": "other"}))
            .is_err());
        assert!(!path.exists());

        let first = writer.emit(SessionEvent::SessionStarted, None, json!({}))?;
        assert_eq!(first.seq, 0);
        Ok(())
    }

    #[test]
    fn clones_share_the_sequence() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");
        let clone = writer.clone();

        writer.emit(SessionEvent::SessionStarted, None, json!({"model": "m"}))?;
        clone.emit(
            SessionEvent::AnalysisStarted,
            Some("analysis-1"),
            json!({"model": "m"}),
        )?;

        let records = read_records(&path)?;
        let seqs: Vec<u64> = records.iter().map(|record| record.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
        assert_eq!(records[1].event, SessionEvent::AnalysisStarted);
        assert_eq!(records[1].details["model"], json!("m"));
        Ok(())
    }
}

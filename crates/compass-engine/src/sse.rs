use std::io::{self, BufRead};

use compass_contracts::analysis::AnalysisError;
use serde_json::Value;

const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "IMAGE_SAFETY",
];

/// What one event payload carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventChunk {
    /// Joined non-thought text, `None` when the chunk had none.
    pub text: Option<String>,
    /// A candidate reported a `finishReason`.
    pub finished: bool,
}

pub(crate) fn ended_early() -> AnalysisError {
    AnalysisError::malformed("Gemini stream ended before a finish reason")
}

/// Pull-based reader over a `text/event-stream` body.
///
/// Each `data:` event is one Gemini response chunk. Yields the non-empty text
/// fragments in arrival order, then stops after the first error. A body that
/// closes before any chunk reported a finish reason ends with a malformed
/// response error instead of passing for a complete report.
pub struct SseFragmentStream<R> {
    reader: R,
    line: String,
    data: String,
    saw_finish: bool,
    done: bool,
}

impl<R: BufRead> SseFragmentStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            data: String::new(),
            saw_finish: false,
            done: false,
        }
    }

    fn dispatch(&mut self) -> Option<Result<String, AnalysisError>> {
        let payload = std::mem::take(&mut self.data);
        if payload.trim() == "[DONE]" {
            self.done = true;
            return None;
        }
        match parse_event(&payload) {
            Ok(chunk) => {
                self.saw_finish |= chunk.finished;
                chunk.text.map(Ok)
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<R: BufRead> Iterator for SseFragmentStream<R> {
    type Item = Result<String, AnalysisError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    if !self.data.is_empty() {
                        if let Some(item) = self.dispatch() {
                            return Some(item);
                        }
                        continue;
                    }
                    self.done = true;
                    if self.saw_finish {
                        return None;
                    }
                    return Some(Err(ended_early()));
                }
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(read_error(err)));
                }
            }

            let line = self.line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if self.data.is_empty() {
                    continue;
                }
                if let Some(item) = self.dispatch() {
                    return Some(item);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            if let Some(value) = line.strip_prefix("data:") {
                let value = value.strip_prefix(' ').unwrap_or(value).to_string();
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(&value);
            }
        }
        None
    }
}

fn read_error(err: io::Error) -> AnalysisError {
    if err.kind() == io::ErrorKind::InvalidData {
        return AnalysisError::malformed(format!("Gemini stream was not valid UTF-8: {err}"));
    }
    AnalysisError::transport(format!("Gemini stream interrupted: {err}"))
}

/// Parses one event payload, a single chunk object or an array of them.
pub fn parse_event(payload: &str) -> Result<EventChunk, AnalysisError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() || trimmed == "[DONE]" {
        return Ok(EventChunk::default());
    }
    let parsed: Value = serde_json::from_str(trimmed).map_err(|err| {
        AnalysisError::malformed(format!("Gemini stream returned invalid JSON: {err}"))
    })?;
    match parsed {
        Value::Array(items) => {
            let mut text = String::new();
            let mut finished = false;
            for item in &items {
                let chunk = parse_chunk(item)?;
                finished |= chunk.finished;
                if let Some(fragment) = chunk.text {
                    text.push_str(&fragment);
                }
            }
            Ok(EventChunk {
                text: (!text.is_empty()).then_some(text),
                finished,
            })
        }
        other => parse_chunk(&other),
    }
}

fn parse_chunk(chunk: &Value) -> Result<EventChunk, AnalysisError> {
    let Some(object) = chunk.as_object() else {
        return Err(AnalysisError::malformed(
            "Gemini stream chunk was not a JSON object",
        ));
    };

    if let Some(error) = object.get("error") {
        return Err(remote_error(error));
    }

    let candidate = object
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|items| items.first());
    let finish_reason = candidate
        .and_then(|value| value.get("finishReason"))
        .and_then(Value::as_str);
    let mut text = String::new();
    if let Some(parts) = candidate
        .and_then(|value| value.get("content"))
        .and_then(|value| value.get("parts"))
        .and_then(Value::as_array)
    {
        for part in parts {
            if part.get("thought").and_then(Value::as_bool) == Some(true) {
                continue;
            }
            if let Some(value) = part.get("text").and_then(Value::as_str) {
                text.push_str(value);
            }
        }
    }
    if !text.is_empty() {
        return Ok(EventChunk {
            text: Some(text),
            finished: finish_reason.is_some(),
        });
    }

    if let Some(reason) = object
        .get("promptFeedback")
        .and_then(|value| value.get("blockReason"))
        .and_then(Value::as_str)
    {
        return Err(AnalysisError::remote(format!(
            "Gemini blocked the request: {reason}"
        )));
    }
    if let Some(reason) = finish_reason.filter(|reason| BLOCKING_FINISH_REASONS.contains(reason)) {
        return Err(AnalysisError::remote(format!(
            "Gemini stopped generating: {reason}"
        )));
    }
    Ok(EventChunk {
        text: None,
        finished: finish_reason.is_some(),
    })
}

pub(crate) fn remote_error(error: &Value) -> AnalysisError {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    match error.get("status").and_then(Value::as_str) {
        Some(status) => AnalysisError::remote(format!("Gemini error {status}: {message}")),
        None => AnalysisError::remote(format!("Gemini error: {message}")),
    }
}

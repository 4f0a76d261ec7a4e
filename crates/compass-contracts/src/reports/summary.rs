use std::path::Path;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::analysis::{AnalysisResult, AnalysisState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub analysis_id: String,
    pub model: String,
    pub image: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_sha256: Option<String>,
    pub state: AnalysisState,
    pub fragments: u64,
    pub chars: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
}

impl AnalysisSummary {
    pub fn from_result(
        result: &AnalysisResult,
        model: &str,
        image: &str,
        mime_type: &str,
        image_sha256: Option<&str>,
    ) -> Self {
        Self {
            analysis_id: result.id().to_string(),
            model: model.to_string(),
            image: image.to_string(),
            mime_type: mime_type.to_string(),
            image_sha256: image_sha256.map(str::to_string),
            state: result.state(),
            fragments: result.fragments(),
            chars: result.text().chars().count() as u64,
            started_at: result.started_at().map(str::to_string),
            finished_at: result.finished_at().map(str::to_string),
            error: result.error().map(|err| err.message().to_string()),
            report_path: None,
        }
    }
}

pub fn write_summary(
    path: &Path,
    summary: &AnalysisSummary,
    extra: Option<&Map<String, Value>>,
) -> anyhow::Result<()> {
    let mut payload = match serde_json::to_value(summary)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert("ts".to_string(), Value::String(now_utc_iso()));
    if let Some(extra) = extra {
        for (key, value) in extra {
            payload.insert(key.clone(), value.clone());
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(&Value::Object(payload))?)?;
    Ok(())
}

pub fn read_summary(path: &Path) -> anyhow::Result<AnalysisSummary> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid summary {}", path.display()))
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{read_summary, write_summary, AnalysisSummary};
    use crate::analysis::{AnalysisError, AnalysisResult, AnalysisState};

    #[test]
    fn write_summary_generates_expected_payload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("summary.json");

        let mut result = AnalysisResult::with_id("a-123");
        result.begin()?;
        result.append("Primary role: Coordinator")?;
        result.complete()?;
        let mut summary = AnalysisSummary::from_result(
            &result,
            "gemini-2.5-flash",
            "chart.png",
            "image/png",
            Some("abc123"),
        );
        summary.report_path = Some("report.txt".to_string());
        let mut extra = Map::new();
        extra.insert("extra_key".to_string(), Value::String("extra".to_string()));
        write_summary(&path, &summary, Some(&extra))?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(parsed["analysis_id"], json!("a-123"));
        assert_eq!(parsed["state"], json!("complete"));
        assert_eq!(parsed["fragments"], json!(1));
        assert_eq!(parsed["chars"], json!(25));
        assert_eq!(parsed["extra_key"], json!("extra"));
        assert!(parsed.get("error").is_none());
        assert!(parsed.get("ts").and_then(Value::as_str).is_some());

        let restored = read_summary(&path)?;
        assert_eq!(restored, summary);
        Ok(())
    }

    #[test]
    fn failed_summaries_carry_the_cause() -> anyhow::Result<()> {
        let mut result = AnalysisResult::new();
        result.begin()?;
        result.append("AB")?;
        result.fail(AnalysisError::remote("quota exceeded"))?;

        let summary =
            AnalysisSummary::from_result(&result, "gemini-2.5-flash", "c.jpg", "image/jpeg", None);
        assert_eq!(summary.state, AnalysisState::Failed);
        assert_eq!(summary.error.as_deref(), Some("quota exceeded"));
        assert_eq!(summary.chars, 2);
        Ok(())
    }
}

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::analysis::AnalysisResult;

pub const DEFAULT_REPORT_FILE_NAME: &str = "performance_compass_analysis.txt";

/// A directory target receives the default file name; anything else is used as-is.
pub fn resolve_report_path(target: &Path) -> PathBuf {
    if target.is_dir() {
        return target.join(DEFAULT_REPORT_FILE_NAME);
    }
    target.to_path_buf()
}

/// Writes the report buffer verbatim as UTF-8.
///
/// Returns `Ok(None)` without touching the filesystem unless the analysis is complete.
pub fn write_report(target: &Path, result: &AnalysisResult) -> anyhow::Result<Option<PathBuf>> {
    if !result.is_exportable() {
        return Ok(None);
    }
    let path = resolve_report_path(target);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(&path, result.text().as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(Some(path))
}

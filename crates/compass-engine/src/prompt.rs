use std::path::Path;

use anyhow::{bail, Context, Result};

/// Instruction sent alongside every compass image.
pub const DEFAULT_PROMPT: &str = "You are an expert in staff performance analysis and a specialist in the nine Belbin Team Roles. \
The attached image is a 'performance compass' for a caregiver working at a center for people with special needs. \
Analyze the image carefully. Based on the data and ratings visible in the image:
1. Summarize the caregiver's main strengths and weaknesses as clear bullet points.
2. Identify which of the nine team roles (for example Implementer, Coordinator, Plant, Resource Investigator) fits this caregiver best. You may name a primary and a secondary role.
3. Justify your choice of roles clearly, linking it to the data visible in the performance compass.
4. Propose practical, specific recommendations for developing the caregiver's performance based on the role analysis.";

/// Loads a replacement prompt. Blank files are rejected.
pub fn load_prompt_file(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading prompt file {}", path.display()))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("prompt file {} is empty", path.display());
    }
    Ok(trimmed.to_string())
}

use anyhow::Result;
use compass_contracts::analysis::{AnalysisError, AnalysisResult, AnalysisState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Fragment(String),
    Completed,
    Failed(AnalysisError),
    /// Nothing is streaming, so nothing was pulled.
    Inactive,
}

/// Applies one item pulled from a fragment stream. `None` means the stream is
/// exhausted.
pub fn apply_step(
    result: &mut AnalysisResult,
    next: Option<Result<String, AnalysisError>>,
) -> Result<StepOutcome> {
    if !result.is_streaming() {
        return Ok(StepOutcome::Inactive);
    }
    match next {
        Some(Ok(fragment)) => {
            result.append(&fragment)?;
            Ok(StepOutcome::Fragment(fragment))
        }
        Some(Err(err)) => {
            result.fail(err.clone())?;
            Ok(StepOutcome::Failed(err))
        }
        None => {
            result.complete()?;
            Ok(StepOutcome::Completed)
        }
    }
}

/// Drives `stream` to the end, appending each fragment to `result`.
///
/// `result` must be idle or already streaming; terminal results are never
/// resumed. `on_fragment` sees each fragment after it has been appended.
pub fn accumulate<I, F>(
    stream: I,
    result: &mut AnalysisResult,
    mut on_fragment: F,
) -> Result<AnalysisState>
where
    I: IntoIterator<Item = Result<String, AnalysisError>>,
    F: FnMut(&str, &AnalysisResult),
{
    if !result.is_streaming() {
        result.begin()?;
    }
    let mut stream = stream.into_iter();
    loop {
        match apply_step(result, stream.next())? {
            StepOutcome::Fragment(fragment) => on_fragment(&fragment, result),
            _ => return Ok(result.state()),
        }
    }
}

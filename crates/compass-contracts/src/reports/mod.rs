mod summary;
mod text;

pub use summary::{read_summary, write_summary, AnalysisSummary};
pub use text::{resolve_report_path, write_report, DEFAULT_REPORT_FILE_NAME};

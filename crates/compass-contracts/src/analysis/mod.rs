mod asset;
mod error;
mod result;

pub use asset::{AnalysisRequest, EncodedPayload, ImageAsset, ImageSource};
pub use error::{AnalysisError, AnalysisErrorKind};
pub use result::{AnalysisResult, AnalysisState};

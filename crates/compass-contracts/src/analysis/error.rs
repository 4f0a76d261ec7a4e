#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnalysisErrorKind {
    /// Rejected input (non-image file, nothing selected). Reported before any work.
    Validation,
    /// The image could not be read.
    Encoding,
    /// Network failure while sending or reading the stream.
    Transport,
    /// The service answered with an error, a non-2xx status, or blocked output.
    Remote,
    /// The stream could not be decoded.
    MalformedResponse,
    /// Missing credential or unusable configuration. Fatal at startup.
    Configuration,
}

impl AnalysisErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Encoding => "encoding",
            Self::Transport => "transport",
            Self::Remote => "remote",
            Self::MalformedResponse => "malformed_response",
            Self::Configuration => "configuration",
        }
    }

    fn fallback_message(&self) -> &'static str {
        match self {
            Self::Validation => "invalid input",
            Self::Encoding => "the image could not be read",
            Self::Transport => "the connection to the analysis service failed",
            Self::Remote => "the analysis service returned an error",
            Self::MalformedResponse => "the analysis service returned an unreadable response",
            Self::Configuration => "the analysis service is not configured",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisError {
    kind: AnalysisErrorKind,
    message: String,
}

impl AnalysisError {
    pub fn new(kind: AnalysisErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let trimmed = message.trim();
        let message = if trimmed.is_empty() {
            kind.fallback_message().to_string()
        } else {
            trimmed.to_string()
        };
        Self { kind, message }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::Validation, message)
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::Encoding, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::Transport, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::Remote, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::MalformedResponse, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::Configuration, message)
    }

    pub fn kind(&self) -> AnalysisErrorKind {
        self.kind
    }

    /// Human-readable cause. Never empty.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_analysis_failure(&self) -> bool {
        !matches!(
            self.kind,
            AnalysisErrorKind::Validation | AnalysisErrorKind::Configuration
        )
    }

    /// Short message for the user-visible layer.
    pub fn user_message(&self) -> String {
        if self.is_analysis_failure() {
            format!("Analysis failed: {}", self.message)
        } else {
            self.message.clone()
        }
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AnalysisError {}

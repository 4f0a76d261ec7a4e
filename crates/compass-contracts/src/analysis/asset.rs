use std::path::{Path, PathBuf};

/// Where the bytes of a selected image live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    /// Read lazily by the encoder; the file may disappear after selection.
    File(PathBuf),
}

/// A user-selected image: opaque content plus its declared MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    source: ImageSource,
    mime_type: String,
    display_name: String,
}

impl ImageAsset {
    pub fn from_bytes(
        bytes: impl Into<Vec<u8>>,
        mime_type: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            source: ImageSource::Bytes(bytes.into()),
            mime_type: normalize_mime(mime_type.into()),
            display_name: display_name.into(),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        let path = path.into();
        let display_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self {
            source: ImageSource::File(path),
            mime_type: normalize_mime(mime_type.into()),
            display_name,
        }
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            ImageSource::File(path) => Some(path.as_path()),
            ImageSource::Bytes(_) => None,
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/") && self.mime_type.len() > "image/".len()
    }
}

fn normalize_mime(raw: String) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Base64 image content without any `data:` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    data: String,
    sha256: String,
    byte_len: usize,
}

impl EncodedPayload {
    pub fn new(data: impl Into<String>, sha256: impl Into<String>, byte_len: usize) -> Self {
        Self {
            data: data.into(),
            sha256: sha256.into(),
            byte_len,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Hex SHA-256 of the raw (decoded) bytes.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_string(self) -> String {
        self.data
    }
}

/// One multimodal request. Built once and moved into the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub model: String,
    pub mime_type: String,
    pub payload: EncodedPayload,
    pub prompt: String,
}

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use compass_contracts::analysis::{EncodedPayload, ImageAsset, ImageSource};
use image::ImageFormat;
use sha2::{Digest, Sha256};

const FALLBACK_MIME: &str = "application/octet-stream";

/// Builds a file-backed asset. Bytes are not read until encoding.
pub fn image_asset_from_path(path: &Path) -> Result<ImageAsset> {
    let meta = fs::metadata(path).with_context(|| format!("failed reading {}", path.display()))?;
    if !meta.is_file() {
        bail!("{} is not a file", path.display());
    }
    Ok(ImageAsset::from_file(path, mime_for_path(path)))
}

/// Declared type of a file, taken from its extension only.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => return "image/png",
        "jpg" | "jpeg" => return "image/jpeg",
        "webp" => return "image/webp",
        "gif" => return "image/gif",
        "txt" | "md" => return "text/plain",
        "json" => return "application/json",
        "pdf" => return "application/pdf",
        _ => {}
    }
    ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or(FALLBACK_MIME)
}

pub fn encode_asset(asset: &ImageAsset) -> Result<EncodedPayload> {
    match asset.source() {
        ImageSource::Bytes(bytes) => Ok(encode_bytes(bytes)),
        ImageSource::File(path) => {
            let bytes =
                fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
            Ok(encode_bytes(&bytes))
        }
    }
}

/// Standard alphabet, padded, no data-URL prefix.
pub fn encode_bytes(bytes: &[u8]) -> EncodedPayload {
    EncodedPayload::new(
        BASE64.encode(bytes),
        hex::encode(Sha256::digest(bytes)),
        bytes.len(),
    )
}

/// Returns the text after the first comma of a `data:` URL, or the input unchanged.
pub fn payload_from_data_url(value: &str) -> &str {
    let trimmed = value.trim();
    if !trimmed.starts_with("data:") {
        return trimmed;
    }
    match trimmed.split_once(',') {
        Some((_, payload)) => payload,
        None => trimmed,
    }
}

pub fn to_data_url(asset: &ImageAsset) -> Result<String> {
    let payload = encode_asset(asset)?;
    Ok(format!(
        "data:{};base64,{}",
        asset.mime_type(),
        payload.as_str()
    ))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use compass_contracts::analysis::ImageAsset;

    use super::{
        encode_asset, encode_bytes, image_asset_from_path, mime_for_path, payload_from_data_url,
        to_data_url,
    };

    #[test]
    fn encoding_is_standard_padded_base64() {
        let payload = encode_bytes(b"compass");
        assert_eq!(payload.as_str(), "Y29tcGFzcw==");
        assert_eq!(payload.byte_len(), 7);
        assert_eq!(payload.sha256().len(), 64);

        let bytes: Vec<u8> = (0u8..=255).collect();
        let roundtrip = BASE64.decode(encode_bytes(&bytes).as_str()).unwrap();
        assert_eq!(roundtrip, bytes);
    }

    #[test]
    fn empty_input_encodes_to_empty_payload() {
        let payload = encode_bytes(&[]);
        assert!(payload.is_empty());
        assert_eq!(payload.byte_len(), 0);
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        assert_eq!(payload_from_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(payload_from_data_url("AAAA"), "AAAA");
        assert_eq!(payload_from_data_url("data:broken"), "data:broken");
    }

    #[test]
    fn mime_follows_the_extension() {
        assert_eq!(mime_for_path(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("a.bmp")), "image/bmp");
        assert_eq!(mime_for_path(Path::new("notes.txt")), "text/plain");
        assert_eq!(
            mime_for_path(Path::new("no_extension")),
            "application/octet-stream"
        );
    }

    #[test]
    fn file_assets_are_read_lazily() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("compass.png");
        std::fs::write(&path, [1u8, 2, 3])?;

        let asset = image_asset_from_path(&path)?;
        assert_eq!(asset.mime_type(), "image/png");
        assert_eq!(asset.display_name(), "compass.png");
        assert_eq!(encode_asset(&asset)?.as_str(), "AQID");

        std::fs::remove_file(&path)?;
        assert!(encode_asset(&asset).is_err());
        assert!(image_asset_from_path(&path).is_err());
        assert!(image_asset_from_path(temp.path()).is_err());
        Ok(())
    }

    #[test]
    fn data_url_carries_the_declared_type() -> anyhow::Result<()> {
        let asset = ImageAsset::from_bytes(vec![1u8, 2, 3], "image/webp", "c.webp");
        assert_eq!(to_data_url(&asset)?, "data:image/webp;base64,AQID");
        Ok(())
    }
}

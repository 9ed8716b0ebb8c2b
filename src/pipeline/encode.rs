//! Image encoding: image file → base64 payload for a vision request.
//!
//! Ollama-style backends accept images as plain base64 strings in the
//! request body. The bytes are passed through untouched — no decoding or
//! re-compression — so whatever the converter rasterised (lossless PNG)
//! reaches the model unchanged.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::debug;

/// Read an image file and base64-encode its raw bytes.
pub fn encode_image_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64", path.display(), b64.len());
    Ok(b64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_round_trips_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pixel.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nfake").unwrap();

        let b64 = encode_image_file(&path).expect("encode");
        let decoded = STANDARD.decode(&b64).expect("valid base64");
        assert_eq!(decoded, b"\x89PNG\r\n\x1a\nfake");
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(encode_image_file(Path::new("/no/such/image.png")).is_err());
    }
}

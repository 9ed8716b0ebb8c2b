//! Format classification: map a user-supplied path or URL to a processing
//! strategy.
//!
//! Classification touches filesystem metadata only (existence, is-dir) —
//! it never opens files or the network. Calling [`classify`] twice on the
//! same unchanged input yields the same descriptor.

use crate::config::InputKind;
use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions handled by the document-to-image collaborator.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "docx", "pptx"];

/// Extensions treated as standalone images (and matched when scanning
/// image directories).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Extensions handled by the audio transcriber.
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3"];

/// An input after classification. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDescriptor {
    /// The original path or URL as supplied by the caller.
    pub source: String,
    pub kind: InputKind,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Lower-cased extension of a path, if any.
fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Classify an input into an [`InputDescriptor`].
///
/// Decision rule, in priority order: URL scheme → `Url`; directory →
/// `ImageDirectory`; document extension → `Document`; image extension →
/// `Image`; audio extension → `Audio`. Anything else is
/// [`ExtractError::UnsupportedFormat`]; a non-URL path that does not exist
/// is [`ExtractError::InputNotFound`].
pub fn classify(input: &str) -> Result<InputDescriptor, ExtractError> {
    if is_url(input) {
        debug!("Classified as URL: {input}");
        return Ok(InputDescriptor {
            source: input.to_string(),
            kind: InputKind::Url,
        });
    }

    let path = PathBuf::from(input);
    if !path.exists() {
        return Err(ExtractError::InputNotFound { path });
    }

    if path.is_dir() {
        debug!("Classified as image directory: {input}");
        return Ok(InputDescriptor {
            source: input.to_string(),
            kind: InputKind::ImageDirectory,
        });
    }

    let ext = extension_of(&path);
    let kind = match ext.as_deref() {
        Some(e) if DOCUMENT_EXTENSIONS.contains(&e) => InputKind::Document,
        Some(e) if IMAGE_EXTENSIONS.contains(&e) => InputKind::Image,
        Some(e) if AUDIO_EXTENSIONS.contains(&e) => InputKind::Audio,
        _ => {
            return Err(ExtractError::UnsupportedFormat {
                input: input.to_string(),
                extension: ext,
            })
        }
    };

    debug!("Classified {input} as {kind}");
    Ok(InputDescriptor {
        source: input.to_string(),
        kind,
    })
}

/// Whether a directory entry counts as an image when scanning an
/// image-directory input.
pub fn has_image_extension(path: &Path) -> bool {
    matches!(extension_of(path).as_deref(), Some(e) if IMAGE_EXTENSIONS.contains(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn urls_win_over_everything() {
        let d = classify("https://example.com/report.pdf").expect("url");
        assert_eq!(d.kind, InputKind::Url);
        assert!(is_url("http://example.com"));
        assert!(!is_url("/tmp/report.pdf"));
    }

    #[test]
    fn files_classified_by_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, kind) in [
            ("a.pdf", InputKind::Document),
            ("b.DOCX", InputKind::Document),
            ("c.png", InputKind::Image),
            ("d.JPEG", InputKind::Image),
            ("e.wav", InputKind::Audio),
            ("f.mp3", InputKind::Audio),
        ] {
            let p = dir.path().join(name);
            fs::write(&p, b"x").unwrap();
            let d = classify(p.to_str().unwrap()).expect(name);
            assert_eq!(d.kind, kind, "{name}");
        }
    }

    #[test]
    fn directory_classified_as_image_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let d = classify(dir.path().to_str().unwrap()).expect("dir");
        assert_eq!(d.kind, InputKind::ImageDirectory);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let p = dir.path().join("notes.xyz");
        fs::write(&p, b"x").unwrap();
        let err = classify(p.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }));
    }

    #[test]
    fn missing_path_is_input_not_found() {
        let err = classify("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::InputNotFound { .. }));
    }

    #[test]
    fn classification_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let p = dir.path().join("scan.png");
        fs::write(&p, b"x").unwrap();
        let s = p.to_str().unwrap();
        assert_eq!(classify(s).unwrap(), classify(s).unwrap());
    }
}

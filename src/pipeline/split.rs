//! Unit splitting: convert a classified input into an ordered sequence of
//! processable units.
//!
//! ## Scratch ownership
//!
//! Document page images are rendered into a per-run `TempDir`, so two
//! concurrent runs can never share a temporary-file namespace. The
//! [`Scratch`] handle travels with the units through the pipeline and is
//! closed by the result builder on both success and failure paths; a
//! failed close is logged and never escalates. If conversion itself fails
//! the splitter drops the scratch before returning, so no partial
//! artifacts outlive the error.

use crate::classify::{has_image_extension, InputDescriptor};
use crate::config::InputKind;
use crate::convert_doc::DocumentConverter;
use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// What kind of unit this is; decides which extraction capabilities run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// A rasterised page of a document (temporary file).
    PageImage,
    /// A standalone image file.
    Image,
    /// An audio file to transcribe.
    AudioFile,
    /// A web page to fetch.
    Url,
}

impl UnitKind {
    /// Units that run the four vision capabilities.
    pub fn is_image_like(self) -> bool {
        matches!(self, UnitKind::PageImage | UnitKind::Image)
    }
}

/// One independently extractable piece of an input.
///
/// Created by the splitter; owned by the orchestrator for the duration of
/// extraction. `temporary` units live in the run's scratch directory.
#[derive(Debug, Clone)]
pub struct ProcessableUnit {
    /// 0-based index; defines the ordering of results.
    pub index: usize,
    pub kind: UnitKind,
    /// Path or URL of this unit.
    pub location: String,
    /// True when the file lives in the run scratch and is deleted at run end.
    pub temporary: bool,
}

impl ProcessableUnit {
    /// Display name used in per-unit reports (`page_001.png`, file name,
    /// or the URL itself).
    pub fn name(&self) -> String {
        match self.kind {
            UnitKind::Url => self.location.clone(),
            _ => Path::new(&self.location)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.location.clone()),
        }
    }
}

/// Handle to the run's temporary artifacts.
///
/// `None` for formats that create no temp files. Dropping it removes the
/// directory; [`Scratch::close`] does the same but logs failures.
#[derive(Debug, Default)]
pub struct Scratch {
    dir: Option<TempDir>,
}

impl Scratch {
    fn new(dir: TempDir) -> Self {
        Self { dir: Some(dir) }
    }

    /// Delete the scratch directory, logging (never propagating) failures.
    pub fn close(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to clean up scratch dir {}: {e}", path.display());
            } else {
                debug!("Cleaned up scratch dir {}", path.display());
            }
        }
    }

    /// Path of the scratch directory, if one exists.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path())
    }
}

/// The splitter's output: ordered units plus the scratch that owns any
/// temporary files among them.
#[derive(Debug)]
pub struct SplitOutput {
    pub units: Vec<ProcessableUnit>,
    pub scratch: Scratch,
}

/// Split a classified input into ordered processable units.
///
/// Only `Document` inputs touch the converter collaborator; every other
/// format is resolved from filesystem metadata alone.
pub async fn split(
    descriptor: &InputDescriptor,
    converter: &dyn DocumentConverter,
) -> Result<SplitOutput, ExtractError> {
    match descriptor.kind {
        InputKind::Document => split_document(descriptor, converter).await,
        InputKind::Image => Ok(single_unit(descriptor, UnitKind::Image)),
        InputKind::ImageDirectory => split_directory(descriptor),
        InputKind::Audio => Ok(single_unit(descriptor, UnitKind::AudioFile)),
        InputKind::Url => Ok(single_unit(descriptor, UnitKind::Url)),
    }
}

fn single_unit(descriptor: &InputDescriptor, kind: UnitKind) -> SplitOutput {
    SplitOutput {
        units: vec![ProcessableUnit {
            index: 0,
            kind,
            location: descriptor.source.clone(),
            temporary: false,
        }],
        scratch: Scratch::default(),
    }
}

async fn split_document(
    descriptor: &InputDescriptor,
    converter: &dyn DocumentConverter,
) -> Result<SplitOutput, ExtractError> {
    let doc_path = PathBuf::from(&descriptor.source);

    let scratch_dir = TempDir::with_prefix("extract2json_")
        .map_err(|e| ExtractError::Internal(format!("failed to create scratch dir: {e}")))?;

    let pages = match converter.convert(&doc_path, scratch_dir.path()).await {
        Ok(pages) => pages,
        Err(e) => {
            // Dropping the TempDir removes whatever the converter already
            // wrote; nothing partial stays registered.
            drop(scratch_dir);
            return Err(ExtractError::ConversionFailure {
                path: doc_path,
                detail: e.to_string(),
            });
        }
    };

    if pages.is_empty() {
        drop(scratch_dir);
        return Err(ExtractError::ConversionFailure {
            path: doc_path,
            detail: "converter returned no pages".into(),
        });
    }

    info!("Document split into {} page images", pages.len());

    let units = pages
        .iter()
        .enumerate()
        .map(|(index, page)| ProcessableUnit {
            index,
            kind: UnitKind::PageImage,
            location: page.to_string_lossy().into_owned(),
            temporary: true,
        })
        .collect();

    Ok(SplitOutput {
        units,
        scratch: Scratch::new(scratch_dir),
    })
}

fn split_directory(descriptor: &InputDescriptor) -> Result<SplitOutput, ExtractError> {
    let dir = PathBuf::from(&descriptor.source);

    let mut images: Vec<PathBuf> = std::fs::read_dir(&dir)
        .map_err(|e| ExtractError::Internal(format!("failed to read {}: {e}", dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();

    // Lexicographic order keeps result order deterministic across runs and
    // platforms; read_dir order is neither.
    images.sort();

    if images.is_empty() {
        return Err(ExtractError::NoUnits {
            input: descriptor.source.clone(),
        });
    }

    debug!("Found {} images in {}", images.len(), dir.display());

    let units = images
        .iter()
        .enumerate()
        .map(|(index, path)| ProcessableUnit {
            index,
            kind: UnitKind::Image,
            location: path.to_string_lossy().into_owned(),
            temporary: false,
        })
        .collect();

    Ok(SplitOutput {
        units,
        scratch: Scratch::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert_doc::ConverterError;
    use async_trait::async_trait;
    use std::fs;

    struct FakeConverter {
        pages: usize,
        fail: bool,
    }

    #[async_trait]
    impl DocumentConverter for FakeConverter {
        async fn convert(
            &self,
            _document: &Path,
            out_dir: &Path,
        ) -> Result<Vec<PathBuf>, ConverterError> {
            if self.fail {
                // Simulate a converter that wrote partial output before dying.
                fs::write(out_dir.join("page_001.png"), b"partial").unwrap();
                return Err(ConverterError::NoPages {
                    out_dir: out_dir.to_path_buf(),
                });
            }
            let mut pages = Vec::new();
            for i in 0..self.pages {
                let p = out_dir.join(format!("page_{:03}.png", i + 1));
                fs::write(&p, b"png").unwrap();
                pages.push(p);
            }
            Ok(pages)
        }
    }

    fn descriptor(source: &str, kind: InputKind) -> InputDescriptor {
        InputDescriptor {
            source: source.to_string(),
            kind,
        }
    }

    #[tokio::test]
    async fn document_split_yields_ordered_temporary_units() {
        let conv = FakeConverter {
            pages: 3,
            fail: false,
        };
        let out = split(&descriptor("report.pdf", InputKind::Document), &conv)
            .await
            .expect("split");

        assert_eq!(out.units.len(), 3);
        for (i, unit) in out.units.iter().enumerate() {
            assert_eq!(unit.index, i);
            assert_eq!(unit.kind, UnitKind::PageImage);
            assert!(unit.temporary);
        }
        assert_eq!(out.units[1].name(), "page_002.png");
        assert!(out.scratch.path().is_some());
    }

    #[tokio::test]
    async fn failed_conversion_leaves_no_scratch_behind() {
        let conv = FakeConverter {
            pages: 0,
            fail: true,
        };
        let err = split(&descriptor("report.pdf", InputKind::Document), &conv)
            .await
            .expect_err("must fail");
        assert!(matches!(err, ExtractError::ConversionFailure { .. }));
        // The TempDir was dropped inside split; nothing to assert beyond
        // the error shape — the partial page died with the directory.
    }

    #[tokio::test]
    async fn directory_split_is_lexicographic_and_skips_non_images() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.png", "a.jpg", "c.jpeg", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let conv = FakeConverter {
            pages: 0,
            fail: false,
        };
        let out = split(
            &descriptor(dir.path().to_str().unwrap(), InputKind::ImageDirectory),
            &conv,
        )
        .await
        .expect("split");

        let names: Vec<String> = out.units.iter().map(|u| u.name()).collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.jpeg"]);
        assert!(out.units.iter().all(|u| !u.temporary));
    }

    #[tokio::test]
    async fn empty_directory_is_no_units() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conv = FakeConverter {
            pages: 0,
            fail: false,
        };
        let err = split(
            &descriptor(dir.path().to_str().unwrap(), InputKind::ImageDirectory),
            &conv,
        )
        .await
        .expect_err("must fail");
        assert!(matches!(err, ExtractError::NoUnits { .. }));
    }

    #[tokio::test]
    async fn single_unit_formats() {
        let conv = FakeConverter {
            pages: 0,
            fail: false,
        };
        for (kind, unit_kind) in [
            (InputKind::Image, UnitKind::Image),
            (InputKind::Audio, UnitKind::AudioFile),
            (InputKind::Url, UnitKind::Url),
        ] {
            let out = split(&descriptor("thing", kind), &conv).await.expect("split");
            assert_eq!(out.units.len(), 1);
            assert_eq!(out.units[0].index, 0);
            assert_eq!(out.units[0].kind, unit_kind);
            assert!(!out.units[0].temporary);
        }
    }

    #[test]
    fn scratch_close_is_idempotent() {
        let mut scratch = Scratch::new(TempDir::new().expect("tempdir"));
        let path = scratch.path().unwrap().to_path_buf();
        scratch.close();
        assert!(!path.exists());
        scratch.close(); // second close is a no-op
    }
}

//! Document-to-image collaborator: turn a pdf/docx/pptx into an ordered
//! set of page images.
//!
//! The core pipeline only depends on the [`DocumentConverter`] trait; the
//! default implementation shells out to external binaries (`pdftoppm` for
//! PDFs, `libreoffice --headless` to get office formats to PDF first).
//! Keeping rasterisation out of process means no native PDF library is
//! linked and the converter can be swapped per deployment.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors from the document conversion collaborator.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// The converter binary could not be spawned.
    #[error("failed to run '{binary}': {detail}")]
    Spawn { binary: String, detail: String },

    /// The converter ran but exited with a failure status.
    #[error("'{binary}' exited with {status}: {stderr}")]
    Failed {
        binary: String,
        status: String,
        stderr: String,
    },

    /// The converter produced no page images.
    #[error("conversion produced no page images in '{out_dir}'")]
    NoPages { out_dir: PathBuf },

    /// Filesystem error while collecting pages.
    #[error("io error during conversion: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts one document into an ordered list of page image paths.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Render `document` into page images under `out_dir`.
    ///
    /// Returned paths are ordered by page number and named
    /// `page_001.png`, `page_002.png`, … so lexicographic order equals
    /// page order.
    async fn convert(&self, document: &Path, out_dir: &Path)
        -> Result<Vec<PathBuf>, ConverterError>;
}

/// Default converter: `pdftoppm` for PDFs, with a `libreoffice` pre-pass
/// for office formats.
#[derive(Debug, Default)]
pub struct PdftoppmConverter {
    /// Rasterisation resolution passed to pdftoppm. 150 is sharp enough
    /// for vision models while keeping images small.
    pub dpi: u32,
}

impl PdftoppmConverter {
    pub fn new() -> Self {
        Self { dpi: 150 }
    }

    async fn pdf_to_images(
        &self,
        pdf: &Path,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let prefix = out_dir.join("raw");
        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.max(72).to_string())
            .arg(pdf)
            .arg(&prefix)
            .output()
            .await
            .map_err(|e| ConverterError::Spawn {
                binary: "pdftoppm".into(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ConverterError::Failed {
                binary: "pdftoppm".into(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        // pdftoppm emits raw-1.png, raw-2.png, … zero-padded to the page
        // count's width. Collect, sort, and rename to a fixed-width scheme
        // so downstream ordering never depends on pdftoppm's padding.
        let mut produced: Vec<PathBuf> = std::fs::read_dir(out_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("raw") && n.ends_with(".png"))
            })
            .collect();
        produced.sort();

        if produced.is_empty() {
            return Err(ConverterError::NoPages {
                out_dir: out_dir.to_path_buf(),
            });
        }

        let mut pages = Vec::with_capacity(produced.len());
        for (i, raw) in produced.iter().enumerate() {
            let page = out_dir.join(format!("page_{:03}.png", i + 1));
            std::fs::rename(raw, &page)?;
            pages.push(page);
        }

        debug!("Rasterised {} pages from {}", pages.len(), pdf.display());
        Ok(pages)
    }

    async fn office_to_pdf(&self, doc: &Path, out_dir: &Path) -> Result<PathBuf, ConverterError> {
        let output = Command::new("libreoffice")
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(out_dir)
            .arg(doc)
            .output()
            .await
            .map_err(|e| ConverterError::Spawn {
                binary: "libreoffice".into(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ConverterError::Failed {
                binary: "libreoffice".into(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stem = doc
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let pdf = out_dir.join(format!("{stem}.pdf"));
        if !pdf.exists() {
            return Err(ConverterError::NoPages {
                out_dir: out_dir.to_path_buf(),
            });
        }
        Ok(pdf)
    }
}

#[async_trait]
impl DocumentConverter for PdftoppmConverter {
    async fn convert(
        &self,
        document: &Path,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        info!("Converting document to images: {}", document.display());

        let is_pdf = document
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            self.pdf_to_images(document, out_dir).await
        } else {
            let pdf = self.office_to_pdf(document, out_dir).await?;
            let pages = self.pdf_to_images(&pdf, out_dir).await;
            // Intermediate PDF is scratch-local; failure to remove it is
            // harmless since the whole directory is deleted at run end.
            std::fs::remove_file(&pdf).ok();
            pages
        }
    }
}

//! Document conversion: text extraction, office-to-PDF rendition and page
//! rasterization for uploaded resumes.

pub mod docx;
pub mod office;
pub mod pdf;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ConversionConfig;
use crate::error::ConversionError;

/// Upload formats the service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Doc,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "doc" => Some(Self::Doc),
            _ => None,
        }
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Maps a declared MIME type (parameters ignored) to a format.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            "application/msword" => Some(Self::Doc),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Doc => "doc",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Self::Doc => "application/msword",
        }
    }

    /// Word-family sources need a PDF rendition before they can be rasterized.
    pub fn is_word_family(&self) -> bool {
        matches!(self, Self::Docx | Self::Doc)
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// One rendered page, encoded and ready for upload to a vision model.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based page number within the source PDF.
    pub page_number: u32,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

pub trait DocumentConverter: Send + Sync {
    /// Extracts plain text from `path`, declared as `format`.
    fn extract_text(&self, path: &Path, format: DocumentFormat) -> Result<String, ConversionError>;

    /// Writes a PDF rendition of a word-family document into `out_dir` and
    /// returns its path. The caller owns the returned file.
    fn convert_to_pdf(
        &self,
        path: &Path,
        format: DocumentFormat,
        out_dir: &Path,
    ) -> Result<PathBuf, ConversionError>;

    /// Renders every page of a PDF, in page order.
    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<PageImage>, ConversionError>;
}

/// Converter backed by lopdf, zip/quick-xml, poppler's `pdftoppm` and
/// optionally LibreOffice.
pub struct LocalConverter {
    config: ConversionConfig,
}

impl LocalConverter {
    pub fn new(config: ConversionConfig) -> Self {
        Self { config }
    }
}

impl DocumentConverter for LocalConverter {
    fn extract_text(&self, path: &Path, format: DocumentFormat) -> Result<String, ConversionError> {
        let _span = tracing::info_span!("processor.extract_text", format = %format).entered();

        match format {
            DocumentFormat::Pdf => pdf::extract_text(path),
            DocumentFormat::Docx => docx::extract_text(path),
            DocumentFormat::Doc => {
                let soffice = self.config.soffice_path.as_deref().ok_or_else(|| {
                    ConversionError::Unsupported(
                        "Legacy .doc files require LibreOffice (conversion.soffice_path)"
                            .to_string(),
                    )
                })?;
                let scratch = tempfile::tempdir().map_err(|e| ConversionError::ReadDocument {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                let rendition = office::convert_with_soffice(soffice, path, scratch.path())?;
                pdf::extract_text(&rendition)
            }
        }
    }

    fn convert_to_pdf(
        &self,
        path: &Path,
        format: DocumentFormat,
        out_dir: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let _span = tracing::info_span!("processor.convert_to_pdf", format = %format).entered();

        if !format.is_word_family() {
            return Err(ConversionError::Unsupported(format!(
                "{} documents do not need a PDF rendition",
                format
            )));
        }

        if let Some(soffice) = self.config.soffice_path.as_deref() {
            return office::convert_with_soffice(soffice, path, out_dir);
        }

        match format {
            DocumentFormat::Docx => {
                let text = docx::extract_text(path)?;
                let pdf_bytes = docx::render_text_pdf(&text)?;
                let out_path = out_dir.join(format!("rendition-{}.pdf", uuid::Uuid::new_v4()));
                std::fs::write(&out_path, pdf_bytes).map_err(|e| {
                    ConversionError::Office(format!("Failed to write PDF rendition: {}", e))
                })?;
                Ok(out_path)
            }
            _ => Err(ConversionError::Unsupported(
                "Legacy .doc files require LibreOffice (conversion.soffice_path)".to_string(),
            )),
        }
    }

    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<PageImage>, ConversionError> {
        let _span = tracing::info_span!("processor.rasterize").entered();
        pdf::rasterize(pdf_path, &self.config)
    }
}

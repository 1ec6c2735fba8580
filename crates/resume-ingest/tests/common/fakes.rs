//! Deterministic stand-ins for document conversion and model calls.
//!
//! File contents steer the fakes:
//! - text extraction returns the file contents verbatim, unless they start
//!   with `corrupt`
//! - rasterization fails when the PDF contents contain `no-pages`
//! - the text backend answers `{"name": <text>}`

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use async_trait::async_trait;

use resume_ingest::error::ConversionError;
use resume_ingest::extraction::{ExtractionBackend, ExtractionError, ExtractionInput, FieldSchema};
use resume_ingest::processor::{DocumentConverter, DocumentFormat, PageImage};
use resume_ingest::Strategy;

/// Blocks callers of `wait` until `open` is called.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
    }
}

#[derive(Default)]
pub struct FakeConverter {
    gate: Option<Arc<Gate>>,
}

impl FakeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every text extraction waits for `gate` first.
    pub fn gated(gate: Arc<Gate>) -> Self {
        Self { gate: Some(gate) }
    }
}

impl DocumentConverter for FakeConverter {
    fn extract_text(&self, path: &Path, _format: DocumentFormat) -> Result<String, ConversionError> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConversionError::ReadDocument {
            path: path.to_path_buf(),
            source,
        })?;
        if text.starts_with("corrupt") {
            return Err(ConversionError::Docx("invalid zip archive".to_string()));
        }
        Ok(text)
    }

    fn convert_to_pdf(
        &self,
        path: &Path,
        _format: DocumentFormat,
        out_dir: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let out = out_dir.join(format!("rendition-{}.pdf", uuid::Uuid::new_v4()));
        std::fs::copy(path, &out).map_err(|source| ConversionError::ReadDocument {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(out)
    }

    fn rasterize(&self, pdf_path: &Path) -> Result<Vec<PageImage>, ConversionError> {
        let contents = std::fs::read(pdf_path).map_err(|source| ConversionError::ReadDocument {
            path: pdf_path.to_path_buf(),
            source,
        })?;
        if String::from_utf8_lossy(&contents).contains("no-pages") {
            return Err(ConversionError::Rasterize("pdftoppm not found".to_string()));
        }
        Ok(vec![PageImage {
            page_number: 1,
            mime_type: "image/png",
            bytes: contents,
        }])
    }
}

pub struct FakeBackend {
    /// Raw answer to vision calls; `None` fails them.
    vision: Option<String>,
    text_enabled: bool,
    calls: Mutex<Vec<Strategy>>,
}

impl FakeBackend {
    pub fn text_only() -> Self {
        Self {
            vision: None,
            text_enabled: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_vision(answer: &str) -> Self {
        Self {
            vision: Some(answer.to_string()),
            ..Self::text_only()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            vision: None,
            text_enabled: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Strategy> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionBackend for FakeBackend {
    async fn extract(
        &self,
        input: ExtractionInput<'_>,
        _schema: &FieldSchema,
    ) -> Result<String, ExtractionError> {
        self.calls.lock().unwrap().push(input.strategy());
        let unavailable = || ExtractionError::Status {
            status: 503,
            body: "deployment overloaded".to_string(),
        };
        match input {
            ExtractionInput::Pages(_) => self.vision.clone().ok_or_else(unavailable),
            ExtractionInput::Text(text) if self.text_enabled => Ok(format!(
                "```json\n{}\n```",
                serde_json::json!({
                    "name": text.trim(),
                    "professional_experience": ["Led the migration"],
                })
            )),
            ExtractionInput::Text(_) => Err(unavailable()),
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

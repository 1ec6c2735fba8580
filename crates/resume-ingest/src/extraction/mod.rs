//! Remote structured-field extraction.
//!
//! An [`ExtractionBackend`] turns resume text or page images into raw model
//! output that is expected to contain a JSON object. Parsing that output is
//! the normalizer's job, not the backend's.

pub mod azure;
pub mod error;
pub mod prompts;
pub mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::processor::PageImage;

pub use azure::{AzureOpenAiBackend, RequestSettings};
pub use error::ExtractionError;
pub use prompts::FieldSchema;

/// How a resume is presented to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Page images of the rendered document.
    Vision,
    /// Plain text extracted from the original file.
    Text,
}

impl Strategy {
    pub fn from_use_vision(use_vision: bool) -> Self {
        if use_vision {
            Self::Vision
        } else {
            Self::Text
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of one extraction call.
#[derive(Debug, Clone, Copy)]
pub enum ExtractionInput<'a> {
    Text(&'a str),
    Pages(&'a [PageImage]),
}

impl ExtractionInput<'_> {
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Text(_) => Strategy::Text,
            Self::Pages(_) => Strategy::Vision,
        }
    }
}

#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Sends `input` with the field schema and returns the model's raw text.
    async fn extract(
        &self,
        input: ExtractionInput<'_>,
        schema: &FieldSchema,
    ) -> Result<String, ExtractionError>;

    fn name(&self) -> &str;
}

/// Stand-in used when no endpoint or API key is configured; every call fails
/// with [`ExtractionError::NotConfigured`].
pub struct UnconfiguredBackend;

#[async_trait]
impl ExtractionBackend for UnconfiguredBackend {
    async fn extract(
        &self,
        _input: ExtractionInput<'_>,
        _schema: &FieldSchema,
    ) -> Result<String, ExtractionError> {
        Err(ExtractionError::NotConfigured)
    }

    fn name(&self) -> &str {
        "unconfigured"
    }
}

use thiserror::Error;

use crate::error::ConversionError;
use crate::extraction::ExtractionError;
use crate::normalize::NormalizeError;
use crate::registry::RegistryError;

/// Fatal failure of one file. The message is what clients see.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Document processing failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Resume extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Resume parsing failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Task bookkeeping failed: {0}")]
    Registry(#[from] RegistryError),
}

/// A recoverable failure that downgraded the strategy.
#[derive(Debug, Clone)]
pub struct PipelineWarning {
    pub step: &'static str,
    pub reason: String,
}

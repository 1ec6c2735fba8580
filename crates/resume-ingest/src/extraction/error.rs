use std::time::Duration;

use thiserror::Error;

use super::Strategy;

/// Failures of a remote extraction call.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extraction backend is not configured (missing endpoint or API key)")]
    NotConfigured,

    #[error("Request to extraction backend failed: {0}")]
    Transport(String),

    #[error("Extraction backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{strategy} extraction timed out after {}s", .after.as_secs())]
    Timeout { strategy: Strategy, after: Duration },

    #[error("Extraction backend returned an empty response")]
    EmptyResponse,

    #[error("Extraction backend returned an unreadable response: {0}")]
    InvalidResponse(String),
}

impl ExtractionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

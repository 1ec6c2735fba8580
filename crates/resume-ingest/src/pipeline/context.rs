use std::path::PathBuf;

use crate::extraction::Strategy;
use crate::processor::PageImage;
use crate::worker::job::SourceFile;

use super::artifacts::ArtifactGuard;
use super::error::PipelineWarning;

/// State of one file moving through the pipeline.
pub struct PipelineContext {
    // Input
    pub task_id: String,
    pub source: SourceFile,
    pub strategy_requested: Strategy,

    /// Downgraded to text by any recoverable failure.
    pub strategy_used: Strategy,

    // Step 1 result: the PDF to rasterize (the source or a rendition)
    pub pdf_path: Option<PathBuf>,

    // Step 2 result
    pub pages: Vec<PageImage>,

    /// Intermediate files created for this file only.
    pub artifacts: ArtifactGuard,

    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(task_id: impl Into<String>, source: SourceFile, strategy: Strategy) -> Self {
        Self {
            task_id: task_id.into(),
            source,
            strategy_requested: strategy,
            strategy_used: strategy,
            pdf_path: None,
            pages: Vec::new(),
            artifacts: ArtifactGuard::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.strategy_used != self.strategy_requested
    }
}

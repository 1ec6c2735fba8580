use std::path::PathBuf;

use crate::extraction::Strategy;
use crate::processor::DocumentFormat;

/// An uploaded file stored in the upload directory. The job owns it.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Client-supplied name, for display and history only.
    pub filename: String,
    pub format: DocumentFormat,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub enum JobKind {
    Single(SourceFile),
    Batch(Vec<SourceFile>),
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub strategy: Strategy,
    pub user_id: Option<String>,
}

impl Job {
    pub fn single(source: SourceFile, strategy: Strategy, user_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: JobKind::Single(source),
            strategy,
            user_id,
        }
    }

    pub fn batch(sources: Vec<SourceFile>, strategy: Strategy, user_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: JobKind::Batch(sources),
            strategy,
            user_id,
        }
    }

    pub fn files(&self) -> &[SourceFile] {
        match &self.kind {
            JobKind::Single(source) => std::slice::from_ref(source),
            JobKind::Batch(sources) => sources,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self.kind, JobKind::Batch(_))
    }
}

//! Submission and query surface used by the HTTP layer.
//!
//! Submissions are validated before anything touches the disk, stored in
//! the upload directory, registered as pending tasks and queued on the
//! worker pool. A full queue rolls the submission back.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tempfile::TempPath;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::db::{history_repo, Database, HistoryDetail, HistorySummary};
use crate::error::{IngestError, Result, ValidationError};
use crate::extraction::{ExtractionBackend, Strategy};
use crate::pipeline::{ArtifactGuard, Pipeline, PipelineConfig};
use crate::processor::{DocumentConverter, DocumentFormat};
use crate::registry::{
    ProgressView, RegistryCounts, TaskEvent, TaskKind, TaskRegistry, TaskSnapshot, TaskStatus,
};
use crate::worker::{Job, SourceFile, WorkerPool};

/// One file as received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            bytes,
        }
    }

    /// Checks extension and content type against the allow-list. A missing
    /// content type is inferred from the file name.
    pub fn validate(&self) -> std::result::Result<DocumentFormat, ValidationError> {
        let format = DocumentFormat::from_filename(&self.filename).ok_or_else(|| {
            ValidationError::UnsupportedExtension {
                filename: self.filename.clone(),
            }
        })?;

        let content_type = match self.content_type.as_deref().map(str::trim) {
            Some(declared) if !declared.is_empty() => declared.to_string(),
            _ => mime_guess::from_path(&self.filename)
                .first_raw()
                .unwrap_or_default()
                .to_string(),
        };
        if DocumentFormat::from_mime(&content_type).is_none() {
            return Err(ValidationError::UnsupportedContentType {
                filename: self.filename.clone(),
                content_type,
            });
        }

        if self.bytes.is_empty() {
            return Err(ValidationError::EmptyFile {
                filename: self.filename.clone(),
            });
        }

        Ok(format)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub task_id: String,
    pub status: TaskStatus,
    pub method: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub workers: usize,
    pub queued_jobs: usize,
    pub tasks: RegistryCounts,
    pub extraction_backend: String,
}

pub struct IngestService {
    registry: Arc<TaskRegistry>,
    pool: WorkerPool,
    db: Database,
    upload_directory: PathBuf,
    backend_name: String,
}

impl IngestService {
    /// Builds the registry, pipeline and worker pool from `config`.
    pub fn start(
        config: &Config,
        db: Database,
        converter: Arc<dyn DocumentConverter>,
        backend: Arc<dyn ExtractionBackend>,
        runtime: Handle,
    ) -> Result<Self> {
        let upload_directory = config.upload_directory();
        std::fs::create_dir_all(&upload_directory).map_err(|source| IngestError::StoreUpload {
            path: upload_directory.clone(),
            source,
        })?;

        let registry = Arc::new(TaskRegistry::new());
        let backend_name = backend.name().to_string();
        let pipeline = Pipeline::new(
            Arc::new(PipelineConfig::from_config(config)),
            converter,
            backend,
            Arc::new(db.clone()),
            Arc::clone(&registry),
            runtime,
        );
        let pool = WorkerPool::new(Arc::new(pipeline), config.worker_count, config.queue_capacity)?;

        log::info!(
            "Ingest service ready (uploads in {}, backend {})",
            upload_directory.display(),
            backend_name
        );

        Ok(Self {
            registry,
            pool,
            db,
            upload_directory,
            backend_name,
        })
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn submit_single(
        &self,
        upload: UploadedFile,
        use_vision: bool,
        user_id: Option<String>,
    ) -> Result<SubmissionReceipt> {
        let format = upload.validate()?;
        let strategy = Strategy::from_use_vision(use_vision);

        let mut stored = ArtifactGuard::new();
        let source = self.store(&upload, format, &mut stored)?;
        let job = Job::single(source, strategy, user_id.clone());

        self.enqueue(job, TaskKind::Single, user_id, stored)
    }

    /// Validates every file before storing any of them.
    pub fn submit_batch(
        &self,
        uploads: Vec<UploadedFile>,
        use_vision: bool,
        user_id: Option<String>,
    ) -> Result<SubmissionReceipt> {
        if uploads.is_empty() {
            return Err(ValidationError::NoFiles.into());
        }
        let formats = uploads
            .iter()
            .map(UploadedFile::validate)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let strategy = Strategy::from_use_vision(use_vision);

        let mut stored = ArtifactGuard::new();
        let mut sources = Vec::with_capacity(uploads.len());
        for (upload, format) in uploads.iter().zip(formats) {
            sources.push(self.store(upload, format, &mut stored)?);
        }
        let total = sources.len();
        let job = Job::batch(sources, strategy, user_id.clone());

        self.enqueue(
            job,
            TaskKind::Batch {
                total,
                processed: 0,
            },
            user_id,
            stored,
        )
    }

    fn enqueue(
        &self,
        job: Job,
        kind: TaskKind,
        user_id: Option<String>,
        mut stored: ArtifactGuard,
    ) -> Result<SubmissionReceipt> {
        let task_id = job.id.clone();
        let strategy = job.strategy;
        self.registry
            .create(TaskSnapshot::pending(&task_id, kind, strategy, user_id))?;

        if let Err((e, _job)) = self.pool.try_submit(job) {
            log::warn!("Rejected task {}: {}", task_id, e);
            self.registry.remove(&task_id);
            stored.release();
            return Err(e.into());
        }
        // The queued job owns its files from here on.
        stored.disarm();

        log::info!("Queued task {} ({:?}, {})", task_id, kind, strategy);
        Ok(SubmissionReceipt {
            task_id,
            status: TaskStatus::Pending,
            method: strategy,
            total_files: match kind {
                TaskKind::Single => None,
                TaskKind::Batch { total, .. } => Some(total),
            },
        })
    }

    fn store(
        &self,
        upload: &UploadedFile,
        format: DocumentFormat,
        stored: &mut ArtifactGuard,
    ) -> Result<SourceFile> {
        let file = write_upload(&self.upload_directory, format, &upload.bytes).map_err(|source| {
            IngestError::StoreUpload {
                path: self.upload_directory.clone(),
                source,
            }
        })?;
        let path = file.to_path_buf();
        stored.adopt(file);

        Ok(SourceFile {
            path,
            filename: upload.filename.clone(),
            format,
            size: upload.bytes.len() as u64,
        })
    }

    pub fn progress(&self, task_id: &str) -> Result<ProgressView> {
        Ok(self.registry.get(task_id)?.progress_view())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.registry.subscribe()
    }

    pub fn history_list(&self, skip: u64, limit: u64) -> Result<Vec<HistorySummary>> {
        let rows = history_repo::list(&self.db, skip, limit)?;
        Ok(rows.iter().map(|row| row.summary()).collect())
    }

    pub fn history_detail(&self, id: i64) -> Result<HistoryDetail> {
        let row = history_repo::find_by_id(&self.db, id)?.ok_or(IngestError::HistoryNotFound(id))?;
        Ok(row.detail()?)
    }

    pub fn history_delete(&self, id: i64) -> Result<()> {
        if history_repo::delete(&self.db, id)? {
            log::info!("Deleted history row {}", id);
            Ok(())
        } else {
            Err(IngestError::HistoryNotFound(id))
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            workers: self.pool.worker_count(),
            queued_jobs: self.pool.queued(),
            tasks: self.registry.counts(),
            extraction_backend: self.backend_name.clone(),
        }
    }

    /// Stops accepting work, lets running jobs finish and fails queued ones.
    pub fn shutdown(self) {
        self.pool.shutdown();
        self.pool.wait();
    }
}

/// The returned path deletes the upload when dropped.
fn write_upload(dir: &Path, format: DocumentFormat, bytes: &[u8]) -> std::io::Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&format!(".{}", format.extension()))
        .tempfile_in(dir)?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

    fn upload(name: &str, content_type: Option<&str>) -> UploadedFile {
        UploadedFile::new(name, content_type.map(str::to_string), b"data".to_vec())
    }

    #[test]
    fn test_accepts_allowed_types() {
        assert_eq!(
            upload("cv.pdf", Some("application/pdf")).validate(),
            Ok(DocumentFormat::Pdf)
        );
        assert_eq!(
            upload("cv.DOCX", Some(DOCX_MIME)).validate(),
            Ok(DocumentFormat::Docx)
        );
        assert_eq!(
            upload("cv.doc", Some("application/msword")).validate(),
            Ok(DocumentFormat::Doc)
        );
    }

    #[test]
    fn test_rejects_bad_extension() {
        assert!(matches!(
            upload("cv.txt", Some("application/pdf")).validate(),
            Err(ValidationError::UnsupportedExtension { .. })
        ));
        assert!(matches!(
            upload("resume", None).validate(),
            Err(ValidationError::UnsupportedExtension { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_content_type() {
        assert!(matches!(
            upload("cv.pdf", Some("image/png")).validate(),
            Err(ValidationError::UnsupportedContentType { .. })
        ));
    }

    #[test]
    fn test_missing_content_type_is_inferred() {
        assert_eq!(upload("cv.pdf", None).validate(), Ok(DocumentFormat::Pdf));
        assert_eq!(upload("cv.docx", Some("")).validate(), Ok(DocumentFormat::Docx));
    }

    #[test]
    fn test_rejects_empty_file() {
        let empty = UploadedFile::new("cv.pdf", Some("application/pdf".to_string()), Vec::new());
        assert!(matches!(
            empty.validate(),
            Err(ValidationError::EmptyFile { .. })
        ));
    }

    #[test]
    fn test_write_upload_owns_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_upload(dir.path(), DocumentFormat::Docx, b"PK").unwrap();
        let path = file.to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("docx"));
        assert_eq!(std::fs::read(&path).unwrap(), b"PK");

        drop(file);
        assert!(!path.exists());
    }
}

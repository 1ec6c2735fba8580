//! Isolated service instance for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use resume_ingest::config::Config;
use resume_ingest::db::{history_repo, HistoryRow};
use resume_ingest::registry::{ProgressView, TaskRegistry};
use resume_ingest::{Database, IngestService, UploadedFile};

use super::fakes::{FakeBackend, FakeConverter};

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub struct TestHarness {
    temp_dir: TempDir,
    pub upload_dir: PathBuf,
    pub db: Database,
    pub backend: Arc<FakeBackend>,
    pub registry: Arc<TaskRegistry>,
    service: Option<IngestService>,
    // Declared last so worker threads are joined before the runtime goes away.
    runtime: tokio::runtime::Runtime,
}

impl TestHarness {
    pub fn new(backend: FakeBackend) -> Self {
        Self::with_pool(FakeConverter::new(), backend, 2, 16)
    }

    pub fn with_pool(
        converter: FakeConverter,
        backend: FakeBackend,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let upload_dir = temp_dir.path().join("uploads");

        let config = Config {
            upload_directory: upload_dir.to_string_lossy().into_owned(),
            worker_count,
            queue_capacity,
            ..Config::default()
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to build runtime");
        let db = Database::open_in_memory().expect("Failed to open database");
        let backend = Arc::new(backend);

        let service = IngestService::start(
            &config,
            db.clone(),
            Arc::new(converter),
            Arc::clone(&backend) as Arc<dyn resume_ingest::extraction::ExtractionBackend>,
            runtime.handle().clone(),
        )
        .expect("Failed to start service");
        let registry = Arc::clone(service.registry());

        Self {
            temp_dir,
            upload_dir,
            db,
            backend,
            registry,
            service: Some(service),
            runtime,
        }
    }

    pub fn service(&self) -> &IngestService {
        self.service.as_ref().expect("service already shut down")
    }

    /// Shuts the service down and waits for the workers to exit.
    pub fn shutdown(&mut self) {
        if let Some(service) = self.service.take() {
            service.shutdown();
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn pdf(name: &str, contents: &str) -> UploadedFile {
        UploadedFile::new(name, Some(PDF_MIME.to_string()), contents.as_bytes().to_vec())
    }

    pub fn docx(name: &str, contents: &str) -> UploadedFile {
        UploadedFile::new(name, Some(DOCX_MIME.to_string()), contents.as_bytes().to_vec())
    }

    /// Polls until the task is terminal.
    pub fn wait_for(&self, task_id: &str) -> ProgressView {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let view = self
                .service()
                .progress(task_id)
                .expect("task should be registered");
            if view.status.is_terminal() {
                return view;
            }
            assert!(Instant::now() < deadline, "task {} never finished", task_id);
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Polls until the task has left the pending state.
    pub fn wait_until_started(&self, task_id: &str) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.registry.get(task_id).expect("task should be registered").status
            == resume_ingest::TaskStatus::Pending
        {
            assert!(Instant::now() < deadline, "task {} never started", task_id);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    pub fn history_for(&self, task_id: &str) -> Vec<HistoryRow> {
        history_repo::find_by_task(&self.db, task_id).expect("history query failed")
    }

    /// Files still present in the upload directory.
    pub fn leftover_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.upload_dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.shutdown();
    }
}

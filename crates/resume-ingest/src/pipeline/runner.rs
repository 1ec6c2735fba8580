use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tracing::{debug, error, info, info_span, warn};

use crate::db::history_repo::{NewHistoryRow, STATUS_COMPLETED, STATUS_FAILED};
use crate::db::HistorySink;
use crate::error::ConversionError;
use crate::extraction::{
    ExtractionBackend, ExtractionError, ExtractionInput, FieldSchema, Strategy,
};
use crate::normalize::{ExtractedResume, ResponseNormalizer};
use crate::processor::{DocumentConverter, DocumentFormat};
use crate::registry::{BatchItem, Stage, TaskOutcome, TaskRegistry, TaskResult};
use crate::sanitize;
use crate::worker::job::{Job, JobKind, SourceFile};

use super::artifacts::{attempt, ArtifactGuard};
use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineError, PipelineWarning};
use super::progress::{NoopProgress, ProgressReporter, RegistryProgress};

/// Error reported for a file or job whose processing panicked.
pub const PANIC_MESSAGE: &str = "Internal error while processing the resume";

/// Progress checkpoints of a single-file run.
mod checkpoint {
    pub const STARTED: u8 = 15;
    pub const CONVERTING: u8 = 20;
    pub const CONVERSION_FAILED: u8 = 25;
    pub const CONVERTED: u8 = 30;
    pub const RASTERIZING: u8 = 35;
    pub const RASTERIZED: u8 = 50;
    pub const VISION_FAILED: u8 = 50;
    pub const EXTRACTING: u8 = 55;
    pub const TEXT_READY: u8 = 70;
    pub const PARSING: u8 = 75;
    pub const PARSED: u8 = 85;
    pub const COMPLETION: u8 = 95;

    /// Batch files are spread over 15..95.
    pub fn batch_file(index: usize, total: usize) -> u8 {
        let span = 80 * index / total.max(1);
        STARTED + span as u8
    }
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    converter: Arc<dyn DocumentConverter>,
    backend: Arc<dyn ExtractionBackend>,
    normalizer: ResponseNormalizer,
    history: Arc<dyn HistorySink>,
    registry: Arc<TaskRegistry>,
    runtime: Handle,
}

impl Pipeline {
    /// `runtime` drives the async backend calls; the pipeline itself runs
    /// on worker threads outside of it.
    pub fn new(
        config: Arc<PipelineConfig>,
        converter: Arc<dyn DocumentConverter>,
        backend: Arc<dyn ExtractionBackend>,
        history: Arc<dyn HistorySink>,
        registry: Arc<TaskRegistry>,
        runtime: Handle,
    ) -> Self {
        let normalizer = ResponseNormalizer::new(config.max_experience_chars);
        Self {
            config,
            converter,
            backend,
            normalizer,
            history,
            registry,
            runtime,
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Runs a job to its terminal state. Every uploaded file of the job is
    /// removed before the task is finalized.
    pub fn run(&self, job: Job) {
        let mut sources = ArtifactGuard::with_paths(job.files().iter().map(|f| f.path.clone()));

        let outcome = match &job.kind {
            JobKind::Single(source) => self.run_single(&job, source, &mut sources),
            JobKind::Batch(files) => self.run_batch(&job, files, &mut sources),
        };

        let _span = info_span!("finalize", task_id = %job.id).entered();
        sources.release();
        if let Err(e) = self.registry.finalize(&job.id, outcome) {
            warn!(task_id = %job.id, error = %e, "Could not finalize task");
        }
    }

    fn run_single(&self, job: &Job, source: &SourceFile, sources: &mut ArtifactGuard) -> TaskOutcome {
        let progress = RegistryProgress::new(Arc::clone(&self.registry), &job.id);
        let ctx = PipelineContext::new(&job.id, source.clone(), job.strategy);
        let (result, mut ctx) = self.process_file(ctx, &progress);
        ctx.artifacts.release();
        sources.release();

        match result {
            Ok(resume) => {
                progress.report(Stage::Completion, checkpoint::COMPLETION);
                let payload = serde_json::to_value(&resume).unwrap_or(Value::Null);
                self.record_history(
                    job,
                    source,
                    STATUS_COMPLETED,
                    payload,
                    resume.processing_method.as_str(),
                    None,
                );
                TaskOutcome::Completed(TaskResult::Single(resume))
            }
            Err(e) => {
                let message = e.to_string();
                self.record_history(
                    job,
                    source,
                    STATUS_FAILED,
                    json!({}),
                    ctx.strategy_used.as_str(),
                    Some(&message),
                );
                TaskOutcome::Failed(message)
            }
        }
    }

    fn run_batch(&self, job: &Job, files: &[SourceFile], sources: &mut ArtifactGuard) -> TaskOutcome {
        let total = files.len();
        self.registry
            .update_progress(&job.id, Stage::Processing, checkpoint::STARTED);

        let mut items = Vec::with_capacity(total);
        for (index, source) in files.iter().enumerate() {
            self.registry.update_progress(
                &job.id,
                Stage::ProcessingFile {
                    index: index + 1,
                    total,
                },
                checkpoint::batch_file(index, total),
            );

            let ctx = PipelineContext::new(&job.id, source.clone(), job.strategy);
            let run = panic::catch_unwind(AssertUnwindSafe(|| self.process_file(ctx, &NoopProgress)));
            let (result, strategy_used) = match run {
                Ok((result, mut ctx)) => {
                    ctx.artifacts.release();
                    (result.map_err(|e| e.to_string()), ctx.strategy_used)
                }
                Err(_) => {
                    error!(task_id = %job.id, file = index + 1, "File processing panicked");
                    (Err(PANIC_MESSAGE.to_string()), job.strategy)
                }
            };
            // The batch reports text as soon as any file fell back to it.
            if strategy_used != job.strategy {
                self.registry.set_strategy_used(&job.id, strategy_used);
            }

            let item = match result {
                Ok(resume) => {
                    let payload = serde_json::to_value(&resume).unwrap_or(Value::Null);
                    self.record_history(
                        job,
                        source,
                        STATUS_COMPLETED,
                        payload,
                        resume.processing_method.as_str(),
                        None,
                    );
                    BatchItem::Parsed {
                        filename: source.filename.clone(),
                        resume,
                    }
                }
                Err(message) => {
                    let item = BatchItem::failed(&source.filename, &message);
                    let payload = serde_json::to_value(&item).unwrap_or(Value::Null);
                    self.record_history(
                        job,
                        source,
                        STATUS_FAILED,
                        payload,
                        BatchItem::FAILED_METHOD,
                        Some(&message),
                    );
                    item
                }
            };
            items.push(item);
            self.registry.record_file_done(&job.id);
        }

        sources.release();
        let failed = items.iter().filter(|item| item.is_failed()).count();
        info!(task_id = %job.id, total, failed, "Batch processed");
        TaskOutcome::Completed(TaskResult::Batch(items))
    }

    /// Fails a job whose run was cut short: writes a failed row per file,
    /// removes the uploads and finalizes the task. A task that already
    /// reached a terminal state is left untouched.
    pub fn fail_job(&self, job: &Job, message: &str) {
        let _span = info_span!("fail_job", task_id = %job.id).entered();
        let mut sources = ArtifactGuard::with_paths(job.files().iter().map(|f| f.path.clone()));
        sources.release();

        let strategy_used = match self.registry.get(&job.id) {
            Ok(task) if task.is_terminal() => {
                debug!("Job was already terminal");
                return;
            }
            Ok(task) => task.strategy_used,
            Err(_) => job.strategy,
        };
        for source in job.files() {
            self.record_history(
                job,
                source,
                STATUS_FAILED,
                json!({}),
                strategy_used.as_str(),
                Some(message),
            );
        }
        if let Err(e) = self
            .registry
            .finalize(&job.id, TaskOutcome::Failed(message.to_string()))
        {
            warn!(error = %e, "Could not finalize failed job");
        }
    }

    /// Drives one file through the stage sequence. Returns the context so
    /// the caller can release its artifacts.
    pub fn process_file(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (Result<ExtractedResume, PipelineError>, PipelineContext) {
        let filename = sanitize::redact_path(&ctx.source.path);
        let _pipeline_span = info_span!("pipeline",
            task_id = %ctx.task_id,
            filename = %filename,
            format = %ctx.source.format,
            strategy = %ctx.strategy_requested,
        )
        .entered();

        progress.report(Stage::Processing, checkpoint::STARTED);
        let result = self.execute(&mut ctx, progress);

        match &result {
            Ok(resume) => debug!(
                method = %resume.processing_method,
                experience_entries = resume.experience_data.len(),
                degraded = ctx.is_degraded(),
                "File processed"
            ),
            Err(e) => warn!(error = %e, strategy = %ctx.strategy_used, "File failed"),
        }
        (result, ctx)
    }

    fn execute(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<ExtractedResume, PipelineError> {
        // Step 1: Normalize format
        if ctx.strategy_used == Strategy::Vision {
            let _step = info_span!("normalize_format").entered();
            self.step_normalize_format(ctx, progress);
        }

        // Step 2: Rasterize
        if ctx.strategy_used == Strategy::Vision {
            let _step = info_span!("rasterize").entered();
            self.step_rasterize(ctx, progress);
        }

        // Step 3: Extract
        let _step = info_span!("extract").entered();
        if ctx.strategy_used == Strategy::Vision {
            progress.report(Stage::ExtractingVision, checkpoint::EXTRACTING);
            match self.extract_vision(ctx) {
                Ok(resume) => {
                    progress.report(Stage::Parsing, checkpoint::PARSED);
                    return Ok(resume);
                }
                Err(e) => self.degrade(ctx, progress, "extract_vision", &e, checkpoint::VISION_FAILED),
            }
        }

        self.extract_text(ctx, progress)
    }

    fn step_normalize_format(&self, ctx: &mut PipelineContext, progress: &dyn ProgressReporter) {
        match ctx.source.format {
            DocumentFormat::Pdf => ctx.pdf_path = Some(ctx.source.path.clone()),
            format => {
                progress.report(Stage::ConvertingToPdf, checkpoint::CONVERTING);
                match self.converter.convert_to_pdf(
                    &ctx.source.path,
                    format,
                    &self.config.scratch_directory,
                ) {
                    Ok(rendition) => {
                        ctx.artifacts.track(rendition.clone());
                        ctx.pdf_path = Some(rendition);
                        progress.report(Stage::ConvertingToPdf, checkpoint::CONVERTED);
                    }
                    Err(e) => {
                        self.degrade(ctx, progress, "normalize_format", &e, checkpoint::CONVERSION_FAILED)
                    }
                }
            }
        }
    }

    fn step_rasterize(&self, ctx: &mut PipelineContext, progress: &dyn ProgressReporter) {
        progress.report(Stage::Rasterizing, checkpoint::RASTERIZING);
        let Some(pdf_path) = ctx.pdf_path.clone() else {
            self.degrade(ctx, progress, "rasterize", &"no PDF to rasterize", checkpoint::RASTERIZED);
            return;
        };

        match self.converter.rasterize(&pdf_path) {
            Ok(pages) if !pages.is_empty() => {
                debug!(pages = pages.len(), "Rasterized document");
                ctx.pages = pages;
                progress.report(Stage::Rasterizing, checkpoint::RASTERIZED);
            }
            Ok(_) => {
                let e = ConversionError::Rasterize("document has no pages".to_string());
                self.degrade(ctx, progress, "rasterize", &e, checkpoint::RASTERIZED);
            }
            Err(e) => self.degrade(ctx, progress, "rasterize", &e, checkpoint::RASTERIZED),
        }
    }

    fn extract_vision(&self, ctx: &PipelineContext) -> Result<ExtractedResume, PipelineError> {
        let schema = FieldSchema::for_strategy(Strategy::Vision);
        let raw = self.call_backend(ExtractionInput::Pages(&ctx.pages), &schema)?;
        Ok(self.normalizer.normalize(&raw, Strategy::Vision)?)
    }

    fn extract_text(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<ExtractedResume, PipelineError> {
        progress.report(Stage::ExtractingText, checkpoint::EXTRACTING);
        let text = self
            .converter
            .extract_text(&ctx.source.path, ctx.source.format)?;
        if text.trim().is_empty() {
            return Err(ConversionError::EmptyText.into());
        }
        debug!(chars = text.chars().count(), "Extracted document text");
        progress.report(Stage::ExtractingText, checkpoint::TEXT_READY);

        progress.report(Stage::Parsing, checkpoint::PARSING);
        let schema = FieldSchema::for_strategy(Strategy::Text);
        let raw = self.call_backend(ExtractionInput::Text(&text), &schema)?;
        let resume = self.normalizer.normalize(&raw, Strategy::Text)?;
        progress.report(Stage::Parsing, checkpoint::PARSED);
        Ok(resume)
    }

    fn timeout_for(&self, strategy: Strategy) -> Duration {
        match strategy {
            Strategy::Text => self.config.text_timeout,
            Strategy::Vision => self.config.vision_timeout,
        }
    }

    /// Blocks the worker thread on the backend call, bounded by the
    /// strategy's timeout.
    fn call_backend(
        &self,
        input: ExtractionInput<'_>,
        schema: &FieldSchema,
    ) -> Result<String, ExtractionError> {
        let strategy = input.strategy();
        let limit = self.timeout_for(strategy);
        let backend = Arc::clone(&self.backend);

        self.runtime.block_on(async move {
            match tokio::time::timeout(limit, backend.extract(input, schema)).await {
                Ok(result) => result,
                Err(_) => Err(ExtractionError::Timeout {
                    strategy,
                    after: limit,
                }),
            }
        })
    }

    /// Switches the rest of the run to the text strategy.
    fn degrade(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
        step: &'static str,
        reason: &dyn std::fmt::Display,
        checkpoint: u8,
    ) {
        warn!(step, reason = %reason, "Vision path failed, falling back to text");
        ctx.warnings.push(PipelineWarning {
            step,
            reason: reason.to_string(),
        });
        ctx.strategy_used = Strategy::Text;
        ctx.pages.clear();
        progress.strategy_changed(Strategy::Text);
        progress.report(Stage::ExtractingText, checkpoint);
    }

    fn record_history(
        &self,
        job: &Job,
        source: &SourceFile,
        status: &'static str,
        resume_data: Value,
        processing_method: &str,
        error: Option<&str>,
    ) {
        let row = NewHistoryRow {
            task_id: Some(job.id.clone()),
            filename: source.filename.clone(),
            processed_at: Utc::now(),
            user_id: job.user_id.clone(),
            resume_data,
            file_size: source.size,
            status,
            original_file_type: source.format.extension().to_string(),
            processing_method: processing_method.to_string(),
            error: error.map(str::to_string),
        };
        attempt("history write", self.history.record(&row));
    }
}

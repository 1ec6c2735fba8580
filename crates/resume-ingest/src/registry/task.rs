use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::extraction::Strategy;
use crate::normalize::ExtractedResume;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Status only ever moves forward; terminal states are final.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Processing) => true,
            (Self::Pending | Self::Processing, Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline step a task is currently in. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Processing,
    ConvertingToPdf,
    Rasterizing,
    ExtractingVision,
    ExtractingText,
    Parsing,
    Completion,
    /// One file of a batch; `index` is 1-based.
    ProcessingFile { index: usize, total: usize },
    Completed,
    Failed,
}

impl Stage {
    pub fn label(&self) -> String {
        match self {
            Self::Upload => "upload".to_string(),
            Self::Processing => "processing".to_string(),
            Self::ConvertingToPdf => "converting_to_pdf".to_string(),
            Self::Rasterizing => "rasterizing".to_string(),
            Self::ExtractingVision => "extracting_vision".to_string(),
            Self::ExtractingText => "extracting_text".to_string(),
            Self::Parsing => "parsing".to_string(),
            Self::Completion => "completion".to_string(),
            Self::ProcessingFile { index, total } => {
                format!("processing_file_{}_of_{}", index, total)
            }
            Self::Completed => "completed".to_string(),
            Self::Failed => "failed".to_string(),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Single,
    Batch { total: usize, processed: usize },
}

/// Per-file entry of a batch result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchItem {
    Parsed {
        filename: String,
        #[serde(flatten)]
        resume: ExtractedResume,
    },
    Failed {
        filename: String,
        error: String,
        processing_method: &'static str,
    },
}

impl BatchItem {
    pub const FAILED_METHOD: &'static str = "failed";

    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Failed {
            filename: filename.into(),
            error: error.into(),
            processing_method: Self::FAILED_METHOD,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Self::Parsed { filename, .. } | Self::Failed { filename, .. } => filename,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskResult {
    Single(ExtractedResume),
    Batch(Vec<BatchItem>),
}

/// Terminal transition requested by the owning worker.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed(TaskResult),
    Failed(String),
}

/// Owned copy of a task's state.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub stage: Stage,
    pub progress: u8,
    pub strategy_requested: Strategy,
    pub strategy_used: Strategy,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub(crate) finished: Option<Instant>,
}

impl TaskSnapshot {
    /// Progress a freshly uploaded task starts at.
    pub const UPLOADED_PROGRESS: u8 = 10;

    pub fn pending(
        id: impl Into<String>,
        kind: TaskKind,
        strategy: Strategy,
        user_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            status: TaskStatus::Pending,
            stage: Stage::Upload,
            progress: Self::UPLOADED_PROGRESS,
            strategy_requested: strategy,
            strategy_used: strategy,
            result: None,
            error: None,
            user_id,
            created_at: now,
            updated_at: now,
            finished: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Client-facing progress report. `data` only appears once completed and
    /// `error` only once failed.
    pub fn progress_view(&self) -> ProgressView {
        let (total_files, processed_files) = match self.kind {
            TaskKind::Single => (None, None),
            TaskKind::Batch { total, processed } => (Some(total), Some(processed)),
        };
        ProgressView {
            task_id: self.id.clone(),
            status: self.status,
            stage: self.stage,
            progress: self.progress,
            processing_method: self.strategy_used,
            data: match self.status {
                TaskStatus::Completed => self.result.clone(),
                _ => None,
            },
            error: match self.status {
                TaskStatus::Failed => self.error.clone(),
                _ => None,
            },
            total_files,
            processed_files,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    pub task_id: String,
    pub status: TaskStatus,
    pub stage: Stage,
    pub progress: u8,
    pub processing_method: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_files: Option<usize>,
}

/// Published on every registry mutation.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub status: TaskStatus,
    pub stage: Stage,
    pub progress: u8,
    pub processing_method: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_files: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl From<&TaskSnapshot> for TaskEvent {
    fn from(task: &TaskSnapshot) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status,
            stage: task.stage,
            progress: task.progress,
            processing_method: task.strategy_used,
            processed_files: match task.kind {
                TaskKind::Single => None,
                TaskKind::Batch { processed, .. } => Some(processed),
            },
            timestamp: task.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resume() -> ExtractedResume {
        ExtractedResume::from_object(
            json!({ "name": "Jane" }).as_object().unwrap(),
            Strategy::Text,
        )
    }

    #[test]
    fn test_status_transitions() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Processing));
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(Stage::ConvertingToPdf.label(), "converting_to_pdf");
        assert_eq!(
            Stage::ProcessingFile { index: 2, total: 3 }.label(),
            "processing_file_2_of_3"
        );
        assert_eq!(serde_json::to_value(Stage::Rasterizing).unwrap(), "rasterizing");
    }

    #[test]
    fn test_progress_view_hides_result_until_completed() {
        let mut task = TaskSnapshot::pending("t1", TaskKind::Single, Strategy::Vision, None);
        task.result = Some(TaskResult::Single(resume()));
        let json = serde_json::to_value(task.progress_view()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["progress"], 10);
        assert!(json.get("data").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("total_files").is_none());

        task.status = TaskStatus::Completed;
        let json = serde_json::to_value(task.progress_view()).unwrap();
        assert_eq!(json["data"]["name"], "Jane");
    }

    #[test]
    fn test_batch_view_reports_counts() {
        let task = TaskSnapshot::pending(
            "t2",
            TaskKind::Batch {
                total: 3,
                processed: 1,
            },
            Strategy::Text,
            None,
        );
        let json = serde_json::to_value(task.progress_view()).unwrap();
        assert_eq!(json["total_files"], 3);
        assert_eq!(json["processed_files"], 1);
    }

    #[test]
    fn test_batch_item_shapes() {
        let parsed = BatchItem::Parsed {
            filename: "a.pdf".to_string(),
            resume: resume(),
        };
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["filename"], "a.pdf");
        assert_eq!(json["name"], "Jane");
        assert_eq!(json["processing_method"], "text");

        let failed = BatchItem::failed("b.pdf", "No text could be extracted");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["processing_method"], "failed");
        assert_eq!(json["error"], "No text could be extracted");
        assert!(failed.is_failed());
        assert_eq!(failed.filename(), "b.pdf");
    }
}

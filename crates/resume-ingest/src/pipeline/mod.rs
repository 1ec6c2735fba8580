pub mod artifacts;
pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use artifacts::{attempt, ArtifactGuard};
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::{PipelineError, PipelineWarning};
pub use progress::{NoopProgress, ProgressReporter, RegistryProgress};
pub use runner::{Pipeline, PANIC_MESSAGE};

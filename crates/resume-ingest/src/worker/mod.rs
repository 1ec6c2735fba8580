pub mod job;
pub mod pool;

pub use job::{Job, JobKind, SourceFile};
pub use pool::WorkerPool;

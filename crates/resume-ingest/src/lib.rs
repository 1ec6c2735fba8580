//! Resume ingestion core.
//!
//! Uploaded documents are tracked in a [`registry::TaskRegistry`], processed
//! on a bounded [`worker::WorkerPool`] by the [`pipeline::Pipeline`]
//! (conversion, vision or text extraction, normalization) and recorded in
//! the history database. [`service::IngestService`] ties these together for
//! the HTTP server.

pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod normalize;
pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod sanitize;
pub mod secrets;
pub mod service;
pub mod telemetry;
pub mod worker;

pub use config::Config;
pub use db::Database;
pub use error::{IngestError, Result};
pub use extraction::Strategy;
pub use normalize::{ExtractedResume, ResponseNormalizer};
pub use registry::{TaskRegistry, TaskStatus};
pub use service::{IngestService, SubmissionReceipt, UploadedFile};

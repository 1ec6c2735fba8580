//! Shared utilities for resume-ingest integration tests.
//!
//! - `TestHarness` runs a real `IngestService` against temp directories and
//!   an in-memory history database
//! - `fakes` provides a converter and extraction backend whose behavior is
//!   driven by the uploaded file contents

pub mod fakes;
pub mod harness;

pub use fakes::{FakeBackend, FakeConverter, Gate};
pub use harness::TestHarness;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid upload: {0}")]
    Validation(#[from] ValidationError),

    #[error("Task registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Resume not found: {0}")]
    HistoryNotFound(i64),

    #[error("Failed to store upload '{path}': {source}")]
    StoreUpload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Failed to resolve extraction API key: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

/// Rejections raised synchronously at submission, before any job exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Only PDF, DOC, or DOCX files are supported (got '{filename}')")]
    UnsupportedExtension { filename: String },

    #[error("File {filename}: content type '{content_type}' is not supported")]
    UnsupportedContentType {
        filename: String,
        content_type: String,
    },

    #[error("File {filename} is empty")]
    EmptyFile { filename: String },

    #[error("No files were uploaded")]
    NoFiles,
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to process PDF: {0}")]
    Pdf(String),

    #[error("Failed to process DOCX: {0}")]
    Docx(String),

    #[error("Office conversion failed: {0}")]
    Office(String),

    #[error("Rasterization failed: {0}")]
    Rasterize(String),

    #[error("Failed to process image: {0}")]
    Image(String),

    #[error("No text could be extracted from the document")]
    EmptyText,

    #[error("{0}")]
    Unsupported(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Processing queue is full, try again later")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, IngestError>;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::secrets;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_upload_directory")]
    pub upload_directory: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            server: ServerConfig::default(),
            upload_directory: default_upload_directory(),
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            extraction: ExtractionConfig::default(),
            conversion: ConversionConfig::default(),
            history: HistoryConfig::default(),
            tasks: TaskConfig::default(),
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl Config {
    pub fn upload_directory(&self) -> PathBuf {
        expand_home(&self.upload_directory)
    }
}

fn default_upload_directory() -> String {
    std::env::temp_dir()
        .join("resume-ingest")
        .to_string_lossy()
        .into_owned()
}

fn default_worker_count() -> usize {
    num_cpus::get().clamp(1, 8)
}

fn default_queue_capacity() -> usize {
    default_worker_count() * 8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Remote chat-completions endpoint used for field extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Full chat-completions URL, including deployment and api-version.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_endpoint_env_var")]
    pub endpoint_env_var: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_text_timeout")]
    pub text_timeout_secs: u64,
    #[serde(default = "default_vision_timeout")]
    pub vision_timeout_secs: u64,
}

fn default_endpoint_env_var() -> Option<String> {
    Some("AZURE_OPENAI_ENDPOINT".to_string())
}

fn default_api_key_env_var() -> Option<String> {
    Some("AZURE_OPENAI_KEY".to_string())
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    3000
}

fn default_text_timeout() -> u64 {
    50
}

fn default_vision_timeout() -> u64 {
    180
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            endpoint_env_var: default_endpoint_env_var(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            text_timeout_secs: default_text_timeout(),
            vision_timeout_secs: default_vision_timeout(),
        }
    }
}

impl ExtractionConfig {
    /// Returns the endpoint URL from the direct value or its env var.
    pub fn resolve_endpoint(&self) -> Option<String> {
        self.endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| {
                self.endpoint_env_var
                    .as_deref()
                    .filter(|name| !name.is_empty())
                    .and_then(|name| std::env::var(name).ok())
                    .filter(|e| !e.trim().is_empty())
            })
    }

    pub fn resolve_api_key(&self) -> Result<Option<SecretString>, ConfigError> {
        Ok(secrets::resolve_secret_optional(
            self.api_key.as_deref(),
            self.api_key_file.as_deref(),
            self.api_key_env_var.as_deref(),
        )?)
    }

    pub fn text_timeout(&self) -> Duration {
        Duration::from_secs(self.text_timeout_secs)
    }

    pub fn vision_timeout(&self) -> Duration {
        Duration::from_secs(self.vision_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Longest edge, in pixels, of a page image sent to the model.
    #[serde(default = "default_max_image_edge")]
    pub max_image_edge: u32,
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm_path: String,
    /// LibreOffice binary; when unset DOCX files get a text-only PDF rendition
    /// and legacy DOC files cannot be converted.
    #[serde(default)]
    pub soffice_path: Option<String>,
}

fn default_dpi() -> u32 {
    150
}

fn default_max_image_edge() -> u32 {
    2048
}

fn default_pdftoppm() -> String {
    "pdftoppm".to_string()
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            max_image_edge: default_max_image_edge(),
            pdftoppm_path: default_pdftoppm(),
            soffice_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub database_path: Option<String>,
}

impl HistoryConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        match self.database_path.as_deref() {
            Some(path) if !path.is_empty() => Some(expand_home(path)),
            _ => crate::db::default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// How long a terminal task stays queryable before it is reaped.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

fn default_retention() -> u64 {
    3600
}

fn default_reap_interval() -> u64 {
    60
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

impl TaskConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default = "default_max_experience_chars")]
    pub max_experience_chars: usize,
}

fn default_max_experience_chars() -> usize {
    crate::normalize::DEFAULT_EXPERIENCE_CAP
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_experience_chars: default_max_experience_chars(),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

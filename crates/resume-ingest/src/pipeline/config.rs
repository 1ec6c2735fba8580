use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

pub struct PipelineConfig {
    /// Where intermediate PDF renditions are written.
    pub scratch_directory: PathBuf,
    pub text_timeout: Duration,
    pub vision_timeout: Duration,
    pub max_experience_chars: usize,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scratch_directory: config.upload_directory(),
            text_timeout: config.extraction.text_timeout(),
            vision_timeout: config.extraction.vision_timeout(),
            max_experience_chars: config.normalizer.max_experience_chars,
        }
    }
}

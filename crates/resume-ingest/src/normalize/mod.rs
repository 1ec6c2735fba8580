//! Turns raw model output into an [`ExtractedResume`].

pub mod cap;
pub mod repair;
pub mod resume;

use thiserror::Error;
use tracing::{debug, warn};

use crate::extraction::Strategy;
use crate::sanitize;

pub use cap::{cap_bullets, TRUNCATION_MARKER};
pub use repair::RepairStep;
pub use resume::{ExperienceEntry, ExtractedResume, SkillGroup};

/// Aggregate character ceiling for `professional_experience`.
pub const DEFAULT_EXPERIENCE_CAP: usize = 1000;

#[derive(Error, Debug)]
pub enum NormalizeError {
    /// The excerpt is for logs only and is not part of the message.
    #[error("Model output could not be parsed as resume JSON")]
    Malformed { excerpt: String },

    #[error("Model returned an empty response")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct ResponseNormalizer {
    experience_cap: usize,
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_EXPERIENCE_CAP)
    }
}

impl ResponseNormalizer {
    pub fn new(experience_cap: usize) -> Self {
        Self { experience_cap }
    }

    pub fn experience_cap(&self) -> usize {
        self.experience_cap
    }

    /// Parses `raw` and applies the experience cap.
    pub fn normalize(&self, raw: &str, method: Strategy) -> Result<ExtractedResume, NormalizeError> {
        if raw.trim().is_empty() {
            return Err(NormalizeError::Empty);
        }

        let Some((object, step)) = repair::parse_object(raw) else {
            let excerpt = sanitize::excerpt(raw, sanitize::EXCERPT_CHARS);
            warn!(method = %method, excerpt = %excerpt, "Unparseable model output");
            return Err(NormalizeError::Malformed { excerpt });
        };

        if step != RepairStep::None {
            debug!(method = %method, step = ?step, "Model output needed repair");
        }

        let mut resume = ExtractedResume::from_object(&object, method);
        let before = resume.professional_experience.len();
        resume.professional_experience =
            cap_bullets(std::mem::take(&mut resume.professional_experience), self.experience_cap);
        if resume.professional_experience.len() < before {
            debug!(
                kept = resume.professional_experience.len(),
                dropped = before - resume.professional_experience.len(),
                "Capped professional experience"
            );
        }

        Ok(resume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_json() -> String {
        json!({
            "name": "Jane Doe",
            "email": "jane@example.com",
            "mobile": "555",
            "skills": [{ "Languages": ["Rust"] }],
            "professional_experience": ["Led teams"]
        })
        .to_string()
    }

    #[test]
    fn test_fenced_and_unfenced_are_identical() {
        let normalizer = ResponseNormalizer::default();
        let plain = normalizer.normalize(&sample_json(), Strategy::Text).unwrap();
        let fenced = normalizer
            .normalize(&format!("```json\n{}\n```", sample_json()), Strategy::Text)
            .unwrap();
        assert_eq!(plain, fenced);
    }

    #[test]
    fn test_cap_is_applied() {
        let bullets: Vec<String> = (0..5).map(|_| "x".repeat(300)).collect();
        let raw = json!({ "professional_experience": bullets }).to_string();

        let resume = ResponseNormalizer::default()
            .normalize(&raw, Strategy::Vision)
            .unwrap();
        assert_eq!(resume.professional_experience.len(), 3);
        assert!(cap::total_chars(&resume.professional_experience) <= DEFAULT_EXPERIENCE_CAP);
        assert_eq!(resume.processing_method, Strategy::Vision);
    }

    #[test]
    fn test_custom_cap() {
        let raw = json!({ "professional_experience": ["abcdef", "ghijkl"] }).to_string();
        let resume = ResponseNormalizer::new(8).normalize(&raw, Strategy::Text).unwrap();
        assert_eq!(resume.professional_experience, vec!["abcdef"]);
    }

    #[test]
    fn test_malformed_message_hides_raw_text() {
        let err = ResponseNormalizer::default()
            .normalize("secret candidate data, no json here", Strategy::Text)
            .unwrap_err();
        assert!(!err.to_string().contains("secret"));
        match err {
            NormalizeError::Malformed { excerpt } => assert!(excerpt.contains("secret")),
            other => panic!("Expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_response() {
        assert!(matches!(
            ResponseNormalizer::default().normalize("  \n", Strategy::Text),
            Err(NormalizeError::Empty)
        ));
    }
}

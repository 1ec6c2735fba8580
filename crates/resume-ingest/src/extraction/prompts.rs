//! Field-schema prompts for resume extraction.

use super::Strategy;

const FIELD_LIST: &str = "\
- name
- email
- mobile
- skills (group related skills together, and return as a list of objects with category as the key and related skills as the value. For example: [{ \"Programming Languages\": [\"Java\", \"C++\"] }, { \"Cloud\": [\"AWS\", \"Docker\"] }])
- education (as a list of degrees/institutions)
- professional_experience (a summary of the whole resume as a list of short points: \"professional_experience\": [\"point1\", \"point2\", ...])
- certifications (as a list)
- experience_data (as a list of objects, each with the keys \"company\", \"startDate\", \"endDate\", \"role\", \"clientEngagement\", \"program\" and \"responsibilities\", where responsibilities is a list of bullet points describing duties)
";

const OUTPUT_RULES: &str = "\
Return the data as a single valid JSON object and nothing else. \
If there is no data available for a section, try to infer it from the resume. \
If that is not possible, return \"Not available\" for that section.";

/// Instructions sent as the system message for one extraction strategy.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub strategy: Strategy,
    pub system_prompt: String,
}

impl FieldSchema {
    pub fn for_strategy(strategy: Strategy) -> Self {
        let preamble = match strategy {
            Strategy::Text => {
                "You are an expert resume parser. Extract the following fields from the resume text:\n"
            }
            Strategy::Vision => {
                "You are an expert resume parser. The user sends every page of a resume as an image, \
                 in page order. Read all pages, including tables, columns and sidebars, and extract \
                 the following fields:\n"
            }
        };

        Self {
            strategy,
            system_prompt: format!("{}{}{}", preamble, FIELD_LIST, OUTPUT_RULES),
        }
    }

    /// User message for the text strategy.
    pub fn text_prompt(&self, resume_text: &str) -> String {
        format!("Resume Text:\n{}", resume_text)
    }

    /// Leading text part for the vision strategy.
    pub fn vision_prompt(&self, page_count: usize) -> String {
        format!(
            "Extract the resume fields from the following {} page image(s).",
            page_count
        )
    }
}

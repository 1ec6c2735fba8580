use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extraction::Strategy;

/// Structured fields extracted from one resume.
///
/// Missing scalars serialize as `null` and missing lists as `[]`; no key is
/// ever omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedResume {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "mobile")]
    pub phone: Option<String>,
    pub skills: Vec<SkillGroup>,
    pub education: Vec<String>,
    pub certifications: Vec<String>,
    pub professional_experience: Vec<String>,
    pub experience_data: Vec<ExperienceEntry>,
    pub processing_method: Strategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillGroup {
    pub category: String,
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceEntry {
    #[serde(rename = "company")]
    pub employer: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(rename = "role")]
    pub title: Option<String>,
    pub client_engagement: Option<String>,
    pub program: Option<String>,
    pub responsibilities: Vec<String>,
}

impl ExperienceEntry {
    fn is_empty(&self) -> bool {
        self.employer.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.title.is_none()
            && self.client_engagement.is_none()
            && self.program.is_none()
            && self.responsibilities.is_empty()
    }
}

const GENERAL_CATEGORY: &str = "General";

/// Placeholders models emit for "no data"; compared case-insensitively.
const PLACEHOLDERS: &[&str] = &[
    "",
    "not available",
    "n/a",
    "na",
    "none",
    "null",
    "not specified",
    "not mentioned",
    "not provided",
    "unknown",
    "-",
];

impl ExtractedResume {
    /// Coerces a parsed model object into the resume shape, tolerating the
    /// layouts models commonly produce for each field.
    pub fn from_object(obj: &Map<String, Value>, processing_method: Strategy) -> Self {
        Self {
            name: scalar(lookup(obj, &["name", "full_name", "fullName"])),
            email: scalar(lookup(obj, &["email", "email_address", "emailAddress"])),
            phone: scalar(lookup(obj, &["mobile", "phone", "phone_number", "phoneNumber"])),
            skills: skill_groups(lookup(obj, &["skills", "skill_groups"])),
            education: string_list(lookup(obj, &["education"])),
            certifications: string_list(lookup(obj, &["certifications", "certificates"])),
            professional_experience: string_list(lookup(
                obj,
                &["professional_experience", "professionalExperience", "summary"],
            )),
            experience_data: experience_entries(lookup(
                obj,
                &["experience_data", "experienceData", "experience"],
            )),
            processing_method,
        }
    }
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key)).or_else(|| {
        obj.iter()
            .find(|(k, _)| keys.iter().any(|key| k.eq_ignore_ascii_case(key)))
            .map(|(_, v)| v)
    })
}

fn is_placeholder(s: &str) -> bool {
    let lowered = s.trim().to_lowercase();
    PLACEHOLDERS.contains(&lowered.as_str())
}

fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !is_placeholder(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(|item| scalar(Some(item))),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(list_item).collect(),
        Some(other) => list_item(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Renders one list element as text; objects become their values joined.
fn list_item(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !is_placeholder(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => {
            let parts: Vec<String> = map.values().filter_map(list_item).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(list_item).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

fn skill_names(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if s.contains(',') => s
            .split(',')
            .map(str::trim)
            .filter(|s| !is_placeholder(s))
            .map(str::to_string)
            .collect(),
        other => string_list(Some(other)),
    }
}

fn push_group(groups: &mut Vec<SkillGroup>, category: &str, skills: Vec<String>) {
    if skills.is_empty() {
        return;
    }
    let category = if is_placeholder(category) {
        GENERAL_CATEGORY
    } else {
        category.trim()
    };
    match groups.iter_mut().find(|g| g.category == category) {
        Some(existing) => existing.skills.extend(skills),
        None => groups.push(SkillGroup {
            category: category.to_string(),
            skills,
        }),
    }
}

fn skill_groups(value: Option<&Value>) -> Vec<SkillGroup> {
    let mut groups = Vec::new();
    match value {
        Some(Value::Array(items)) => {
            for item in items {
                match item {
                    Value::Object(map) => {
                        let explicit_category = lookup(map, &["category"]).and_then(Value::as_str);
                        let explicit_skills = lookup(map, &["skills", "items"]);
                        match (explicit_category, explicit_skills) {
                            (Some(category), Some(skills)) => {
                                push_group(&mut groups, category, skill_names(skills))
                            }
                            _ => {
                                for (category, skills) in map {
                                    push_group(&mut groups, category, skill_names(skills));
                                }
                            }
                        }
                    }
                    other => push_group(&mut groups, GENERAL_CATEGORY, skill_names(other)),
                }
            }
        }
        Some(Value::Object(map)) => {
            for (category, skills) in map {
                push_group(&mut groups, category, skill_names(skills));
            }
        }
        Some(other) => push_group(&mut groups, GENERAL_CATEGORY, skill_names(other)),
        None => {}
    }
    groups
}

fn experience_entries(value: Option<&Value>) -> Vec<ExperienceEntry> {
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(Value::as_object)
        .map(|entry| ExperienceEntry {
            employer: scalar(lookup(entry, &["company", "employer", "organization"])),
            start_date: scalar(lookup(entry, &["startDate", "start_date", "start", "from"])),
            end_date: scalar(lookup(entry, &["endDate", "end_date", "end", "to"])),
            title: scalar(lookup(entry, &["role", "title", "designation", "position"])),
            client_engagement: scalar(lookup(
                entry,
                &["clientEngagement", "client_engagement", "client"],
            )),
            program: scalar(lookup(entry, &["program", "programme", "project"])),
            responsibilities: string_list(lookup(
                entry,
                &["responsibilities", "duties", "highlights"],
            )),
        })
        .filter(|entry| !entry.is_empty())
        .collect()
}

//! Recovery of a JSON object from imperfect model output.
//!
//! Each ladder step is applied on top of the previous ones and the text is
//! re-parsed after every step.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[^\n`]*\n(.*?)```").unwrap());

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_+-]*[^\n`]*\n").unwrap());

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStep {
    /// Parsed as-is after fence stripping.
    None,
    CollapseControlChars,
    ExtractBalancedObject,
    StripTrailingCommas,
}

impl RepairStep {
    const LADDER: [RepairStep; 3] = [
        RepairStep::CollapseControlChars,
        RepairStep::ExtractBalancedObject,
        RepairStep::StripTrailingCommas,
    ];

    fn apply(self, text: &str) -> String {
        match self {
            RepairStep::None => text.to_string(),
            RepairStep::CollapseControlChars => collapse_control_chars(text),
            RepairStep::ExtractBalancedObject => extract_object(text),
            RepairStep::StripTrailingCommas => strip_trailing_commas(text),
        }
    }
}

/// Removes a Markdown code fence (with optional language tag) around the
/// payload. An unterminated opening fence, as left by a truncated response,
/// is removed too.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(caps) = FENCED_BLOCK.captures(trimmed) {
        return caps[1].trim().to_string();
    }
    if let Some(m) = OPENING_FENCE.find(trimmed) {
        return trimmed[m.end()..].trim().to_string();
    }
    trimmed.to_string()
}

/// Parses `raw` into a JSON object, walking the repair ladder on failure.
/// Returns the object and the last step that was needed, or `None` when
/// every step is exhausted.
pub fn parse_object(raw: &str) -> Option<(Map<String, Value>, RepairStep)> {
    let mut candidate = strip_code_fences(raw);
    if let Some(obj) = try_object(&candidate) {
        return Some((obj, RepairStep::None));
    }

    for step in RepairStep::LADDER {
        candidate = step.apply(&candidate);
        if let Some(obj) = try_object(&candidate) {
            return Some((obj, step));
        }
    }

    None
}

fn try_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn collapse_control_chars(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn strip_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "$1").into_owned()
}

/// Returns the longest balanced `{...}` span, or, when no span closes, the
/// text from the first `{` with its open strings and brackets closed.
fn extract_object(text: &str) -> String {
    let mut best: Option<(usize, usize)> = None;
    let mut stack: Vec<char> = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' if !stack.is_empty() => in_string = true,
            '{' => {
                if stack.is_empty() {
                    start = idx;
                }
                stack.push('}');
            }
            '[' if !stack.is_empty() => stack.push(']'),
            '}' | ']' if !stack.is_empty() => {
                if stack.last() == Some(&c) {
                    stack.pop();
                    if stack.is_empty() {
                        let end = idx + 1;
                        let longer = match best {
                            Some((s, e)) => end - start > e - s,
                            None => true,
                        };
                        if longer {
                            best = Some((start, end));
                        }
                    }
                } else {
                    // Mismatched closer: abandon this candidate.
                    stack.clear();
                }
            }
            _ => {}
        }
    }

    if let Some((s, e)) = best {
        return text[s..e].to_string();
    }

    match text.find('{') {
        Some(first) => close_truncated(&text[first..]),
        None => text.to_string(),
    }
}

/// Appends the closers a truncated object is missing.
fn close_truncated(fragment: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in fragment.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut repaired = fragment.trim_end().to_string();
    if escaped {
        repaired.pop();
    }
    if in_string {
        repaired.push('"');
    }
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    repaired
}

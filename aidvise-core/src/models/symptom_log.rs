use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Stored and returned when the completion carries no usable content.
pub const NO_RESPONSE: &str = "No response.";

/// Row written to the append-only symptom log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSymptomLog {
    pub symptoms: String,
    pub ai_response: String,
}

/// Break a free-text description into individual symptoms.
///
/// Splits on `,` `;` `.` and newlines. When fewer than two non-empty parts
/// remain the whole (trimmed) text is returned as the only item.
pub fn split_symptoms(text: &str) -> Vec<String> {
    static DELIMITERS: OnceLock<Regex> = OnceLock::new();
    let re = DELIMITERS.get_or_init(|| Regex::new(r"[,;.\n]").expect("delimiter regex"));

    let parts: Vec<String> = re
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if parts.len() > 1 {
        parts
    } else {
        vec![text.trim().to_string()]
    }
}

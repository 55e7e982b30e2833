//! Turning untrusted provider text into a validated verdict.
//!
//! Parsing is a single tagged step: either a [`ParsedVerdict`] with every
//! required field present, or a [`ParseError`] saying what was wrong. No
//! partially filled verdict ever leaves this module.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use screenwise_common::{
    CriterionAssessment, CriterionStatus, Decision, ElementAssessment, ElementStatus,
    PicottElement, ReviewerResult, clamp_confidence,
};

use crate::errors::ParseError;

static FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n?(.*?)\s*```\s*$").unwrap());

/// A verdict whose shape has been validated and whose values are normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVerdict {
    pub decision: Decision,
    pub confidence: f64,
    pub reasoning: String,
    pub picott: Vec<ElementAssessment>,
    pub inclusion: Vec<CriterionAssessment>,
    pub exclusion: Vec<CriterionAssessment>,
}

impl ParsedVerdict {
    pub fn into_result(self, reviewer: &str) -> ReviewerResult {
        ReviewerResult::new(self.decision, self.confidence, &self.reasoning, reviewer)
            .with_picott(self.picott)
            .with_criteria(self.inclusion, self.exclusion)
    }
}

/// Parse a provider response into a verdict.
///
/// Tries, in order: the text with markdown fences stripped, then the first
/// balanced JSON object found anywhere in the text.
pub fn parse_verdict(text: &str) -> Result<ParsedVerdict, ParseError> {
    let value = locate_json(text)?;
    verdict_from_value(&value)
}

fn locate_json(text: &str) -> Result<Value, ParseError> {
    let stripped = strip_fences(text);
    let first_error = match serde_json::from_str::<Value>(stripped) {
        Ok(value) if value.is_object() => return Ok(value),
        Ok(_) => "top-level value is not an object".to_string(),
        Err(e) => e.to_string(),
    };

    if let Some(value) = extract_json_object(text) {
        return Ok(value);
    }

    if text.contains('{') {
        Err(ParseError::InvalidJson(first_error))
    } else {
        Err(ParseError::NoJson)
    }
}

/// Remove a surrounding ```json ... ``` fence if the whole response is fenced.
pub fn strip_fences(text: &str) -> &str {
    match FENCE_REGEX.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// Find the first balanced `{...}` span that parses as a JSON object.
///
/// Braces inside string literals are ignored while balancing.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&text[start..]) {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..start + end]) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
        search_from = start + 1;
    }
    None
}

/// Byte length of the balanced object starting at `s[0] == '{'`.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn verdict_from_value(value: &Value) -> Result<ParsedVerdict, ParseError> {
    let recommendation = value
        .get("recommendation")
        .or_else(|| value.get("decision"))
        .ok_or(ParseError::MissingField("recommendation"))?;
    let recommendation = recommendation.as_str().ok_or_else(|| ParseError::InvalidField {
        field: "recommendation",
        message: format!("expected string, got {}", recommendation),
    })?;

    let confidence = read_confidence(value)?;

    let reasoning = value
        .get("reasoning")
        .ok_or(ParseError::MissingField("reasoning"))?;
    let reasoning = match reasoning {
        Value::String(s) => s.clone(),
        Value::Null => return Err(ParseError::MissingField("reasoning")),
        other => other.to_string(),
    };

    let picott = read_picott(value.get("picott_assessment"));
    let criteria = value.get("criteria_assessment");
    let inclusion = read_criteria(criteria.and_then(|c| c.get("inclusion")));
    let exclusion = read_criteria(criteria.and_then(|c| c.get("exclusion")));

    Ok(ParsedVerdict {
        decision: Decision::coerce(recommendation),
        confidence: clamp_confidence(confidence),
        reasoning,
        picott,
        inclusion,
        exclusion,
    })
}

fn read_confidence(value: &Value) -> Result<f64, ParseError> {
    match value.get("confidence") {
        None | Some(Value::Null) => Err(ParseError::MissingField("confidence")),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| ParseError::InvalidField {
            field: "confidence",
            message: format!("not representable as f64: {}", n),
        }),
        Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|e| ParseError::InvalidField {
            field: "confidence",
            message: format!("'{}': {}", s, e),
        }),
        Some(other) => Err(ParseError::InvalidField {
            field: "confidence",
            message: format!("expected number, got {}", other),
        }),
    }
}

/// Always yields all six elements; anything missing is `unclear`.
fn read_picott(section: Option<&Value>) -> Vec<ElementAssessment> {
    PicottElement::ALL
        .iter()
        .map(|element| {
            let entry = section.and_then(|s| s.get(element.key()));
            let (status, evidence) = match entry {
                Some(Value::String(status)) => (ElementStatus::coerce(status), String::new()),
                Some(obj @ Value::Object(_)) => (
                    obj.get("status")
                        .and_then(Value::as_str)
                        .map(ElementStatus::coerce)
                        .unwrap_or_default(),
                    string_field(obj, &["evidence", "quote"]),
                ),
                _ => (ElementStatus::Unclear, String::new()),
            };
            ElementAssessment {
                element: *element,
                status,
                evidence,
            }
        })
        .collect()
}

fn read_criteria(list: Option<&Value>) -> Vec<CriterionAssessment> {
    let Some(Value::Array(items)) = list else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let criterion = string_field(item, &["criterion", "name"]);
            if criterion.is_empty() {
                return None;
            }
            let status = match item.get("status") {
                Some(Value::String(s)) => CriterionStatus::coerce(s),
                _ => match item.get("met").and_then(Value::as_bool) {
                    Some(true) => CriterionStatus::Met,
                    Some(false) => CriterionStatus::NotMet,
                    None => CriterionStatus::Unclear,
                },
            };
            Some(CriterionAssessment {
                criterion,
                status,
                evidence: string_field(item, &["evidence", "quote"]),
            })
        })
        .collect()
}

fn string_field(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

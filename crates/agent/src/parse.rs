//! Tolerant decoding of the intent pass.
//!
//! Models are asked for bare JSON but routinely wrap it in markdown fences or
//! surround it with prose. Decoding never fails outward: anything that does not
//! yield a JSON value becomes [`ParseOutcome::Failed`], and the extraction
//! derived from it falls back to the `chitchat` defaults.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use concierge_core::domain::intent::CHITCHAT;
use concierge_core::domain::slot::{SlotMap, SlotValue};

const FENCED_OBJECT_PATTERN: &str = r"(?s)```(?:json)?\s*(\{.*?\})\s*```";

#[derive(Clone, Debug, PartialEq)]
pub enum ParseOutcome {
    Parsed(Value),
    Failed { raw: String, reason: String },
}

impl ParseOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Pass-1 result as reported by the model. `missing_slots` is advisory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotExtraction {
    pub intent: String,
    pub missing_slots: Vec<String>,
    pub extracted_entities: SlotMap,
}

impl Default for SlotExtraction {
    fn default() -> Self {
        Self {
            intent: CHITCHAT.to_string(),
            missing_slots: Vec::new(),
            extracted_entities: SlotMap::new(),
        }
    }
}

impl SlotExtraction {
    pub fn from_outcome(outcome: &ParseOutcome) -> Self {
        match outcome {
            ParseOutcome::Parsed(value) => Self::from_value(value),
            ParseOutcome::Failed { .. } => Self::default(),
        }
    }

    fn from_value(value: &Value) -> Self {
        let intent = match value.get("intent") {
            Some(intent) if is_truthy(intent) => match intent {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            },
            _ => CHITCHAT.to_string(),
        };

        let missing_slots = match value.get("missing_slots") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };

        let extracted_entities = match value.get("extracted_entities") {
            Some(Value::Object(entities)) => entities
                .iter()
                .map(|(name, value)| (name.clone(), SlotValue::from(value.clone())))
                .collect(),
            _ => SlotMap::new(),
        };

        Self { intent, missing_slots, extracted_entities }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntentPassOutput {
    pub extraction: SlotExtraction,
    pub outcome: ParseOutcome,
}

pub fn parse_intent_response(raw: &str) -> IntentPassOutput {
    let outcome = decode_structured(raw);
    IntentPassOutput { extraction: SlotExtraction::from_outcome(&outcome), outcome }
}

pub fn decode_structured(raw: &str) -> ParseOutcome {
    let candidate = json_candidate(raw);
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => ParseOutcome::Parsed(value),
        Err(error) => {
            ParseOutcome::Failed { raw: candidate.to_string(), reason: error.to_string() }
        }
    }
}

/// Pick the substring most likely to hold the JSON object.
fn json_candidate(raw: &str) -> &str {
    let trimmed = raw.trim();

    if let Some(inner) = strip_enclosing_fence(trimmed) {
        return inner;
    }

    if let Some(captured) = fenced_object()
        .and_then(|pattern| pattern.captures(trimmed))
        .and_then(|captures| captures.get(1))
    {
        return captured.as_str().trim();
    }

    brace_span(trimmed).unwrap_or(trimmed)
}

/// Inner lines when the whole text is one fenced block with the markers on
/// their own first and last lines.
fn strip_enclosing_fence(text: &str) -> Option<&str> {
    if !text.starts_with("```") || !text.ends_with("```") {
        return None;
    }

    let first_break = text.find('\n')?;
    let last_break = text.rfind('\n')?;
    if last_break <= first_break {
        return None;
    }

    let last_line = &text[last_break + 1..];
    if !last_line.starts_with("```") {
        return None;
    }

    Some(text[first_break + 1..last_break].trim())
}

/// The first complete JSON object in `text`. When none decodes, the span from
/// the first `{` to the last `}` is returned so the decode error is reported
/// against it.
fn brace_span(text: &str) -> Option<&str> {
    let first_object = text.match_indices('{').find_map(|(start, _)| {
        let rest = &text[start..];
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(_))) => Some(&rest[..stream.byte_offset()]),
            _ => None,
        }
    });
    if first_object.is_some() {
        return first_object;
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn fenced_object() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(FENCED_OBJECT_PATTERN).ok()).as_ref()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

//! Gates: pure validators between the Completion Service and the case record.
//!
//! A gate turns raw model output into a typed record or a
//! [`ValidationError`] with a human-readable reason. Gates never call the
//! Completion Service and never panic on bad input; malformed output is an
//! expected outcome that the step's retry loop handles.
//!
//! - `claim` -- extraction, assessment (severity/cost), routing gates
//! - `verdict` -- evaluator verdict gate
//! - this module -- the `Gate` trait, strict single-object parsing, and the
//!   generic `TextGate` / `JsonGate`

pub mod claim;
pub mod verdict;

use std::marker::PhantomData;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use claimflow_types::error::ValidationError;
use claimflow_types::llm::{CompletionResponse, OutputJsonSchema};

pub use claim::{AssessmentGate, ExtractionGate, RoutingGate};
pub use verdict::VerdictGate;

/// Characters of offending output quoted back in rejection reasons.
const PREVIEW_CHARS: usize = 40;

/// Validator for one kind of step output.
pub trait Gate: Send + Sync {
    type Output: Send;

    /// Short name used in logs and error context.
    fn name(&self) -> &str;

    /// Validate raw text output.
    fn validate(&self, raw: &str) -> Result<Self::Output, ValidationError>;

    /// Validate an object the collaborator already decoded against a schema.
    ///
    /// Schema-level checks happened upstream, but the semantic checks in
    /// [`Gate::validate`] still have to run, so the default re-serializes.
    fn validate_structured(&self, value: &Value) -> Result<Self::Output, ValidationError> {
        if !value.is_object() {
            return Err(ValidationError::NotSingleObject(
                "structured output is not an object".to_string(),
            ));
        }
        self.validate(&value.to_string())
    }

    /// Structured-output schema to request, if the gate expects an object.
    fn response_schema(&self) -> Option<OutputJsonSchema> {
        None
    }

    /// Validate whichever form the response arrived in.
    fn check(&self, response: &CompletionResponse) -> Result<Self::Output, ValidationError> {
        match &response.structured {
            Some(value) => self.validate_structured(value),
            None => self.validate(&response.content),
        }
    }
}

/// Parse `raw` as exactly one JSON object and deserialize it into `T`.
///
/// Leading or trailing prose, code fences, arrays, and multiple objects are
/// all rejected: the prompts instruct the model to emit the object and
/// nothing else.
pub fn parse_single_object<T: DeserializeOwned>(raw: &str) -> Result<T, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    if !trimmed.starts_with('{') {
        return Err(ValidationError::NotSingleObject(format!(
            "response starts with {:?}",
            preview(trimmed)
        )));
    }

    let mut stream = serde_json::Deserializer::from_str(trimmed).into_iter::<Value>();
    let value = match stream.next() {
        Some(Ok(value)) => value,
        Some(Err(e)) => return Err(ValidationError::Parse(e.to_string())),
        None => return Err(ValidationError::Empty),
    };
    let consumed = stream.byte_offset();
    if consumed < trimmed.len() {
        return Err(ValidationError::NotSingleObject(format!(
            "unexpected text after the object: {:?}",
            preview(&trimmed[consumed..])
        )));
    }

    serde_json::from_value(value).map_err(|e| ValidationError::Parse(e.to_string()))
}

/// Structured-output schema for `T`.
pub fn schema_of<T: JsonSchema>(name: &str) -> OutputJsonSchema {
    OutputJsonSchema {
        name: name.to_string(),
        schema: schemars::schema_for!(T).to_value(),
        strict: Some(true),
    }
}

/// Check that `value` has between `bounds` chars after trimming.
pub(crate) fn check_len(
    field: &str,
    value: &str,
    bounds: &std::ops::RangeInclusive<usize>,
) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if bounds.contains(&len) {
        Ok(())
    } else {
        Err(ValidationError::field(
            field,
            format!(
                "must be {}..={} chars, got {len}",
                bounds.start(),
                bounds.end()
            ),
        ))
    }
}

fn preview(s: &str) -> String {
    let mut out: String = s.chars().take(PREVIEW_CHARS).collect();
    if s.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

// ---------------------------------------------------------------------------
// TextGate
// ---------------------------------------------------------------------------

/// Accepts any non-blank free text. Used for drafts and specialist analyses.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextGate;

impl Gate for TextGate {
    type Output = String;

    fn name(&self) -> &str {
        "text"
    }

    fn validate(&self, raw: &str) -> Result<String, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Err(ValidationError::Empty)
        } else {
            Ok(trimmed.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// JsonGate
// ---------------------------------------------------------------------------

/// Accepts a single JSON object deserializable into `T`, with no further
/// semantic checks. Used for structured generator artifacts.
pub struct JsonGate<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonGate<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> Gate for JsonGate<T>
where
    T: DeserializeOwned + JsonSchema + Send,
{
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, raw: &str) -> Result<T, ValidationError> {
        parse_single_object(raw)
    }

    fn response_schema(&self) -> Option<OutputJsonSchema> {
        Some(schema_of::<T>(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq, JsonSchema)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_parse_single_object_accepts_bare_object() {
        let p: Point = parse_single_object("  {\"x\": 1, \"y\": 2}\n").unwrap();
        assert_eq!(p, Point { x: 1, y: 2 });
    }

    #[test]
    fn test_parse_single_object_rejects_empty() {
        assert_eq!(
            parse_single_object::<Point>("   ").unwrap_err(),
            ValidationError::Empty
        );
    }

    #[test]
    fn test_parse_single_object_rejects_leading_prose() {
        let err = parse_single_object::<Point>("Sure! {\"x\": 1, \"y\": 2}").unwrap_err();
        assert!(matches!(err, ValidationError::NotSingleObject(_)), "{err:?}");
    }

    #[test]
    fn test_parse_single_object_rejects_code_fence() {
        let err = parse_single_object::<Point>("```json\n{\"x\": 1, \"y\": 2}\n```").unwrap_err();
        assert!(matches!(err, ValidationError::NotSingleObject(_)));
    }

    #[test]
    fn test_parse_single_object_rejects_trailing_text() {
        let err = parse_single_object::<Point>("{\"x\": 1, \"y\": 2} hope this helps").unwrap_err();
        match err {
            ValidationError::NotSingleObject(reason) => assert!(reason.contains("hope")),
            other => panic!("expected NotSingleObject, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_single_object_rejects_two_objects() {
        let err = parse_single_object::<Point>("{\"x\":1,\"y\":2}{\"x\":3,\"y\":4}").unwrap_err();
        assert!(matches!(err, ValidationError::NotSingleObject(_)));
    }

    #[test]
    fn test_parse_single_object_reports_missing_field() {
        let err = parse_single_object::<Point>("{\"x\": 1}").unwrap_err();
        match err {
            ValidationError::Parse(reason) => assert!(reason.contains("missing field `y`")),
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_single_object_reports_syntax_error() {
        let err = parse_single_object::<Point>("{\"x\": 1,").unwrap_err();
        assert!(matches!(err, ValidationError::Parse(_)));
    }

    #[test]
    fn test_text_gate() {
        assert_eq!(TextGate.validate("  draft \n").unwrap(), "draft");
        assert_eq!(TextGate.validate("\n\t").unwrap_err(), ValidationError::Empty);
    }

    #[test]
    fn test_json_gate_and_schema() {
        let gate = JsonGate::<Point>::new("point");
        assert_eq!(gate.validate("{\"x\":0,\"y\":5}").unwrap(), Point { x: 0, y: 5 });
        let schema = gate.response_schema().unwrap();
        assert_eq!(schema.name, "point");
        assert!(schema.schema["properties"].get("x").is_some());
    }

    #[test]
    fn test_check_prefers_structured_payload() {
        let gate = JsonGate::<Point>::new("point");
        let response = CompletionResponse {
            content: String::new(),
            structured: Some(serde_json::json!({"x": 7, "y": 8})),
            model: "m".into(),
            usage: Default::default(),
        };
        assert_eq!(gate.check(&response).unwrap(), Point { x: 7, y: 8 });
    }

    #[test]
    fn test_structured_non_object_rejected() {
        let gate = JsonGate::<Point>::new("point");
        let err = gate.validate_structured(&serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, ValidationError::NotSingleObject(_)));
    }

    #[test]
    fn test_check_len() {
        assert!(check_len("claim_id", "C1", &(2..=10)).is_ok());
        let err = check_len("claim_id", "C", &(2..=10)).unwrap_err();
        assert_eq!(err.to_string(), "field 'claim_id' must be 2..=10 chars, got 1");
    }
}

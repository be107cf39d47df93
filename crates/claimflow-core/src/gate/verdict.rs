use claimflow_types::error::ValidationError;
use claimflow_types::evaluation::{EvaluationVerdict, SCORE_MAX, SCORE_MIN};
use claimflow_types::llm::OutputJsonSchema;

use super::{Gate, parse_single_object, schema_of};

/// Gate for the evaluator's verdict.
///
/// A rejection must say what to fix, since that feedback is the only thing
/// the generator sees on the next cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerdictGate;

impl Gate for VerdictGate {
    type Output = EvaluationVerdict;

    fn name(&self) -> &str {
        "verdict"
    }

    fn validate(&self, raw: &str) -> Result<EvaluationVerdict, ValidationError> {
        let mut verdict: EvaluationVerdict = parse_single_object(raw)?;
        if !(SCORE_MIN..=SCORE_MAX).contains(&verdict.score) {
            return Err(ValidationError::field(
                "score",
                format!("must be {SCORE_MIN}..={SCORE_MAX}, got {}", verdict.score),
            ));
        }
        if !verdict.approved && verdict.feedback.trim().is_empty() {
            return Err(ValidationError::Inconsistent(
                "a rejected verdict must include feedback".to_string(),
            ));
        }
        verdict.feedback = verdict.feedback.trim().to_string();
        Ok(verdict)
    }

    fn response_schema(&self) -> Option<OutputJsonSchema> {
        Some(schema_of::<EvaluationVerdict>("evaluation_verdict"))
    }
}

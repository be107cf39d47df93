//! Evaluator verdict for the evaluator-optimizer loop.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lowest allowed quality score.
pub const SCORE_MIN: u8 = 1;

/// Highest allowed quality score.
pub const SCORE_MAX: u8 = 10;

/// Judgement of one generated candidate against the evaluator's rubric.
///
/// When `approved` is false, `feedback` is non-empty and becomes the only
/// context added to the next generator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EvaluationVerdict {
    pub approved: bool,
    /// Specific, actionable feedback. Empty when approved.
    #[serde(default)]
    pub feedback: String,
    /// Quality score from 1 (poor) to 10 (excellent).
    pub score: u8,
}

impl EvaluationVerdict {
    pub fn approve(score: u8) -> Self {
        Self {
            approved: true,
            feedback: String::new(),
            score,
        }
    }

    pub fn reject(feedback: impl Into<String>, score: u8) -> Self {
        Self {
            approved: false,
            feedback: feedback.into(),
            score,
        }
    }
}

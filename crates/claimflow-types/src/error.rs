use thiserror::Error;

use crate::case::CaseStatus;

/// A gate rejected a Completion Service response.
///
/// Malformed model output is an expected outcome, so every rejection carries
/// a human-readable reason that can be fed back to the model on retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("response was empty")]
    Empty,

    #[error("expected exactly one JSON object: {0}")]
    NotSingleObject(String),

    #[error("could not parse response: {0}")]
    Parse(String),

    #[error("field '{field}' {reason}")]
    Field { field: String, reason: String },

    #[error("inconsistent record: {0}")]
    Inconsistent(String),
}

impl ValidationError {
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from merging an update into a case record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaseError {
    #[error("field '{0}' is already populated")]
    FieldAlreadySet(&'static str),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: CaseStatus, to: CaseStatus },

    #[error("case is terminal ({0})")]
    Terminal(CaseStatus),
}

//! The case record threaded through a pipeline run.
//!
//! `CaseRecord` is a value type: steps never mutate it in place. Each step
//! produces a [`CaseUpdate`] delta which the engine merges with
//! [`CaseRecord::apply`], consuming the old record and returning a new one.
//! `apply` is where the lifecycle invariants live:
//!
//! - a stage status (`Extracted`, `Assessed`, `Routed`) is only reachable
//!   from the stage directly before it, so no stage is skipped;
//! - `Completed` and `Failed` are reachable from any non-terminal status;
//! - nothing is applied to a `Failed` or `Completed` record;
//! - each structured field is written at most once;
//! - `errors` only grows.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::claim::{ClaimInformation, ClaimRouting, SeverityAssessment};
use crate::error::CaseError;

/// Lifecycle stage of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Extracted,
    Assessed,
    Routed,
    Completed,
    Failed,
}

impl CaseStatus {
    /// Position in the forward chain. `Failed` sits outside it.
    fn rank(self) -> Option<u8> {
        match self {
            CaseStatus::Pending => Some(0),
            CaseStatus::Extracted => Some(1),
            CaseStatus::Assessed => Some(2),
            CaseStatus::Routed => Some(3),
            CaseStatus::Completed => Some(4),
            CaseStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CaseStatus::Completed | CaseStatus::Failed)
    }

    /// Whether a case in `self` may move to `next`.
    ///
    /// Stages advance one at a time. `Completed` closes a run after its last
    /// step, whichever stage that step reached.
    pub fn can_advance_to(self, next: CaseStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next) {
            (_, CaseStatus::Failed | CaseStatus::Completed) => true,
            (Some(from), next) => next.rank() == Some(from + 1),
            (None, _) => false,
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaseStatus::Pending => "pending",
            CaseStatus::Extracted => "extracted",
            CaseStatus::Assessed => "assessed",
            CaseStatus::Routed => "routed",
            CaseStatus::Completed => "completed",
            CaseStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Delta produced by a successful step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseUpdate {
    pub extracted: Option<ClaimInformation>,
    pub assessment: Option<SeverityAssessment>,
    pub routing: Option<ClaimRouting>,
    pub status: Option<CaseStatus>,
}

impl CaseUpdate {
    pub fn extracted(info: ClaimInformation) -> Self {
        Self {
            extracted: Some(info),
            status: Some(CaseStatus::Extracted),
            ..Default::default()
        }
    }

    pub fn assessed(assessment: SeverityAssessment) -> Self {
        Self {
            assessment: Some(assessment),
            status: Some(CaseStatus::Assessed),
            ..Default::default()
        }
    }

    pub fn routed(routing: ClaimRouting) -> Self {
        Self {
            routing: Some(routing),
            status: Some(CaseStatus::Routed),
            ..Default::default()
        }
    }

    pub fn status(status: CaseStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Evolving context of one pipeline run.
///
/// Callers must check [`CaseRecord::is_completed`] before trusting the
/// structured fields: a failed record may still carry fields written by the
/// steps that succeeded before the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: Uuid,
    /// Raw origin text (the FNOL report for the claims pipeline).
    pub input: String,
    /// Model identifier used for every step of this run.
    pub model: String,
    pub extracted: Option<ClaimInformation>,
    pub assessment: Option<SeverityAssessment>,
    pub routing: Option<ClaimRouting>,
    /// Append-only error and diagnostic log.
    pub errors: Vec<String>,
    /// Total re-attempts made by all steps so far. Diagnostic only.
    pub retry_count: u32,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl CaseRecord {
    pub fn new(input: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            input: input.into(),
            model: model.into(),
            extracted: None,
            assessment: None,
            routing: None,
            errors: Vec::new(),
            retry_count: 0,
            status: CaseStatus::Pending,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == CaseStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == CaseStatus::Failed
    }

    /// Merge a step's delta into a new record.
    pub fn apply(mut self, update: CaseUpdate) -> Result<Self, CaseError> {
        if self.status.is_terminal() {
            return Err(CaseError::Terminal(self.status));
        }
        if update.extracted.is_some() && self.extracted.is_some() {
            return Err(CaseError::FieldAlreadySet("extracted"));
        }
        if update.assessment.is_some() && self.assessment.is_some() {
            return Err(CaseError::FieldAlreadySet("assessment"));
        }
        if update.routing.is_some() && self.routing.is_some() {
            return Err(CaseError::FieldAlreadySet("routing"));
        }
        if let Some(next) = update.status {
            if !self.status.can_advance_to(next) {
                return Err(CaseError::InvalidTransition {
                    from: self.status,
                    to: next,
                });
            }
        }

        if let Some(info) = update.extracted {
            self.extracted = Some(info);
        }
        if let Some(assessment) = update.assessment {
            self.assessment = Some(assessment);
        }
        if let Some(routing) = update.routing {
            self.routing = Some(routing);
        }
        if let Some(next) = update.status {
            self.status = next;
            if next.is_terminal() {
                self.finished_at = Some(Utc::now());
            }
        }
        Ok(self)
    }

    /// Append errors without touching the status.
    pub fn with_errors(mut self, errors: impl IntoIterator<Item = String>) -> Self {
        self.errors.extend(errors);
        self
    }

    /// Add re-attempts made by a step.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry_count = self.retry_count.saturating_add(retries);
        self
    }

    /// Append `error` and move to `Failed`.
    ///
    /// A `Completed` record keeps its status; the error is still recorded.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        if self.status != CaseStatus::Completed {
            if self.status != CaseStatus::Failed {
                self.finished_at = Some(Utc::now());
            }
            self.status = CaseStatus::Failed;
        }
        self
    }
}

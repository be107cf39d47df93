//! Evaluator-Optimizer loop: generate, judge, revise.
//!
//! Each cycle runs two gated calls: the generator drafts a candidate, then
//! the evaluator returns an [`EvaluationVerdict`] for it. A rejection's
//! feedback becomes the only addition to the next generator request;
//! earlier feedback is dropped. The loop stops on approval or after
//! `max_iterations` cycles, whichever comes first.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};

use claimflow_types::config::{PipelineConfig, RetryConfig};
use claimflow_types::evaluation::EvaluationVerdict;
use claimflow_types::llm::{CompletionRequest, Message};

use crate::gate::{Gate, VerdictGate};
use crate::llm::box_service::BoxCompletionService;

use super::step::{GatedCall, StepError};

/// Step name of the generator call, also its retry override key.
pub const GENERATE: &str = "generate";
/// Step name of the evaluator call, also its retry override key.
pub const EVALUATE: &str = "evaluate";

/// A candidate the evaluator can read.
pub trait Artifact: Send {
    fn render(&self) -> String;
}

impl Artifact for String {
    fn render(&self) -> String {
        self.clone()
    }
}

impl Artifact for Value {
    fn render(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_string())
    }
}

/// Where the loop is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Drafting,
    Evaluating,
    Revising,
    Approved,
    Exhausted,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Drafting => "drafting",
            LoopState::Evaluating => "evaluating",
            LoopState::Revising => "revising",
            LoopState::Approved => "approved",
            LoopState::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

/// How the loop ended when no step failed.
///
/// `Exhausted` still carries the last candidate and verdict; the caller
/// decides whether a best-effort candidate is usable.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome<A> {
    Approved {
        candidate: A,
        verdict: EvaluationVerdict,
        iterations: u32,
    },
    Exhausted {
        candidate: A,
        verdict: EvaluationVerdict,
        iterations: u32,
    },
}

impl<A> LoopOutcome<A> {
    pub fn is_approved(&self) -> bool {
        matches!(self, LoopOutcome::Approved { .. })
    }

    pub fn candidate(&self) -> &A {
        match self {
            LoopOutcome::Approved { candidate, .. } | LoopOutcome::Exhausted { candidate, .. } => {
                candidate
            }
        }
    }

    pub fn verdict(&self) -> &EvaluationVerdict {
        match self {
            LoopOutcome::Approved { verdict, .. } | LoopOutcome::Exhausted { verdict, .. } => {
                verdict
            }
        }
    }

    pub fn iterations(&self) -> u32 {
        match self {
            LoopOutcome::Approved { iterations, .. }
            | LoopOutcome::Exhausted { iterations, .. } => *iterations,
        }
    }

    pub fn into_candidate(self) -> A {
        match self {
            LoopOutcome::Approved { candidate, .. } | LoopOutcome::Exhausted { candidate, .. } => {
                candidate
            }
        }
    }
}

/// A generator or evaluator call failed outright.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoopError {
    #[error("{step} failed on iteration {iteration}: {source}")]
    Step {
        step: &'static str,
        iteration: u32,
        #[source]
        source: StepError,
    },
}

/// Generate/evaluate loop over candidates accepted by `G`.
pub struct EvaluatorOptimizer<G: Gate> {
    service: Arc<BoxCompletionService>,
    gate: G,
    generator_instruction: String,
    evaluator_instruction: String,
    model: String,
    max_tokens: Option<u32>,
    max_iterations: u32,
    generator_temperature: f64,
    evaluator_temperature: f64,
    generator_retry: RetryConfig,
    evaluator_retry: RetryConfig,
}

impl<G> EvaluatorOptimizer<G>
where
    G: Gate,
    G::Output: Artifact,
{
    /// Build a loop with bounds and sampling taken from `config`.
    ///
    /// Retry policy for each call comes from `config.steps["generate"]` and
    /// `config.steps["evaluate"]`, falling back to `config.retry`.
    pub fn new(
        service: Arc<BoxCompletionService>,
        gate: G,
        generator_instruction: impl Into<String>,
        evaluator_instruction: impl Into<String>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            service,
            gate,
            generator_instruction: generator_instruction.into(),
            evaluator_instruction: evaluator_instruction.into(),
            model: config.model.clone(),
            max_tokens: None,
            max_iterations: config.optimizer.max_iterations.max(1),
            generator_temperature: config.optimizer.generator_temperature,
            evaluator_temperature: config.optimizer.evaluator_temperature,
            generator_retry: config.retry_for(GENERATE).clone(),
            evaluator_retry: config.retry_for(EVALUATE).clone(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Hard ceiling on cycles. Values below 1 are raised to 1.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run cycles for `request` until approval or the iteration ceiling.
    pub async fn run(&self, request: &str) -> Result<LoopOutcome<G::Output>, LoopError> {
        let span = info_span!(
            "optimizer.run",
            gate = self.gate.name(),
            model = %self.model,
            max_iterations = self.max_iterations,
        );
        self.run_cycles(request).instrument(span).await
    }

    async fn run_cycles(&self, request: &str) -> Result<LoopOutcome<G::Output>, LoopError> {
        let mut feedback: Option<String> = None;
        let mut iteration: u32 = 0;

        loop {
            iteration += 1;

            debug!(iteration, state = %LoopState::Drafting, "generating candidate");
            let draft_request = self.generator_request(request, feedback.as_deref());
            let candidate = GatedCall::new(&self.service, GENERATE, &self.generator_retry)
                .run(draft_request, |response| self.gate.check(response))
                .await
                .result
                .map_err(|source| LoopError::Step {
                    step: GENERATE,
                    iteration,
                    source,
                })?;

            debug!(iteration, state = %LoopState::Evaluating, "evaluating candidate");
            let verdict_request = self.evaluator_request(&candidate.render());
            let verdict = GatedCall::new(&self.service, EVALUATE, &self.evaluator_retry)
                .run(verdict_request, |response| VerdictGate.check(response))
                .await
                .result
                .map_err(|source| LoopError::Step {
                    step: EVALUATE,
                    iteration,
                    source,
                })?;

            if verdict.approved {
                info!(iteration, score = verdict.score, state = %LoopState::Approved, "candidate approved");
                return Ok(LoopOutcome::Approved {
                    candidate,
                    verdict,
                    iterations: iteration,
                });
            }

            if iteration >= self.max_iterations {
                warn!(
                    iteration,
                    score = verdict.score,
                    feedback = %verdict.feedback,
                    state = %LoopState::Exhausted,
                    "iteration ceiling reached without approval"
                );
                return Ok(LoopOutcome::Exhausted {
                    candidate,
                    verdict,
                    iterations: iteration,
                });
            }

            info!(
                iteration,
                score = verdict.score,
                feedback = %verdict.feedback,
                state = %LoopState::Revising,
                "candidate rejected"
            );
            feedback = Some(verdict.feedback);
        }
    }

    fn generator_request(&self, request: &str, feedback: Option<&str>) -> CompletionRequest {
        let user = match feedback {
            Some(feedback) => format!(
                "{request}\n\n--- EVALUATOR FEEDBACK ---\n{feedback}\n\n\
                 Rewrite your response fixing the issues above."
            ),
            None => request.to_string(),
        };
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(self.generator_instruction.clone()),
                Message::user(user),
            ],
            temperature: Some(self.generator_temperature),
            max_tokens: self.max_tokens,
            response_schema: self.gate.response_schema(),
        }
    }

    fn evaluator_request(&self, rendered: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(self.evaluator_instruction.clone()),
                Message::user(format!(
                    "Evaluate this candidate against your rubric. Return ONLY a JSON object \
                     with keys approved (bool), feedback (string, required when not approved) \
                     and score (1-10).\n\n{rendered}"
                )),
            ],
            temperature: Some(self.evaluator_temperature),
            max_tokens: self.max_tokens,
            response_schema: VerdictGate.response_schema(),
        }
    }
}

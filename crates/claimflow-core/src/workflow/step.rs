//! Gated steps and the bounded call loop behind them.
//!
//! A step builds one request from the case record, sends it through
//! [`GatedCall`], and turns the accepted response into a [`CaseUpdate`].
//! Rejections, empty responses, and transient provider errors are retried up
//! to the step's `max_attempts`; transport errors fail immediately.

use thiserror::Error;
use tracing::{Instrument, Span, debug, field, info_span, warn};

use claimflow_observe::genai_attrs;
use claimflow_types::case::{CaseRecord, CaseStatus, CaseUpdate};
use claimflow_types::config::{PipelineConfig, RetryConfig};
use claimflow_types::error::ValidationError;
use claimflow_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, Message, OutputJsonSchema,
};

use crate::llm::box_service::BoxCompletionService;

use super::retry::{AttemptFailure, OutputFormat, RetryHandler};

/// Why a step did not produce an update.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("completion service error: {0}")]
    Transport(LlmError),

    #[error("gave up after {attempts} attempts: {last_reason}")]
    Exhausted {
        step: String,
        attempts: u32,
        last_reason: String,
    },

    #[error("cannot build prompt: {0}")]
    Prompt(String),
}

/// Outcome of executing one step against a case.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Advance(CaseUpdate),
    Fail(StepError),
}

/// Everything a step execution reports back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StepExecution {
    pub step: String,
    /// Completion Service calls made, including the first.
    pub attempts: u32,
    /// One `"[{step}] attempt {n}/{max}: {reason}"` line per failed attempt.
    pub diagnostics: Vec<String>,
    pub result: StepResult,
}

impl StepExecution {
    /// Re-attempts beyond the first call.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// One LLM-backed transformation in a pipeline.
///
/// Object-safe so the engine can hold a heterogeneous `Vec<Box<dyn PipelineStep>>`.
pub trait PipelineStep: Send + Sync {
    /// Step name, used for retry overrides, logs, and error prefixes.
    fn name(&self) -> &str;

    /// Status the case moves to when this step succeeds.
    fn target_status(&self) -> CaseStatus;

    /// Build the base request messages from the case record.
    ///
    /// Fails with [`StepError::Prompt`] when a prerequisite field is missing.
    fn build_messages(&self, case: &CaseRecord) -> Result<Vec<Message>, StepError>;

    fn response_schema(&self) -> Option<OutputJsonSchema> {
        None
    }

    /// Gate the response and turn it into a delta for the case.
    fn accept(
        &self,
        response: &CompletionResponse,
        case: &CaseRecord,
    ) -> Result<CaseUpdate, ValidationError>;
}

/// Run `step` against `case` with the step's retry policy.
pub async fn execute(
    step: &dyn PipelineStep,
    service: &BoxCompletionService,
    config: &PipelineConfig,
    case: &CaseRecord,
) -> StepExecution {
    let name = step.name().to_string();
    let messages = match step.build_messages(case) {
        Ok(messages) => messages,
        Err(e) => {
            return StepExecution {
                step: name,
                attempts: 0,
                diagnostics: Vec::new(),
                result: StepResult::Fail(e),
            };
        }
    };

    let request = CompletionRequest {
        model: case.model.clone(),
        messages,
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        response_schema: step.response_schema(),
    };

    let call = GatedCall::new(service, &name, config.retry_for(&name));
    let outcome = call.run(request, |response| step.accept(response, case)).await;

    StepExecution {
        step: name,
        attempts: outcome.attempts,
        diagnostics: outcome.diagnostics,
        result: match outcome.result {
            Ok(update) => StepResult::Advance(update),
            Err(e) => StepResult::Fail(e),
        },
    }
}

// ---------------------------------------------------------------------------
// GatedCall
// ---------------------------------------------------------------------------

/// Result of a bounded gated call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome<T> {
    pub attempts: u32,
    pub diagnostics: Vec<String>,
    pub result: Result<T, StepError>,
}

/// A Completion Service call guarded by a validator and a retry bound.
pub struct GatedCall<'a> {
    service: &'a BoxCompletionService,
    step: &'a str,
    retry: &'a RetryConfig,
}

impl<'a> GatedCall<'a> {
    pub fn new(service: &'a BoxCompletionService, step: &'a str, retry: &'a RetryConfig) -> Self {
        Self {
            service,
            step,
            retry,
        }
    }

    /// Call until `accept` returns `Ok`, the retry bound is hit, or a
    /// transport error occurs.
    ///
    /// Every retry is rebuilt from `base`, so a self-correct request only
    /// ever carries the most recent rejection reason.
    pub async fn run<T, F>(&self, base: CompletionRequest, mut accept: F) -> CallOutcome<T>
    where
        F: FnMut(&CompletionResponse) -> Result<T, ValidationError>,
    {
        let step = self.step;
        let max_attempts = self.retry.max_attempts.max(1);
        let format = OutputFormat::of(&base);
        let mut diagnostics = Vec::new();
        let mut request = base.clone();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let span = completion_span(self.service.name(), step, attempt, &request);
            let reply = self
                .service
                .complete(&request)
                .instrument(span.clone())
                .await;

            let failure = match reply {
                Ok(response) => {
                    span.record(
                        genai_attrs::GEN_AI_USAGE_INPUT_TOKENS,
                        response.usage.input_tokens,
                    );
                    span.record(
                        genai_attrs::GEN_AI_USAGE_OUTPUT_TOKENS,
                        response.usage.output_tokens,
                    );
                    debug!(step, attempt, "completion received");
                    match accept(&response) {
                        Ok(value) => {
                            return CallOutcome {
                                attempts: attempt,
                                diagnostics,
                                result: Ok(value),
                            };
                        }
                        Err(rejection) => AttemptFailure::Rejected(rejection),
                    }
                }
                Err(e) => AttemptFailure::from_llm(e),
            };

            if let AttemptFailure::Transport(e) = &failure {
                warn!(step, attempt, error = %e, "transport error, not retrying");
                diagnostics.push(format!("[{step}] attempt {attempt}/{max_attempts}: {e}"));
                return CallOutcome {
                    attempts: attempt,
                    diagnostics,
                    result: Err(StepError::Transport(e.clone())),
                };
            }

            let reason = failure.reason();
            warn!(step, attempt, max_attempts, %reason, "attempt rejected");
            diagnostics.push(format!("[{step}] attempt {attempt}/{max_attempts}: {reason}"));

            if !RetryHandler::should_retry(self.retry, attempt, &failure) {
                return CallOutcome {
                    attempts: attempt,
                    diagnostics,
                    result: Err(StepError::Exhausted {
                        step: step.to_string(),
                        attempts: attempt,
                        last_reason: reason,
                    }),
                };
            }

            if matches!(failure, AttemptFailure::Transient(_)) {
                if let Some(delay) = RetryHandler::backoff_delay(self.retry, attempt) {
                    debug!(step, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                    tokio::time::sleep(delay).await;
                }
            }

            let action = RetryHandler::prepare_retry(self.retry, step, &failure, attempt, format);
            request = RetryHandler::apply(&action, &base);
        }
    }
}

/// Span around one Completion Service call.
///
/// GenAI fields are declared empty and recorded through the `genai_attrs`
/// names; usage is recorded once the response arrives.
fn completion_span(system: &str, step: &str, attempt: u32, request: &CompletionRequest) -> Span {
    let span = info_span!(
        "gen_ai.complete",
        claimflow.step = step,
        attempt,
        gen_ai.system = field::Empty,
        gen_ai.operation.name = field::Empty,
        gen_ai.request.model = field::Empty,
        gen_ai.request.max_tokens = field::Empty,
        gen_ai.request.temperature = field::Empty,
        gen_ai.usage.input_tokens = field::Empty,
        gen_ai.usage.output_tokens = field::Empty,
    );
    span.record(genai_attrs::GEN_AI_SYSTEM, system);
    span.record(genai_attrs::GEN_AI_OPERATION_NAME, genai_attrs::OP_CHAT);
    span.record(genai_attrs::GEN_AI_REQUEST_MODEL, request.model.as_str());
    if let Some(max_tokens) = request.max_tokens {
        span.record(genai_attrs::GEN_AI_REQUEST_MAX_TOKENS, max_tokens);
    }
    if let Some(temperature) = request.temperature {
        span.record(genai_attrs::GEN_AI_REQUEST_TEMPERATURE, temperature);
    }
    span
}

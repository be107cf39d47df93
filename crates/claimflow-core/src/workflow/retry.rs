//! Retry handler with Simple and Self-Correct strategies.
//!
//! Stateless retry policy for gated step calls. The attempt counter is owned
//! by the caller's loop; this module only answers "retry?" and "with what
//! request?".
//!
//! - **Simple**: re-send the identical request.
//! - **Self-Correct**: re-send the base request with the latest rejection
//!   reason appended to the last user message. Reasons are never
//!   accumulated across attempts.

use std::time::Duration;

use claimflow_types::config::{RetryConfig, RetryStrategy};
use claimflow_types::error::ValidationError;
use claimflow_types::llm::{CompletionRequest, LlmError, LlmErrorKind, Message, MessageRole};

/// Ceiling on a single backoff sleep.
pub const MAX_BACKOFF_MS: u64 = 10_000;

// ---------------------------------------------------------------------------
// AttemptFailure
// ---------------------------------------------------------------------------

/// Why a single attempt did not produce an accepted record.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    /// The gate rejected the response.
    Rejected(ValidationError),
    /// Empty or undecodable response from the collaborator.
    Malformed(LlmError),
    /// Rate limit, overload, timeout.
    Transient(LlmError),
    /// Auth or malformed request. Never retried.
    Transport(LlmError),
}

impl AttemptFailure {
    pub fn from_llm(error: LlmError) -> Self {
        match error.kind() {
            LlmErrorKind::Transport => AttemptFailure::Transport(error),
            LlmErrorKind::Transient => AttemptFailure::Transient(error),
            LlmErrorKind::Malformed => AttemptFailure::Malformed(error),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, AttemptFailure::Transport(_))
    }

    /// Whether the model's own output was at fault, so feeding the reason
    /// back can help.
    pub fn is_output_fault(&self) -> bool {
        matches!(
            self,
            AttemptFailure::Rejected(_) | AttemptFailure::Malformed(_)
        )
    }

    pub fn reason(&self) -> String {
        match self {
            AttemptFailure::Rejected(e) => e.to_string(),
            AttemptFailure::Malformed(e)
            | AttemptFailure::Transient(e)
            | AttemptFailure::Transport(e) => e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Shape of the answer a request asks for, restated in correction notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Free text.
    Text,
    /// A single JSON object, requested through a response schema.
    JsonObject,
}

impl OutputFormat {
    pub fn of(request: &CompletionRequest) -> Self {
        if request.response_schema.is_some() {
            OutputFormat::JsonObject
        } else {
            OutputFormat::Text
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            OutputFormat::Text => "Respond again with a corrected answer.",
            OutputFormat::JsonObject => {
                "Respond again with a corrected answer. Return ONLY the JSON object, nothing else."
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RetryAction
// ---------------------------------------------------------------------------

/// The action to take before the next attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    /// Re-send the base request unchanged.
    Rerun,
    /// Re-send the base request with a correction note appended.
    SelfCorrect { correction: String },
}

// ---------------------------------------------------------------------------
// RetryHandler
// ---------------------------------------------------------------------------

/// Stateless retry handler for gated step calls.
pub struct RetryHandler;

impl RetryHandler {
    /// Whether another attempt should be made.
    ///
    /// `attempt` is 1-based (first execution is attempt 1).
    pub fn should_retry(config: &RetryConfig, attempt: u32, failure: &AttemptFailure) -> bool {
        failure.is_retryable() && attempt < config.max_attempts
    }

    /// Decide how the next attempt's request is built.
    ///
    /// Transient provider errors always re-run unchanged; there is nothing
    /// for the model to correct.
    pub fn prepare_retry(
        config: &RetryConfig,
        step: &str,
        failure: &AttemptFailure,
        attempt: u32,
        format: OutputFormat,
    ) -> RetryAction {
        match config.strategy {
            RetryStrategy::SelfCorrect if failure.is_output_fault() => RetryAction::SelfCorrect {
                correction: Self::build_correction_prompt(
                    step,
                    &failure.reason(),
                    attempt,
                    config.max_attempts,
                    format,
                ),
            },
            _ => RetryAction::Rerun,
        }
    }

    /// Build the correction note appended on a self-correct retry.
    ///
    /// `attempt` is the attempt that just failed (1-based).
    pub fn build_correction_prompt(
        step: &str,
        reason: &str,
        attempt: u32,
        max_attempts: u32,
        format: OutputFormat,
    ) -> String {
        let remaining = max_attempts.saturating_sub(attempt);
        format!(
            "--- VALIDATION FEEDBACK ---\n\
             Your previous response for step '{step}' was rejected \
             (attempt {attempt} of {max_attempts}, {remaining} remaining):\n\
             {reason}\n\
             \n\
             {}",
            format.instruction()
        )
    }

    /// Build the request for the next attempt from the untouched base request.
    pub fn apply(action: &RetryAction, base: &CompletionRequest) -> CompletionRequest {
        let mut request = base.clone();
        if let RetryAction::SelfCorrect { correction } = action {
            match request
                .messages
                .iter_mut()
                .rev()
                .find(|m| m.role == MessageRole::User)
            {
                Some(message) => {
                    message.content.push_str("\n\n");
                    message.content.push_str(correction);
                }
                None => request.messages.push(Message::user(correction.clone())),
            }
        }
        request
    }

    /// Delay before retrying a transient failure, if backoff is configured.
    pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Option<Duration> {
        if config.backoff_ms == 0 {
            return None;
        }
        let shift = attempt.saturating_sub(1).min(16);
        let ms = config
            .backoff_ms
            .saturating_mul(1u64 << shift)
            .min(MAX_BACKOFF_MS);
        Some(Duration::from_millis(ms))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_attempts: u32, strategy: RetryStrategy) -> RetryConfig {
        RetryConfig {
            max_attempts,
            strategy,
            backoff_ms: 0,
        }
    }

    fn rejected(reason: &str) -> AttemptFailure {
        AttemptFailure::Rejected(ValidationError::Inconsistent(reason.to_string()))
    }

    fn base_request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4.1-mini".into(),
            messages: vec![Message::system("assess"), Message::user("{\"claim_id\":\"C1\"}")],
            temperature: Some(0.0),
            max_tokens: Some(500),
            response_schema: None,
        }
    }

    // -------------------------------------------------------------------
    // should_retry
    // -------------------------------------------------------------------

    #[test]
    fn test_should_retry_within_limit() {
        let config = config(3, RetryStrategy::Simple);
        assert!(RetryHandler::should_retry(&config, 1, &rejected("x")));
        assert!(RetryHandler::should_retry(&config, 2, &rejected("x")));
        assert!(!RetryHandler::should_retry(&config, 3, &rejected("x")));
        assert!(!RetryHandler::should_retry(&config, 4, &rejected("x")));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let config = config(1, RetryStrategy::SelfCorrect);
        assert!(!RetryHandler::should_retry(&config, 1, &rejected("x")));
    }

    #[test]
    fn test_transport_errors_never_retry() {
        let config = config(5, RetryStrategy::Simple);
        let failure = AttemptFailure::from_llm(LlmError::AuthenticationFailed);
        assert!(!RetryHandler::should_retry(&config, 1, &failure));
    }

    #[test]
    fn test_transient_errors_retry() {
        let config = config(3, RetryStrategy::Simple);
        let failure = AttemptFailure::from_llm(LlmError::RateLimited { retry_after_ms: None });
        assert!(matches!(failure, AttemptFailure::Transient(_)));
        assert!(RetryHandler::should_retry(&config, 1, &failure));
    }

    // -------------------------------------------------------------------
    // prepare_retry
    // -------------------------------------------------------------------

    #[test]
    fn test_simple_strategy_reruns() {
        let config = config(3, RetryStrategy::Simple);
        let action = RetryHandler::prepare_retry(
            &config,
            "assess_severity",
            &rejected("x"),
            1,
            OutputFormat::JsonObject,
        );
        assert_eq!(action, RetryAction::Rerun);
    }

    #[test]
    fn test_self_correct_on_rejection() {
        let config = config(3, RetryStrategy::SelfCorrect);
        let action = RetryHandler::prepare_retry(
            &config,
            "assess_severity",
            &rejected("cost $1500 out of range for Low severity"),
            1,
            OutputFormat::JsonObject,
        );
        match action {
            RetryAction::SelfCorrect { correction } => {
                assert!(correction.contains("assess_severity"));
                assert!(correction.contains("cost $1500 out of range"));
                assert!(correction.contains("attempt 1 of 3"));
                assert!(correction.contains("2 remaining"));
                assert!(correction.ends_with("Return ONLY the JSON object, nothing else."));
            }
            other => panic!("expected SelfCorrect, got {other:?}"),
        }
    }

    #[test]
    fn test_self_correct_reruns_on_transient() {
        let config = config(3, RetryStrategy::SelfCorrect);
        let failure = AttemptFailure::from_llm(LlmError::Timeout);
        let action = RetryHandler::prepare_retry(
            &config,
            "extract_claim",
            &failure,
            1,
            OutputFormat::Text,
        );
        assert_eq!(action, RetryAction::Rerun);
    }

    #[test]
    fn test_self_correct_on_empty_response() {
        let config = config(3, RetryStrategy::SelfCorrect);
        let failure = AttemptFailure::from_llm(LlmError::EmptyResponse);
        let action = RetryHandler::prepare_retry(
            &config,
            "extract_claim",
            &failure,
            2,
            OutputFormat::Text,
        );
        assert!(matches!(action, RetryAction::SelfCorrect { .. }));
    }

    #[test]
    fn test_text_correction_does_not_ask_for_json() {
        let correction = RetryHandler::build_correction_prompt(
            "generate",
            "empty response",
            1,
            3,
            OutputFormat::Text,
        );
        assert!(correction.contains("empty response"));
        assert!(correction.ends_with("Respond again with a corrected answer."));
        assert!(!correction.contains("JSON"));
    }

    #[test]
    fn test_output_format_follows_response_schema() {
        let mut request = base_request();
        assert_eq!(OutputFormat::of(&request), OutputFormat::Text);
        request.response_schema = Some(claimflow_types::llm::OutputJsonSchema {
            name: "claim_information".into(),
            schema: serde_json::json!({"type": "object"}),
            strict: Some(true),
        });
        assert_eq!(OutputFormat::of(&request), OutputFormat::JsonObject);
    }

    // -------------------------------------------------------------------
    // apply
    // -------------------------------------------------------------------

    #[test]
    fn test_apply_appends_to_last_user_message() {
        let base = base_request();
        let action = RetryAction::SelfCorrect {
            correction: "fix the cost".into(),
        };
        let request = RetryHandler::apply(&action, &base);
        let user = request.last_user_content().unwrap();
        assert!(user.starts_with("{\"claim_id\":\"C1\"}"));
        assert!(user.ends_with("fix the cost"));
        assert_eq!(request.messages.len(), base.messages.len());
    }

    #[test]
    fn test_apply_never_accumulates_reasons() {
        let base = base_request();
        let first = RetryHandler::apply(
            &RetryAction::SelfCorrect {
                correction: "reason one".into(),
            },
            &base,
        );
        assert!(first.last_user_content().unwrap().contains("reason one"));

        let second = RetryHandler::apply(
            &RetryAction::SelfCorrect {
                correction: "reason two".into(),
            },
            &base,
        );
        let user = second.last_user_content().unwrap();
        assert!(user.contains("reason two"));
        assert!(!user.contains("reason one"));
    }

    #[test]
    fn test_apply_rerun_is_identity() {
        let base = base_request();
        assert_eq!(RetryHandler::apply(&RetryAction::Rerun, &base), base);
    }

    // -------------------------------------------------------------------
    // backoff
    // -------------------------------------------------------------------

    #[test]
    fn test_backoff_disabled_by_default() {
        assert!(RetryHandler::backoff_delay(&RetryConfig::default(), 1).is_none());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig {
            backoff_ms: 1_000,
            ..Default::default()
        };
        assert_eq!(
            RetryHandler::backoff_delay(&config, 1),
            Some(Duration::from_millis(1_000))
        );
        assert_eq!(
            RetryHandler::backoff_delay(&config, 2),
            Some(Duration::from_millis(2_000))
        );
        assert_eq!(
            RetryHandler::backoff_delay(&config, 10),
            Some(Duration::from_millis(MAX_BACKOFF_MS))
        );
    }

    #[test]
    fn test_default_max_attempts_is_three() {
        let config: RetryConfig = serde_json::from_str(r#"{"strategy":"simple"}"#).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert!(RetryHandler::should_retry(&config, 2, &rejected("x")));
        assert!(!RetryHandler::should_retry(&config, 3, &rejected("x")));
    }
}

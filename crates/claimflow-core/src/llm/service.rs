//! CompletionService trait definition.
//!
//! The narrow request/response boundary every step calls through. Concrete
//! transports (OpenAI-compatible HTTP clients, test doubles) implement it
//! outside this crate.

use claimflow_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for text/structured generation backends.
///
/// Uses native async fn in traits (RPITIT). Wrap implementations in
/// [`BoxCompletionService`](super::box_service::BoxCompletionService) to
/// inject them into the engine.
pub trait CompletionService: Send + Sync {
    /// Human-readable backend name (e.g. "openai").
    fn name(&self) -> &str;

    /// Send a request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}

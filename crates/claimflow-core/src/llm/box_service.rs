//! BoxCompletionService -- object-safe dynamic dispatch wrapper.
//!
//! 1. Define an object-safe `CompletionServiceDyn` trait with boxed futures
//! 2. Blanket-impl `CompletionServiceDyn` for all `T: CompletionService`
//! 3. `BoxCompletionService` wraps `Box<dyn CompletionServiceDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use claimflow_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use super::service::CompletionService;

/// Object-safe version of [`CompletionService`] with boxed futures.
pub trait CompletionServiceDyn: Send + Sync {
    fn name(&self) -> &str;

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>>;
}

impl<T: CompletionService> CompletionServiceDyn for T {
    fn name(&self) -> &str {
        CompletionService::name(self)
    }

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>> {
        Box::pin(self.complete(request))
    }
}

/// Type-erased Completion Service handle.
///
/// Built once by the caller and passed into the pipeline, loop, or fan-out
/// at construction time (usually behind an `Arc`), so tests can inject
/// scripted doubles.
pub struct BoxCompletionService {
    inner: Box<dyn CompletionServiceDyn + Send + Sync>,
}

impl BoxCompletionService {
    pub fn new<T: CompletionService + 'static>(service: T) -> Self {
        Self {
            inner: Box::new(service),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        self.inner.complete_boxed(request).await
    }
}

impl std::fmt::Debug for BoxCompletionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxCompletionService")
            .field("name", &self.name())
            .finish()
    }
}

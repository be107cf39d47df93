//! In-memory Completion Service doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use claimflow_types::llm::{CompletionRequest, CompletionResponse, LlmError, MessageRole};

use crate::llm::box_service::BoxCompletionService;
use crate::llm::service::CompletionService;

type Reply = Result<CompletionResponse, LlmError>;

pub fn text(content: &str) -> Reply {
    Ok(CompletionResponse::text("test-model", content))
}

/// Replays a fixed script of replies, then repeats `fallback` forever.
#[derive(Clone)]
pub struct ScriptedService {
    script: Arc<Mutex<VecDeque<Reply>>>,
    fallback: Reply,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedService {
    pub fn new(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            fallback,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answers with `reply`.
    pub fn always(reply: Reply) -> Self {
        Self::new(Vec::new(), reply)
    }

    pub fn boxed(&self) -> BoxCompletionService {
        BoxCompletionService::new(self.clone())
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Reply {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Answers by running a closure over each request.
pub struct FnService<F> {
    respond: Arc<F>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

// Manual impl: clones share the closure, so `F` need not be `Clone`.
impl<F> Clone for FnService<F> {
    fn clone(&self) -> Self {
        Self {
            respond: Arc::clone(&self.respond),
            requests: Arc::clone(&self.requests),
        }
    }
}

impl<F> FnService<F>
where
    F: Fn(&CompletionRequest) -> Reply + Send + Sync + 'static,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond: Arc::new(respond),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn boxed(&self) -> BoxCompletionService {
        BoxCompletionService::new(self.clone())
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl<F> CompletionService for FnService<F>
where
    F: Fn(&CompletionRequest) -> Reply + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "fn"
    }

    async fn complete(&self, request: &CompletionRequest) -> Reply {
        self.requests.lock().unwrap().push(request.clone());
        (self.respond)(request)
    }
}

/// System prompt of a request, or the empty string.
pub fn system_prompt(request: &CompletionRequest) -> &str {
    request
        .messages
        .iter()
        .find(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use claimflow_types::llm::Message;

    use super::*;

    fn request(content: &str) -> CompletionRequest {
        CompletionRequest {
            model: "test-model".into(),
            messages: vec![Message::system("sys"), Message::user(content)],
            temperature: None,
            max_tokens: None,
            response_schema: None,
        }
    }

    #[tokio::test]
    async fn test_fn_service_boxes_stateful_closure() {
        let calls = AtomicU32::new(0);
        let service = FnService::new(move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            text(&format!("call {n}"))
        });
        let boxed = service.boxed();

        let first = boxed.complete(&request("a")).await.unwrap();
        let second = boxed.complete(&request("b")).await.unwrap();
        assert_eq!(first.content, "call 0");
        assert_eq!(second.content, "call 1");

        let seen: Vec<_> = service
            .requests()
            .iter()
            .map(|r| r.last_user_content().unwrap_or_default().to_string())
            .collect();
        assert_eq!(seen, vec!["a", "b"]);
    }
}

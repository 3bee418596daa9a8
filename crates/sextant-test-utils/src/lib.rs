//! Mocks and fixtures shared by the Sextant test suites.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use sextant_core::config::ModelConfig;
use sextant_core::error::{Result, SextantError};
use sextant_core::traits::{LlmClient, SourceAdapter};
use sextant_core::types::{CompletionRequest, QueryParams, SourceItem, SourcePayload};

#[derive(Default)]
struct MockState {
    scripted: VecDeque<Result<String>>,
    rules: Vec<(String, String)>,
    default: Option<String>,
    requests: Vec<CompletionRequest>,
}

/// Scripted generative backend.
///
/// Replies are chosen in order: the next scripted reply, then the first rule
/// whose needle appears in the prompt, then the default. With none of those
/// the call fails with a transport error. Clones share state.
#[derive(Clone, Default)]
pub struct MockLlm {
    state: Arc<Mutex<MockState>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(reply: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.lock().default = Some(reply.into());
        mock
    }

    pub fn push_ok(&self, reply: impl Into<String>) {
        self.lock().scripted.push_back(Ok(reply.into()));
    }

    pub fn push_err(&self, err: SextantError) {
        self.lock().scripted.push_back(Err(err));
    }

    /// Reply with `reply` whenever the prompt or system text contains `needle`.
    pub fn on(&self, needle: impl Into<String>, reply: impl Into<String>) {
        self.lock().rules.push((needle.into(), reply.into()));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.lock().requests.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn reply(&self, request: CompletionRequest) -> Result<String> {
        let mut state = self.lock();
        let haystack = format!(
            "{}\n{}",
            request.system.as_deref().unwrap_or_default(),
            request.prompt
        );
        state.requests.push(request);

        if let Some(next) = state.scripted.pop_front() {
            return next;
        }
        if let Some((_, reply)) = state.rules.iter().find(|(n, _)| haystack.contains(n.as_str())) {
            return Ok(reply.clone());
        }
        state
            .default
            .clone()
            .ok_or_else(|| SextantError::transport("mock", "no scripted reply"))
    }
}

impl LlmClient for MockLlm {
    fn complete(
        &self,
        _config: &ModelConfig,
        request: CompletionRequest,
    ) -> BoxFuture<'_, Result<String>> {
        let reply = self.reply(request);
        Box::pin(async move { reply })
    }
}

/// Payload of `n` numbered items.
pub fn items(n: usize) -> SourcePayload {
    SourcePayload::new(
        (0..n)
            .map(|i| {
                SourceItem::new(format!("Result {}", i), format!("Snippet for result {}", i))
                    .with_url(format!("https://example.com/{}", i))
            })
            .collect(),
    )
}

/// Adapter that always returns the same payload and counts its calls.
#[derive(Clone)]
pub struct StaticSource {
    name: String,
    source_type: String,
    payload: SourcePayload,
    calls: Arc<AtomicUsize>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, payload: SourcePayload) -> Self {
        let name = name.into();
        Self {
            source_type: name.clone(),
            name,
            payload,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SourceAdapter for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &str {
        &self.source_type
    }

    fn fetch(&self, _params: &QueryParams) -> BoxFuture<'_, Result<SourcePayload>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let payload = self.payload.clone();
        Box::pin(async move { Ok(payload) })
    }
}

/// Adapter whose every call fails with a transport error.
pub struct FailingSource {
    name: String,
    message: String,
}

impl FailingSource {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl SourceAdapter for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, _params: &QueryParams) -> BoxFuture<'_, Result<SourcePayload>> {
        let err = SextantError::transport(&self.name, &self.message);
        Box::pin(async move { Err(err) })
    }
}

/// Adapter that sleeps before answering. Pair with a paused tokio clock.
pub struct SlowSource {
    name: String,
    delay: Duration,
    payload: SourcePayload,
}

impl SlowSource {
    pub fn new(name: impl Into<String>, delay: Duration, payload: SourcePayload) -> Self {
        Self {
            name: name.into(),
            delay,
            payload,
        }
    }
}

impl SourceAdapter for SlowSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, _params: &QueryParams) -> BoxFuture<'_, Result<SourcePayload>> {
        let delay = self.delay;
        let payload = self.payload.clone();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(payload)
        })
    }
}

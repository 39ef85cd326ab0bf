//! Test-only scripted LLM provider.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;

use crate::error::LlmError;
use crate::provider::{ChatStream, LlmProvider, Message, StreamChunk, ToolDefinition};

/// A request the mock received, kept for assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools_offered: bool,
}

/// Replays scripted chunk sequences, one script per `chat_stream` call.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    scripts: Arc<Mutex<Vec<Vec<StreamChunk>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    pub fail_chat: bool,
    /// Milliseconds to sleep before yielding each chunk.
    pub chunk_delay_ms: u64,
}

impl MockProvider {
    #[must_use]
    pub fn with_scripts(scripts: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            ..Self::default()
        }
    }

    /// One script per response, each streamed character by character.
    #[must_use]
    pub fn with_text_responses(responses: &[&str]) -> Self {
        let scripts = responses
            .iter()
            .map(|r| r.chars().map(|c| StreamChunk::text(c.to_string())).collect())
            .collect();
        Self::with_scripts(scripts)
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_chunk_delay(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = ms;
        self
    }

    /// Push another script to be served after the ones already queued.
    pub fn push_script(&self, script: Vec<StreamChunk>) {
        self.scripts.lock().unwrap().push(script);
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl LlmProvider for MockProvider {
    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatStream, LlmError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            model: model.to_owned(),
            messages: messages.to_vec(),
            tools_offered: tools.is_some_and(|t| !t.is_empty()),
        });
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                vec![StreamChunk::text("mock response")]
            } else {
                scripts.remove(0)
            }
        };
        let delay = self.chunk_delay_ms;
        let stream = tokio_stream::iter(script).then(move |chunk| async move {
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Ok(chunk)
        });
        Ok(Box::pin(stream))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

use std::time::Duration;

use futures::StreamExt;
use roost_llm::{ChatStream, LlmError, LlmProvider, Message};
use roost_tools::{CommandExecutor, extractor};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::Agent;
use crate::channel::{Channel, MessageId};
use crate::error::AgentError;

/// Shown while a tool-enabled turn is still working.
pub const PLACEHOLDER: &str = "processing…";

/// Appended to visible text when the user stops generation.
pub const CANCELLED_MARKER: &str = "\n\n*[Generation cancelled]*";

/// When to push buffered tokens to the visible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditCadence {
    pub interval: Duration,
    pub tokens: usize,
}

impl Default for EditCadence {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            tokens: 50,
        }
    }
}

/// Per-turn streaming buffer. Discarded when the turn ends.
#[derive(Debug)]
pub struct StreamState {
    pub accumulated: String,
    pub token_count: usize,
    pub cancelled: bool,
    tokens_since_edit: usize,
    last_edit: Option<Instant>,
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accumulated: String::new(),
            token_count: 0,
            cancelled: false,
            tokens_since_edit: 0,
            last_edit: None,
        }
    }

    pub fn push(&mut self, text: &str) {
        self.accumulated.push_str(text);
        self.token_count += 1;
        self.tokens_since_edit += 1;
    }

    /// True when the interval has elapsed or enough tokens piled up since the last edit.
    #[must_use]
    pub fn should_edit(&self, cadence: &EditCadence, now: Instant) -> bool {
        let Some(last) = self.last_edit else {
            return true;
        };
        now.duration_since(last) >= cadence.interval || self.tokens_since_edit >= cadence.tokens
    }

    pub fn mark_edited(&mut self, now: Instant) {
        self.last_edit = Some(now);
        self.tokens_since_edit = 0;
    }
}

/// Split `text` into chunks of at most `limit` characters.
///
/// A chunk ends at the last newline inside the window when that newline falls in the final
/// quarter of the window; otherwise the window is cut hard. Newlines at a chunk boundary are
/// dropped.
#[must_use]
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let min_break = limit * 3 / 4;
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        let hard = rest
            .char_indices()
            .nth(limit)
            .map_or(rest.len(), |(i, _)| i);
        let window = &rest[..hard];
        let cut = window
            .rfind('\n')
            .filter(|&i| i > 0 && window[..i].chars().count() >= min_break)
            .unwrap_or(hard);
        chunks.push(rest[..cut].to_owned());
        rest = rest[cut..].trim_start_matches('\n');
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_owned());
    }
    chunks
}

/// First `limit` characters of `text`, for live previews of long replies.
fn preview(text: &str, limit: usize) -> &str {
    text.char_indices()
        .nth(limit)
        .map_or(text, |(i, _)| &text[..i])
}

/// Drain a text-only stream, stopping early on cancellation.
///
/// Returns the collected text and whether the turn was cancelled.
pub(super) async fn collect_text(
    mut stream: ChatStream,
    cancel: &CancellationToken,
) -> Result<(String, bool), LlmError> {
    let mut text = String::new();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok((text, true)),
            next = stream.next() => next,
        };
        match next {
            Some(chunk) => text.push_str(&chunk?.content),
            None => return Ok((text, false)),
        }
    }
}

impl<P: LlmProvider, C: Channel, E: CommandExecutor> Agent<P, C, E> {
    /// Run one user turn end to end.
    pub(super) async fn process_turn(
        &mut self,
        user_id: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        self.store.add_message(user_id, Message::user(text));
        self.store
            .set_system_prompt(user_id, self.mode.system_prompt());

        let tools = self.offered_tools();
        let placeholder = if tools.is_empty() {
            None
        } else {
            Some(self.channel.send(PLACEHOLDER).await?)
        };
        let _ = self.channel.send_typing().await;

        let result = self.stream_turn(user_id, placeholder, cancel).await;
        if result.is_err()
            && let Some(id) = placeholder
        {
            let _ = self.channel.delete(id).await;
        }
        result
    }

    async fn stream_turn(
        &mut self,
        user_id: &str,
        placeholder: Option<MessageId>,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let tools = self.offered_tools();
        let tools_enabled = !tools.is_empty();
        let messages = self.store.messages(user_id);

        if cancel.is_cancelled() {
            self.finish_cancelled(placeholder, "").await;
            return Ok(());
        }

        let mut stream = self
            .provider
            .chat_stream(&self.model, &messages, tools_enabled.then_some(tools.as_slice()))
            .instrument(tracing::info_span!("llm_call", model = %self.model))
            .await?;

        let mut state = StreamState::new();
        let mut live: Option<MessageId> = None;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    state.cancelled = true;
                    break;
                }
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;

            if chunk.has_tool_calls() {
                tracing::debug!(count = chunk.tool_calls.len(), "structured tool calls");
                let calls = chunk
                    .tool_calls
                    .iter()
                    .filter_map(super::orchestrator::structured_call)
                    .collect();
                return self
                    .run_tool_calls(user_id, calls, placeholder, cancel)
                    .await;
            }

            state.push(&chunk.content);

            if !tools_enabled && !state.accumulated.is_empty() {
                let now = Instant::now();
                match live {
                    None => {
                        let shown = preview(&state.accumulated, self.message_limit);
                        live = Some(self.channel.send(shown).await?);
                        state.mark_edited(now);
                    }
                    Some(id) if state.should_edit(&self.cadence, now) => {
                        let shown = preview(&state.accumulated, self.message_limit).to_owned();
                        self.safe_edit(id, &shown).await;
                        state.mark_edited(now);
                    }
                    Some(_) => {}
                }
            }
        }
        drop(stream);

        if state.cancelled {
            tracing::info!(user_id, tokens = state.token_count, "generation cancelled");
            if tools_enabled {
                // Partial output may be raw tool-call JSON; never show it.
                self.finish_cancelled(placeholder, "").await;
            } else {
                self.finish_cancelled(live, &state.accumulated).await;
                if !state.accumulated.trim().is_empty() {
                    self.store
                        .add_message(user_id, Message::assistant(state.accumulated));
                }
            }
            return Ok(());
        }

        if tools_enabled && !state.accumulated.is_empty() {
            let calls = extractor::parse_all(&state.accumulated);
            if !calls.is_empty() {
                tracing::debug!(count = calls.len(), "tool calls extracted from text");
                return self
                    .run_tool_calls(user_id, calls, placeholder, cancel)
                    .await;
            }
        }

        let target = placeholder.or(live);
        if state.accumulated.trim().is_empty() {
            if let Some(id) = target {
                let _ = self.channel.delete(id).await;
            }
            return Ok(());
        }

        self.display_final(target, &state.accumulated).await?;
        self.store
            .add_message(user_id, Message::assistant(state.accumulated));
        Ok(())
    }

    /// Show `partial` with the cancellation marker, reusing `target` when there is one.
    pub(super) async fn finish_cancelled(&mut self, target: Option<MessageId>, partial: &str) {
        let text = format!("{partial}{CANCELLED_MARKER}");
        let text = text.trim_start();
        match target {
            Some(id) => self.safe_edit(id, text).await,
            None => {
                let _ = self.channel.send(text).await;
            }
        }
    }

    /// Replace `target` with the first chunk of `text` and send the rest as new messages.
    pub(super) async fn display_final(
        &mut self,
        target: Option<MessageId>,
        text: &str,
    ) -> Result<(), AgentError> {
        let mut chunks = split_message(text, self.message_limit).into_iter();
        if let Some(id) = target
            && let Some(first) = chunks.next()
        {
            self.safe_edit(id, &first).await;
        }
        for chunk in chunks {
            self.channel.send(&chunk).await?;
        }
        Ok(())
    }

    /// Edit that swallows transport errors; the message may have been removed by the user.
    pub(super) async fn safe_edit(&mut self, id: MessageId, text: &str) {
        if let Err(e) = self.channel.edit(id, text).await {
            tracing::debug!("failed to edit message: {e}");
        }
    }
}

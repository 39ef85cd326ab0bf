use std::collections::HashMap;
use std::sync::Mutex;

use roost_llm::{Message, Role, ToolUseRequest};

/// Per-user conversation transcript.
///
/// Implementations are shared across turns and must be internally synchronized. Entries are
/// only ever appended; the one exception is [`ConversationStore::clear`].
pub trait ConversationStore: Send + Sync {
    fn add_message(&self, user_id: &str, message: Message);

    /// Record an assistant message that carries one tool call.
    fn add_tool_call(&self, user_id: &str, call: ToolUseRequest) {
        self.add_message(user_id, Message::tool_call(call));
    }

    /// Record the result of the most recent tool call.
    fn add_tool_result(&self, user_id: &str, tool_name: &str, content: &str) {
        self.add_message(user_id, Message::tool_result(tool_name, content));
    }

    /// Transcript for `user_id`, with the system prompt first when one is set.
    fn messages(&self, user_id: &str) -> Vec<Message>;

    fn set_system_prompt(&self, user_id: &str, prompt: &str);

    fn clear(&self, user_id: &str);
}

#[derive(Debug, Default)]
struct History {
    system_prompt: Option<String>,
    messages: Vec<Message>,
}

/// Bounded in-memory store. Oldest entries are dropped beyond `max_messages`.
#[derive(Debug)]
pub struct InMemoryConversationStore {
    histories: Mutex<HashMap<String, History>>,
    max_messages: usize,
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(50)
    }
}

impl InMemoryConversationStore {
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        Self {
            histories: Mutex::new(HashMap::new()),
            max_messages: max_messages.max(1),
        }
    }

    fn with_history<R>(&self, user_id: &str, f: impl FnOnce(&mut History) -> R) -> Option<R> {
        let mut histories = self.histories.lock().ok()?;
        Some(f(histories.entry(user_id.to_owned()).or_default()))
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn add_message(&self, user_id: &str, message: Message) {
        let max = self.max_messages;
        self.with_history(user_id, |h| {
            h.messages.push(message);
            if h.messages.len() > max {
                let excess = h.messages.len() - max;
                h.messages.drain(..excess);
                // A tool result is meaningless without the call that preceded it.
                let orphans = h
                    .messages
                    .iter()
                    .take_while(|m| m.role == Role::Tool)
                    .count();
                h.messages.drain(..orphans);
            }
        });
    }

    fn messages(&self, user_id: &str) -> Vec<Message> {
        self.with_history(user_id, |h| {
            let mut out = Vec::with_capacity(h.messages.len() + 1);
            if let Some(ref prompt) = h.system_prompt {
                out.push(Message::system(prompt.clone()));
            }
            out.extend(h.messages.iter().cloned());
            out
        })
        .unwrap_or_default()
    }

    fn set_system_prompt(&self, user_id: &str, prompt: &str) {
        self.with_history(user_id, |h| h.system_prompt = Some(prompt.to_owned()));
    }

    fn clear(&self, user_id: &str) {
        if let Ok(mut histories) = self.histories.lock() {
            histories.remove(user_id);
        }
    }
}

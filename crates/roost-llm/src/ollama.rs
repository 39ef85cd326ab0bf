use std::time::Duration;

use ollama_rs::Ollama;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::{ChatMessage, ChatMessageResponse};
use ollama_rs::generation::tools::{ToolCall, ToolCallFunction, ToolInfo};
use tokio_stream::StreamExt;

use crate::error::LlmError;
use crate::provider::{
    ChatStream, LlmProvider, Message, Role, StreamChunk, ToolDefinition, ToolUseRequest,
};

const DEFAULT_PORT: u16 = 11434;

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Ollama,
    timeout: Duration,
}

impl OllamaProvider {
    /// `timeout` bounds the wait for the response to start and the gap between chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an `http(s)://host[:port]` URL.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LlmError> {
        let (host, port) = parse_host_port(base_url)?;
        Ok(Self {
            client: Ollama::new(host, port),
            timeout,
        })
    }

    /// Check if Ollama is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection to Ollama fails.
    pub async fn health_check(&self) -> Result<(), LlmError> {
        tokio::time::timeout(self.timeout, self.client.list_local_models())
            .await
            .map_err(|_| LlmError::Stream("Ollama health check timed out".into()))?
            .map_err(|e| LlmError::Other(format!("failed to connect to Ollama: {e}")))?;
        Ok(())
    }
}

impl LlmProvider for OllamaProvider {
    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatStream, LlmError> {
        let history = messages.iter().map(convert_message).collect();
        let mut request = ChatMessageRequest::new(model.to_owned(), history);
        if let Some(defs) = tools {
            let infos = defs.iter().map(convert_tool).collect::<Result<_, LlmError>>()?;
            request = request.tools(infos);
        }

        tracing::debug!(
            model,
            messages = messages.len(),
            tools = tools.map_or(0, <[ToolDefinition]>::len),
            "ollama chat request"
        );

        let pending = self.client.send_chat_messages_stream(request);
        let stream = tokio::time::timeout(self.timeout, pending)
            .await
            .map_err(|_| LlmError::Stream("Ollama did not answer in time".into()))?
            .map_err(|e| LlmError::Other(format!("Ollama streaming request failed: {e}")))?;

        let idle_secs = self.timeout.as_secs();
        let mapped = stream
            .timeout(self.timeout)
            .filter_map(move |item| match item {
                Ok(Ok(response)) => convert_response(response).map(Ok),
                Ok(Err(())) => Some(Err(LlmError::Stream("Ollama stream chunk failed".into()))),
                Err(_) => Some(Err(LlmError::Stream(format!(
                    "no data from Ollama for {idle_secs}s"
                )))),
            });

        Ok(Box::pin(mapped))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }
}

fn convert_message(msg: &Message) -> ChatMessage {
    match msg.role {
        Role::System => ChatMessage::system(msg.content.clone()),
        Role::User => ChatMessage::user(msg.content.clone()),
        Role::Tool => ChatMessage::tool(msg.content.clone()),
        Role::Assistant => {
            let mut out = ChatMessage::assistant(msg.content.clone());
            out.tool_calls = msg
                .tool_calls
                .iter()
                .map(|c| ToolCall {
                    function: ToolCallFunction {
                        name: c.name.clone(),
                        arguments: c.arguments.clone(),
                    },
                })
                .collect();
            out
        }
    }
}

fn convert_tool(def: &ToolDefinition) -> Result<ToolInfo, LlmError> {
    let info = serde_json::json!({
        "type": "function",
        "function": {
            "name": def.name,
            "description": def.description,
            "parameters": def.parameters,
        },
    });
    Ok(serde_json::from_value(info)?)
}

/// Keep-alive and final frames carry neither text nor tool calls and are skipped.
fn convert_response(response: ChatMessageResponse) -> Option<StreamChunk> {
    let message = response.message;
    let tool_calls: Vec<ToolUseRequest> = message
        .tool_calls
        .into_iter()
        .map(|c| ToolUseRequest {
            name: c.function.name,
            arguments: c.function.arguments,
        })
        .collect();
    if message.content.is_empty() && tool_calls.is_empty() {
        return None;
    }
    Some(StreamChunk {
        content: message.content,
        tool_calls,
    })
}

fn parse_host_port(url: &str) -> Result<(String, u16), LlmError> {
    let url = url.trim().trim_end_matches('/');
    let invalid = || LlmError::InvalidUrl(url.to_owned());
    let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
    if !matches!(scheme, "http" | "https") || rest.is_empty() || rest.contains('/') {
        return Err(invalid());
    }
    match rest.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| invalid())?;
            Ok((format!("{scheme}://{host}"), port))
        }
        Some(_) => Err(invalid()),
        None => Ok((url.to_owned(), DEFAULT_PORT)),
    }
}

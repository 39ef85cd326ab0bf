mod orchestrator;
mod streaming;

pub use streaming::{CANCELLED_MARKER, EditCadence, PLACEHOLDER, StreamState, split_message};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use roost_llm::{LlmProvider, ToolDefinition};
use roost_tools::{AuditAction, AuditEntry, AuditLogger, CommandExecutor, CommandPolicy};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::channel::{Channel, ChannelMessage};
use crate::config::Config;
use crate::confirm::ConfirmationGate;
use crate::context::{ConversationStore, InMemoryConversationStore};
use crate::prompt::Mode;

const AUDIT_PREVIEW_CHARS: usize = 200;

/// Shared handle that cancels whichever turn is currently running.
///
/// Every turn starts with a fresh token, so a cancel issued between turns is not carried over.
#[derive(Debug, Clone, Default)]
pub struct TurnCancel {
    current: Arc<Mutex<CancellationToken>>,
}

impl TurnCancel {
    /// Cancel the running turn, if any.
    pub fn cancel(&self) {
        if let Ok(token) = self.current.lock() {
            token.cancel();
        }
    }

    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut current) = self.current.lock() {
            *current = token.clone();
        }
        token
    }
}

/// Turn controller: reads user messages from a channel, drives the model, and routes every
/// command the model asks for through the policy, the confirmation gate, and the executor.
pub struct Agent<P: LlmProvider, C: Channel, E: CommandExecutor> {
    provider: P,
    channel: C,
    executor: E,
    policy: Arc<CommandPolicy>,
    store: Arc<dyn ConversationStore>,
    audit: Arc<AuditLogger>,
    gate: ConfirmationGate,
    mode: Mode,
    tools_enabled: bool,
    model: String,
    cadence: EditCadence,
    message_limit: usize,
    shutdown: watch::Receiver<bool>,
    turn_cancel: TurnCancel,
}

impl<P: LlmProvider, C: Channel, E: CommandExecutor> Agent<P, C, E> {
    #[must_use]
    pub fn new(provider: P, channel: C, executor: E) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            provider,
            channel,
            executor,
            policy: Arc::new(CommandPolicy::default()),
            store: Arc::new(InMemoryConversationStore::default()),
            audit: Arc::new(AuditLogger::disabled()),
            gate: ConfirmationGate::default(),
            mode: Mode::default(),
            tools_enabled: true,
            model: crate::config::LlmConfig::default().model,
            cadence: EditCadence::default(),
            message_limit: 2000,
            shutdown: rx,
            turn_cancel: TurnCancel::default(),
        }
    }

    /// Apply mode, model, streaming, history, and confirmation settings.
    ///
    /// The command policy is not derived here because building it can fail; pass it with
    /// [`Agent::with_policy`].
    #[must_use]
    pub fn with_config(self, config: &Config) -> Self {
        self.with_mode(config.agent.mode)
            .with_tools_enabled(config.tools.enabled)
            .with_model(config.llm.model.clone())
            .with_stream_cadence(EditCadence {
                interval: Duration::from_millis(config.agent.stream_edit_interval_ms),
                tokens: config.agent.stream_edit_tokens,
            })
            .with_message_limit(config.agent.message_limit)
            .with_store(Arc::new(InMemoryConversationStore::new(
                config.agent.history_limit,
            )))
            .with_gate(ConfirmationGate::from_config(&config.confirm))
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<CommandPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn with_gate(mut self, gate: ConfirmationGate) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// When disabled, no mode offers tools and replies are never scanned for commands.
    #[must_use]
    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_stream_cadence(mut self, cadence: EditCadence) -> Self {
        self.cadence = cadence;
        self
    }

    #[must_use]
    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = rx;
        self
    }

    /// Handle for stopping the running turn from outside the loop, e.g. on Ctrl-C.
    #[must_use]
    pub fn cancel_handle(&self) -> TurnCancel {
        self.turn_cancel.clone()
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn offered_tools(&self) -> Vec<ToolDefinition> {
        if self.tools_enabled {
            self.mode.tools()
        } else {
            Vec::new()
        }
    }

    /// Run the chat loop, receiving messages via the channel until EOF or shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel fails.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.audit
            .log(&AuditEntry::new(
                "system",
                AuditAction::BotReady,
                format!("mode={} model={}", self.mode, self.model),
            ))
            .await;
        tracing::info!(mode = %self.mode, model = %self.model, "agent ready");

        loop {
            let incoming = tokio::select! {
                result = self.channel.recv() => result?,
                () = shutdown_signal(&mut self.shutdown) => {
                    tracing::info!("shutting down");
                    break;
                }
            };
            let Some(msg) = incoming else { break };
            self.process_message(msg).await?;
        }
        Ok(())
    }

    /// Handle one incoming message: a slash command or a conversational turn.
    ///
    /// Turn failures are reported to the user and do not end the loop.
    ///
    /// # Errors
    ///
    /// Returns an error only if the channel itself fails.
    pub async fn process_message(&mut self, msg: ChannelMessage) -> anyhow::Result<()> {
        let ChannelMessage { user_id, text } = msg;
        let trimmed = text.trim();

        let preview: String = trimmed.chars().take(AUDIT_PREVIEW_CHARS).collect();
        self.audit
            .log(&AuditEntry::new(&user_id, AuditAction::Message, preview))
            .await;

        if trimmed == "/mode" || trimmed.starts_with("/mode ") {
            let arg = trimmed.strip_prefix("/mode").unwrap_or("").trim();
            return self.handle_mode_command(arg).await;
        }
        if trimmed == "/model" || trimmed.starts_with("/model ") {
            let arg = trimmed.strip_prefix("/model").unwrap_or("").trim();
            return self.handle_model_command(arg).await;
        }
        if trimmed == "/clear" {
            self.store.clear(&user_id);
            self.channel.send("Conversation cleared.").await?;
            return Ok(());
        }

        let cancel = self.turn_cancel.begin();
        let span = tracing::info_span!("turn", user_id = %user_id, mode = %self.mode);
        if let Err(e) = self
            .process_turn(&user_id, &text, &cancel)
            .instrument(span)
            .await
        {
            tracing::error!(user_id, "turn failed: {e:#}");
            self.channel.send(&format!("Error: {e}")).await?;
        }
        Ok(())
    }

    async fn handle_mode_command(&mut self, arg: &str) -> anyhow::Result<()> {
        if arg.is_empty() {
            self.channel
                .send(&format!(
                    "Current mode: {}. Available: planning, fast.",
                    self.mode
                ))
                .await?;
            return Ok(());
        }
        match Mode::try_parse(arg) {
            Some(mode) => {
                self.mode = mode;
                tracing::info!(%mode, "mode switched");
                self.channel.send(&format!("Mode set to {mode}.")).await?;
            }
            None => {
                self.channel
                    .send(&format!(
                        "Unknown mode '{arg}'. Available: planning, fast."
                    ))
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_model_command(&mut self, arg: &str) -> anyhow::Result<()> {
        if arg.is_empty() {
            self.channel
                .send(&format!("Current model: {}", self.model))
                .await?;
            return Ok(());
        }
        self.model = arg.to_owned();
        tracing::info!(model = %self.model, "model switched");
        self.channel
            .send(&format!("Model set to {}.", self.model))
            .await?;
        Ok(())
    }
}

async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

//! Turn controller, execution orchestrator, confirmation gate, and configuration.

pub mod agent;
pub mod channel;
pub mod config;
pub mod confirm;
pub mod context;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod prompt;

pub use agent::{Agent, TurnCancel};
pub use channel::{Channel, ChannelError, ChannelMessage, MessageId};
pub use config::Config;
pub use confirm::{ConfirmationGate, ConfirmationRequest, Decision, Resolver};
pub use context::{ConversationStore, InMemoryConversationStore};
pub use error::AgentError;
pub use prompt::Mode;

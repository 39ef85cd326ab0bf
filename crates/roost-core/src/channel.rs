use crate::confirm::{ConfirmationRequest, Resolver};

/// Typed error for channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel closed (mpsc send/recv failure).
    #[error("channel closed")]
    ChannelClosed,

    /// The referenced message no longer exists on the transport.
    #[error("unknown message id {0}")]
    UnknownMessage(u64),

    /// Catch-all for transport-specific errors.
    #[error("{0}")]
    Other(String),
}

/// Incoming message from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub user_id: String,
    pub text: String,
}

impl ChannelMessage {
    #[must_use]
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
        }
    }
}

/// Handle to a message already shown on the transport, used for edits and deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u64);

/// Bidirectional chat transport for the agent.
pub trait Channel: Send {
    /// Receive the next message. Returns `None` on EOF or shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn recv(&mut self)
    -> impl Future<Output = Result<Option<ChannelMessage>, ChannelError>> + Send;

    /// Send a new message and return its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn send(&mut self, text: &str) -> impl Future<Output = Result<MessageId, ChannelError>> + Send;

    /// Replace the text of a previously sent message.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails or the message is gone.
    fn edit(
        &mut self,
        id: MessageId,
        text: &str,
    ) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Remove a previously sent message.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn delete(&mut self, id: MessageId) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Send a typing indicator. No-op by default.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn send_typing(&mut self) -> impl Future<Output = Result<(), ChannelError>> + Send {
        async { Ok(()) }
    }

    /// Present an approval prompt for `request` to its requester.
    ///
    /// The surface answers through `resolver`, either before returning or later from its own
    /// callback. It should stop accepting answers after `request.display_timeout` and call
    /// [`Resolver::expire`]. Default: deny immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt cannot be shown.
    fn request_approval(
        &mut self,
        request: &ConfirmationRequest,
        resolver: Resolver,
    ) -> impl Future<Output = Result<(), ChannelError>> + Send {
        let _ = request;
        resolver.deny();
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_message_creation() {
        let msg = ChannelMessage::new("42", "hello");
        assert_eq!(msg.user_id, "42");
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn channel_error_display() {
        assert_eq!(ChannelError::ChannelClosed.to_string(), "channel closed");
        assert_eq!(
            ChannelError::UnknownMessage(7).to_string(),
            "unknown message id 7"
        );
        assert_eq!(ChannelError::Other("boom".into()).to_string(), "boom");
    }
}

//! Transport Traits
//!
//! The chat-service surface the bot consumes: send, edit, acknowledge, and an
//! indefinite long-poll for inbound events.

use async_trait::async_trait;

use crate::error::Result;
use crate::events::InboundEvent;
use crate::messages::{CallbackId, MessageEdit, MessageId, OutgoingMessage};

/// Chat-service surface
///
/// Implementations must tolerate [`MessageTransport::receive`] running in one
/// task while the send/edit methods are called from others.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Transport name for logs
    fn name(&self) -> &str;

    /// Send a message, returning its id
    async fn send_message(&self, message: &OutgoingMessage) -> Result<MessageId>;

    /// Edit a previously sent message's text and/or controls
    async fn edit_message(&self, edit: &MessageEdit) -> Result<()>;

    /// Acknowledge a button press, optionally with a short toast
    async fn answer_callback(&self, callback_id: &CallbackId, notice: Option<&str>) -> Result<()>;

    /// Wait for the next batch of inbound events
    ///
    /// May block indefinitely; callers race it against cancellation. An empty
    /// batch is a normal long-poll timeout.
    async fn receive(&self) -> Result<Vec<InboundEvent>>;
}

//! Inbound Events
//!
//! What the chat service delivers to the bot: slash commands and button
//! presses, each tagged with the originating chat and user.

use serde::{Deserialize, Serialize};

use crate::messages::{CallbackId, ChatId, MessageId, UserId};

/// An event received from the chat service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundEvent {
    /// User sent a slash command
    Command {
        /// Chat the command was sent in
        chat_id: ChatId,
        /// User who sent it
        user_id: UserId,
        /// Command name without the leading `/` or `@botname` suffix
        command: String,
        /// Whitespace-separated arguments
        args: Vec<String>,
    },

    /// User pressed an inline button
    Callback {
        /// Identifier to acknowledge
        callback_id: CallbackId,
        /// Chat holding the message with the button
        chat_id: ChatId,
        /// User who pressed it
        user_id: UserId,
        /// Message the button was attached to
        message_id: MessageId,
        /// Current text of that message
        message_text: String,
        /// Raw button payload
        data: String,
    },
}

impl InboundEvent {
    /// Chat this event came from
    #[must_use]
    pub fn chat_id(&self) -> ChatId {
        match self {
            Self::Command { chat_id, .. } | Self::Callback { chat_id, .. } => *chat_id,
        }
    }

    /// User this event came from
    #[must_use]
    pub fn user_id(&self) -> UserId {
        match self {
            Self::Command { user_id, .. } | Self::Callback { user_id, .. } => *user_id,
        }
    }

    /// Parse raw message text into a command event
    ///
    /// Returns `None` for text that does not start with `/`. A `@botname`
    /// suffix on the command is dropped.
    #[must_use]
    pub fn parse_command(chat_id: ChatId, user_id: UserId, text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let mut tokens = rest.split_whitespace();
        let head = tokens.next()?;
        let command = head.split('@').next().unwrap_or(head);
        if command.is_empty() {
            return None;
        }

        Some(Self::Command {
            chat_id,
            user_id,
            command: command.to_lowercase(),
            args: tokens.map(str::to_string).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_with_args() {
        let event =
            InboundEvent::parse_command(ChatId(1), UserId(2), "/add 22.02.2021 Pay  rent").unwrap();
        assert_eq!(
            event,
            InboundEvent::Command {
                chat_id: ChatId(1),
                user_id: UserId(2),
                command: "add".to_string(),
                args: vec!["22.02.2021".into(), "Pay".into(), "rent".into()],
            }
        );
    }

    #[test]
    fn test_parse_command_strips_bot_suffix() {
        let event = InboundEvent::parse_command(ChatId(1), UserId(2), "/Cancel@NotifierBot").unwrap();
        match event {
            InboundEvent::Command { command, args, .. } => {
                assert_eq!(command, "cancel");
                assert!(args.is_empty());
            }
            InboundEvent::Callback { .. } => panic!("Expected command"),
        }
    }

    #[test]
    fn test_parse_command_ignores_plain_text() {
        assert!(InboundEvent::parse_command(ChatId(1), UserId(2), "hello").is_none());
        assert!(InboundEvent::parse_command(ChatId(1), UserId(2), "/").is_none());
        assert!(InboundEvent::parse_command(ChatId(1), UserId(2), "/@bot").is_none());
    }
}

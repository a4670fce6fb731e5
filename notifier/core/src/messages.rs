//! Outbound Messages
//!
//! Types the bot sends to the chat service: identifiers, inline keyboards,
//! and message edits. Kept transport-neutral so the engine never sees Telegram
//! JSON directly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::{ActionKind, ActionPayload};
use crate::error::Result;

/// Chat identifier (a private chat or a group)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier; conversations are keyed by this
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a message within a chat
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a button press awaiting acknowledgment
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackId(pub String);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inline button
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    /// Label shown to the user
    pub text: String,
    /// Encoded action payload returned on press
    pub callback_data: String,
}

impl InlineButton {
    /// Build a button whose payload is checked against the size limit
    ///
    /// # Errors
    ///
    /// Returns [`crate::NotifierError::PayloadTooLarge`] if the payload does not fit.
    pub fn action(text: impl Into<String>, kind: ActionKind, reference: &str) -> Result<Self> {
        Ok(Self {
            text: text.into(),
            callback_data: ActionPayload::new(kind, reference).encode()?,
        })
    }
}

/// Rows of inline buttons attached to a message
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboard {
    /// Button rows, top to bottom
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    /// A keyboard with no buttons; sending it clears existing controls
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// One button per row
    #[must_use]
    pub fn single_column(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    /// Whether there are no buttons
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    /// Iterate over every button
    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

/// A message to send
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Destination chat
    pub chat_id: ChatId,
    /// Message text
    pub text: String,
    /// Optional inline controls
    pub keyboard: Option<InlineKeyboard>,
}

impl OutgoingMessage {
    /// Plain text message
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            keyboard: None,
        }
    }

    /// Attach inline controls
    #[must_use]
    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Change to a previously sent message
///
/// `text: None` keeps the current text and only replaces the controls.
/// `keyboard: None` on a text edit removes the controls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEdit {
    /// Chat the message lives in
    pub chat_id: ChatId,
    /// Message to edit
    pub message_id: MessageId,
    /// Replacement text
    pub text: Option<String>,
    /// Replacement controls
    pub keyboard: Option<InlineKeyboard>,
}

impl MessageEdit {
    /// Remove every inline control, leaving the text alone
    #[must_use]
    pub fn clear_keyboard(chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            chat_id,
            message_id,
            text: None,
            keyboard: Some(InlineKeyboard::empty()),
        }
    }

    /// Replace the controls, leaving the text alone
    #[must_use]
    pub fn replace_keyboard(chat_id: ChatId, message_id: MessageId, keyboard: InlineKeyboard) -> Self {
        Self {
            chat_id,
            message_id,
            text: None,
            keyboard: Some(keyboard),
        }
    }

    /// Replace the text; controls are removed unless set with [`Self::with_keyboard`]
    pub fn text(chat_id: ChatId, message_id: MessageId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            message_id,
            text: Some(text.into()),
            keyboard: None,
        }
    }

    /// Attach replacement controls
    #[must_use]
    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

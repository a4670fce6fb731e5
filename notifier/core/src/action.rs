//! Button Action Codec
//!
//! Interactive buttons carry a short opaque string that comes back when the
//! button is pressed. This module owns that wire format:
//!
//! ```text
//! <action-tag>:<reference>
//! mark-finished:5f1a0c2e9b3d4a0012345678
//! choose-add-board:5f1a0c2e9b3d4a0012345678
//! ```
//!
//! The tag never contains `:`, so the first separator splits the payload and
//! the reference may contain anything. The encoded form must fit the chat
//! transport's callback data limit of 64 bytes; [`encode`] checks this before
//! anything is sent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NotifierError, Result};

/// Hard limit on encoded payload size imposed by the chat transport
pub const MAX_PAYLOAD_BYTES: usize = 64;

const SEPARATOR: char = ':';

/// What a button does when pressed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Mark the referenced card complete
    MarkFinished,
    /// Pick the board for a card being added
    ChooseAddBoard,
    /// Pick the list for a card being added
    ChooseAddList,
}

impl ActionKind {
    /// All known kinds
    pub const ALL: [Self; 3] = [Self::MarkFinished, Self::ChooseAddBoard, Self::ChooseAddList];

    /// Wire tag for this kind
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::MarkFinished => "mark-finished",
            Self::ChooseAddBoard => "choose-add-board",
            Self::ChooseAddList => "choose-add-list",
        }
    }

    /// Look up a kind by its wire tag
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Decoded button payload
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionPayload {
    /// Action to perform
    pub kind: ActionKind,
    /// Opaque reference, usually a board, list, or card id
    pub reference: String,
}

impl ActionPayload {
    /// Create a payload
    pub fn new(kind: ActionKind, reference: impl Into<String>) -> Self {
        Self {
            kind,
            reference: reference.into(),
        }
    }

    /// Encode this payload for attaching to a button
    ///
    /// # Errors
    ///
    /// Returns [`NotifierError::PayloadTooLarge`] if the encoded form exceeds
    /// [`MAX_PAYLOAD_BYTES`].
    pub fn encode(&self) -> Result<String> {
        encode(self.kind, &self.reference)
    }
}

/// Encode an action and reference into button data
///
/// # Errors
///
/// Returns [`NotifierError::PayloadTooLarge`] if the encoded form exceeds
/// [`MAX_PAYLOAD_BYTES`].
pub fn encode(kind: ActionKind, reference: &str) -> Result<String> {
    let tag = kind.tag();
    let size = tag.len() + SEPARATOR.len_utf8() + reference.len();
    if size > MAX_PAYLOAD_BYTES {
        return Err(NotifierError::PayloadTooLarge {
            size,
            limit: MAX_PAYLOAD_BYTES,
        });
    }

    let mut raw = String::with_capacity(size);
    raw.push_str(tag);
    raw.push(SEPARATOR);
    raw.push_str(reference);
    Ok(raw)
}

/// Decode button data back into an action and reference
///
/// # Errors
///
/// - [`NotifierError::MalformedPayload`] if there is no separator or the tag is empty
/// - [`NotifierError::UnknownAction`] if the tag is well formed but not recognised
pub fn decode(raw: &str) -> Result<ActionPayload> {
    let Some((tag, reference)) = raw.split_once(SEPARATOR) else {
        return Err(NotifierError::MalformedPayload(raw.to_string()));
    };
    if tag.is_empty() {
        return Err(NotifierError::MalformedPayload(raw.to_string()));
    }

    let kind =
        ActionKind::from_tag(tag).ok_or_else(|| NotifierError::UnknownAction(tag.to_string()))?;
    Ok(ActionPayload::new(kind, reference))
}

//! In-Memory Transport
//!
//! Channel-fed [`MessageTransport`] for tests and local runs. Inbound events
//! are pushed through an `mpsc` sender; everything the bot sends or edits is
//! recorded and the current text of each message is tracked.
//!
//! # Usage
//!
//! ```ignore
//! let (transport, events) = InMemoryTransport::new_pair();
//! events.send(InboundEvent::parse_command(chat, user, "/add 1.1.2021 x").unwrap()).await?;
//! // hand `transport` to the dispatcher, then inspect `transport.sent()`
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use super::traits::MessageTransport;
use crate::error::{NotifierError, Result};
use crate::events::InboundEvent;
use crate::messages::{CallbackId, ChatId, InlineKeyboard, MessageEdit, MessageId, OutgoingMessage};

/// A message as the chat client would currently display it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayedMessage {
    /// Chat holding the message
    pub chat_id: ChatId,
    /// Current text
    pub text: String,
    /// Current controls
    pub keyboard: Option<InlineKeyboard>,
}

#[derive(Default)]
struct Record {
    sent: Vec<(MessageId, OutgoingMessage)>,
    edits: Vec<MessageEdit>,
    answers: Vec<(CallbackId, Option<String>)>,
    displayed: HashMap<MessageId, DisplayedMessage>,
}

/// In-memory chat transport
pub struct InMemoryTransport {
    event_rx: AsyncMutex<mpsc::Receiver<InboundEvent>>,
    record: Mutex<Record>,
    unavailable: AtomicBool,
    reject_text_edits: AtomicBool,
    next_message_id: AtomicI64,
}

impl InMemoryTransport {
    /// Create a transport and the sender that feeds it events
    #[must_use]
    pub fn new_pair() -> (Self, mpsc::Sender<InboundEvent>) {
        Self::new_pair_with_capacity(100)
    }

    /// Create with custom channel capacity
    #[must_use]
    pub fn new_pair_with_capacity(capacity: usize) -> (Self, mpsc::Sender<InboundEvent>) {
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let transport = Self {
            event_rx: AsyncMutex::new(event_rx),
            record: Mutex::new(Record::default()),
            unavailable: AtomicBool::new(false),
            reject_text_edits: AtomicBool::new(false),
            next_message_id: AtomicI64::new(100),
        };
        (transport, event_tx)
    }

    /// Make every outbound call fail with an upstream error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make edits that replace message text fail; keyboard-only edits still apply
    pub fn set_reject_text_edits(&self, reject: bool) {
        self.reject_text_edits.store(reject, Ordering::SeqCst);
    }

    /// Messages sent so far, with their assigned ids
    #[must_use]
    pub fn sent(&self) -> Vec<(MessageId, OutgoingMessage)> {
        self.record.lock().sent.clone()
    }

    /// Texts of messages sent to `chat_id`, in order
    #[must_use]
    pub fn sent_texts(&self, chat_id: ChatId) -> Vec<String> {
        self.record
            .lock()
            .sent
            .iter()
            .filter(|(_, m)| m.chat_id == chat_id)
            .map(|(_, m)| m.text.clone())
            .collect()
    }

    /// Edits applied so far
    #[must_use]
    pub fn edits(&self) -> Vec<MessageEdit> {
        self.record.lock().edits.clone()
    }

    /// Callback acknowledgments with their notices
    #[must_use]
    pub fn answers(&self) -> Vec<(CallbackId, Option<String>)> {
        self.record.lock().answers.clone()
    }

    /// What a message currently looks like after all edits
    #[must_use]
    pub fn displayed(&self, message_id: MessageId) -> Option<DisplayedMessage> {
        self.record.lock().displayed.get(&message_id).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(NotifierError::messaging("transport unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    fn name(&self) -> &'static str {
        "InMemory"
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<MessageId> {
        self.check_available()?;
        let id = MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst));
        let mut record = self.record.lock();
        record.displayed.insert(
            id,
            DisplayedMessage {
                chat_id: message.chat_id,
                text: message.text.clone(),
                keyboard: message.keyboard.clone(),
            },
        );
        record.sent.push((id, message.clone()));
        Ok(id)
    }

    async fn edit_message(&self, edit: &MessageEdit) -> Result<()> {
        self.check_available()?;
        if edit.text.is_some() && self.reject_text_edits.load(Ordering::SeqCst) {
            return Err(NotifierError::messaging("text edit rejected"));
        }
        let mut record = self.record.lock();
        let shown = record
            .displayed
            .get_mut(&edit.message_id)
            .ok_or_else(|| NotifierError::messaging(format!("message {} not found", edit.message_id)))?;

        match &edit.text {
            Some(text) => {
                shown.text.clone_from(text);
                shown.keyboard.clone_from(&edit.keyboard);
            }
            None => shown.keyboard.clone_from(&edit.keyboard),
        }
        if shown.keyboard.as_ref().is_some_and(InlineKeyboard::is_empty) {
            shown.keyboard = None;
        }
        record.edits.push(edit.clone());
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &CallbackId, notice: Option<&str>) -> Result<()> {
        self.check_available()?;
        self.record
            .lock()
            .answers
            .push((callback_id.clone(), notice.map(str::to_string)));
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<InboundEvent>> {
        let mut rx = self.event_rx.lock().await;
        let Some(first) = rx.recv().await else {
            // Every sender dropped; wait for cancellation
            return std::future::pending().await;
        };

        let mut batch = vec![first];
        while let Ok(event) = rx.try_recv() {
            batch.push(event);
        }
        Ok(batch)
    }
}

//! Event Dispatcher
//!
//! Routes every inbound event:
//!
//! - slash commands go to the conversation engine (`/add`, `/cancel`), the
//!   scan job (`/due`), or a usage reply (`/start`, `/help`)
//! - button presses are decoded; `mark-finished` is handled here, add-flow
//!   actions go to the pressing user's conversation
//!
//! Failures are reported to the user (when they would expect feedback) and
//! logged. Nothing here stops the loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::action::{self, ActionKind, ActionPayload};
use crate::board::BoardClient;
use crate::conversation::{ChoiceOutcome, ConversationEngine, ConversationTable};
use crate::error::{NotifierError, Result};
use crate::events::InboundEvent;
use crate::messages::{CallbackId, ChatId, MessageEdit, MessageId, OutgoingMessage, UserId};
use crate::scheduler::DueScan;
use crate::transport::MessageTransport;

/// Appended to a reminder once its card is finished
pub const COMPLETION_MARKER: &str = "\n\u{2705} Finished";

/// Reply for button presses the bot cannot interpret
pub const UNAVAILABLE_NOTICE: &str = "This command is unavailable.";

/// Reply for add-flow presses that do not match the current step
pub const FINISH_OR_CANCEL_NOTICE: &str = "Finish the current step or /cancel first.";

const NO_LISTS_NOTICE: &str = "That board has no open lists.";

const HELP_TEXT: &str = "\
I remind you about Trello cards that are due.

/add <dd.mm.yyyy> <card name> - add a card
/cancel - abort adding a card
/due - show due cards now
/help - this message";

/// Append the completion marker unless the text already carries it
#[must_use]
pub fn with_completion_marker(text: &str) -> String {
    if text.contains(COMPLETION_MARKER) {
        text.to_string()
    } else {
        format!("{text}{COMPLETION_MARKER}")
    }
}

/// Routes inbound events for the owner chat
pub struct Dispatcher {
    board: Arc<dyn BoardClient>,
    transport: Arc<dyn MessageTransport>,
    engine: ConversationEngine,
    scan: Arc<DueScan>,
    owner_chat_id: ChatId,
}

impl Dispatcher {
    /// Create a dispatcher serving `owner_chat_id`
    pub fn new(
        board: Arc<dyn BoardClient>,
        transport: Arc<dyn MessageTransport>,
        scan: Arc<DueScan>,
        owner_chat_id: ChatId,
        conversation_timeout: Duration,
    ) -> Self {
        let engine = ConversationEngine::new(board.clone(), transport.clone(), conversation_timeout);
        Self {
            board,
            transport,
            engine,
            scan,
            owner_chat_id,
        }
    }

    /// Active conversations
    #[must_use]
    pub fn conversations(&self) -> &ConversationTable {
        self.engine.table()
    }

    /// Handle one inbound event
    pub async fn handle_event(&self, event: InboundEvent) {
        if event.chat_id() != self.owner_chat_id {
            tracing::debug!(
                chat_id = %event.chat_id(),
                user_id = %event.user_id(),
                "Ignoring event from foreign chat"
            );
            return;
        }

        match event {
            InboundEvent::Command {
                chat_id,
                user_id,
                command,
                args,
            } => {
                if let Err(e) = self.handle_command(chat_id, user_id, &command, &args).await {
                    self.report(chat_id, user_id, &e).await;
                }
            }

            InboundEvent::Callback {
                callback_id,
                chat_id,
                user_id,
                message_id,
                message_text,
                data,
            } => {
                let notice = self
                    .handle_callback(chat_id, user_id, message_id, &message_text, &data)
                    .await;
                self.answer(&callback_id, notice.as_deref()).await;
            }
        }
    }

    async fn handle_command(&self, chat_id: ChatId, user_id: UserId, command: &str, args: &[String]) -> Result<()> {
        tracing::debug!(chat_id = %chat_id, user_id = %user_id, command, "Command received");
        match command {
            "add" => self.engine.start_add(chat_id, user_id, args).await.map(drop),
            "cancel" => self.engine.cancel(chat_id, user_id).await.map(drop),
            "due" => {
                let report = self.scan.run(Local::now().date_naive()).await?;
                if report.eligible == 0 {
                    self.send(chat_id, "Nothing is due.").await?;
                }
                Ok(())
            }
            "start" | "help" => self.send(chat_id, HELP_TEXT).await,
            other => {
                tracing::info!(user_id = %user_id, command = other, "Unknown command");
                self.send(chat_id, format!("Unknown command /{other}. Try /help.")).await
            }
        }
    }

    /// Returns the notice to show on the pressed button, if any
    async fn handle_callback(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        message_id: MessageId,
        message_text: &str,
        data: &str,
    ) -> Option<String> {
        let payload = match action::decode(data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(user_id = %user_id, data, error = %e, "Undecodable button payload");
                return Some(UNAVAILABLE_NOTICE.to_string());
            }
        };

        let result = match payload.kind {
            ActionKind::MarkFinished => self
                .mark_finished(chat_id, message_id, message_text, &payload.reference)
                .await
                .map(|()| None),
            ActionKind::ChooseAddBoard | ActionKind::ChooseAddList => {
                self.choose(user_id, message_id, &payload).await
            }
        };

        match result {
            Ok(notice) => notice,
            Err(e) => {
                tracing::warn!(user_id = %user_id, action = %payload.kind, error = %e, "Button press failed");
                e.is_user_visible().then(|| e.to_string())
            }
        }
    }

    async fn mark_finished(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        message_text: &str,
        card_id: &str,
    ) -> Result<()> {
        self.board.mark_complete(card_id).await?;
        tracing::info!(card_id, "Card marked finished");

        self.transport
            .edit_message(&MessageEdit::text(
                chat_id,
                message_id,
                with_completion_marker(message_text),
            ))
            .await
    }

    async fn choose(&self, user_id: UserId, message_id: MessageId, payload: &ActionPayload) -> Result<Option<String>> {
        let notice = match self.engine.choose(user_id, message_id, payload).await? {
            ChoiceOutcome::Rejected => Some(FINISH_OR_CANCEL_NOTICE.to_string()),
            ChoiceOutcome::NoLists => Some(NO_LISTS_NOTICE.to_string()),
            ChoiceOutcome::AwaitingList | ChoiceOutcome::Completed(_) => None,
        };
        Ok(notice)
    }

    async fn send(&self, chat_id: ChatId, text: impl Into<String>) -> Result<()> {
        self.transport
            .send_message(&OutgoingMessage::text(chat_id, text))
            .await
            .map(drop)
    }

    async fn answer(&self, callback_id: &CallbackId, notice: Option<&str>) {
        if let Err(e) = self.transport.answer_callback(callback_id, notice).await {
            tracing::warn!(callback_id = %callback_id, error = %e, "Failed to answer button press");
        }
    }

    async fn report(&self, chat_id: ChatId, user_id: UserId, error: &NotifierError) {
        if !error.is_user_visible() {
            tracing::error!(user_id = %user_id, error = %error, "Command aborted");
            return;
        }
        tracing::info!(user_id = %user_id, error = %error, "Command rejected");
        if let Err(e) = self.send(chat_id, error.to_string()).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to deliver notice");
        }
    }

    /// Receive and dispatch events until `cancel` fires
    ///
    /// Each event runs in its own task so one user's slow step never holds up
    /// another user. Tasks for the same user are chained, so that user's
    /// events are handled one at a time in arrival order. A pending long-poll
    /// is dropped on cancellation, and in-flight events are allowed to finish.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            transport = self.transport.name(),
            board = self.board.name(),
            owner_chat_id = %self.owner_chat_id,
            "Starting dispatcher"
        );
        let mut tasks = JoinSet::new();
        let mut lanes = UserLanes::default();

        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => break,
                received = self.transport.receive() => received,
            };

            match received {
                Ok(events) => {
                    for event in events {
                        let dispatcher = Arc::clone(&self);
                        let (previous, done) = lanes.enter(event.user_id());
                        tasks.spawn(async move {
                            if let Some(previous) = previous {
                                // Err only means the earlier task is gone
                                let _ = previous.await;
                            }
                            dispatcher.handle_event(event).await;
                            drop(done);
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to receive events");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }

            while let Some(finished) = tasks.try_join_next() {
                if let Err(e) = finished {
                    tracing::error!(error = %e, "Event task panicked");
                }
            }
            lanes.prune();
        }

        while tasks.join_next().await.is_some() {}
        tracing::info!("Dispatcher stopped");
    }
}

/// Per-user completion chain
///
/// Every spawned event task holds a sender that is dropped when it finishes.
/// The next task for the same user waits on the matching receiver first.
#[derive(Default)]
struct UserLanes {
    tails: HashMap<UserId, oneshot::Receiver<()>>,
}

impl UserLanes {
    /// Join the user's lane: the task to wait for, and the handle to drop when done
    fn enter(&mut self, user_id: UserId) -> (Option<oneshot::Receiver<()>>, oneshot::Sender<()>) {
        let (done, tail) = oneshot::channel();
        let previous = self.tails.insert(user_id, tail);
        (previous, done)
    }

    /// Forget lanes whose last task has finished
    fn prune(&mut self) {
        self.tails
            .retain(|_, tail| matches!(tail.try_recv(), Err(oneshot::error::TryRecvError::Empty)));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.tails.len()
    }
}

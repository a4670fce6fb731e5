//! Add-Card Conversations
//!
//! The multi-step dialog that turns `/add <date> <name...>` into a new card:
//!
//! ```text
//! IDLE ──/add──▶ AWAITING_BOARD_CHOICE ──board──▶ AWAITING_LIST_CHOICE ──list──▶ COMPLETED
//!                        │                                 │
//!                        └──────────────/cancel────────────┴──────────────────▶ CANCELLED
//! ```
//!
//! State lives in a [`ConversationTable`] keyed by user id. Each user has its
//! own async mutex, held for the whole step, so two events from one user never
//! interleave while different users never wait on each other. A slot is
//! dropped from the table as soon as it is empty and unlocked.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::action::{ActionKind, ActionPayload};
use crate::board::{BoardClient, Card, NewCard};
use crate::dates::{format_due_date, parse_due_date};
use crate::error::{NotifierError, Result};
use crate::messages::{ChatId, InlineButton, InlineKeyboard, MessageEdit, MessageId, OutgoingMessage, UserId};
use crate::transport::MessageTransport;

/// Default inactivity timeout
pub const DEFAULT_CONVERSATION_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Where a user's dialog stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversationStep {
    /// No dialog
    Idle,
    /// Board options shown, waiting for a press
    AwaitingBoardChoice,
    /// List options shown, waiting for a press
    AwaitingListChoice,
    /// Card created; the dialog is gone
    Completed,
    /// User cancelled; the dialog is gone
    Cancelled,
}

impl ConversationStep {
    /// The only action accepted in this step
    #[must_use]
    pub fn expected_action(self) -> Option<ActionKind> {
        match self {
            Self::AwaitingBoardChoice => Some(ActionKind::ChooseAddBoard),
            Self::AwaitingListChoice => Some(ActionKind::ChooseAddList),
            Self::Idle | Self::Completed | Self::Cancelled => None,
        }
    }
}

/// One user's in-progress dialog
#[derive(Clone, Debug)]
pub struct ConversationState {
    /// Current step; always one of the awaiting steps while stored
    pub step: ConversationStep,
    /// Chat the prompt was sent to
    pub chat_id: ChatId,
    /// Message carrying the current options
    pub prompt: MessageId,
    /// Parsed due date
    pub due: NaiveDate,
    /// Card name
    pub name: String,
    /// Board picked in the first step
    pub board_id: Option<String>,
    /// Controls currently shown on the prompt
    pub options: InlineKeyboard,
    /// Last time the user advanced the dialog
    pub last_active: Instant,
}

/// Result of pressing an add-flow button
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChoiceOutcome {
    /// Wrong action or stale message; nothing changed
    Rejected,
    /// The chosen board has no open lists; nothing changed
    NoLists,
    /// Board accepted, list options shown
    AwaitingList,
    /// Card created, dialog destroyed
    Completed(Card),
}

type Slot = Arc<Mutex<Option<ConversationState>>>;

/// Exclusive access to one user's dialog
///
/// Dereferences to the stored state. On drop the slot is removed from the
/// table if the dialog is gone and nobody else holds it.
pub struct SlotGuard<'a> {
    table: &'a ConversationTable,
    user_id: UserId,
    guard: OwnedMutexGuard<Option<ConversationState>>,
}

impl Deref for SlotGuard<'_> {
    type Target = Option<ConversationState>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for SlotGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.guard.is_some() {
            return;
        }
        // Handles are only cloned out of the map under the shard lock, so a
        // count of two (map plus this guard) means nobody is waiting on it.
        let held = OwnedMutexGuard::mutex(&self.guard);
        self.table
            .slots
            .remove_if(&self.user_id, |_, slot| Arc::ptr_eq(slot, held) && Arc::strong_count(slot) == 2);
    }
}

/// Per-user conversation storage
pub struct ConversationTable {
    slots: DashMap<UserId, Slot>,
    timeout: Duration,
}

impl ConversationTable {
    /// Empty table with the given inactivity timeout
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            timeout,
        }
    }

    /// Lock one user's slot, dropping the dialog if it has gone idle
    ///
    /// The map shard is released before awaiting the user's mutex.
    pub async fn lock(&self, user_id: UserId) -> SlotGuard<'_> {
        let slot = self.slots.entry(user_id).or_default().clone();
        let mut guard = slot.lock_owned().await;

        let expired = guard
            .as_ref()
            .is_some_and(|state| state.last_active.elapsed() > self.timeout);
        if expired {
            tracing::info!(user_id = %user_id, "Conversation timed out");
            *guard = None;
        }
        SlotGuard {
            table: self,
            user_id,
            guard,
        }
    }

    /// Number of users with a slot in the table
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.slots.len()
    }

    /// Current step for a user
    pub async fn step(&self, user_id: UserId) -> ConversationStep {
        self.lock(user_id)
            .await
            .as_ref()
            .map_or(ConversationStep::Idle, |state| state.step)
    }

    /// Number of users with a live dialog
    pub async fn active_count(&self) -> usize {
        let users: Vec<UserId> = self.slots.iter().map(|entry| *entry.key()).collect();
        let mut count = 0;
        for user_id in users {
            if self.lock(user_id).await.is_some() {
                count += 1;
            }
        }
        count
    }
}

/// Drives add-card dialogs against the board and chat services
pub struct ConversationEngine {
    board: Arc<dyn BoardClient>,
    transport: Arc<dyn MessageTransport>,
    table: ConversationTable,
}

impl ConversationEngine {
    /// Create an engine
    pub fn new(
        board: Arc<dyn BoardClient>,
        transport: Arc<dyn MessageTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            board,
            transport,
            table: ConversationTable::new(timeout),
        }
    }

    /// The backing table
    #[must_use]
    pub fn table(&self) -> &ConversationTable {
        &self.table
    }

    /// Handle `/add <dd.mm.yyyy> <name...>`
    ///
    /// On success the user is shown one button per board and the dialog moves
    /// to [`ConversationStep::AwaitingBoardChoice`]. On any error no state is
    /// created.
    ///
    /// # Errors
    ///
    /// - [`NotifierError::ConversationInProgress`] if the user already has a dialog
    /// - [`NotifierError::MissingArguments`] with fewer than two tokens
    /// - [`NotifierError::InvalidDateFormat`] if the first token is not a date
    /// - [`NotifierError::UpstreamServiceError`] if a service call fails
    pub async fn start_add(&self, chat_id: ChatId, user_id: UserId, args: &[String]) -> Result<ConversationStep> {
        let mut slot = self.table.lock(user_id).await;
        if slot.is_some() {
            return Err(NotifierError::ConversationInProgress);
        }

        let [date, name_tokens @ ..] = args else {
            return Err(NotifierError::MissingArguments);
        };
        let due = parse_due_date(date)?;
        if name_tokens.is_empty() {
            return Err(NotifierError::MissingArguments);
        }
        let name = name_tokens.concat();

        let boards = self.board.list_boards().await?;
        if boards.is_empty() {
            self.transport
                .send_message(&OutgoingMessage::text(chat_id, "There are no open boards to add a card to."))
                .await?;
            return Ok(ConversationStep::Idle);
        }

        let buttons = boards
            .iter()
            .map(|b| InlineButton::action(&b.name, ActionKind::ChooseAddBoard, &b.id))
            .collect::<Result<Vec<_>>>()?;
        let options = InlineKeyboard::single_column(buttons);
        let prompt = OutgoingMessage::text(
            chat_id,
            format!("Choose a board for \"{name}\" (due {}):", format_due_date(due)),
        )
        .with_keyboard(options.clone());
        let prompt = self.transport.send_message(&prompt).await?;

        tracing::debug!(user_id = %user_id, %due, "Add dialog started");
        *slot = Some(ConversationState {
            step: ConversationStep::AwaitingBoardChoice,
            chat_id,
            prompt,
            due,
            name,
            board_id: None,
            options,
            last_active: Instant::now(),
        });
        Ok(ConversationStep::AwaitingBoardChoice)
    }

    /// Handle an add-flow button press
    ///
    /// # Errors
    ///
    /// - [`NotifierError::NoActiveConversation`] if the user has no dialog
    /// - [`NotifierError::UpstreamServiceError`] if a service call fails; the
    ///   dialog stays where it was
    pub async fn choose(
        &self,
        user_id: UserId,
        message_id: MessageId,
        action: &ActionPayload,
    ) -> Result<ChoiceOutcome> {
        let mut slot = self.table.lock(user_id).await;
        let Some(state) = slot.as_mut() else {
            return Err(NotifierError::NoActiveConversation);
        };

        if state.prompt != message_id || state.step.expected_action() != Some(action.kind) {
            tracing::debug!(
                user_id = %user_id,
                action = %action.kind,
                step = ?state.step,
                "Rejected out-of-step choice"
            );
            return Ok(ChoiceOutcome::Rejected);
        }

        match action.kind {
            ActionKind::ChooseAddBoard => self.choose_board(state, &action.reference).await,
            ActionKind::ChooseAddList => {
                let card = self.choose_list(state, &action.reference).await?;
                let finished = slot.take();
                if let Some(state) = finished {
                    self.confirm(&state, &card).await?;
                }
                Ok(ChoiceOutcome::Completed(card))
            }
            ActionKind::MarkFinished => Ok(ChoiceOutcome::Rejected),
        }
    }

    async fn choose_board(&self, state: &mut ConversationState, board_id: &str) -> Result<ChoiceOutcome> {
        let board = self.board.get_board(board_id).await?;
        let lists = self.board.list_lists(board_id).await?;
        if lists.is_empty() {
            return Ok(ChoiceOutcome::NoLists);
        }

        let buttons = lists
            .iter()
            .map(|l| InlineButton::action(&l.name, ActionKind::ChooseAddList, &l.id))
            .collect::<Result<Vec<_>>>()?;
        let options = InlineKeyboard::single_column(buttons);

        self.transport
            .edit_message(&MessageEdit::clear_keyboard(state.chat_id, state.prompt))
            .await?;
        let rendered = self
            .transport
            .edit_message(
                &MessageEdit::text(
                    state.chat_id,
                    state.prompt,
                    format!("Choose a list on {} for \"{}\":", board.name, state.name),
                )
                .with_keyboard(options.clone()),
            )
            .await;
        if let Err(e) = rendered {
            // Put the board buttons back so the step can be retried
            let restore = MessageEdit::replace_keyboard(state.chat_id, state.prompt, state.options.clone());
            if let Err(restore_error) = self.transport.edit_message(&restore).await {
                tracing::warn!(error = %restore_error, "Failed to restore board options");
            }
            return Err(e);
        }

        state.step = ConversationStep::AwaitingListChoice;
        state.board_id = Some(board.id);
        state.options = options;
        state.last_active = Instant::now();
        Ok(ChoiceOutcome::AwaitingList)
    }

    async fn choose_list(&self, state: &ConversationState, list_id: &str) -> Result<Card> {
        let card = self
            .board
            .create_card(&NewCard {
                list_id: list_id.to_string(),
                name: state.name.clone(),
                due: state.due,
            })
            .await?;
        tracing::info!(
            card_id = %card.id,
            board_id = state.board_id.as_deref().unwrap_or_default(),
            "Card created"
        );
        Ok(card)
    }

    async fn confirm(&self, state: &ConversationState, card: &Card) -> Result<()> {
        self.transport
            .edit_message(&MessageEdit::clear_keyboard(state.chat_id, state.prompt))
            .await?;
        self.transport
            .edit_message(&MessageEdit::text(
                state.chat_id,
                state.prompt,
                format!("Card \"{}\" added, due {}.", card.name, format_due_date(state.due)),
            ))
            .await
    }

    /// Handle `/cancel`
    ///
    /// The dialog is destroyed before the prompt is tidied up, so a failed
    /// edit never leaves it alive.
    ///
    /// # Errors
    ///
    /// - [`NotifierError::NoActiveConversation`] if there is nothing to cancel
    /// - [`NotifierError::UpstreamServiceError`] if the notice cannot be sent
    pub async fn cancel(&self, chat_id: ChatId, user_id: UserId) -> Result<ConversationStep> {
        let state = self
            .table
            .lock(user_id)
            .await
            .take()
            .ok_or(NotifierError::NoActiveConversation)?;

        if let Err(e) = self
            .transport
            .edit_message(&MessageEdit::clear_keyboard(state.chat_id, state.prompt))
            .await
        {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to clear cancelled prompt");
        }
        self.transport
            .send_message(&OutgoingMessage::text(chat_id, "Adding the card was cancelled."))
            .await?;
        Ok(ConversationStep::Cancelled)
    }
}

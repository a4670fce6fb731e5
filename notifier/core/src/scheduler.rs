//! Due-Card Scheduler
//!
//! Wakes every tick (about a second), checks whether a trigger has elapsed,
//! and if so runs one scan: every open card that is incomplete and due on or
//! before today gets a reminder with a "Mark finished" button.
//!
//! # Trigger policies
//!
//! - **Daily**: a list of wall-clock `HH:MM` times, each firing at most once
//!   per calendar day. A time already passed when the scheduler starts waits
//!   for tomorrow.
//! - **Interval**: a fixed period, for testing and degraded setups.
//!
//! Scans keep no state. An incomplete card is reminded about on every scan
//! until someone finishes it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::action::ActionKind;
use crate::board::{BoardClient, Card};
use crate::dates::format_due_date;
use crate::error::Result;
use crate::messages::{ChatId, InlineButton, InlineKeyboard, OutgoingMessage};
use crate::transport::MessageTransport;

/// Default loop tick
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Label of the button attached to every reminder
pub const MARK_FINISHED_LABEL: &str = "Mark finished";

/// When scans fire
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerPolicy {
    /// Once per day at each of these local times
    Daily(Vec<NaiveTime>),
    /// Every fixed period
    Interval(Duration),
}

/// One daily trigger time and the last day it fired
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Time of day
    pub at: NaiveTime,
    /// Day it last fired (or was skipped at startup)
    pub last_fired: Option<NaiveDate>,
}

impl ScheduleEntry {
    /// Entry created at `now`; a time already passed today counts as fired
    #[must_use]
    pub fn new(at: NaiveTime, now: NaiveDateTime) -> Self {
        let last_fired = (now.time() >= at).then(|| now.date());
        Self { at, last_fired }
    }

    /// Whether the entry should fire at `now`
    #[must_use]
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now.time() >= self.at && self.last_fired != Some(now.date())
    }
}

/// Trigger bookkeeping, separated from the clock so it can be driven by tests
#[derive(Debug)]
pub enum Triggers {
    /// Daily entries
    Daily(Vec<ScheduleEntry>),
    /// Fixed period since the last fire
    Interval {
        /// Period
        every: Duration,
        /// Last fire (or creation)
        last: Instant,
    },
}

impl Triggers {
    /// Build trigger state for `policy` as of `now`
    #[must_use]
    pub fn new(policy: &TriggerPolicy, now: NaiveDateTime, instant: Instant) -> Self {
        match policy {
            TriggerPolicy::Daily(times) => {
                Self::Daily(times.iter().map(|&at| ScheduleEntry::new(at, now)).collect())
            }
            TriggerPolicy::Interval(every) => Self::Interval {
                every: *every,
                last: instant,
            },
        }
    }

    /// Check the triggers, marking any that fire
    ///
    /// Several daily entries elapsing in the same tick produce one scan.
    pub fn poll(&mut self, now: NaiveDateTime, instant: Instant) -> bool {
        match self {
            Self::Daily(entries) => {
                let mut fired = false;
                for entry in entries.iter_mut().filter(|e| e.is_due(now)) {
                    entry.last_fired = Some(now.date());
                    fired = true;
                }
                fired
            }
            Self::Interval { every, last } => {
                if instant.duration_since(*last) >= *every {
                    *last = instant;
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// Cards a scan on `today` should remind about
#[must_use]
pub fn eligible_cards(cards: Vec<Card>, today: NaiveDate) -> Vec<Card> {
    cards.into_iter().filter(|card| card.is_due_by(today)).collect()
}

/// Reminder message for one card
///
/// # Errors
///
/// Returns [`crate::NotifierError::PayloadTooLarge`] if the card id does not fit
/// in a button payload.
pub fn notification(chat_id: ChatId, card: &Card) -> Result<OutgoingMessage> {
    let due = card.due_date().map(format_due_date).unwrap_or_default();
    let button = InlineButton::action(MARK_FINISHED_LABEL, ActionKind::MarkFinished, &card.id)?;
    Ok(
        OutgoingMessage::text(chat_id, format!("\u{23f0} {due} {}", card.name))
            .with_keyboard(InlineKeyboard::single_column(vec![button])),
    )
}

/// Outcome of one scan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Eligible cards found
    pub eligible: usize,
    /// Reminders delivered
    pub sent: usize,
}

/// Scan-and-notify job shared by the scheduler loop and `/due`
pub struct DueScan {
    board: Arc<dyn BoardClient>,
    transport: Arc<dyn MessageTransport>,
    chat_id: ChatId,
}

impl DueScan {
    /// Create a job that reminds `chat_id`
    pub fn new(board: Arc<dyn BoardClient>, transport: Arc<dyn MessageTransport>, chat_id: ChatId) -> Self {
        Self {
            board,
            transport,
            chat_id,
        }
    }

    /// Query the board and send one reminder per eligible card
    ///
    /// A failed send skips that card only.
    ///
    /// # Errors
    ///
    /// Returns an upstream error if the cards cannot be listed.
    pub async fn run(&self, today: NaiveDate) -> Result<ScanReport> {
        let cards = eligible_cards(self.board.all_open_cards().await?, today);
        let mut report = ScanReport {
            eligible: cards.len(),
            sent: 0,
        };

        for card in &cards {
            let message = match notification(self.chat_id, card) {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!(card_id = %card.id, error = %e, "Cannot build reminder");
                    continue;
                }
            };
            match self.transport.send_message(&message).await {
                Ok(_) => report.sent += 1,
                Err(e) => tracing::warn!(card_id = %card.id, error = %e, "Failed to send reminder"),
            }
        }
        Ok(report)
    }
}

/// Long-running scheduler task
pub struct Scheduler {
    policy: TriggerPolicy,
    tick: Duration,
    job: Arc<DueScan>,
}

impl Scheduler {
    /// Create a scheduler
    pub fn new(policy: TriggerPolicy, tick: Duration, job: Arc<DueScan>) -> Self {
        Self { policy, tick, job }
    }

    /// Run until `cancel` fires
    ///
    /// A failed scan is logged; the next trigger retries naturally.
    pub async fn run(self, cancel: CancellationToken) {
        let mut triggers = Triggers::new(&self.policy, Local::now().naive_local(), Instant::now());
        tracing::info!(policy = ?self.policy, tick = ?self.tick, "Starting scheduler");

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Scheduler stopped");
                    break;
                }
                _ = interval.tick() => {}
            }

            let now = Local::now().naive_local();
            if !triggers.poll(now, Instant::now()) {
                continue;
            }

            match self.job.run(now.date()).await {
                Ok(report) => tracing::info!(
                    eligible = report.eligible,
                    sent = report.sent,
                    "Due-card scan finished"
                ),
                Err(e) => tracing::warn!(error = %e, "Due-card scan failed"),
            }
        }
    }
}

//! Board Client Traits
//!
//! The query surface the bot needs from a task-board service. The bot only
//! holds transient copies of boards, lists, and cards; the service owns them.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A board (top-level container)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Service identifier
    pub id: String,
    /// Display name
    pub name: String,
}

/// A list within a board
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardList {
    /// Service identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Board this list belongs to
    pub board_id: String,
}

/// A card (task) within a list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Service identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Owning board
    pub board_id: String,
    /// Owning list
    pub list_id: String,
    /// When the card is due, if ever
    pub due: Option<DateTime<Utc>>,
    /// Whether the due date has been marked complete
    pub due_complete: bool,
}

impl Card {
    /// Calendar date the card is due on (UTC)
    #[must_use]
    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due.map(|due| due.date_naive())
    }

    /// Whether a scan on `today` should remind about this card
    ///
    /// Cards without a due date are never eligible. Overdue cards stay
    /// eligible until completed.
    #[must_use]
    pub fn is_due_by(&self, today: NaiveDate) -> bool {
        !self.due_complete && self.due_date().is_some_and(|due| due <= today)
    }
}

/// Request to create a card
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCard {
    /// List to create the card in
    pub list_id: String,
    /// Card name
    pub name: String,
    /// Due date
    pub due: NaiveDate,
}

/// Task-board service surface
///
/// Implementations must be safe to call from the dispatcher and scheduler
/// tasks at the same time.
#[async_trait]
pub trait BoardClient: Send + Sync {
    /// Service name for logs
    fn name(&self) -> &str;

    /// List open boards visible to the bot's account
    async fn list_boards(&self) -> Result<Vec<Board>>;

    /// Fetch a single board
    async fn get_board(&self, board_id: &str) -> Result<Board>;

    /// List open lists of a board
    async fn list_lists(&self, board_id: &str) -> Result<Vec<BoardList>>;

    /// List open (non-archived) cards of a board
    async fn open_cards(&self, board_id: &str) -> Result<Vec<Card>>;

    /// Create a card in a list
    async fn create_card(&self, card: &NewCard) -> Result<Card>;

    /// Set a card's due-complete flag; completing a completed card is not an error
    async fn mark_complete(&self, card_id: &str) -> Result<()>;

    /// Open cards across every open board
    async fn all_open_cards(&self) -> Result<Vec<Card>> {
        let mut cards = Vec::new();
        for board in self.list_boards().await? {
            cards.extend(self.open_cards(&board.id).await?);
        }
        Ok(cards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn card(due: Option<(i32, u32, u32)>, due_complete: bool) -> Card {
        Card {
            id: "c1".to_string(),
            name: "Pay rent".to_string(),
            board_id: "b1".to_string(),
            list_id: "l1".to_string(),
            due: due.map(|(y, m, d)| Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()),
            due_complete,
        }
    }

    #[test]
    fn test_due_by_eligibility() {
        let today = NaiveDate::from_ymd_opt(2021, 2, 22).unwrap();

        assert!(card(Some((2021, 2, 21)), false).is_due_by(today));
        assert!(card(Some((2021, 2, 22)), false).is_due_by(today));
        assert!(card(Some((2020, 12, 1)), false).is_due_by(today));

        assert!(!card(Some((2021, 2, 21)), true).is_due_by(today));
        assert!(!card(Some((2021, 2, 23)), false).is_due_by(today));
        assert!(!card(None, false).is_due_by(today));
    }
}

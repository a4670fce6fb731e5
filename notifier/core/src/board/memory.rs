//! In-Memory Board
//!
//! A [`BoardClient`] backed by plain vectors for tests. It records every
//! write so assertions can inspect them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;

use super::traits::{Board, BoardClient, BoardList, Card, NewCard};
use crate::error::{NotifierError, Result};

#[derive(Default)]
struct BoardData {
    boards: Vec<Board>,
    lists: Vec<BoardList>,
    cards: Vec<Card>,
    created: Vec<NewCard>,
    completions: Vec<String>,
}

/// In-memory board service
#[derive(Default)]
pub struct InMemoryBoard {
    data: Mutex<BoardData>,
    unavailable: AtomicBool,
    next_id: AtomicU64,
}

impl InMemoryBoard {
    /// Empty board service
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a board
    #[must_use]
    pub fn with_board(self, id: &str, name: &str) -> Self {
        self.data.lock().boards.push(Board {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Add a list to a board
    #[must_use]
    pub fn with_list(self, board_id: &str, id: &str, name: &str) -> Self {
        self.data.lock().lists.push(BoardList {
            id: id.to_string(),
            name: name.to_string(),
            board_id: board_id.to_string(),
        });
        self
    }

    /// Add a card
    #[must_use]
    pub fn with_card(self, card: Card) -> Self {
        self.data.lock().cards.push(card);
        self
    }

    /// Build a card due at noon UTC on `due`
    #[must_use]
    pub fn card(id: &str, name: &str, board_id: &str, due: Option<NaiveDate>) -> Card {
        Card {
            id: id.to_string(),
            name: name.to_string(),
            board_id: board_id.to_string(),
            list_id: format!("{board_id}-list"),
            due: due.and_then(|d| d.and_hms_opt(12, 0, 0)).map(|dt| Utc.from_utc_datetime(&dt)),
            due_complete: false,
        }
    }

    /// Make every call fail with an upstream error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Cards created through [`BoardClient::create_card`]
    #[must_use]
    pub fn created_cards(&self) -> Vec<NewCard> {
        self.data.lock().created.clone()
    }

    /// Card ids passed to [`BoardClient::mark_complete`], in call order
    #[must_use]
    pub fn completions(&self) -> Vec<String> {
        self.data.lock().completions.clone()
    }

    /// Current state of a card
    #[must_use]
    pub fn find_card(&self, card_id: &str) -> Option<Card> {
        self.data.lock().cards.iter().find(|c| c.id == card_id).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(NotifierError::board("service unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl BoardClient for InMemoryBoard {
    fn name(&self) -> &'static str {
        "InMemory"
    }

    async fn list_boards(&self) -> Result<Vec<Board>> {
        self.check_available()?;
        Ok(self.data.lock().boards.clone())
    }

    async fn get_board(&self, board_id: &str) -> Result<Board> {
        self.check_available()?;
        self.data
            .lock()
            .boards
            .iter()
            .find(|b| b.id == board_id)
            .cloned()
            .ok_or_else(|| NotifierError::board(format!("board {board_id} not found")))
    }

    async fn list_lists(&self, board_id: &str) -> Result<Vec<BoardList>> {
        self.check_available()?;
        Ok(self
            .data
            .lock()
            .lists
            .iter()
            .filter(|l| l.board_id == board_id)
            .cloned()
            .collect())
    }

    async fn open_cards(&self, board_id: &str) -> Result<Vec<Card>> {
        self.check_available()?;
        Ok(self
            .data
            .lock()
            .cards
            .iter()
            .filter(|c| c.board_id == board_id)
            .cloned()
            .collect())
    }

    async fn create_card(&self, card: &NewCard) -> Result<Card> {
        self.check_available()?;
        let mut data = self.data.lock();
        let board_id = data
            .lists
            .iter()
            .find(|l| l.id == card.list_id)
            .map(|l| l.board_id.clone())
            .ok_or_else(|| NotifierError::board(format!("list {} not found", card.list_id)))?;

        let id = format!("card-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let created = Card {
            id,
            name: card.name.clone(),
            board_id,
            list_id: card.list_id.clone(),
            due: card
                .due
                .and_hms_opt(0, 0, 0)
                .map(|dt| Utc.from_utc_datetime(&dt)),
            due_complete: false,
        };
        data.cards.push(created.clone());
        data.created.push(card.clone());
        Ok(created)
    }

    async fn mark_complete(&self, card_id: &str) -> Result<()> {
        self.check_available()?;
        let mut data = self.data.lock();
        let card = data
            .cards
            .iter_mut()
            .find(|c| c.id == card_id)
            .ok_or_else(|| NotifierError::board(format!("card {card_id} not found")))?;
        card.due_complete = true;
        data.completions.push(card_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_open_cards_spans_boards() {
        let day = NaiveDate::from_ymd_opt(2021, 2, 22);
        let board = InMemoryBoard::new()
            .with_board("b1", "Work")
            .with_board("b2", "Home")
            .with_card(InMemoryBoard::card("c1", "Report", "b1", day))
            .with_card(InMemoryBoard::card("c2", "Rent", "b2", day));

        let cards = board.all_open_cards().await.unwrap();
        let ids: Vec<_> = cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn test_mark_complete_twice_is_ok() {
        let board = InMemoryBoard::new()
            .with_board("b1", "Work")
            .with_card(InMemoryBoard::card("c1", "Report", "b1", None));

        board.mark_complete("c1").await.unwrap();
        board.mark_complete("c1").await.unwrap();
        assert!(board.find_card("c1").unwrap().due_complete);
        assert_eq!(board.completions().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let board = InMemoryBoard::new().with_board("b1", "Work");
        board.set_unavailable(true);
        assert!(matches!(
            board.list_boards().await,
            Err(NotifierError::UpstreamServiceError { .. })
        ));
    }
}

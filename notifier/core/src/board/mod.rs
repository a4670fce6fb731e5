//! Task-Board Integration
//!
//! Abstracted access to the task-board service through the [`BoardClient`]
//! trait.
//!
//! # Available Clients
//!
//! - **Trello**: REST API client (production)
//! - **InMemory**: vector-backed double for tests and dry runs

mod memory;
mod traits;
mod trello;

pub use memory::InMemoryBoard;
pub use traits::{Board, BoardClient, BoardList, Card, NewCard};
pub use trello::{TrelloClient, TrelloConfig, DEFAULT_TRELLO_API_BASE};

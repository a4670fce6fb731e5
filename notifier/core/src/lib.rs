//! Notifier Core - Interactive Command Engine for the Trello Notifier Bot
//!
//! This crate holds everything with state or concurrency in the bot: the
//! add-card conversation, the compact button-payload protocol, and the due-card
//! scheduler. The chat and board services are reached only through traits, so
//! the engine runs the same against Telegram/Trello or the in-memory doubles.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       notifier-daemon                            │
//! │        CLI, config, logging, signals, CancellationToken          │
//! └───────────────┬──────────────────────────────────┬───────────────┘
//!                 │ spawns                           │ spawns
//! ┌───────────────┴───────────────┐  ┌───────────────┴───────────────┐
//! │          Dispatcher           │  │           Scheduler           │
//! │  receive() long-poll loop     │  │  ~1s tick, daily/interval     │
//! │  ┌─────────────────────────┐  │  │  triggers                     │
//! │  │  ConversationEngine     │  │  │  ┌─────────────────────────┐  │
//! │  │  per-user state table   │  │  │  │  DueScan (also /due)    │◀─┼── /due
//! │  └─────────────────────────┘  │  │  └─────────────────────────┘  │
//! │  ActionCodec (decode)         │  │  ActionCodec (encode)         │
//! └───────────────┬───────────────┘  └───────────────┬───────────────┘
//!                 │                                  │
//!        ┌────────┴──────────────────────────────────┴────────┐
//!        │    BoardClient (Trello)   MessageTransport (Telegram)  │
//!        └────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Dispatcher`]: routes inbound commands and button presses
//! - [`ConversationEngine`]: the `/add` state machine
//! - [`Scheduler`] / [`DueScan`]: timed scan-and-notify
//! - [`BoardClient`] / [`MessageTransport`]: service seams
//! - [`NotifierError`]: error taxonomy
//!
//! # Module Overview
//!
//! - [`action`]: button payload encoding (`<tag>:<reference>`, 64-byte cap)
//! - [`board`]: task-board client trait, Trello client, in-memory board
//! - [`config`]: TOML/env configuration
//! - [`conversation`]: add-card dialogs and the per-user table
//! - [`dates`]: strict date and trigger-time parsing
//! - [`dispatcher`]: inbound event routing
//! - [`error`]: error types
//! - [`events`]: inbound events
//! - [`messages`]: outbound messages and identifiers
//! - [`scheduler`]: trigger policies and the scan job
//! - [`transport`]: chat transport trait, Telegram transport, in-memory transport

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod board;
pub mod config;
pub mod conversation;
pub mod dates;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod messages;
pub mod scheduler;
pub mod transport;

// Re-exports for convenience
pub use action::{ActionKind, ActionPayload, MAX_PAYLOAD_BYTES};
pub use board::{Board, BoardClient, BoardList, Card, InMemoryBoard, NewCard, TrelloClient, TrelloConfig};
pub use config::{
    default_config_path, load_config_file, load_config_from_path, ConfigError, ConfigOverrides, ConfigSource,
    NotifierConfig,
};
pub use conversation::{ChoiceOutcome, ConversationEngine, ConversationState, ConversationStep, ConversationTable};
pub use dispatcher::Dispatcher;
pub use error::{NotifierError, Result, Service};
pub use events::InboundEvent;
pub use messages::{CallbackId, ChatId, InlineButton, InlineKeyboard, MessageEdit, MessageId, OutgoingMessage, UserId};
pub use scheduler::{DueScan, ScanReport, ScheduleEntry, Scheduler, TriggerPolicy};
pub use transport::{InMemoryTransport, MessageTransport, TelegramConfig, TelegramTransport};

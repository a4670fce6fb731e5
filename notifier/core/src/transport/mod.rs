//! Chat Transport
//!
//! Abstracted access to the chat service through the [`MessageTransport`]
//! trait.
//!
//! # Available Transports
//!
//! - **Telegram**: Bot API over HTTPS with long-polling (production)
//! - **InMemory**: channel-fed double that records outbound traffic

mod in_memory;
mod telegram;
mod traits;

pub use in_memory::{DisplayedMessage, InMemoryTransport};
pub use telegram::{TelegramConfig, TelegramTransport, DEFAULT_TELEGRAM_API_BASE};
pub use traits::MessageTransport;

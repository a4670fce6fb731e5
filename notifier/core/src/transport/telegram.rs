//! Telegram Bot API Transport
//!
//! # Bot API methods used
//!
//! - `getUpdates` - long-poll for messages and callback queries
//! - `sendMessage` - text with optional `inline_keyboard`
//! - `editMessageText` / `editMessageReplyMarkup` - rewrite a sent message
//! - `answerCallbackQuery` - dismiss the client's button spinner
//!
//! The update offset is guarded by a mutex so only one poll runs at a time.
//! Outbound calls share a `reqwest::Client` (safe for concurrent use) and are
//! bounded by a semaphore.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};

use super::traits::MessageTransport;
use crate::error::{NotifierError, Result};
use crate::events::InboundEvent;
use crate::messages::{
    CallbackId, ChatId, InlineKeyboard, MessageEdit, MessageId, OutgoingMessage, UserId,
};

/// Default Bot API base URL
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Error text Telegram returns for an edit that changes nothing
const NOT_MODIFIED: &str = "message is not modified";

/// Telegram connection settings
#[derive(Clone, Debug)]
pub struct TelegramConfig {
    /// Bot token
    pub bot_token: String,
    /// Base URL (overridable for tests)
    pub api_base: String,
    /// Long-poll timeout passed to `getUpdates`
    pub poll_timeout: Duration,
    /// Timeout for every other call
    pub request_timeout: Duration,
    /// Maximum outbound calls in flight
    pub max_concurrent_requests: usize,
}

impl TelegramConfig {
    /// Settings with default base URL and timeouts
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            poll_timeout: Duration::from_secs(25),
            request_timeout: Duration::from_secs(30),
            max_concurrent_requests: 4,
        }
    }

    /// Override the base URL
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Override the long-poll timeout
    #[must_use]
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<TgMessage>,
    #[serde(default)]
    callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    #[serde(default)]
    from: Option<TgUser>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    #[serde(default)]
    message: Option<TgMessage>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct TgButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

#[derive(Debug, Serialize)]
struct TgMarkup<'a> {
    inline_keyboard: Vec<Vec<TgButton<'a>>>,
}

impl<'a> From<&'a InlineKeyboard> for TgMarkup<'a> {
    fn from(keyboard: &'a InlineKeyboard) -> Self {
        Self {
            inline_keyboard: keyboard
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| TgButton {
                            text: &b.text,
                            callback_data: &b.callback_data,
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<TgMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct EditTextRequest<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<TgMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct EditMarkupRequest<'a> {
    chat_id: i64,
    message_id: i64,
    reply_markup: TgMarkup<'a>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackRequest<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

/// Convert one update into an event, skipping anything we don't handle
fn update_to_event(update: Update) -> Option<InboundEvent> {
    if let Some(query) = update.callback_query {
        let message = query.message?;
        return Some(InboundEvent::Callback {
            callback_id: CallbackId(query.id),
            chat_id: ChatId(message.chat.id),
            user_id: UserId(query.from.id),
            message_id: MessageId(message.message_id),
            message_text: message.text.unwrap_or_default(),
            data: query.data.unwrap_or_default(),
        });
    }

    let message = update.message?;
    let user_id = message.from.as_ref().map_or(message.chat.id, |u| u.id);
    InboundEvent::parse_command(ChatId(message.chat.id), UserId(user_id), message.text.as_deref()?)
}

// ============================================================================
// Client
// ============================================================================

/// Telegram Bot API transport
pub struct TelegramTransport {
    config: TelegramConfig,
    http_client: reqwest::Client,
    gate: Semaphore,
    offset: Mutex<i64>,
}

impl TelegramTransport {
    /// Create a transport
    ///
    /// # Errors
    ///
    /// Returns an upstream error if the HTTP client cannot be built.
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| NotifierError::messaging(format!("Failed to create HTTP client: {e}")))?;
        let gate = Semaphore::new(config.max_concurrent_requests.max(1));

        Ok(Self {
            config,
            http_client,
            gate,
            offset: Mutex::new(0),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    async fn call<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T> {
        let response = self
            .http_client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| NotifierError::messaging(format!("{method}: failed to send request: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NotifierError::messaging(format!("{method}: failed to read response: {e}")))?;

        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            NotifierError::messaging(format!("{method}: unexpected response ({status}): {e}"))
        })?;

        if !parsed.ok {
            let description = parsed.description.unwrap_or_else(|| status.to_string());
            return Err(NotifierError::messaging(format!("{method}: {description}")));
        }
        parsed
            .result
            .ok_or_else(|| NotifierError::messaging(format!("{method}: response has no result")))
    }

    async fn call_gated<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| NotifierError::messaging("transport is shut down"))?;
        self.call(method, body, self.config.request_timeout).await
    }
}

fn is_not_modified(err: &NotifierError) -> bool {
    matches!(err, NotifierError::UpstreamServiceError { message, .. } if message.contains(NOT_MODIFIED))
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    fn name(&self) -> &'static str {
        "Telegram"
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<MessageId> {
        let request = SendMessageRequest {
            chat_id: message.chat_id.0,
            text: &message.text,
            reply_markup: message.keyboard.as_ref().map(TgMarkup::from),
        };
        let sent: TgMessage = self.call_gated("sendMessage", &request).await?;
        Ok(MessageId(sent.message_id))
    }

    async fn edit_message(&self, edit: &MessageEdit) -> Result<()> {
        let result: Result<serde_json::Value> = match &edit.text {
            Some(text) => {
                let request = EditTextRequest {
                    chat_id: edit.chat_id.0,
                    message_id: edit.message_id.0,
                    text,
                    reply_markup: edit.keyboard.as_ref().map(TgMarkup::from),
                };
                self.call_gated("editMessageText", &request).await
            }
            None => {
                let empty = InlineKeyboard::empty();
                let request = EditMarkupRequest {
                    chat_id: edit.chat_id.0,
                    message_id: edit.message_id.0,
                    reply_markup: TgMarkup::from(edit.keyboard.as_ref().unwrap_or(&empty)),
                };
                self.call_gated("editMessageReplyMarkup", &request).await
            }
        };

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => {
                tracing::debug!(message_id = %edit.message_id, "Edit left message unchanged");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn answer_callback(&self, callback_id: &CallbackId, notice: Option<&str>) -> Result<()> {
        let request = AnswerCallbackRequest {
            callback_query_id: &callback_id.0,
            text: notice,
        };
        let _: bool = self.call_gated("answerCallbackQuery", &request).await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<InboundEvent>> {
        let mut offset = self.offset.lock().await;
        let request = GetUpdatesRequest {
            offset: *offset,
            timeout: self.config.poll_timeout.as_secs(),
            allowed_updates: ["message", "callback_query"],
        };
        let poll_deadline = self.config.poll_timeout + self.config.request_timeout;
        let updates: Vec<Update> = self.call("getUpdates", &request, poll_deadline).await?;

        let mut events = Vec::with_capacity(updates.len());
        for update in updates {
            *offset = (*offset).max(update.update_id + 1);
            let update_id = update.update_id;
            match update_to_event(update) {
                Some(event) => events.push(event),
                None => tracing::trace!(update_id, "Skipping unsupported update"),
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::action::ActionKind;
    use crate::messages::InlineButton;

    fn transport(server: &MockServer) -> TelegramTransport {
        TelegramTransport::new(
            TelegramConfig::new("TOKEN")
                .with_api_base(server.uri())
                .with_poll_timeout(Duration::from_secs(0)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_receive_parses_commands_and_callbacks() {
        let server = MockServer::start().await;
        let body = r#"{"ok":true,"result":[
            {"update_id":10,"message":{"message_id":1,"chat":{"id":42},"from":{"id":7},
             "text":"/add 22.02.2021 Pay rent"}},
            {"update_id":11,"message":{"message_id":2,"chat":{"id":42},"from":{"id":7},
             "text":"just chatting"}},
            {"update_id":12,"callback_query":{"id":"cb1","from":{"id":7},
             "message":{"message_id":5,"chat":{"id":42},"text":"Rent due"},
             "data":"mark-finished:c1"}}
        ]}"#;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_partial_json(serde_json::json!({"offset": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_partial_json(serde_json::json!({"offset": 13})))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"ok":true,"result":[]}"#, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport(&server);
        let events = transport.receive().await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            InboundEvent::Command { command, args, .. } if command == "add" && args.len() == 3
        ));
        assert_eq!(
            events[1],
            InboundEvent::Callback {
                callback_id: CallbackId("cb1".to_string()),
                chat_id: ChatId(42),
                user_id: UserId(7),
                message_id: MessageId(5),
                message_text: "Rent due".to_string(),
                data: "mark-finished:c1".to_string(),
            }
        );

        // Offset advanced past every update, including the skipped one
        assert!(transport.receive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_with_keyboard() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": 42,
                "reply_markup": {"inline_keyboard": [[
                    {"text": "Work", "callback_data": "choose-add-board:b1"}
                ]]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"ok":true,"result":{"message_id":99,"chat":{"id":42}}}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let keyboard = InlineKeyboard::single_column(vec![InlineButton::action(
            "Work",
            ActionKind::ChooseAddBoard,
            "b1",
        )
        .unwrap()]);
        let id = transport(&server)
            .send_message(&OutgoingMessage::text(ChatId(42), "Choose a board").with_keyboard(keyboard))
            .await
            .unwrap();
        assert_eq!(id, MessageId(99));
    }

    #[tokio::test]
    async fn test_edit_not_modified_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/editMessageText"))
            .respond_with(ResponseTemplate::new(400).set_body_raw(
                r#"{"ok":false,"error_code":400,"description":"Bad Request: message is not modified"}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        transport(&server)
            .edit_message(&MessageEdit::text(ChatId(42), MessageId(5), "same"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_clear_keyboard_uses_markup_edit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/editMessageReplyMarkup"))
            .and(body_partial_json(serde_json::json!({
                "message_id": 5,
                "reply_markup": {"inline_keyboard": []}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"ok":true,"result":{"message_id":5,"chat":{"id":42}}}"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        transport(&server)
            .edit_message(&MessageEdit::clear_keyboard(ChatId(42), MessageId(5)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_api_error_maps_to_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/answerCallbackQuery"))
            .respond_with(ResponseTemplate::new(401).set_body_raw(
                r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let err = transport(&server)
            .answer_callback(&CallbackId("cb".to_string()), None)
            .await
            .unwrap_err();
        assert_eq!(err, NotifierError::messaging("answerCallbackQuery: Unauthorized"));
    }

    #[test]
    fn test_response_without_result_parses_as_none() {
        let parsed: ApiResponse<Vec<Update>> =
            serde_json::from_str(r#"{"ok":false,"description":"Conflict"}"#).unwrap();
        assert!(!parsed.ok);
        assert!(parsed.result.is_none());
        assert_eq!(parsed.description.as_deref(), Some("Conflict"));
    }
}

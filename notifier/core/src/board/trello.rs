//! Trello Board Client
//!
//! REST client for the Trello API. Authentication uses the `key` and `token`
//! query parameters on every request.
//!
//! # Endpoints
//!
//! - `GET /members/me/boards?filter=open` - boards of the token owner
//! - `GET /boards/{id}` - one board
//! - `GET /boards/{id}/lists?filter=open` - lists of a board
//! - `GET /boards/{id}/cards/open` - open cards of a board
//! - `POST /cards` - create a card
//! - `PUT /cards/{id}` - update a card (`dueComplete`)
//!
//! `reqwest::Client` is safe for concurrent use; a semaphore bounds how many
//! requests are in flight at once.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Semaphore;

use super::traits::{Board, BoardClient, BoardList, Card, NewCard};
use crate::dates::{due_timestamp, parse_board_timestamp};
use crate::error::{NotifierError, Result};

/// Default Trello API base URL
pub const DEFAULT_TRELLO_API_BASE: &str = "https://api.trello.com/1";

/// Trello connection settings
#[derive(Clone, Debug)]
pub struct TrelloConfig {
    /// API key
    pub api_key: String,
    /// API token
    pub api_token: String,
    /// Base URL (overridable for tests)
    pub api_base: String,
    /// Maximum requests in flight
    pub max_concurrent_requests: usize,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl TrelloConfig {
    /// Settings with default base URL and limits
    pub fn new(api_key: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_token: api_token.into(),
            api_base: DEFAULT_TRELLO_API_BASE.to_string(),
            max_concurrent_requests: 4,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Override the base URL
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// Trello card as returned by the API
#[derive(Debug, Deserialize)]
struct TrelloCard {
    id: String,
    name: String,
    #[serde(rename = "idBoard")]
    id_board: String,
    #[serde(rename = "idList")]
    id_list: String,
    #[serde(default)]
    due: Option<String>,
    #[serde(rename = "dueComplete", default)]
    due_complete: bool,
}

impl From<TrelloCard> for Card {
    fn from(card: TrelloCard) -> Self {
        Self {
            due: card.due.as_deref().and_then(parse_board_timestamp),
            id: card.id,
            name: card.name,
            board_id: card.id_board,
            list_id: card.id_list,
            due_complete: card.due_complete,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TrelloBoard {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TrelloList {
    id: String,
    name: String,
    #[serde(rename = "idBoard")]
    id_board: String,
}

/// Error body returned by Trello on failure
#[derive(Debug, Deserialize)]
struct TrelloErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Trello REST client
pub struct TrelloClient {
    config: TrelloConfig,
    http_client: reqwest::Client,
    gate: Semaphore,
}

impl TrelloClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns an upstream error if the HTTP client cannot be built.
    pub fn new(config: TrelloConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| NotifierError::board(format!("Failed to create HTTP client: {e}")))?;
        let gate = Semaphore::new(config.max_concurrent_requests.max(1));

        Ok(Self {
            config,
            http_client,
            gate,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base.trim_end_matches('/'))
    }

    fn auth(&self) -> [(&str, &str); 2] {
        [
            ("key", self.config.api_key.as_str()),
            ("token", self.config.api_token.as_str()),
        ]
    }

    async fn request<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| NotifierError::board("client is shut down"))?;

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::board(format!("Failed to send request: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NotifierError::board(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<TrelloErrorResponse>(&body)
                .ok()
                .and_then(|e| e.message.or(e.error))
                .unwrap_or(body);
            return Err(NotifierError::board(format!("Trello returned {status}: {detail}")));
        }

        serde_json::from_str(&body)
            .map_err(|e| NotifierError::board(format!("Failed to parse response: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T> {
        let request = self
            .http_client
            .get(self.url(path))
            .query(&self.auth())
            .query(params);
        self.request(request).await
    }
}

#[async_trait]
impl BoardClient for TrelloClient {
    fn name(&self) -> &'static str {
        "Trello"
    }

    async fn list_boards(&self) -> Result<Vec<Board>> {
        let boards: Vec<TrelloBoard> = self
            .get("/members/me/boards", &[("filter", "open"), ("fields", "name")])
            .await?;
        Ok(boards
            .into_iter()
            .map(|b| Board {
                id: b.id,
                name: b.name,
            })
            .collect())
    }

    async fn get_board(&self, board_id: &str) -> Result<Board> {
        let board: TrelloBoard = self
            .get(&format!("/boards/{board_id}"), &[("fields", "name")])
            .await?;
        Ok(Board {
            id: board.id,
            name: board.name,
        })
    }

    async fn list_lists(&self, board_id: &str) -> Result<Vec<BoardList>> {
        let lists: Vec<TrelloList> = self
            .get(&format!("/boards/{board_id}/lists"), &[("filter", "open")])
            .await?;
        Ok(lists
            .into_iter()
            .map(|l| BoardList {
                id: l.id,
                name: l.name,
                board_id: l.id_board,
            })
            .collect())
    }

    async fn open_cards(&self, board_id: &str) -> Result<Vec<Card>> {
        let cards: Vec<TrelloCard> = self
            .get(&format!("/boards/{board_id}/cards/open"), &[])
            .await?;
        Ok(cards.into_iter().map(Card::from).collect())
    }

    async fn create_card(&self, card: &NewCard) -> Result<Card> {
        let due = due_timestamp(card.due);
        let form = [
            ("idList", card.list_id.as_str()),
            ("name", card.name.as_str()),
            ("due", due.as_str()),
        ];
        let request = self
            .http_client
            .post(self.url("/cards"))
            .query(&self.auth())
            .form(&form);
        let created: TrelloCard = self.request(request).await?;
        Ok(created.into())
    }

    async fn mark_complete(&self, card_id: &str) -> Result<()> {
        let request = self
            .http_client
            .put(self.url(&format!("/cards/{card_id}")))
            .query(&self.auth())
            .form(&[("dueComplete", "true")]);
        let _: serde_json::Value = self.request(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> TrelloClient {
        TrelloClient::new(TrelloConfig::new("k", "t").with_api_base(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_list_boards_sends_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/members/me/boards"))
            .and(query_param("key", "k"))
            .and(query_param("token", "t"))
            .and(query_param("filter", "open"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"[{"id":"b1","name":"Work"},{"id":"b2","name":"Home"}]"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let boards = client(&server).list_boards().await.unwrap();
        assert_eq!(boards.len(), 2);
        assert_eq!(boards[0].name, "Work");
        assert_eq!(boards[1].id, "b2");
    }

    #[tokio::test]
    async fn test_open_cards_parses_due_fields() {
        let server = MockServer::start().await;
        let body = r#"[
            {"id":"c1","name":"Pay rent","idBoard":"b1","idList":"l1",
             "due":"2021-02-22T09:00:00.000Z","dueComplete":false},
            {"id":"c2","name":"Someday","idBoard":"b1","idList":"l1","due":null}
        ]"#;
        Mock::given(method("GET"))
            .and(path("/boards/b1/cards/open"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;

        let cards = client(&server).open_cards("b1").await.unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(
            cards[0].due_date(),
            chrono::NaiveDate::from_ymd_opt(2021, 2, 22)
        );
        assert!(!cards[0].due_complete);
        assert!(cards[1].due.is_none());
    }

    #[tokio::test]
    async fn test_create_card_posts_due_timestamp() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cards"))
            .and(body_string_contains("idList=l1"))
            .and(body_string_contains("due=2021-02-22T00%3A00%3A00.000Z"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"id":"c9","name":"Payrent","idBoard":"b1","idList":"l1",
                    "due":"2021-02-22T00:00:00.000Z","dueComplete":false}"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let card = client(&server)
            .create_card(&NewCard {
                list_id: "l1".to_string(),
                name: "Payrent".to_string(),
                due: chrono::NaiveDate::from_ymd_opt(2021, 2, 22).unwrap(),
            })
            .await
            .unwrap();
        assert_eq!(card.id, "c9");
        assert_eq!(card.list_id, "l1");
    }

    #[tokio::test]
    async fn test_mark_complete_puts_flag() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/cards/c1"))
            .and(body_string_contains("dueComplete=true"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"id":"c1","dueComplete":true}"#,
                "application/json",
            ))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        client.mark_complete("c1").await.unwrap();
        // Completing again is fine
        client.mark_complete("c1").await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_maps_to_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/boards/missing/lists"))
            .respond_with(ResponseTemplate::new(404).set_body_string("The requested resource was not found."))
            .mount(&server)
            .await;

        let err = client(&server).list_lists("missing").await.unwrap_err();
        match err {
            NotifierError::UpstreamServiceError { service, message } => {
                assert_eq!(service, crate::error::Service::Board);
                assert!(message.contains("404"));
                assert!(message.contains("not found"));
            }
            other => panic!("Expected upstream error, got {other:?}"),
        }
    }
}

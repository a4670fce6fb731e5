//! Bot Server
//!
//! Wires the clients, the dispatcher, and the scheduler together and owns
//! their lifetime:
//!
//! ```text
//!                    BotServer
//!                        │
//!          ┌─────────────┴─────────────┐
//!          │                           │
//!     Dispatcher task            Scheduler task
//!     (long-poll loop)           (~1s tick loop)
//!          │                           │
//!          └──────── CancellationToken ┘
//!                        ▲
//!                 SIGINT / SIGTERM
//! ```
//!
//! Both tasks share one `TrelloClient` and one `TelegramTransport`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use notifier_core::{
    config::NotifierConfig, BoardClient, Dispatcher, DueScan, MessageTransport, Scheduler,
    TelegramTransport, TrelloClient,
};

/// The running bot
pub struct BotServer {
    dispatcher: Arc<Dispatcher>,
    scheduler: Scheduler,
    cancel: CancellationToken,
}

impl BotServer {
    /// Build the clients and loops from a validated configuration
    pub fn from_config(config: &NotifierConfig) -> Result<Self> {
        let board: Arc<dyn BoardClient> = Arc::new(
            TrelloClient::new(config.trello_config()).context("Failed to create Trello client")?,
        );
        let transport: Arc<dyn MessageTransport> = Arc::new(
            TelegramTransport::new(config.telegram_config())
                .context("Failed to create Telegram transport")?,
        );
        let policy = config.trigger_policy().context("Invalid schedule")?;

        Ok(Self::new(
            board,
            transport,
            config.owner_chat(),
            policy,
            config.tick(),
            config.conversation_timeout(),
        ))
    }

    /// Build from already constructed clients
    pub fn new(
        board: Arc<dyn BoardClient>,
        transport: Arc<dyn MessageTransport>,
        owner: notifier_core::ChatId,
        policy: notifier_core::TriggerPolicy,
        tick: Duration,
        conversation_timeout: Duration,
    ) -> Self {
        let scan = Arc::new(DueScan::new(board.clone(), transport.clone(), owner));
        let dispatcher = Arc::new(Dispatcher::new(
            board,
            transport,
            scan.clone(),
            owner,
            conversation_timeout,
        ));
        let scheduler = Scheduler::new(policy, tick, scan);

        Self {
            dispatcher,
            scheduler,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops both loops when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until a shutdown signal, then wait for both loops to finish
    pub async fn run(self) -> Result<()> {
        let signals = tokio::spawn(wait_for_shutdown(self.cancel.clone()));
        self.run_until_cancelled().await?;
        signals.abort();
        Ok(())
    }

    /// Run until the token is cancelled
    pub async fn run_until_cancelled(self) -> Result<()> {
        let dispatcher = tokio::spawn(self.dispatcher.run(self.cancel.clone()));
        let scheduler = tokio::spawn(self.scheduler.run(self.cancel.clone()));
        info!("Bot running");

        let (dispatcher, scheduler) = tokio::join!(dispatcher, scheduler);
        dispatcher.context("Dispatcher task failed")?;
        scheduler.context("Scheduler task failed")?;
        Ok(())
    }
}

/// Cancel `cancel` on SIGINT or SIGTERM
async fn wait_for_shutdown(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
                    result = tokio::signal::ctrl_c() => log_ctrl_c(result),
                    () = cancel.cancelled() => return,
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                tokio::select! {
                    result = tokio::signal::ctrl_c() => log_ctrl_c(result),
                    () = cancel.cancelled() => return,
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => log_ctrl_c(result),
            () = cancel.cancelled() => return,
        }
    }

    cancel.cancel();
}

fn log_ctrl_c(result: std::io::Result<()>) {
    match result {
        Ok(()) => info!("Received SIGINT, initiating shutdown"),
        Err(e) => warn!(error = %e, "Failed to listen for SIGINT, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use notifier_core::{ChatId, InMemoryBoard, InMemoryTransport, InboundEvent, TriggerPolicy, UserId};

    use super::*;

    #[tokio::test]
    async fn test_server_stops_on_cancel() {
        let board = Arc::new(InMemoryBoard::new().with_board("b1", "Work"));
        let (transport, events) = InMemoryTransport::new_pair();
        let transport = Arc::new(transport);

        let server = BotServer::new(
            board,
            transport.clone(),
            ChatId(1),
            TriggerPolicy::Interval(Duration::from_secs(3600)),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );
        let cancel = server.cancel_token();
        let handle = tokio::spawn(server.run_until_cancelled());

        events
            .send(InboundEvent::parse_command(ChatId(1), UserId(1), "/help").unwrap())
            .await
            .unwrap();
        for _ in 0..50 {
            if !transport.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(transport.sent().len(), 1);
    }
}

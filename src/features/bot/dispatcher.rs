use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};

use crate::core::error::Result;
use crate::features::bot::router::CommandRouter;
use crate::modules::telegram::types::Update;
use crate::modules::telegram::ChatTransport;
use crate::shared::constants::GENERIC_FAILURE_REPLY;

/// First delay after a failed poll
const INITIAL_BACKOFF_SECS: u64 = 1;

/// Upper bound for the poll retry delay
const MAX_BACKOFF_SECS: u64 = 30;

/// Long-polling loop that hands every update to its own task
///
/// A slow upload for one user never blocks commands from another. A handler
/// that panics still produces a generic reply and leaves the loop running.
pub struct Dispatcher {
    transport: Arc<dyn ChatTransport>,
    router: Arc<CommandRouter>,
    shutdown_grace: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        router: Arc<CommandRouter>,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            transport,
            router,
            shutdown_grace,
        }
    }

    /// Poll until `shutdown` resolves, then let in-flight handlers finish
    ///
    /// Handlers still running after the grace period are aborted.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tracing::info!("Starting update dispatcher");
        tokio::pin!(shutdown);

        let mut in_flight = JoinSet::new();
        let mut offset = None;
        let mut backoff = Duration::from_secs(INITIAL_BACKOFF_SECS);

        loop {
            while let Some(finished) = in_flight.try_join_next() {
                log_join_failure(finished);
            }

            let polled = tokio::select! {
                _ = &mut shutdown => break,
                polled = self.poll_once(offset, &mut in_flight) => polled,
            };

            match polled {
                Ok(next_offset) => {
                    offset = next_offset;
                    backoff = Duration::from_secs(INITIAL_BACKOFF_SECS);
                }
                Err(e) => {
                    tracing::warn!("Polling for updates failed, retrying in {:?}: {}", backoff, e);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(Duration::from_secs(MAX_BACKOFF_SECS));
                }
            }
        }

        self.drain(in_flight).await;
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }
        tracing::info!(
            "Waiting up to {:?} for {} in-flight handlers",
            self.shutdown_grace,
            in_flight.len()
        );

        let finished = timeout(self.shutdown_grace, async {
            while let Some(result) = in_flight.join_next().await {
                log_join_failure(result);
            }
        })
        .await;

        if finished.is_err() {
            tracing::warn!("Aborting {} handlers still running", in_flight.len());
            in_flight.shutdown().await;
        }
    }

    /// Fetch one batch of updates and spawn their handlers into `in_flight`
    ///
    /// Returns the offset acknowledging the batch. Spawning happens right
    /// after the fetch, so cancelling this future never drops fetched updates.
    async fn poll_once(
        &self,
        offset: Option<i64>,
        in_flight: &mut JoinSet<()>,
    ) -> Result<Option<i64>> {
        let updates = self.transport.get_updates(offset).await?;

        let next_offset = updates
            .iter()
            .map(|u| u.update_id + 1)
            .max()
            .or(offset);

        for update in updates {
            self.dispatch(update, in_flight);
        }

        Ok(next_offset)
    }

    fn dispatch(&self, update: Update, in_flight: &mut JoinSet<()>) {
        let transport = Arc::clone(&self.transport);
        let router = Arc::clone(&self.router);

        in_flight.spawn(async move {
            let update_id = update.update_id;
            let Some(message) = update.message else {
                return;
            };
            let chat_id = message.chat.id;
            let message_id = message.message_id;

            // Inner task so a panic surfaces as a JoinError instead of killing the reply
            let reply = match tokio::spawn(async move { router.route(&message).await }).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!("Handler for update {} failed: {}", update_id, e);
                    Some(GENERIC_FAILURE_REPLY.to_string())
                }
            };

            let Some(text) = reply else {
                return;
            };
            if let Err(e) = transport
                .send_message(chat_id, &text, Some(message_id))
                .await
            {
                tracing::error!("Failed to reply in chat {}: {}", chat_id, e);
            }
        });
    }
}

fn log_join_failure(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!("Update task ended abnormally: {}", e);
    }
}

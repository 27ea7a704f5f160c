//! Administrative broadcast: one text to many accounts.

use crate::types::AccountId;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Why a single delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The platform asked us to wait before sending again.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The recipient blocked the bot or no longer exists.
    #[error("recipient unreachable")]
    Unreachable,

    #[error("delivery failed: {0}")]
    Other(String),
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, account: AccountId, text: &str) -> Result<(), DeliveryError>;
}

/// Sends a text to recipients one after another.
///
/// A rate-limit answer suspends the whole run for the requested wait and then
/// retries the same recipient. Any other failure skips that recipient.
pub struct BroadcastDispatcher {
    sink: Arc<dyn MessageSink>,
    /// Rate-limit retries per recipient before giving up on it
    max_rate_limit_retries: u32,
}

impl BroadcastDispatcher {
    pub fn new(sink: Arc<dyn MessageSink>, max_rate_limit_retries: u32) -> Self {
        Self {
            sink,
            max_rate_limit_retries,
        }
    }

    /// Deliver `text` to each of `recipients` and return how many succeeded.
    pub async fn broadcast(&self, text: &str, recipients: &[AccountId]) -> usize {
        let mut delivered = 0;
        for &account in recipients {
            if self.deliver_one(account, text).await {
                delivered += 1;
            }
        }
        tracing::info!(
            "Broadcast delivered to {}/{} accounts",
            delivered,
            recipients.len()
        );
        delivered
    }

    async fn deliver_one(&self, account: AccountId, text: &str) -> bool {
        let mut retries = 0;
        loop {
            match self.sink.deliver(account, text).await {
                Ok(()) => return true,
                Err(DeliveryError::RateLimited { retry_after })
                    if retries < self.max_rate_limit_retries =>
                {
                    retries += 1;
                    tracing::warn!(
                        "Rate limited sending to {}, waiting {:?} (retry {})",
                        account,
                        retry_after,
                        retries
                    );
                    tokio::time::sleep(retry_after).await;
                }
                Err(e) => {
                    tracing::warn!("Skipping broadcast recipient {}: {}", account, e);
                    return false;
                }
            }
        }
    }
}

//! Postgres LISTEN/NOTIFY source for the change feed

use anyhow::Result;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::time::Duration;

use super::feed::{ChangeFeed, OrderChange};

/// Channel the `notify_order_change` trigger publishes on
pub const ORDER_CHANNEL: &str = "order_changes";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Forwards row changes announced by the database into a [`ChangeFeed`]
pub struct PgChangeListener {
    pool: PgPool,
    feed: ChangeFeed,
}

impl PgChangeListener {
    pub fn new(pool: PgPool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    /// Listen forever, reconnecting after any error
    pub async fn start(self) {
        tracing::info!(channel = ORDER_CHANNEL, "Starting order change listener");

        loop {
            if let Err(e) = self.listen().await {
                tracing::error!("Order change listener error: {}", e);
            }

            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn listen(&self) -> Result<()> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(ORDER_CHANNEL).await?;
        tracing::debug!("Subscribed to {}", ORDER_CHANNEL);

        loop {
            let notification = listener.recv().await?;
            match parse_change(notification.payload()) {
                Ok(change) => self.feed.publish(change),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding malformed order change payload");
                }
            }
        }
    }
}

/// Decode a trigger payload into the normalized envelope
pub fn parse_change(payload: &str) -> Result<OrderChange, serde_json::Error> {
    serde_json::from_str(payload)
}

//! Funds release collaborator
//!
//! Releasing the crypto leg to the ally happens outside this service. The
//! shipped implementation is simulated and only produces a transaction hash.

use anyhow::Result;
use async_trait::async_trait;
use rand::RngCore;

use super::model::Order;

#[async_trait]
pub trait FundsReleaser: Send + Sync {
    /// Release the order's crypto amount to its ally, returning the tx hash
    async fn release(&self, order: &Order) -> Result<String>;
}

/// Releaser that fabricates a transaction hash
#[derive(Debug, Default, Clone)]
pub struct SimulatedReleaser;

#[async_trait]
impl FundsReleaser for SimulatedReleaser {
    async fn release(&self, order: &Order) -> Result<String> {
        let ally = order
            .ally_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Order {} has no assigned ally", order.id))?;

        tracing::info!(
            order_id = %order.id,
            ally_id = %ally,
            amount = %order.crypto_amount,
            token = order.crypto_currency.as_str(),
            "Releasing funds"
        );

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let tx_hash = format!("0x{}", hex::encode(bytes));

        tracing::warn!("Using simulated funds release - no on-chain transfer was made");

        Ok(tx_hash)
    }
}

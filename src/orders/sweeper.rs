//! Background expiry sweep

use std::sync::Arc;
use std::time::Duration;

use super::service::OrderService;

/// Periodically cancel PENDING_PAYMENT orders whose window lapsed.
/// Failures are logged and the loop carries on.
pub async fn expiry_sweeper(service: Arc<OrderService>, interval: Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "Starting order expiry sweeper");

    loop {
        tokio::time::sleep(interval).await;

        match service.sweep_expired().await {
            Ok(cancelled) => {
                for order in cancelled {
                    tracing::debug!(order_id = %order.id, "Pending order expired");
                }
            }
            Err(e) => {
                tracing::error!("Error sweeping expired orders: {}", e);
            }
        }
    }
}

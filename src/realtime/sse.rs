//! Server-sent event transport for realtime order views
//!
//! A stream always opens its change-feed subscription before reading the
//! snapshot, so nothing committed in between is lost. The price is that a
//! change may appear both in the snapshot and as an update; clients
//! reconcile on `(id, status)`.

use axum::{
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures_util::{future, stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::feed::{ChangeFeed, FeedScope, OrderChange};
use crate::config::Config;
use crate::error::{ApiError, ApiResult};

/// Framing of every event written to a realtime stream
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StreamMessage<T> {
    InitialData(T),
    Update(OrderChange),
}

/// Per-connection stream tunables
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub keep_alive: Duration,
    pub max_lifetime: Duration,
    pub buffer_size: usize,
    pub retry: Duration,
    /// Cancelled on server shutdown; every open stream then ends
    pub shutdown: CancellationToken,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(15),
            max_lifetime: Duration::from_secs(3600),
            buffer_size: 64,
            retry: Duration::from_secs(3),
            shutdown: CancellationToken::new(),
        }
    }
}

impl From<&Config> for StreamSettings {
    fn from(config: &Config) -> Self {
        Self {
            keep_alive: Duration::from_secs(config.sse_keep_alive_secs),
            max_lifetime: Duration::from_secs(config.sse_max_lifetime_secs),
            buffer_size: config.sse_buffer_size,
            ..Self::default()
        }
    }
}

fn encode<T: Serialize>(message: &StreamMessage<T>) -> Result<Event, serde_json::Error> {
    serde_json::to_string(message).map(|data| Event::default().data(data))
}

/// Build an SSE response: one `initial_data` event with the snapshot, then
/// one `update` event per change matching `scope`.
///
/// The subscription lives inside the response body; dropping the body on
/// client disconnect releases it. The body ends after `max_lifetime` or
/// once `settings.shutdown` is cancelled.
pub async fn order_stream<T, F, Fut>(
    feed: &ChangeFeed,
    scope: FeedScope,
    settings: &StreamSettings,
    snapshot: F,
) -> ApiResult<Response>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let (tx, rx) = mpsc::channel::<OrderChange>(settings.buffer_size.max(1));

    let subscription = feed.subscribe(scope, move |change| {
        // Full buffer or closed receiver: skip, never fail the feed
        if let Err(e) = tx.try_send(change) {
            tracing::debug!(error = %e, "Skipping change for realtime client");
        }
    });

    let initial = snapshot().await?;
    let first = encode(&StreamMessage::InitialData(initial))
        .map_err(|e| ApiError::Internal(format!("Failed to encode snapshot: {}", e)))?
        .retry(settings.retry);

    let updates = ReceiverStream::new(rx).filter_map(move |change| {
        let _subscription = &subscription;
        let event = match encode(&StreamMessage::<()>::Update(change)) {
            Ok(event) => Some(Ok::<Event, Infallible>(event)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode order change");
                None
            }
        };
        future::ready(event)
    });

    let shutdown = settings.shutdown.clone();
    let max_lifetime = settings.max_lifetime;
    let closed = async move {
        tokio::select! {
            _ = tokio::time::sleep(max_lifetime) => {}
            _ = shutdown.cancelled() => {
                tracing::debug!("Closing realtime stream for shutdown");
            }
        }
    };

    let events = stream::once(future::ready(Ok::<Event, Infallible>(first)))
        .chain(updates)
        .take_until(closed);

    let sse = Sse::new(events).keep_alive(KeepAlive::new().interval(settings.keep_alive));

    Ok((
        [
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    )
        .into_response())
}

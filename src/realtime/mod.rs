//! Realtime order updates: change feed, database listener, and SSE transport

mod feed;
mod pg_listener;
mod sse;

pub use feed::{ChangeFeed, ChangeKind, FeedScope, OrderChange, OrderField, RowPredicate, Subscription};
pub use pg_listener::{parse_change, PgChangeListener, ORDER_CHANNEL};
pub use sse::{order_stream, StreamMessage, StreamSettings};

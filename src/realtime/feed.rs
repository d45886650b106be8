//! Change feed bridge
//!
//! Row-level mutations of the order table arrive here (from the Postgres
//! listener or straight from the in-memory store) and are fanned out to
//! subscribers. Each subscriber filters locally against the before and after
//! images, so a row moving into or out of its visible set is still surfaced.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::orders::Order;

/// Kind of row mutation
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Normalized change envelope
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderChange {
    pub event_type: ChangeKind,
    pub old: Option<Order>,
    pub new: Option<Order>,
}

impl OrderChange {
    pub fn insert(order: Order) -> Self {
        Self {
            event_type: ChangeKind::Insert,
            old: None,
            new: Some(order),
        }
    }

    pub fn update(old: Order, new: Order) -> Self {
        Self {
            event_type: ChangeKind::Update,
            old: Some(old),
            new: Some(new),
        }
    }

    pub fn delete(order: Order) -> Self {
        Self {
            event_type: ChangeKind::Delete,
            old: Some(order),
            new: None,
        }
    }
}

/// Order columns a subscription can be scoped by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    Id,
    UserId,
    AllyId,
    Status,
}

/// `field = value` predicate over an order row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPredicate {
    pub field: OrderField,
    pub value: String,
}

impl RowPredicate {
    pub fn new(field: OrderField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        match self.field {
            OrderField::Id => order.id.to_string() == self.value,
            OrderField::UserId => order.user_id == self.value,
            OrderField::AllyId => order.ally_id.as_deref() == Some(self.value.as_str()),
            OrderField::Status => order.status.as_str() == self.value,
        }
    }
}

/// Which changes a subscriber receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedScope {
    All,
    Matching(RowPredicate),
}

impl FeedScope {
    pub fn matches(&self, change: &OrderChange) -> bool {
        match self {
            FeedScope::All => true,
            FeedScope::Matching(predicate) => {
                change.old.as_ref().is_some_and(|o| predicate.matches(o))
                    || change.new.as_ref().is_some_and(|n| predicate.matches(n))
            }
        }
    }
}

/// Fan-out point for order changes
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<OrderChange>,
    active: Arc<AtomicUsize>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish a change to every live subscriber
    pub fn publish(&self, change: OrderChange) {
        // No receivers is the normal idle state, not an error
        if self.tx.send(change).is_err() {
            tracing::trace!("Order change published with no subscribers");
        }
    }

    /// Number of subscriptions that have not been released
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Register `callback` for every change matching `scope`.
    ///
    /// The callback runs on a dedicated task until the returned handle is
    /// unsubscribed or dropped.
    pub fn subscribe<F>(&self, scope: FeedScope, callback: F) -> Subscription
    where
        F: Fn(OrderChange) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        self.active.fetch_add(1, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        if scope.matches(&change) {
                            callback(change);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Change feed subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Subscription {
            task,
            released: AtomicBool::new(false),
            active: self.active.clone(),
        }
    }
}

/// Handle to a live subscription; releasing it is idempotent
pub struct Subscription {
    task: JoinHandle<()>,
    released: AtomicBool,
    active: Arc<AtomicUsize>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.task.abort();
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!("Change feed subscription released");
    }

    pub fn is_active(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

//! Order persistence port and its in-memory implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{
    AvailableFilter, AvailableSort, Order, OrderFilter, OrderPage, OrderPatch, OrderStatus,
    SortOrder, StatusGuard,
};
use crate::db::StoreResult;
use crate::models::Pagination;
use crate::realtime::{ChangeFeed, OrderChange};

/// Durable CRUD over orders plus the lifecycle-specific queries
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> StoreResult<Order>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Order>>;

    /// Caller-scoped listing, newest first
    async fn find_many(&self, filter: &OrderFilter) -> StoreResult<OrderPage>;

    /// AVAILABLE orders whose window is still open at `now`
    async fn find_available(
        &self,
        filter: &AvailableFilter,
        now: DateTime<Utc>,
    ) -> StoreResult<OrderPage>;

    async fn count_by_owner_and_status(
        &self,
        user_id: &str,
        status: OrderStatus,
    ) -> StoreResult<i64>;

    /// Atomic conditional update. Returns `None` when the guard did not hold
    /// (row missing, status moved on, or window lapsed).
    async fn update_status(
        &self,
        id: Uuid,
        guard: StatusGuard,
        patch: &OrderPatch,
    ) -> StoreResult<Option<Order>>;

    /// Detach a proof claimed by `update_status` whose funds release failed.
    /// Only matches a TAKEN order still carrying `proof_image_url`.
    async fn clear_proof_claim(
        &self,
        id: Uuid,
        proof_image_url: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Order>>;

    /// Flip PENDING_PAYMENT orders whose window has lapsed to CANCELLED
    async fn cancel_expired_pending(&self, now: DateTime<Utc>) -> StoreResult<Vec<Order>>;

    async fn health_check(&self) -> StoreResult<()>;
}

/// Order store held in process memory; publishes its own change events
pub struct MemoryOrderStore {
    // Insertion order doubles as the tie-breaker for sorted listings
    orders: RwLock<Vec<Order>>,
    feed: Option<ChangeFeed>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(Vec::new()),
            feed: None,
        }
    }

    pub fn with_change_feed(feed: ChangeFeed) -> Self {
        Self {
            orders: RwLock::new(Vec::new()),
            feed: Some(feed),
        }
    }

    fn publish(&self, change: OrderChange) {
        if let Some(feed) = &self.feed {
            feed.publish(change);
        }
    }

    fn page(matching: Vec<Order>, limit: i64, offset: i64) -> OrderPage {
        let total = matching.len() as i64;
        let orders = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        OrderPage {
            orders,
            pagination: Pagination::new(total, limit, offset),
        }
    }
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_by(sort: AvailableSort, a: &Order, b: &Order) -> Ordering {
    match sort {
        AvailableSort::CreatedAt => a.created_at.cmp(&b.created_at),
        AvailableSort::ExpiresAt => a.expires_at.cmp(&b.expires_at),
        AvailableSort::Amount => a.fiat_amount.cmp(&b.fiat_amount),
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    // Changes are published while the write lock is held so feed order
    // matches commit order.

    async fn insert(&self, order: &Order) -> StoreResult<Order> {
        let mut orders = self.orders.write().await;
        orders.push(order.clone());
        self.publish(OrderChange::insert(order.clone()));
        Ok(order.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|o| o.id == id).cloned())
    }

    async fn find_many(&self, filter: &OrderFilter) -> StoreResult<OrderPage> {
        let orders = self.orders.read().await;
        let mut matching: Vec<Order> = orders
            .iter()
            .filter(|o| filter.scope.includes(o))
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .filter(|o| filter.search.as_ref().map_or(true, |term| term.matches(o)))
            .cloned()
            .collect();

        // Newest first; stable sort keeps insertion order among equal timestamps
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(Self::page(matching, filter.limit, filter.offset))
    }

    async fn find_available(
        &self,
        filter: &AvailableFilter,
        now: DateTime<Utc>,
    ) -> StoreResult<OrderPage> {
        let orders = self.orders.read().await;
        let mut matching: Vec<Order> = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Available && o.expires_at > now)
            .filter(|o| filter.min_amount.map_or(true, |min| o.fiat_amount >= min))
            .filter(|o| filter.max_amount.map_or(true, |max| o.fiat_amount <= max))
            .cloned()
            .collect();

        matching.sort_by(|a, b| match filter.sort_order {
            SortOrder::Asc => compare_by(filter.sort_by, a, b),
            SortOrder::Desc => compare_by(filter.sort_by, b, a),
        });

        Ok(Self::page(matching, filter.limit, filter.offset))
    }

    async fn count_by_owner_and_status(
        &self,
        user_id: &str,
        status: OrderStatus,
    ) -> StoreResult<i64> {
        let orders = self.orders.read().await;
        Ok(orders
            .iter()
            .filter(|o| o.user_id == user_id && o.status == status)
            .count() as i64)
    }

    async fn update_status(
        &self,
        id: Uuid,
        guard: StatusGuard,
        patch: &OrderPatch,
    ) -> StoreResult<Option<Order>> {
        // Check and write under one write lock: the in-memory compare-and-swap
        let mut orders = self.orders.write().await;
        let Some(order) = orders.iter_mut().find(|o| o.id == id) else {
            return Ok(None);
        };
        if !guard.matches(order) {
            return Ok(None);
        }

        let old = order.clone();
        order.apply(patch);
        let new = order.clone();

        self.publish(OrderChange::update(old, new.clone()));
        Ok(Some(new))
    }

    async fn clear_proof_claim(
        &self,
        id: Uuid,
        proof_image_url: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Order>> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.iter_mut().find(|o| {
            o.id == id
                && o.status == OrderStatus::Taken
                && o.proof_image_url.as_deref() == Some(proof_image_url)
        }) else {
            return Ok(None);
        };

        let old = order.clone();
        order.proof_image_url = None;
        order.bank_transaction_id = None;
        order.proof_notes = None;
        order.updated_at = now;
        let new = order.clone();

        self.publish(OrderChange::update(old, new.clone()));
        Ok(Some(new))
    }

    async fn cancel_expired_pending(&self, now: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        let mut orders = self.orders.write().await;
        let mut cancelled = Vec::new();

        for order in orders
            .iter_mut()
            .filter(|o| o.status == OrderStatus::PendingPayment && o.is_expired(now))
        {
            let old = order.clone();
            let mut patch = OrderPatch::status(OrderStatus::Cancelled, now);
            patch.cancelled_at = Some(now);
            order.apply(&patch);

            cancelled.push(order.clone());
            self.publish(OrderChange::update(old, order.clone()));
        }
        Ok(cancelled)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

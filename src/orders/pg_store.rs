//! Postgres implementation of OrderStore.
//!
//! Change events are not published from here; the `notify_order_change`
//! trigger emits them and `realtime::PgChangeListener` forwards them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::model::{
    AvailableFilter, Order, OrderFilter, OrderPage, OrderPatch, OrderScope, OrderStatus,
    SearchTerm, SortOrder, StatusGuard,
};
use super::store::OrderStore;
use crate::db::{StoreError, StoreResult};
use crate::models::Pagination;

/// Postgres-backed order store
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
        match &filter.scope {
            OrderScope::Owner(user_id) => {
                builder.push(" AND user_id = ");
                builder.push_bind(user_id.clone());
            }
            OrderScope::Ally(ally_id) => {
                builder.push(" AND ally_id = ");
                builder.push_bind(ally_id.clone());
            }
            OrderScope::All => {}
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        match &filter.search {
            Some(SearchTerm::Amount(amount)) => {
                builder.push(" AND (fiat_amount = ");
                builder.push_bind(*amount);
                builder.push(" OR crypto_amount = ");
                builder.push_bind(*amount);
                builder.push(")");
            }
            Some(SearchTerm::Text(text)) => {
                let pattern = format!("%{}%", text);
                builder.push(" AND (status::text ILIKE ");
                builder.push_bind(pattern.clone());
                builder.push(" OR fiat_currency::text ILIKE ");
                builder.push_bind(pattern.clone());
                builder.push(" OR crypto_currency::text ILIKE ");
                builder.push_bind(pattern);
                builder.push(")");
            }
            None => {}
        }
    }

    fn push_available(
        builder: &mut QueryBuilder<'_, Postgres>,
        filter: &AvailableFilter,
        now: DateTime<Utc>,
    ) {
        builder.push(" AND status = ");
        builder.push_bind(OrderStatus::Available);
        builder.push(" AND expires_at > ");
        builder.push_bind(now);
        if let Some(min) = filter.min_amount {
            builder.push(" AND fiat_amount >= ");
            builder.push_bind(min);
        }
        if let Some(max) = filter.max_amount {
            builder.push(" AND fiat_amount <= ");
            builder.push_bind(max);
        }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> StoreResult<Order> {
        let row = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (
                id, user_id, ally_id, fiat_amount, fiat_currency, crypto_amount,
                crypto_currency, network, status, recipient, description, qr_image_url,
                created_at, updated_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(&order.user_id)
        .bind(&order.ally_id)
        .bind(order.fiat_amount)
        .bind(order.fiat_currency)
        .bind(order.crypto_amount)
        .bind(order.crypto_currency)
        .bind(order.network)
        .bind(order.status)
        .bind(&order.recipient)
        .bind(&order.description)
        .bind(&order.qr_image_url)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    async fn find_many(&self, filter: &OrderFilter) -> StoreResult<OrderPage> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM orders WHERE 1=1");
        Self::push_scope(&mut count, filter);
        let (total,): (i64,) = count.build_query_as::<(i64,)>().fetch_one(&self.pool).await?;

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM orders WHERE 1=1");
        Self::push_scope(&mut query, filter);
        query.push(" ORDER BY created_at DESC, seq ASC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.offset);

        let orders = query
            .build_query_as::<Order>()
            .fetch_all(&self.pool)
            .await?;

        Ok(OrderPage {
            orders,
            pagination: Pagination::new(total, filter.limit, filter.offset),
        })
    }

    async fn find_available(
        &self,
        filter: &AvailableFilter,
        now: DateTime<Utc>,
    ) -> StoreResult<OrderPage> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM orders WHERE 1=1");
        Self::push_available(&mut count, filter, now);
        let (total,): (i64,) = count.build_query_as::<(i64,)>().fetch_one(&self.pool).await?;

        let direction = match filter.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM orders WHERE 1=1");
        Self::push_available(&mut query, filter, now);
        // Column and direction come from closed enums, never from user text
        query.push(format!(
            " ORDER BY {} {}, seq ASC LIMIT ",
            filter.sort_by.column(),
            direction
        ));
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.offset);

        let orders = query
            .build_query_as::<Order>()
            .fetch_all(&self.pool)
            .await?;

        Ok(OrderPage {
            orders,
            pagination: Pagination::new(total, filter.limit, filter.offset),
        })
    }

    async fn count_by_owner_and_status(
        &self,
        user_id: &str,
        status: OrderStatus,
    ) -> StoreResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1 AND status = $2")
                .bind(user_id)
                .bind(status)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn update_status(
        &self,
        id: Uuid,
        guard: StatusGuard,
        patch: &OrderPatch,
    ) -> StoreResult<Option<Order>> {
        // Single statement: the WHERE clause is the compare, SET is the swap
        let order = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = $3,
                updated_at = $4,
                ally_id = COALESCE($5, ally_id),
                expires_at = COALESCE($6, expires_at),
                taken_at = COALESCE($7, taken_at),
                completed_at = COALESCE($8, completed_at),
                cancelled_at = COALESCE($9, cancelled_at),
                proof_image_url = COALESCE($10, proof_image_url),
                bank_transaction_id = COALESCE($11, bank_transaction_id),
                proof_notes = COALESCE($12, proof_notes),
                release_tx_hash = COALESCE($13, release_tx_hash)
            WHERE id = $1
              AND status = $2
              AND ($14::timestamptz IS NULL OR expires_at > $14)
              AND (NOT $15 OR proof_image_url IS NULL)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(guard.from)
        .bind(patch.status)
        .bind(patch.updated_at)
        .bind(&patch.ally_id)
        .bind(patch.expires_at)
        .bind(patch.taken_at)
        .bind(patch.completed_at)
        .bind(patch.cancelled_at)
        .bind(&patch.proof_image_url)
        .bind(&patch.bank_transaction_id)
        .bind(&patch.proof_notes)
        .bind(&patch.release_tx_hash)
        .bind(guard.unexpired_at)
        .bind(guard.without_proof)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn clear_proof_claim(
        &self,
        id: Uuid,
        proof_image_url: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET proof_image_url = NULL,
                bank_transaction_id = NULL,
                proof_notes = NULL,
                updated_at = $3
            WHERE id = $1
              AND status = 'TAKEN'
              AND proof_image_url = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(proof_image_url)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn cancel_expired_pending(&self, now: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        let cancelled = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = 'CANCELLED', cancelled_at = $1, updated_at = $1
            WHERE status = 'PENDING_PAYMENT'
              AND expires_at <= $1
            RETURNING *
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(cancelled)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::sample_order;

    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/kibo_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");
        crate::db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_round_trip_preserves_amounts() {
        let store = PgOrderStore::new(setup_test_db().await);
        let order = sample_order(OrderStatus::PendingPayment);

        store.insert(&order).await.unwrap();
        let fetched = store.find_by_id(order.id).await.unwrap().unwrap();

        assert_eq!(fetched.fiat_amount, order.fiat_amount);
        assert_eq!(fetched.crypto_amount, order.crypto_amount);
        assert_eq!(fetched.status, OrderStatus::PendingPayment);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_concurrent_take_has_one_winner() {
        let store = std::sync::Arc::new(PgOrderStore::new(setup_test_db().await));
        let order = sample_order(OrderStatus::Available);
        store.insert(&order).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let now = Utc::now();
                let mut patch = OrderPatch::status(OrderStatus::Taken, now);
                patch.ally_id = Some(format!("did:privy:ally-{}", i));
                store
                    .update_status(
                        order.id,
                        StatusGuard::expecting(OrderStatus::Available).unexpired_at(now),
                        &patch,
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_proof_claim_is_taken_once() {
        let store = PgOrderStore::new(setup_test_db().await);
        let order = sample_order(OrderStatus::Taken);
        store.insert(&order).await.unwrap();

        let mut patch = OrderPatch::status(OrderStatus::Taken, Utc::now());
        patch.proof_image_url = Some(format!("memory://proofs/{}.png", order.id));
        let guard = StatusGuard::expecting(OrderStatus::Taken).without_proof();

        assert!(store.update_status(order.id, guard, &patch).await.unwrap().is_some());
        assert!(store.update_status(order.id, guard, &patch).await.unwrap().is_none());

        let url = patch.proof_image_url.clone().unwrap();
        let cleared = store
            .clear_proof_claim(order.id, &url, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(cleared.proof_image_url.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_sweep_includes_order_expiring_now() {
        let store = PgOrderStore::new(setup_test_db().await);
        let now = Utc::now();
        let mut due = sample_order(OrderStatus::PendingPayment);
        due.expires_at = now;
        store.insert(&due).await.unwrap();

        let cancelled = store.cancel_expired_pending(now).await.unwrap();
        assert!(cancelled.iter().any(|o| o.id == due.id));
    }
}

//! Order lifecycle service
//!
//! Enforces who may do what to an order and which status moves are legal.
//! Every status write goes through the store's conditional update so that a
//! concurrent writer can never be silently overwritten.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::model::{
    AvailableFilter, AvailableOrdersQuery, ListOrdersQuery, NewOrder, Order, OrderDetails,
    OrderFilter, OrderPage, OrderPatch, OrderScope, OrderStatus, ProofSubmission, SearchTerm,
    StatusGuard,
};
use super::release::FundsReleaser;
use super::store::OrderStore;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{clamp_page, Role};
use crate::storage::{BlobStore, UploadedFile};

const QR_FOLDER: &str = "qr";
const PROOF_FOLDER: &str = "proofs";

/// Tunables for the order lifecycle
#[derive(Debug, Clone)]
pub struct OrderSettings {
    /// Cap on a user's simultaneously AVAILABLE orders
    pub max_active_orders: i64,
    pub pending_payment_ttl: Duration,
    pub availability_window: Duration,
    pub completion_window: Duration,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            max_active_orders: 3,
            pending_payment_ttl: Duration::minutes(30),
            availability_window: Duration::minutes(60),
            completion_window: Duration::minutes(5),
        }
    }
}

impl From<&crate::config::Config> for OrderSettings {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            max_active_orders: config.max_active_orders,
            pending_payment_ttl: Duration::seconds(config.pending_payment_ttl_secs),
            availability_window: Duration::seconds(config.availability_window_secs),
            completion_window: Duration::seconds(config.completion_window_secs),
        }
    }
}

/// Order service for lifecycle operations
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    blobs: Arc<dyn BlobStore>,
    releaser: Arc<dyn FundsReleaser>,
    settings: OrderSettings,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        blobs: Arc<dyn BlobStore>,
        releaser: Arc<dyn FundsReleaser>,
        settings: OrderSettings,
    ) -> Self {
        Self {
            store,
            blobs,
            releaser,
            settings,
        }
    }

    pub fn settings(&self) -> &OrderSettings {
        &self.settings
    }

    /// Create a new order in PENDING_PAYMENT
    pub async fn create_order(
        &self,
        caller: &AuthenticatedUser,
        new_order: NewOrder,
        qr_image: UploadedFile,
    ) -> ApiResult<Order> {
        caller.require_role(Role::User)?;
        new_order.validate().map_err(ApiError::Validation)?;

        let active = self
            .store
            .count_by_owner_and_status(&caller.user_id, OrderStatus::Available)
            .await?;
        if active >= self.settings.max_active_orders {
            return Err(ApiError::LimitExceeded(format!(
                "You can have at most {} active orders",
                self.settings.max_active_orders
            )));
        }

        let qr = self.blobs.put(QR_FOLDER, &qr_image).await?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            user_id: caller.user_id.clone(),
            ally_id: None,
            fiat_amount: new_order.fiat_amount,
            fiat_currency: new_order.fiat_currency,
            crypto_amount: new_order.crypto_amount,
            crypto_currency: new_order.crypto_currency,
            network: new_order.network,
            status: OrderStatus::PendingPayment,
            recipient: new_order.recipient,
            description: new_order.description,
            qr_image_url: Some(qr.url),
            proof_image_url: None,
            bank_transaction_id: None,
            proof_notes: None,
            release_tx_hash: None,
            created_at: now,
            updated_at: now,
            expires_at: now + self.settings.pending_payment_ttl,
            taken_at: None,
            completed_at: None,
            cancelled_at: None,
        };

        let created = self.store.insert(&order).await?;

        tracing::info!(
            order_id = %created.id,
            user_id = %created.user_id,
            fiat_amount = %created.fiat_amount,
            "Order created"
        );

        Ok(created)
    }

    /// List orders visible to the caller, newest first
    pub async fn list_orders(
        &self,
        caller: &AuthenticatedUser,
        query: ListOrdersQuery,
    ) -> ApiResult<OrderPage> {
        let (limit, offset) = clamp_page(query.limit, query.offset);
        let filter = OrderFilter {
            scope: Self::scope_for(caller),
            status: query.status,
            search: query.search.as_deref().and_then(SearchTerm::parse),
            limit,
            offset,
        };

        Ok(self.store.find_many(&filter).await?)
    }

    /// Fetch one order the caller is allowed to see
    pub async fn get_order(&self, caller: &AuthenticatedUser, id: Uuid) -> ApiResult<OrderDetails> {
        let order = self.load(id).await?;
        Self::ensure_can_view(caller, &order)?;

        Ok(OrderDetails {
            seconds_remaining: order.seconds_remaining(Utc::now()),
            order,
        })
    }

    /// Claimable orders for allies
    pub async fn list_available_orders(
        &self,
        caller: &AuthenticatedUser,
        query: AvailableOrdersQuery,
    ) -> ApiResult<OrderPage> {
        caller.require_role(Role::Ally)?;
        query.validate()?;

        if let (Some(min), Some(max)) = (query.min_amount, query.max_amount) {
            if min > max {
                return Err(ApiError::Validation(
                    "min_amount must not exceed max_amount".to_string(),
                ));
            }
        }

        let (limit, offset) = clamp_page(query.limit, query.offset);
        let filter = AvailableFilter {
            min_amount: query.min_amount,
            max_amount: query.max_amount,
            sort_by: query.sort_by.unwrap_or_default(),
            sort_order: query.sort_order.unwrap_or_default(),
            limit,
            offset,
        };

        Ok(self.store.find_available(&filter, Utc::now()).await?)
    }

    /// Claim an AVAILABLE order for the calling ally
    pub async fn take_order(&self, caller: &AuthenticatedUser, id: Uuid) -> ApiResult<Order> {
        caller.require_role(Role::Ally)?;

        let order = self.load(id).await?;
        if order.status != OrderStatus::Available {
            return Err(ApiError::InvalidState(format!(
                "Order is {} and cannot be taken",
                order.status
            )));
        }

        let now = Utc::now();
        if order.is_expired(now) {
            return Err(ApiError::InvalidState("Order has expired".to_string()));
        }

        let mut patch = OrderPatch::status(OrderStatus::Taken, now);
        patch.ally_id = Some(caller.user_id.clone());
        patch.taken_at = Some(now);
        patch.expires_at = Some(now + self.settings.completion_window);

        let guard = StatusGuard::expecting(OrderStatus::Available).unexpired_at(now);
        let taken = self
            .store
            .update_status(id, guard, &patch)
            .await?
            .ok_or_else(|| {
                tracing::debug!(order_id = %id, ally_id = %caller.user_id, "Lost race to take order");
                ApiError::Conflict("Order was taken by another ally".to_string())
            })?;

        tracing::info!(order_id = %id, ally_id = %caller.user_id, "Order taken");

        Ok(taken)
    }

    /// Complete a TAKEN order with the ally's payment proof
    pub async fn upload_proof(
        &self,
        caller: &AuthenticatedUser,
        id: Uuid,
        proof_image: UploadedFile,
        submission: ProofSubmission,
    ) -> ApiResult<Order> {
        let order = self.load(id).await?;
        if order.status != OrderStatus::Taken {
            return Err(ApiError::InvalidState(format!(
                "Order is {} and cannot accept a proof",
                order.status
            )));
        }
        if order.ally_id.as_deref() != Some(caller.user_id.as_str()) {
            return Err(ApiError::AccessDenied(
                "Only the assigned ally can upload a proof".to_string(),
            ));
        }

        let proof = self.blobs.put(PROOF_FOLDER, &proof_image).await?;

        // Attaching the proof claims the order; only the claimant releases funds
        let mut claim = OrderPatch::status(OrderStatus::Taken, Utc::now());
        claim.proof_image_url = Some(proof.url.clone());
        claim.bank_transaction_id = submission.bank_transaction_id;
        claim.proof_notes = submission.notes;

        let claimed = self
            .store
            .update_status(
                id,
                StatusGuard::expecting(OrderStatus::Taken).without_proof(),
                &claim,
            )
            .await?
            .ok_or_else(|| {
                ApiError::Conflict("A proof is already being processed for this order".to_string())
            })?;

        let tx_hash = match self.releaser.release(&claimed).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                tracing::error!(order_id = %id, error = %e, "Funds release failed");
                if let Err(clear_err) = self
                    .store
                    .clear_proof_claim(id, &proof.url, Utc::now())
                    .await
                {
                    tracing::error!(order_id = %id, error = %clear_err, "Failed to clear proof claim");
                }
                return Err(ApiError::ExternalService(format!(
                    "Funds release failed: {}",
                    e
                )));
            }
        };

        let now = Utc::now();
        let mut patch = OrderPatch::status(OrderStatus::Completed, now);
        patch.completed_at = Some(now);
        patch.release_tx_hash = Some(tx_hash);

        let completed = self
            .store
            .update_status(id, StatusGuard::expecting(OrderStatus::Taken), &patch)
            .await?
            .ok_or_else(|| ApiError::Conflict("Order changed while uploading proof".to_string()))?;

        tracing::info!(
            order_id = %id,
            ally_id = %caller.user_id,
            tx_hash = ?completed.release_tx_hash,
            "Order completed"
        );

        Ok(completed)
    }

    /// Admin confirms the user's payment landed; the order goes on the board
    pub async fn confirm_payment(&self, caller: &AuthenticatedUser, id: Uuid) -> ApiResult<Order> {
        caller.require_admin()?;

        let now = Utc::now();
        let mut patch = OrderPatch::status(OrderStatus::Available, now);
        patch.expires_at = Some(now + self.settings.availability_window);

        let order = self.transition(id, OrderStatus::PendingPayment, patch).await?;
        tracing::info!(order_id = %id, admin_id = %caller.user_id, "Payment confirmed");
        Ok(order)
    }

    /// Owner or admin withdraws an order that nobody has taken yet
    pub async fn cancel_order(&self, caller: &AuthenticatedUser, id: Uuid) -> ApiResult<Order> {
        let order = self.load(id).await?;
        if !caller.is_admin() && order.user_id != caller.user_id {
            return Err(ApiError::AccessDenied(
                "Only the owner can cancel this order".to_string(),
            ));
        }

        let now = Utc::now();
        let mut patch = OrderPatch::status(OrderStatus::Cancelled, now);
        patch.cancelled_at = Some(now);

        let cancelled = self.transition_from(&order, patch).await?;
        tracing::info!(order_id = %id, by = %caller.user_id, "Order cancelled");
        Ok(cancelled)
    }

    /// Admin refunds an order that will not complete
    pub async fn refund_order(&self, caller: &AuthenticatedUser, id: Uuid) -> ApiResult<Order> {
        caller.require_admin()?;

        let order = self.load(id).await?;
        let patch = OrderPatch::status(OrderStatus::Refunded, Utc::now());

        let refunded = self.transition_from(&order, patch).await?;
        tracing::info!(order_id = %id, admin_id = %caller.user_id, "Order refunded");
        Ok(refunded)
    }

    /// Cancel PENDING_PAYMENT orders whose window lapsed
    pub async fn sweep_expired(&self) -> ApiResult<Vec<Order>> {
        let cancelled = self.store.cancel_expired_pending(Utc::now()).await?;
        if !cancelled.is_empty() {
            tracing::info!(count = cancelled.len(), "Cancelled expired pending orders");
        }
        Ok(cancelled)
    }

    pub async fn health_check(&self) -> bool {
        self.store.health_check().await.is_ok()
    }

    /// Order the caller may view, for per-order streams
    pub async fn visible_order(&self, caller: &AuthenticatedUser, id: Uuid) -> ApiResult<Order> {
        let order = self.load(id).await?;
        Self::ensure_can_view(caller, &order)?;
        Ok(order)
    }

    /// Listing scope implied by the caller's active role
    pub fn scope_for(caller: &AuthenticatedUser) -> OrderScope {
        match caller.role {
            Role::User => OrderScope::Owner(caller.user_id.clone()),
            Role::Ally => OrderScope::Ally(caller.user_id.clone()),
            Role::Admin => OrderScope::All,
        }
    }

    fn ensure_can_view(caller: &AuthenticatedUser, order: &Order) -> ApiResult<()> {
        let is_owner = order.user_id == caller.user_id;
        let is_ally = order.ally_id.as_deref() == Some(caller.user_id.as_str());
        if is_owner || is_ally || caller.is_admin() {
            Ok(())
        } else {
            Err(ApiError::AccessDenied(
                "You do not have access to this order".to_string(),
            ))
        }
    }

    async fn load(&self, id: Uuid) -> ApiResult<Order> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", id)))
    }

    async fn transition(&self, id: Uuid, from: OrderStatus, patch: OrderPatch) -> ApiResult<Order> {
        let order = self.load(id).await?;
        if order.status != from {
            return Err(ApiError::InvalidState(format!(
                "Order is {}, expected {}",
                order.status, from
            )));
        }
        self.transition_from(&order, patch).await
    }

    /// Apply `patch` if the graph allows it from the order's current status
    async fn transition_from(&self, order: &Order, patch: OrderPatch) -> ApiResult<Order> {
        if !order.status.can_transition_to(patch.status) {
            return Err(ApiError::InvalidState(format!(
                "Cannot move order from {} to {}",
                order.status, patch.status
            )));
        }

        // A TAKEN order with a proof attached belongs to the in-flight release
        let mut guard = StatusGuard::expecting(order.status);
        if order.status == OrderStatus::Taken {
            guard = guard.without_proof();
        }

        self.store
            .update_status(order.id, guard, &patch)
            .await?
            .ok_or_else(|| ApiError::Conflict("Order was modified concurrently".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::release::SimulatedReleaser;
    use crate::orders::store::MemoryOrderStore;
    use crate::orders::{sample_order, CryptoCurrency, FiatCurrency, Network};
    use crate::storage::MemoryBlobStore;
    use rust_decimal::Decimal;

    fn service_with(store: Arc<MemoryOrderStore>) -> OrderService {
        OrderService::new(
            store,
            Arc::new(MemoryBlobStore::new()),
            Arc::new(SimulatedReleaser),
            OrderSettings::default(),
        )
    }

    fn user() -> AuthenticatedUser {
        AuthenticatedUser::new("did:privy:owner", Role::User)
    }

    fn ally(id: &str) -> AuthenticatedUser {
        AuthenticatedUser::new(id, Role::Ally)
    }

    fn admin() -> AuthenticatedUser {
        AuthenticatedUser::new("did:privy:admin", Role::Admin)
    }

    fn new_order() -> NewOrder {
        NewOrder {
            fiat_amount: Decimal::new(100, 0),
            fiat_currency: FiatCurrency::Mxn,
            crypto_amount: Decimal::new(606, 2),
            crypto_currency: CryptoCurrency::Usdt,
            network: Some(Network::Polygon),
            recipient: None,
            description: Some("rent".to_string()),
        }
    }

    fn qr() -> UploadedFile {
        UploadedFile::new("qr.png", b"qr-bytes".to_vec())
    }

    #[tokio::test]
    async fn test_create_order_sets_pending_window() {
        let service = service_with(Arc::new(MemoryOrderStore::new()));
        let order = service
            .create_order(&user(), new_order(), qr())
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert!(order.qr_image_url.is_some());
        let window = order.expires_at - order.created_at;
        assert_eq!(window, Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_create_order_requires_user_role() {
        let service = service_with(Arc::new(MemoryOrderStore::new()));
        let err = service
            .create_order(&ally("did:privy:ally"), new_order(), qr())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_active_order_limit() {
        let store = Arc::new(MemoryOrderStore::new());
        for _ in 0..3 {
            store
                .insert(&sample_order(OrderStatus::Available))
                .await
                .unwrap();
        }
        let service = service_with(store);

        let err = service
            .create_order(&user(), new_order(), qr())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::LimitExceeded(_)));
    }

    #[tokio::test]
    async fn test_get_order_access() {
        let store = Arc::new(MemoryOrderStore::new());
        let order = sample_order(OrderStatus::Available);
        store.insert(&order).await.unwrap();
        let service = service_with(store);

        assert!(service.get_order(&user(), order.id).await.is_ok());
        assert!(service.get_order(&admin(), order.id).await.is_ok());

        let stranger = AuthenticatedUser::new("did:privy:stranger", Role::User);
        let err = service.get_order(&stranger, order.id).await.unwrap_err();
        assert!(matches!(err, ApiError::AccessDenied(_)));

        let err = service.get_order(&user(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_take_order_assigns_ally_and_completion_window() {
        let store = Arc::new(MemoryOrderStore::new());
        let order = sample_order(OrderStatus::Available);
        store.insert(&order).await.unwrap();
        let service = service_with(store);

        let taken = service
            .take_order(&ally("did:privy:ally"), order.id)
            .await
            .unwrap();
        assert_eq!(taken.status, OrderStatus::Taken);
        assert_eq!(taken.ally_id.as_deref(), Some("did:privy:ally"));
        let taken_at = taken.taken_at.unwrap();
        assert_eq!(taken.expires_at - taken_at, Duration::minutes(5));

        // The assigned ally can now read it
        assert!(service
            .get_order(&ally("did:privy:ally"), order.id)
            .await
            .is_ok());

        let err = service
            .take_order(&ally("did:privy:late"), order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_take_expired_order_fails() {
        let store = Arc::new(MemoryOrderStore::new());
        let mut order = sample_order(OrderStatus::Available);
        order.expires_at = Utc::now() - Duration::seconds(1);
        store.insert(&order).await.unwrap();
        let service = service_with(store);

        let err = service
            .take_order(&ally("did:privy:ally"), order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_upload_proof_completes_order() {
        let store = Arc::new(MemoryOrderStore::new());
        let order = sample_order(OrderStatus::Available);
        store.insert(&order).await.unwrap();
        let service = service_with(store);
        let ally = ally("did:privy:ally");
        service.take_order(&ally, order.id).await.unwrap();

        let other = AuthenticatedUser::new("did:privy:other-ally", Role::Ally);
        let err = service
            .upload_proof(
                &other,
                order.id,
                UploadedFile::new("proof.jpg", b"proof".to_vec()),
                ProofSubmission::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AccessDenied(_)));

        let completed = service
            .upload_proof(
                &ally,
                order.id,
                UploadedFile::new("proof.jpg", b"proof".to_vec()),
                ProofSubmission {
                    bank_transaction_id: Some("SPEI-123".to_string()),
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(completed.status, OrderStatus::Completed);
        assert!(completed.completed_at.is_some());
        assert!(completed.proof_image_url.is_some());
        assert_eq!(completed.bank_transaction_id.as_deref(), Some("SPEI-123"));
        assert!(completed
            .release_tx_hash
            .as_deref()
            .is_some_and(|h| h.starts_with("0x")));
    }

    struct FailingReleaser;

    #[async_trait::async_trait]
    impl FundsReleaser for FailingReleaser {
        async fn release(&self, _order: &Order) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("node unreachable"))
        }
    }

    #[tokio::test]
    async fn test_failed_release_leaves_order_taken_and_retryable() {
        let store = Arc::new(MemoryOrderStore::new());
        let mut order = sample_order(OrderStatus::Taken);
        order.ally_id = Some("did:privy:ally".to_string());
        store.insert(&order).await.unwrap();

        let failing = OrderService::new(
            store.clone(),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(FailingReleaser),
            OrderSettings::default(),
        );
        let err = failing
            .upload_proof(
                &ally("did:privy:ally"),
                order.id,
                UploadedFile::new("proof.png", b"proof".to_vec()),
                ProofSubmission::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ExternalService(_)));

        let stored = store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Taken);
        assert!(stored.proof_image_url.is_none());

        let completed = service_with(store)
            .upload_proof(
                &ally("did:privy:ally"),
                order.id,
                UploadedFile::new("proof.png", b"proof".to_vec()),
                ProofSubmission::default(),
            )
            .await
            .unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_refund_waits_for_claimed_proof() {
        let store = Arc::new(MemoryOrderStore::new());
        let mut order = sample_order(OrderStatus::Taken);
        order.proof_image_url = Some("memory://proofs/pending.png".to_string());
        store.insert(&order).await.unwrap();
        let service = service_with(store);

        let err = service.refund_order(&admin(), order.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_confirm_payment_is_admin_only() {
        let store = Arc::new(MemoryOrderStore::new());
        let order = sample_order(OrderStatus::PendingPayment);
        store.insert(&order).await.unwrap();
        let service = service_with(store);

        let err = service.confirm_payment(&user(), order.id).await.unwrap_err();
        assert!(matches!(err, ApiError::AccessDenied(_)));

        let available = service.confirm_payment(&admin(), order.id).await.unwrap();
        assert_eq!(available.status, OrderStatus::Available);
        assert!(available.expires_at > Utc::now() + Duration::minutes(59));

        let err = service
            .confirm_payment(&admin(), order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_cancel_and_refund_follow_graph() {
        let store = Arc::new(MemoryOrderStore::new());
        let pending = sample_order(OrderStatus::PendingPayment);
        let taken = sample_order(OrderStatus::Taken);
        store.insert(&pending).await.unwrap();
        store.insert(&taken).await.unwrap();
        let service = service_with(store);

        let stranger = AuthenticatedUser::new("did:privy:stranger", Role::User);
        assert!(matches!(
            service.cancel_order(&stranger, pending.id).await.unwrap_err(),
            ApiError::AccessDenied(_)
        ));

        let cancelled = service.cancel_order(&user(), pending.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());

        // Terminal: nothing moves it again
        assert!(matches!(
            service.refund_order(&admin(), pending.id).await.unwrap_err(),
            ApiError::InvalidState(_)
        ));

        // TAKEN cannot be cancelled, only refunded
        assert!(matches!(
            service.cancel_order(&user(), taken.id).await.unwrap_err(),
            ApiError::InvalidState(_)
        ));
        let refunded = service.refund_order(&admin(), taken.id).await.unwrap();
        assert_eq!(refunded.status, OrderStatus::Refunded);
    }

    #[tokio::test]
    async fn test_list_available_requires_ally() {
        let store = Arc::new(MemoryOrderStore::new());
        store
            .insert(&sample_order(OrderStatus::Available))
            .await
            .unwrap();
        let service = service_with(store);

        assert!(matches!(
            service
                .list_available_orders(&user(), AvailableOrdersQuery::default())
                .await
                .unwrap_err(),
            ApiError::AccessDenied(_)
        ));

        let page = service
            .list_available_orders(&ally("did:privy:ally"), AvailableOrdersQuery::default())
            .await
            .unwrap();
        assert_eq!(page.orders.len(), 1);
    }

    #[tokio::test]
    async fn test_list_orders_scoped_by_role() {
        let store = Arc::new(MemoryOrderStore::new());
        let mine = sample_order(OrderStatus::PendingPayment);
        let mut assigned = sample_order(OrderStatus::Taken);
        assigned.user_id = "did:privy:someone".to_string();
        assigned.ally_id = Some("did:privy:ally".to_string());
        store.insert(&mine).await.unwrap();
        store.insert(&assigned).await.unwrap();
        let service = service_with(store);

        let page = service
            .list_orders(&user(), ListOrdersQuery::default())
            .await
            .unwrap();
        assert_eq!(page.orders.len(), 1);
        assert_eq!(page.orders[0].id, mine.id);

        let page = service
            .list_orders(&ally("did:privy:ally"), ListOrdersQuery::default())
            .await
            .unwrap();
        assert_eq!(page.orders.len(), 1);
        assert_eq!(page.orders[0].id, assigned.id);

        let page = service
            .list_orders(&admin(), ListOrdersQuery::default())
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 2);
    }
}

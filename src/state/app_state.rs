//! Application state shared across handlers

use axum::extract::FromRef;
use sqlx::PgPool;
use std::sync::Arc;

use crate::applications::{
    ApplicationService, ApplicationStore, MemoryApplicationStore, PgApplicationStore,
};
use crate::config::Config;
use crate::orders::{
    FundsReleaser, MemoryOrderStore, OrderService, OrderSettings, OrderStore, PgOrderStore,
    SimulatedReleaser,
};
use crate::quote::{QuoteError, QuoteService};
use crate::realtime::{ChangeFeed, StreamSettings};
use crate::storage::BlobStore;
use crate::users::{MemoryUserStore, PgUserStore, UserService, UserStore};

/// Persistence backends the services are wired to
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub users: Arc<dyn UserStore>,
    pub applications: Arc<dyn ApplicationStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub releaser: Arc<dyn FundsReleaser>,
}

impl Stores {
    /// In-process stores; the order store publishes to `feed` itself
    pub fn in_memory(feed: &ChangeFeed, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            orders: Arc::new(MemoryOrderStore::with_change_feed(feed.clone())),
            users: Arc::new(MemoryUserStore::new()),
            applications: Arc::new(MemoryApplicationStore::new()),
            blobs,
            releaser: Arc::new(SimulatedReleaser),
        }
    }

    /// Postgres stores; order changes reach the feed through the database listener
    pub fn postgres(pool: PgPool, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            orders: Arc::new(PgOrderStore::new(pool.clone())),
            users: Arc::new(PgUserStore::new(pool.clone())),
            applications: Arc::new(PgApplicationStore::new(pool)),
            blobs,
            releaser: Arc::new(SimulatedReleaser),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub order_service: Arc<OrderService>,
    pub quote_service: Arc<QuoteService>,
    pub user_service: Arc<UserService>,
    pub application_service: Arc<ApplicationService>,
    pub change_feed: ChangeFeed,
    pub stream_settings: StreamSettings,
}

impl AppState {
    pub fn new(
        order_service: Arc<OrderService>,
        quote_service: Arc<QuoteService>,
        user_service: Arc<UserService>,
        application_service: Arc<ApplicationService>,
        change_feed: ChangeFeed,
        stream_settings: StreamSettings,
    ) -> Self {
        Self {
            order_service,
            quote_service,
            user_service,
            application_service,
            change_feed,
            stream_settings,
        }
    }
}

impl AppState {
    /// Wire every service from configuration and the chosen stores
    pub fn build(
        config: &Config,
        stores: Stores,
        change_feed: ChangeFeed,
    ) -> Result<Self, QuoteError> {
        let user_service = Arc::new(UserService::new(stores.users));
        let quote_service = QuoteService::new(config.quote_api_url.clone(), config.quote_timeout())?;

        Ok(Self::new(
            Arc::new(OrderService::new(
                stores.orders,
                stores.blobs,
                stores.releaser,
                OrderSettings::from(config),
            )),
            Arc::new(quote_service),
            user_service.clone(),
            Arc::new(ApplicationService::new(stores.applications, user_service)),
            change_feed,
            StreamSettings::from(config),
        ))
    }
}

impl FromRef<AppState> for Arc<OrderService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.order_service.clone()
    }
}

impl FromRef<AppState> for Arc<QuoteService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.quote_service.clone()
    }
}

impl FromRef<AppState> for Arc<UserService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.user_service.clone()
    }
}

impl FromRef<AppState> for Arc<ApplicationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.application_service.clone()
    }
}

impl FromRef<AppState> for ChangeFeed {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.change_feed.clone()
    }
}

//! Order API handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::Response,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::extract::{ApiPath, ApiQuery};
use super::multipart::MultipartForm;
use crate::error::ApiResult;
use crate::middleware::AuthenticatedUser;
use crate::models::{ApiResponse, Role};
use crate::orders::{
    AvailableOrdersQuery, ListOrdersQuery, NewOrder, Order, OrderDetails, OrderPage,
    OrderService, ProofSubmission,
};
use crate::realtime::{order_stream, FeedScope, OrderField, RowPredicate};
use crate::state::AppState;

/// Snapshot size for the list stream
const REALTIME_SNAPSHOT_LIMIT: i64 = 100;

/// Create a new order (multipart with a `qr` image)
pub async fn create_order(
    State(service): State<Arc<OrderService>>,
    user: AuthenticatedUser,
    mut form: MultipartForm,
) -> ApiResult<(StatusCode, Json<ApiResponse<Order>>)> {
    let new_order = NewOrder {
        fiat_amount: form.require("fiat_amount")?,
        fiat_currency: form.require("fiat_currency")?,
        crypto_amount: form.require("crypto_amount")?,
        crypto_currency: form.require("crypto_currency")?,
        network: form.parse("network")?,
        recipient: form.text("recipient"),
        description: form.text("description"),
    };
    let qr = form.take_file("qr")?;

    let order = service.create_order(&user, new_order, qr).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(order))))
}

/// List orders scoped to the caller
pub async fn list_orders(
    State(service): State<Arc<OrderService>>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<ListOrdersQuery>,
) -> ApiResult<Json<ApiResponse<OrderPage>>> {
    let page = service.list_orders(&user, query).await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// List claimable orders (allies)
pub async fn list_available_orders(
    State(service): State<Arc<OrderService>>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<AvailableOrdersQuery>,
) -> ApiResult<Json<ApiResponse<OrderPage>>> {
    let page = service.list_available_orders(&user, query).await?;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn get_order(
    State(service): State<Arc<OrderService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<OrderDetails>>> {
    let order = service.get_order(&user, id).await?;
    Ok(Json(ApiResponse::ok(order)))
}

pub async fn take_order(
    State(service): State<Arc<OrderService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<Order>>> {
    let order = service.take_order(&user, id).await?;
    Ok(Json(ApiResponse::ok(order)))
}

/// Upload a completion proof (multipart with a `proof` image)
pub async fn upload_proof(
    State(service): State<Arc<OrderService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    mut form: MultipartForm,
) -> ApiResult<Json<ApiResponse<Order>>> {    let proof = form.take_file("proof")?;
    let submission = ProofSubmission {
        bank_transaction_id: form.text("bank_transaction_id"),
        notes: form.text("notes"),
    };

    let order = service.upload_proof(&user, id, proof, submission).await?;
    Ok(Json(ApiResponse::ok(order)))
}

pub async fn confirm_payment(
    State(service): State<Arc<OrderService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<Order>>> {
    let order = service.confirm_payment(&user, id).await?;
    Ok(Json(ApiResponse::ok(order)))
}

pub async fn cancel_order(
    State(service): State<Arc<OrderService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<Order>>> {
    let order = service.cancel_order(&user, id).await?;
    Ok(Json(ApiResponse::ok(order)))
}

pub async fn refund_order(
    State(service): State<Arc<OrderService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<Order>>> {
    let order = service.refund_order(&user, id).await?;
    Ok(Json(ApiResponse::ok(order)))
}

/// SSE stream of the caller's order list
pub async fn stream_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Response> {
    let scope = match user.role {
        Role::User => FeedScope::Matching(RowPredicate::new(OrderField::UserId, &user.user_id)),
        Role::Ally => FeedScope::Matching(RowPredicate::new(OrderField::AllyId, &user.user_id)),
        Role::Admin => FeedScope::All,
    };

    tracing::debug!(user_id = %user.user_id, role = %user.role, "Opening order list stream");

    let service = state.order_service.clone();
    order_stream(&state.change_feed, scope, &state.stream_settings, || async move {
        let query = ListOrdersQuery {
            limit: Some(REALTIME_SNAPSHOT_LIMIT),
            ..Default::default()
        };
        Ok(service.list_orders(&user, query).await?.orders)
    })
    .await
}

/// SSE stream of a single order
pub async fn stream_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Response> {
    state.order_service.visible_order(&user, id).await?;

    let scope = FeedScope::Matching(RowPredicate::new(OrderField::Id, id.to_string()));
    let service = state.order_service.clone();
    order_stream(&state.change_feed, scope, &state.stream_settings, || async move {
        service.get_order(&user, id).await
    })
    .await
}

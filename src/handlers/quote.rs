//! Quote API handler

use axum::{extract::State, Json};
use std::sync::Arc;

use super::extract::ApiQuery;
use crate::error::ApiResult;
use crate::middleware::AuthenticatedUser;
use crate::models::ApiResponse;
use crate::quote::{Quote, QuoteRequest, QuoteService};

/// Rate quote for a fiat amount
pub async fn get_quote(
    State(service): State<Arc<QuoteService>>,
    user: AuthenticatedUser,
    ApiQuery(request): ApiQuery<QuoteRequest>,
) -> ApiResult<Json<ApiResponse<Quote>>> {
    tracing::debug!(user_id = %user.user_id, fiat_currency = ?request.fiat_currency, "Quote requested");
    let quote = service.get_quote(&request).await?;
    Ok(Json(ApiResponse::ok(quote)))
}

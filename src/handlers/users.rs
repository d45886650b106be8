//! User profile handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use super::extract::ApiJson;
use crate::error::ApiResult;
use crate::middleware::AuthenticatedUser;
use crate::models::ApiResponse;
use crate::users::{ActivateRoleRequest, UpdateProfileRequest, UserProfile, UserService};

/// Current profile; registers the caller on first call
pub async fn get_me(
    State(service): State<Arc<UserService>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<UserProfile>>> {
    let profile = service.ensure_user(&user).await?;
    Ok(Json(ApiResponse::ok(profile)))
}

pub async fn update_me(
    State(service): State<Arc<UserService>>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<ApiResponse<UserProfile>>> {
    let profile = service.update_profile(&user, request).await?;
    Ok(Json(ApiResponse::ok(profile)))
}

pub async fn activate_role(
    State(service): State<Arc<UserService>>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<ActivateRoleRequest>,
) -> ApiResult<Json<ApiResponse<UserProfile>>> {
    let profile = service.activate_role(&user, request.role).await?;
    Ok(Json(ApiResponse::ok(profile)))
}

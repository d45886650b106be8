//! Ally application handlers

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::applications::{
    AllyApplication, ApplicationService, ListApplicationsQuery, RejectApplicationRequest,
    SubmitApplicationRequest,
};
use crate::error::ApiResult;
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::models::ApiResponse;

pub async fn submit_application(
    State(service): State<Arc<ApplicationService>>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<SubmitApplicationRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<AllyApplication>>)> {
    let application = service.submit(&user, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(application))))
}

pub async fn my_applications(
    State(service): State<Arc<ApplicationService>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<Vec<AllyApplication>>>> {
    let applications = service.my_applications(&user).await?;
    Ok(Json(ApiResponse::ok(applications)))
}

pub async fn list_applications(
    State(service): State<Arc<ApplicationService>>,
    AdminUser(admin): AdminUser,
    ApiQuery(query): ApiQuery<ListApplicationsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<AllyApplication>>>> {
    let applications = service.list(&admin, query.status).await?;
    Ok(Json(ApiResponse::ok(applications)))
}

pub async fn approve_application(
    State(service): State<Arc<ApplicationService>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ApiResponse<AllyApplication>>> {
    let application = service.approve(&admin, id).await?;
    Ok(Json(ApiResponse::ok(application)))
}

pub async fn reject_application(
    State(service): State<Arc<ApplicationService>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<RejectApplicationRequest>,
) -> ApiResult<Json<ApiResponse<AllyApplication>>> {
    let application = service.reject(&admin, id, request.reason).await?;
    Ok(Json(ApiResponse::ok(application)))
}

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use super::guard;
use crate::app::AppState;
use crate::authz::permissions::{STAFF_MANAGEMENT_MANAGE, STAFF_MANAGEMENT_READ};
use crate::authz::Capability;
use crate::errors::AppResult;
use crate::events::{log_activity, RequestContext};
use crate::jwt::CurrentStaff;
use crate::models::permission::{Permission, PermissionCreateRequest, PermissionListQuery, PermissionUpdateRequest};
use crate::services::permissions;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/permissions", get(list_permissions).post(create_permission))
        .route(
            "/permissions/:id",
            get(get_permission).put(update_permission).delete(delete_permission),
        )
}

#[utoipa::path(
    get,
    path = "/rbac/permissions",
    tag = "RBAC",
    params(PermissionListQuery),
    responses((status = 200, description = "Permissions ordered by module then action", body = [Permission])),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    current: CurrentStaff,
    Query(filter): Query<PermissionListQuery>,
) -> AppResult<Json<Vec<Permission>>> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_READ)).await?;
    Ok(Json(permissions::list(&state.pool, &filter).await?))
}

#[utoipa::path(
    post,
    path = "/rbac/permissions",
    tag = "RBAC",
    request_body = PermissionCreateRequest,
    responses(
        (status = 201, description = "Permission registered", body = Permission),
        (status = 409, description = "Name or module/action pair already registered"),
        (status = 422, description = "Invalid name or description")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    current: CurrentStaff,
    headers: HeaderMap,
    Json(req): Json<PermissionCreateRequest>,
) -> AppResult<(StatusCode, Json<Permission>)> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_MANAGE)).await?;

    let permission = permissions::register(&state.pool, req, Some(current.id())).await?;

    log_activity(
        &state.event_bus,
        "created",
        Some(current.id()),
        &permission,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(permission)))
}

#[utoipa::path(
    get,
    path = "/rbac/permissions/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission detail", body = Permission),
        (status = 404, description = "Permission not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_permission(
    State(state): State<AppState>,
    current: CurrentStaff,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Permission>> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_READ)).await?;
    Ok(Json(permissions::get(&state.pool, id).await?))
}

#[utoipa::path(
    put,
    path = "/rbac/permissions/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Permission id")),
    request_body = PermissionUpdateRequest,
    responses(
        (status = 200, description = "Permission updated", body = Permission),
        (status = 404, description = "Permission not found"),
        (status = 409, description = "Name or module/action pair already registered")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_permission(
    State(state): State<AppState>,
    current: CurrentStaff,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<PermissionUpdateRequest>,
) -> AppResult<Json<Permission>> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_MANAGE)).await?;

    let old = permissions::get(&state.pool, id).await?;
    let permission = permissions::update(&state.pool, id, req, Some(current.id())).await?;

    log_activity(
        &state.event_bus,
        "updated",
        Some(current.id()),
        &permission,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(permission))
}

#[utoipa::path(
    delete,
    path = "/rbac/permissions/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Permission id")),
    responses(
        (status = 204, description = "Permission removed"),
        (status = 404, description = "Permission not found"),
        (status = 409, description = "Permission is still granted by a role")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    current: CurrentStaff,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    guard(&state, &current, Capability::TopTier).await?;

    let permission = permissions::retire(&state.pool, id).await?;

    log_activity(
        &state.event_bus,
        "deleted",
        Some(current.id()),
        &permission,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

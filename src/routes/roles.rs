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
use crate::models::role::{AvailableRole, Role, RoleCreateRequest, RoleListQuery, RoleUpdateRequest};
use crate::services::roles;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/available", get(list_available_roles))
        .route("/roles/:id", get(get_role).put(update_role).delete(delete_role))
}

#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    params(RoleListQuery),
    responses((status = 200, description = "Roles ordered by level, highest first", body = [Role])),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    current: CurrentStaff,
    Query(filter): Query<RoleListQuery>,
) -> AppResult<Json<Vec<Role>>> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_READ)).await?;
    Ok(Json(roles::list(&state.pool, &filter).await?))
}

/// Active roles that may be handed to staff; reserved names never appear.
#[utoipa::path(
    get,
    path = "/rbac/roles/available",
    tag = "RBAC",
    responses((status = 200, description = "Assignable roles", body = [AvailableRole])),
    security(("bearerAuth" = []))
)]
pub async fn list_available_roles(
    State(state): State<AppState>,
    current: CurrentStaff,
) -> AppResult<Json<Vec<AvailableRole>>> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_READ)).await?;
    Ok(Json(roles::list_available(&state.pool).await?))
}

#[utoipa::path(
    post,
    path = "/rbac/roles",
    tag = "RBAC",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 409, description = "Role name already exists"),
        (status = 422, description = "Unknown or inactive permission, bad level or reserved name")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    current: CurrentStaff,
    headers: HeaderMap,
    Json(req): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_MANAGE)).await?;

    let role = roles::create(&state.pool, req, Some(current.id())).await?;

    log_activity(
        &state.event_bus,
        "created",
        Some(current.id()),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/rbac/roles/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role detail", body = Role),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(State(state): State<AppState>, current: CurrentStaff, Path(id): Path<Uuid>) -> AppResult<Json<Role>> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_READ)).await?;
    Ok(Json(roles::get(&state.pool, id).await?))
}

/// Staff already holding the role keep their snapshot until re-assigned.
#[utoipa::path(
    put,
    path = "/rbac/roles/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 403, description = "System role"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    current: CurrentStaff,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<RoleUpdateRequest>,
) -> AppResult<Json<Role>> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_MANAGE)).await?;

    let old = roles::get(&state.pool, id).await?;
    let role = roles::update(&state.pool, id, req, &current.principal).await?;

    log_activity(
        &state.event_bus,
        "updated",
        Some(current.id()),
        &role,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/rbac/roles/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "System role"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role is still assigned to staff")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    current: CurrentStaff,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    guard(&state, &current, Capability::TopTier).await?;

    let role = roles::delete(&state.pool, id).await?;

    log_activity(
        &state.event_bus,
        "deleted",
        Some(current.id()),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use uuid::Uuid;

use super::guard;
use crate::app::AppState;
use crate::authz::permissions::{STAFF_MANAGEMENT_MANAGE, STAFF_MANAGEMENT_READ, STAFF_MANAGEMENT_UPDATE};
use crate::authz::Capability;
use crate::errors::AppResult;
use crate::events::{log_activity, RequestContext};
use crate::jwt::CurrentStaff;
use crate::models::staff::{
    AssignPermissionsRequest, AssignRoleRequest, Staff, StaffListQuery, StaffPage, StaffUpdateRequest,
};
use crate::services::staff;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/staff", get(list_staff))
        .route("/staff/:id", get(get_staff).put(update_staff).delete(delete_staff))
        .route("/staff/:id/role", post(assign_role))
        .route("/staff/:id/permissions", put(assign_permissions))
}

#[utoipa::path(
    get,
    path = "/rbac/staff",
    tag = "Staff",
    params(StaffListQuery),
    responses((status = 200, description = "Paginated staff with per-role counts", body = StaffPage)),
    security(("bearerAuth" = []))
)]
pub async fn list_staff(
    State(state): State<AppState>,
    current: CurrentStaff,
    Query(filter): Query<StaffListQuery>,
) -> AppResult<Json<StaffPage>> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_READ)).await?;
    Ok(Json(staff::list(&state.pool, &filter).await?))
}

#[utoipa::path(
    get,
    path = "/rbac/staff/{id}",
    tag = "Staff",
    params(("id" = Uuid, Path, description = "Staff id")),
    responses(
        (status = 200, description = "Staff detail", body = Staff),
        (status = 404, description = "Staff member not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_staff(State(state): State<AppState>, current: CurrentStaff, Path(id): Path<Uuid>) -> AppResult<Json<Staff>> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_READ)).await?;
    Ok(Json(staff::get(&state.pool, id).await?))
}

#[utoipa::path(
    put,
    path = "/rbac/staff/{id}",
    tag = "Staff",
    params(("id" = Uuid, Path, description = "Staff id")),
    request_body = StaffUpdateRequest,
    responses(
        (status = 200, description = "Staff member updated", body = Staff),
        (status = 403, description = "Top-tier account can only be edited by itself and never disabled"),
        (status = 404, description = "Staff member not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_staff(
    State(state): State<AppState>,
    current: CurrentStaff,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<StaffUpdateRequest>,
) -> AppResult<Json<Staff>> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_UPDATE)).await?;

    let old = staff::get(&state.pool, id).await?;
    let updated = staff::update_profile(&state.pool, id, req, Some(current.id())).await?;

    log_activity(
        &state.event_bus,
        "updated",
        Some(current.id()),
        &updated,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/rbac/staff/{id}",
    tag = "Staff",
    params(("id" = Uuid, Path, description = "Staff id")),
    responses(
        (status = 204, description = "Staff member deleted"),
        (status = 403, description = "Top-tier account cannot be deleted"),
        (status = 404, description = "Staff member not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_staff(
    State(state): State<AppState>,
    current: CurrentStaff,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    guard(&state, &current, Capability::TopTier).await?;

    let deleted = staff::delete(&state.pool, id).await?;

    log_activity(
        &state.event_bus,
        "deleted",
        Some(current.id()),
        &deleted,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Copies the role's current permissions onto the staff record. Only the
/// top-tier account assigns roles.
#[utoipa::path(
    post,
    path = "/rbac/staff/{id}/role",
    tag = "Staff",
    params(("id" = Uuid, Path, description = "Staff id")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = Staff),
        (status = 403, description = "Caller is not top-tier, or the target is the top-tier account"),
        (status = 404, description = "Staff member or role not found"),
        (status = 422, description = "Role is inactive")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    current: CurrentStaff,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignRoleRequest>,
) -> AppResult<Json<Staff>> {
    guard(&state, &current, Capability::TopTier).await?;

    let old = staff::get(&state.pool, id).await?;
    let updated = staff::assign_role(&state.pool, id, req.role_id, Some(&current.principal)).await?;

    log_activity(
        &state.event_bus,
        "role_assigned",
        Some(current.id()),
        &updated,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(updated))
}

#[utoipa::path(
    put,
    path = "/rbac/staff/{id}/permissions",
    tag = "Staff",
    params(("id" = Uuid, Path, description = "Staff id")),
    request_body = AssignPermissionsRequest,
    responses(
        (status = 200, description = "Permission set replaced", body = Staff),
        (status = 403, description = "Own account, top-tier target, or permissions the caller does not hold"),
        (status = 404, description = "Staff member not found"),
        (status = 422, description = "Unknown or inactive permission")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_permissions(
    State(state): State<AppState>,
    current: CurrentStaff,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignPermissionsRequest>,
) -> AppResult<Json<Staff>> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_MANAGE)).await?;

    let old = staff::get(&state.pool, id).await?;
    let updated = staff::assign_permissions(&state.pool, id, &req.permission_ids, Some(&current.principal)).await?;

    log_activity(
        &state.event_bus,
        "permissions_assigned",
        Some(current.id()),
        &updated,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(updated))
}

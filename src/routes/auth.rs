use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};

use super::{ensure_enabled, guard, MessageResponse};
use crate::app::AppState;
use crate::authz::{permissions::STAFF_MANAGEMENT_CREATE, Capability};
use crate::errors::AppResult;
use crate::events::{log_activity, RequestContext};
use crate::jwt::CurrentStaff;
use crate::models::staff::{
    AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RegisterStaffRequest, ResetPasswordRequest,
    Staff,
};
use crate::services::staff;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/me", get(me))
        .route("/logout", post(logout))
        .route("/change-password", put(change_password))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account disabled")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let staff = staff::authenticate(&state.pool, &payload.email, &payload.password).await?;
    let token = state.jwt.encode(staff.id)?;

    log_activity(
        &state.event_bus,
        "login",
        Some(staff.id),
        &staff,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(AuthResponse { token, staff }))
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterStaffRequest,
    responses(
        (status = 201, description = "Staff member registered", body = Staff),
        (status = 403, description = "Missing staff-management-create, reserved role, or role at or above the caller's level"),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn register(
    State(state): State<AppState>,
    current: CurrentStaff,
    headers: HeaderMap,
    Json(payload): Json<RegisterStaffRequest>,
) -> AppResult<(StatusCode, Json<Staff>)> {
    guard(&state, &current, Capability::named(STAFF_MANAGEMENT_CREATE)).await?;

    let created = staff::register(&state.pool, payload, Some(&current.principal)).await?;

    log_activity(
        &state.event_bus,
        "registered",
        Some(current.id()),
        &created,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current staff member", body = Staff)),
    security(("bearerAuth" = []))
)]
pub async fn me(current: CurrentStaff) -> AppResult<Json<Staff>> {
    ensure_enabled(&current)?;
    Ok(Json(current.staff))
}

/// Tokens are stateless; the client discards its copy.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged", body = MessageResponse)),
    security(("bearerAuth" = []))
)]
pub async fn logout(_current: CurrentStaff) -> AppResult<Json<MessageResponse>> {
    Ok(Json(MessageResponse::new("Logged out")))
}

#[utoipa::path(
    put,
    path = "/auth/change-password",
    tag = "Auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 401, description = "Current password is wrong"),
        (status = 422, description = "New password too short")
    ),
    security(("bearerAuth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentStaff,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    ensure_enabled(&current)?;
    staff::change_password(&state.pool, current.id(), &payload.current_password, &payload.new_password).await?;

    log_activity(
        &state.event_bus,
        "password_changed",
        Some(current.id()),
        &current.staff,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(MessageResponse::new("Password changed")))
}

/// Answers the same way whether or not the email belongs to an account.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    tag = "Auth",
    request_body = ForgotPasswordRequest,
    responses((status = 200, description = "Reset issued if the account exists", body = MessageResponse))
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    if let Some(reset) = staff::request_password_reset(&state.pool, &state.jwt, &payload.email).await? {
        let target = staff::get(&state.pool, reset.staff_id).await?;
        log_activity(
            &state.event_bus,
            "password_reset_requested",
            None,
            &target,
            None,
            Some(RequestContext::from_headers(&headers)),
        );
    }

    Ok(Json(MessageResponse::new(
        "If the account exists, a password reset has been issued",
    )))
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    tag = "Auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 401, description = "Invalid, used or expired reset token"),
        (status = 422, description = "New password too short")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let staff_id = staff::reset_password(&state.pool, &state.jwt, &payload.token, &payload.new_password).await?;
    let target = staff::get(&state.pool, staff_id).await?;

    log_activity(
        &state.event_bus,
        "password_reset",
        Some(staff_id),
        &target,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(MessageResponse::new("Password reset")))
}

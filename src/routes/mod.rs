pub mod auth;
pub mod health;
pub mod permissions;
pub mod roles;
pub mod seed;
pub mod staff;

use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::Capability;
use crate::errors::{AccessError, AppResult};
use crate::jwt::CurrentStaff;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Runs the configured policy for `capability` against the caller.
pub(crate) async fn guard(state: &AppState, current: &CurrentStaff, capability: Capability) -> AppResult<()> {
    let result = state.policy.authorize(&current.principal, &capability).await;
    if let Err(err) = &result {
        tracing::info!(staff_id = %current.id(), capability = %capability, error = %err, "access denied");
    }
    result
}

/// For endpoints open to any signed-in staff member: a disabled account is
/// still turned away.
pub(crate) fn ensure_enabled(current: &CurrentStaff) -> AppResult<()> {
    if current.principal.is_disabled() {
        return Err(AccessError::AccountDisabled.into());
    }
    Ok(())
}

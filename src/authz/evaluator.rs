use std::ops::ControlFlow;

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::principal::{Capability, Principal};
use crate::errors::{AccessError, AppError};
use crate::models::permission::{DbPermissionRef, PermissionRef};
use crate::models::staff::RoleLabel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Authorized,
    Denied(AccessError),
}

impl Decision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Decision::Authorized)
    }

    pub fn into_result(self) -> Result<(), AccessError> {
        match self {
            Decision::Authorized => Ok(()),
            Decision::Denied(err) => Err(err),
        }
    }
}

/// Checks 1-3, shared by every evaluator. `Break` carries a final decision;
/// `Continue` hands back the principal whose capability still has to be
/// checked.
fn gate(principal: Option<&Principal>) -> ControlFlow<Decision, &Principal> {
    let Some(principal) = principal else {
        return ControlFlow::Break(Decision::Denied(AccessError::Unauthenticated));
    };

    if principal.is_disabled() {
        tracing::debug!(staff_id = %principal.staff_id, "account disabled");
        return ControlFlow::Break(Decision::Denied(AccessError::AccountDisabled));
    }

    if principal.is_top_tier() {
        tracing::debug!(staff_id = %principal.staff_id, "top-tier bypass");
        return ControlFlow::Break(Decision::Authorized);
    }

    ControlFlow::Continue(principal)
}

/// The decision function over a principal's materialized permissions.
pub fn decide(principal: Option<&Principal>, capability: &Capability) -> Decision {
    match gate(principal) {
        ControlFlow::Continue(principal) => grant_or_deny(principal, capability, principal.holds(capability)),
        ControlFlow::Break(decision) => decision,
    }
}

fn grant_or_deny(principal: &Principal, capability: &Capability, held: bool) -> Decision {
    if held {
        tracing::debug!(staff_id = %principal.staff_id, capability = %capability, "permission match");
        Decision::Authorized
    } else {
        tracing::debug!(staff_id = %principal.staff_id, capability = %capability, "permission denied");
        Decision::Denied(AccessError::InsufficientPermission)
    }
}

/// Pluggable authorization policy consulted by request handlers.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(&self, principal: Option<&Principal>, capability: &Capability) -> Result<Decision, AppError>;

    async fn authorize(&self, principal: &Principal, capability: &Capability) -> Result<(), AppError> {
        self.evaluate(Some(principal), capability)
            .await?
            .into_result()
            .map_err(AppError::from)
    }
}

/// Uses the permission snapshot copied onto the staff record when its role
/// was assigned. Later role edits are not seen until the role is
/// re-assigned.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotPolicy;

#[async_trait]
impl PolicyEvaluator for SnapshotPolicy {
    async fn evaluate(&self, principal: Option<&Principal>, capability: &Capability) -> Result<Decision, AppError> {
        Ok(decide(principal, capability))
    }
}

/// Resolves the assigned role's current permissions on every check. An
/// inactive role grants nothing.
#[derive(Debug, Clone)]
pub struct LiveRolePolicy {
    pool: SqlitePool,
}

impl LiveRolePolicy {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn current_permissions(&self, role_id: uuid::Uuid) -> Result<Vec<PermissionRef>, AppError> {
        let rows = sqlx::query_as::<_, DbPermissionRef>(
            r#"
            SELECT p.id, p.name, p.module, p.action
            FROM role_permissions rp
            INNER JOIN permissions p ON p.id = rp.permission_id
            INNER JOIN roles r ON r.id = rp.role_id
            WHERE rp.role_id = ? AND r.is_active = 1
            "#,
        )
        .bind(role_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PermissionRef::try_from).collect()
    }
}

#[async_trait]
impl PolicyEvaluator for LiveRolePolicy {
    async fn evaluate(&self, principal: Option<&Principal>, capability: &Capability) -> Result<Decision, AppError> {
        let principal = match gate(principal) {
            ControlFlow::Continue(principal) => principal,
            ControlFlow::Break(decision) => return Ok(decision),
        };

        let held = match &principal.role {
            RoleLabel::Assigned { role_id, .. } => {
                let current = Principal::new(principal.staff_id)
                    .with_permissions(&self.current_permissions(*role_id).await?);
                current.holds(capability)
            }
            _ => false,
        };

        Ok(grant_or_deny(principal, capability, held))
    }
}

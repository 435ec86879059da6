//! Authorization: principals, capability checks and the request guard.
//!
//! Decision order for every guarded request:
//! 1. no resolved principal -> `Unauthenticated`
//! 2. inactive or blocked account -> `AccountDisabled`
//! 3. top-tier account -> allow
//! 4. capability present in the principal's permissions -> allow, else
//!    `InsufficientPermission`

mod evaluator;
mod naming;
mod principal;

pub use evaluator::{decide, Decision, LiveRolePolicy, PolicyEvaluator, SnapshotPolicy};
pub use naming::is_reserved_role_name;
pub use principal::{Capability, Principal};

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::errors::AppError;

/// Storage label of the reserved all-capability account.
pub const TOP_TIER_LABEL: &str = "super-admin";

/// Where the guard reads a principal's permissions from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionSource {
    /// The snapshot copied onto the staff record at role assignment.
    #[default]
    Snapshot,
    /// The assigned role's current permission set, looked up per check.
    Live,
}

impl PermissionSource {
    pub fn from_env() -> Result<Self, AppError> {
        match std::env::var("AUTHZ_PERMISSION_SOURCE") {
            Err(_) => Ok(Self::Snapshot),
            Ok(value) => Self::parse(&value),
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_lowercase().as_str() {
            "" | "snapshot" => Ok(Self::Snapshot),
            "live" => Ok(Self::Live),
            other => Err(AppError::configuration(format!(
                "AUTHZ_PERMISSION_SOURCE must be 'snapshot' or 'live', got '{other}'"
            ))),
        }
    }

    pub fn evaluator(self, pool: SqlitePool) -> Arc<dyn PolicyEvaluator> {
        match self {
            Self::Snapshot => Arc::new(SnapshotPolicy),
            Self::Live => Arc::new(LiveRolePolicy::new(pool)),
        }
    }
}

/// Capabilities that guard the administrative endpoints.
pub mod permissions {
    pub const STAFF_MANAGEMENT_CREATE: &str = "staff-management-create";
    pub const STAFF_MANAGEMENT_READ: &str = "staff-management-read";
    pub const STAFF_MANAGEMENT_UPDATE: &str = "staff-management-update";
    pub const STAFF_MANAGEMENT_MANAGE: &str = "staff-management-manage";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_source_parsing() {
        assert_eq!(PermissionSource::parse("Live").unwrap(), PermissionSource::Live);
        assert_eq!(PermissionSource::parse(" snapshot ").unwrap(), PermissionSource::Snapshot);
        assert_eq!(PermissionSource::parse("").unwrap(), PermissionSource::Snapshot);
        assert!(PermissionSource::parse("cached").is_err());
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::db::{parse_optional_uuid, parse_uuid};
use crate::errors::{AccessError, AppError};
use crate::events::{Loggable, Severity};

/// Business domain a capability applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionModule {
    Dashboard,
    Users,
    Orders,
    Payments,
    ForexServices,
    Reports,
    Settings,
    StaffManagement,
    Notifications,
    Analytics,
}

impl PermissionModule {
    pub const ALL: [PermissionModule; 10] = [
        PermissionModule::Dashboard,
        PermissionModule::Users,
        PermissionModule::Orders,
        PermissionModule::Payments,
        PermissionModule::ForexServices,
        PermissionModule::Reports,
        PermissionModule::Settings,
        PermissionModule::StaffManagement,
        PermissionModule::Notifications,
        PermissionModule::Analytics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionModule::Dashboard => "dashboard",
            PermissionModule::Users => "users",
            PermissionModule::Orders => "orders",
            PermissionModule::Payments => "payments",
            PermissionModule::ForexServices => "forex-services",
            PermissionModule::Reports => "reports",
            PermissionModule::Settings => "settings",
            PermissionModule::StaffManagement => "staff-management",
            PermissionModule::Notifications => "notifications",
            PermissionModule::Analytics => "analytics",
        }
    }
}

impl fmt::Display for PermissionModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionModule {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|module| module.as_str() == s)
            .ok_or_else(|| AccessError::validation("module", format!("unknown module '{s}'")))
    }
}

/// Operation a capability allows within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Create,
    Read,
    Update,
    Delete,
    Export,
    Import,
    Approve,
    Reject,
    Manage,
}

impl PermissionAction {
    pub const ALL: [PermissionAction; 9] = [
        PermissionAction::Create,
        PermissionAction::Read,
        PermissionAction::Update,
        PermissionAction::Delete,
        PermissionAction::Export,
        PermissionAction::Import,
        PermissionAction::Approve,
        PermissionAction::Reject,
        PermissionAction::Manage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionAction::Create => "create",
            PermissionAction::Read => "read",
            PermissionAction::Update => "update",
            PermissionAction::Delete => "delete",
            PermissionAction::Export => "export",
            PermissionAction::Import => "import",
            PermissionAction::Approve => "approve",
            PermissionAction::Reject => "reject",
            PermissionAction::Manage => "manage",
        }
    }
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionAction {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| AccessError::validation("action", format!("unknown action '{s}'")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    #[schema(example = "orders-read")]
    pub name: String,
    pub module: PermissionModule,
    pub action: PermissionAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Permission {
    fn entity_type() -> &'static str { "permission" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPermission {
    pub id: String,
    pub name: String,
    pub module: String,
    pub action: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbPermission> for Permission {
    type Error = AppError;

    fn try_from(db: DbPermission) -> Result<Self, Self::Error> {
        Ok(Permission {
            id: parse_uuid(&db.id)?,
            module: db.module.parse()?,
            action: db.action.parse()?,
            name: db.name,
            description: db.description,
            is_active: db.is_active,
            created_by: parse_optional_uuid(db.created_by.as_deref())?,
            updated_by: parse_optional_uuid(db.updated_by.as_deref())?,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

/// Compact permission reference embedded in roles and staff snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionRef {
    pub id: Uuid,
    pub name: String,
    pub module: PermissionModule,
    pub action: PermissionAction,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPermissionRef {
    pub id: String,
    pub name: String,
    pub module: String,
    pub action: String,
}

impl TryFrom<DbPermissionRef> for PermissionRef {
    type Error = AppError;

    fn try_from(db: DbPermissionRef) -> Result<Self, Self::Error> {
        Ok(PermissionRef {
            id: parse_uuid(&db.id)?,
            module: db.module.parse()?,
            action: db.action.parse()?,
            name: db.name,
        })
    }
}

impl From<&Permission> for PermissionRef {
    fn from(p: &Permission) -> Self {
        PermissionRef {
            id: p.id,
            name: p.name.clone(),
            module: p.module,
            action: p.action,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PermissionCreateRequest {
    #[schema(example = "orders-approve")]
    pub name: String,
    pub module: PermissionModule,
    pub action: PermissionAction,
    #[schema(example = "Approve forex orders")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PermissionUpdateRequest {
    pub name: Option<String>,
    pub module: Option<PermissionModule>,
    pub action: Option<PermissionAction>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PermissionListQuery {
    pub module: Option<PermissionModule>,
    pub active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_round_trip_through_storage_form() {
        for module in PermissionModule::ALL {
            assert_eq!(module.as_str().parse::<PermissionModule>().unwrap(), module);
        }
        assert_eq!(
            serde_json::to_value(PermissionModule::ForexServices).unwrap(),
            serde_json::json!("forex-services")
        );
    }

    #[test]
    fn unknown_action_is_a_validation_error() {
        let err = "archive".parse::<PermissionAction>().unwrap_err();
        assert!(matches!(err, AccessError::Validation { field: "action", .. }));
    }
}

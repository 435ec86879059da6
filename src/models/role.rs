use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::db::{parse_optional_uuid, parse_uuid};
use crate::errors::AppError;
use crate::events::{Loggable, Severity};
use crate::models::permission::PermissionRef;

pub const MIN_ROLE_LEVEL: i64 = 1;
pub const MAX_ROLE_LEVEL: i64 = 100;
pub const MAX_ROLE_NAME_LENGTH: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    #[schema(example = "Agent")]
    pub name: String,
    /// Permissions in the order they were granted.
    pub permissions: Vec<PermissionRef>,
    /// 1..=100, higher is more privileged.
    #[schema(example = 40)]
    pub level: i64,
    pub is_system: bool,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn permission_ids(&self) -> Vec<Uuid> {
        self.permissions.iter().map(|p| p.id).collect()
    }
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: String,
    pub name: String,
    pub level: i64,
    pub is_system: bool,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbRole {
    pub fn into_role(self, permissions: Vec<PermissionRef>) -> Result<Role, AppError> {
        Ok(Role {
            id: parse_uuid(&self.id)?,
            created_by: parse_optional_uuid(self.created_by.as_deref())?,
            updated_by: parse_optional_uuid(self.updated_by.as_deref())?,
            name: self.name,
            permissions,
            level: self.level,
            is_system: self.is_system,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Role entry offered for assignment; never includes the top-tier label.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailableRole {
    pub id: Uuid,
    pub name: String,
    pub level: i64,
    pub is_system: bool,
}

impl From<&Role> for AvailableRole {
    fn from(role: &Role) -> Self {
        AvailableRole {
            id: role.id,
            name: role.name.clone(),
            level: role.level,
            is_system: role.is_system,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "Agent")]
    pub name: String,
    #[serde(default)]
    pub permission_ids: Vec<Uuid>,
    #[schema(example = 40)]
    pub level: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub name: Option<String>,
    pub permission_ids: Option<Vec<Uuid>>,
    pub level: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoleListQuery {
    pub active: Option<bool>,
}

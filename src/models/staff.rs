use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::authz::TOP_TIER_LABEL;
use crate::db::{parse_optional_uuid, parse_uuid};
use crate::errors::AppError;
use crate::events::{Loggable, Severity};
use crate::models::permission::PermissionRef;

/// Which role a staff member holds.
///
/// The top-tier account is its own variant rather than a catalog role, so it
/// can never be created, edited or listed through role management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleLabel {
    TopTier,
    Assigned { role_id: Uuid, name: String },
    Unassigned,
}

impl RoleLabel {
    pub fn is_top_tier(&self) -> bool {
        matches!(self, RoleLabel::TopTier)
    }

    pub fn role_id(&self) -> Option<Uuid> {
        match self {
            RoleLabel::Assigned { role_id, .. } => Some(*role_id),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            RoleLabel::TopTier => TOP_TIER_LABEL,
            RoleLabel::Assigned { name, .. } => name,
            RoleLabel::Unassigned => "unassigned",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Staff {
    pub id: Uuid,
    #[schema(example = "Asha Raman")]
    pub name: String,
    #[schema(example = "asha@remit.example")]
    pub email: String,
    pub role: RoleLabel,
    /// Snapshot of the role's permissions taken when the role was assigned.
    pub permissions: Vec<PermissionRef>,
    pub is_active: bool,
    pub is_blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Staff {
    fn entity_type() -> &'static str { "staff" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbStaff {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub top_tier: bool,
    pub role_id: Option<String>,
    pub role_name: Option<String>,
    pub is_active: bool,
    pub is_blocked: bool,
    pub department: Option<String>,
    pub phone_number: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbStaff {
    pub fn role_label(&self) -> Result<RoleLabel, AppError> {
        if self.top_tier {
            return Ok(RoleLabel::TopTier);
        }

        match (self.role_id.as_deref(), self.role_name.as_ref()) {
            (Some(role_id), Some(name)) => Ok(RoleLabel::Assigned {
                role_id: parse_uuid(role_id)?,
                name: name.clone(),
            }),
            _ => Ok(RoleLabel::Unassigned),
        }
    }

    pub fn into_staff(self, permissions: Vec<PermissionRef>) -> Result<Staff, AppError> {
        Ok(Staff {
            id: parse_uuid(&self.id)?,
            role: self.role_label()?,
            created_by: parse_optional_uuid(self.created_by.as_deref())?,
            updated_by: parse_optional_uuid(self.updated_by.as_deref())?,
            name: self.name,
            email: self.email,
            permissions,
            is_active: self.is_active,
            is_blocked: self.is_blocked,
            department: self.department,
            phone_number: self.phone_number,
            last_login: self.last_login,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Public identity of a staff member, safe to return from the seed endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StaffSummary {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub is_active: bool,
}

impl From<&Staff> for StaffSummary {
    fn from(staff: &Staff) -> Self {
        StaffSummary {
            id: staff.id,
            email: staff.email.clone(),
            role: staff.role.display_name().to_string(),
            is_active: staff.is_active,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterStaffRequest {
    #[schema(example = "Asha Raman")]
    pub name: String,
    #[schema(example = "asha@remit.example")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    /// Name of the catalog role to assign on creation.
    #[schema(example = "Agent")]
    pub role: Option<String>,
    pub department: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "asha@remit.example")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub staff: Staff,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct StaffUpdateRequest {
    pub name: Option<String>,
    pub department: Option<String>,
    pub phone_number: Option<String>,
    pub is_active: Option<bool>,
    pub is_blocked: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    #[schema(example = "asha@remit.example")]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Replaces the staff member's permission set directly, without a role.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignPermissionsRequest {
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StaffListQuery {
    /// Case-insensitive match on name or email.
    pub search: Option<String>,
    pub role_id: Option<Uuid>,
    pub active: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleCount {
    pub role: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StaffPage {
    pub staff: Vec<Staff>,
    pub pagination: Pagination,
    pub role_stats: Vec<RoleCount>,
}

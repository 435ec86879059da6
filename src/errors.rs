use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

/// Domain failures raised by the permission registry, role catalog, staff
/// store and the authorization guard.
///
/// Authorization-shaped variants (`Unauthenticated`, `AccountDisabled`,
/// `InsufficientPermission`) render fixed messages so a response never tells
/// the caller which part of a check failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("permission with {field} '{value}' already exists")]
    DuplicateCapability { field: &'static str, value: String },
    #[error("role '{name}' already exists")]
    DuplicateRole { name: String },
    #[error("staff member with email '{email}' already exists")]
    DuplicatePrincipal { email: String },
    #[error("permissions are invalid or inactive: {}", join_ids(.ids))]
    InvalidPermission { ids: Vec<String> },
    #[error("role '{name}' is inactive and cannot be assigned")]
    InactiveRole { name: String },
    #[error("role name '{name}' is reserved")]
    ReservedRoleName { name: String },
    #[error("role '{name}' is a system role")]
    ProtectedRole { name: String },
    #[error("the top-tier account cannot be {action}")]
    ProtectedPrincipal { action: &'static str },
    #[error("{entity} is still in use: {detail}")]
    InUse { entity: &'static str, detail: String },
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("forbidden role assignment: {0}")]
    ForbiddenRoleAssignment(String),
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("invalid credentials")]
    Unauthenticated,
    #[error("account is disabled")]
    AccountDisabled,
    #[error("insufficient permission")]
    InsufficientPermission,
}

fn join_ids(ids: &[String]) -> String {
    ids.join(", ")
}

impl AccessError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AccessError::DuplicateCapability { .. } => "duplicate_capability",
            AccessError::DuplicateRole { .. } => "duplicate_role",
            AccessError::DuplicatePrincipal { .. } => "duplicate_principal",
            AccessError::InvalidPermission { .. } => "invalid_permission",
            AccessError::InactiveRole { .. } => "inactive_role",
            AccessError::ReservedRoleName { .. } => "reserved_role_name",
            AccessError::ProtectedRole { .. } => "protected_role",
            AccessError::ProtectedPrincipal { .. } => "protected_principal",
            AccessError::InUse { .. } => "in_use",
            AccessError::NotFound { .. } => "not_found",
            AccessError::ForbiddenRoleAssignment(_) => "forbidden_role_assignment",
            AccessError::Validation { .. } => "validation",
            AccessError::Unauthenticated => "unauthenticated",
            AccessError::AccountDisabled => "account_disabled",
            AccessError::InsufficientPermission => "insufficient_permission",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AccessError::DuplicateCapability { .. }
            | AccessError::DuplicateRole { .. }
            | AccessError::DuplicatePrincipal { .. }
            | AccessError::InUse { .. } => StatusCode::CONFLICT,
            AccessError::InvalidPermission { .. }
            | AccessError::InactiveRole { .. }
            | AccessError::ReservedRoleName { .. }
            | AccessError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AccessError::ProtectedRole { .. }
            | AccessError::ProtectedPrincipal { .. }
            | AccessError::ForbiddenRoleAssignment(_)
            | AccessError::AccountDisabled
            | AccessError::InsufficientPermission => StatusCode::FORBIDDEN,
            AccessError::NotFound { .. } => StatusCode::NOT_FOUND,
            AccessError::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("token error: {0}")]
    Token(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn token(err: impl Into<String>) -> Self {
        Self::Token(err.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The domain error behind this failure, if any.
    pub fn access(&self) -> Option<&AccessError> {
        match self {
            AppError::Access(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            AppError::Access(err) => (err.status(), err.kind()),
            AppError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
            AppError::Token(_) => (StatusCode::UNAUTHORIZED, "token"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, source = ?self, "request failed");
        }

        let payload = ErrorResponse {
            error: error.to_string(),
            message: self.to_string(),
        };

        (status, Json(payload)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

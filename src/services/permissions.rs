//! Permission registry: the catalogue of (module, action) capabilities.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::unique_violation;
use crate::errors::{AccessError, AppResult};
use crate::models::permission::{
    DbPermission, DbPermissionRef, Permission, PermissionAction, PermissionCreateRequest,
    PermissionListQuery, PermissionModule, PermissionRef, PermissionUpdateRequest,
};
use crate::utils::utc_now;

const MAX_DESCRIPTION_LENGTH: usize = 200;

const SELECT_PERMISSION: &str = "SELECT id, name, module, action, description, is_active, created_by, updated_by, created_at, updated_at FROM permissions";

/// Trims and lower-cases `raw`; the result must be lowercase letters and
/// hyphens only.
pub fn normalize_name(raw: &str) -> Result<String, AccessError> {
    let name = raw.trim().to_lowercase();
    if name.is_empty() {
        return Err(AccessError::validation("name", "must not be empty"));
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c == '-') {
        return Err(AccessError::validation(
            "name",
            "must contain only lowercase letters and hyphens",
        ));
    }
    Ok(name)
}

fn normalize_description(raw: Option<String>) -> Result<Option<String>, AccessError> {
    let Some(description) = raw.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(AccessError::validation(
            "description",
            format!("must be at most {MAX_DESCRIPTION_LENGTH} characters"),
        ));
    }
    Ok(Some(description))
}

fn duplicate_error(constraint: &str, name: &str, module: PermissionModule, action: PermissionAction) -> AccessError {
    if constraint.contains("permissions.name") {
        AccessError::DuplicateCapability {
            field: "name",
            value: name.to_string(),
        }
    } else {
        AccessError::DuplicateCapability {
            field: "module/action",
            value: format!("{module}:{action}"),
        }
    }
}

pub async fn register(
    pool: &SqlitePool,
    req: PermissionCreateRequest,
    created_by: Option<Uuid>,
) -> AppResult<Permission> {
    let name = normalize_name(&req.name)?;
    let description = normalize_description(req.description)?;
    let id = Uuid::new_v4();
    let now = utc_now();

    let inserted = sqlx::query(
        "INSERT INTO permissions (id, name, module, action, description, is_active, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&name)
    .bind(req.module.as_str())
    .bind(req.action.as_str())
    .bind(&description)
    .bind(created_by.map(|id| id.to_string()))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    if let Err(err) = inserted {
        return Err(match unique_violation(&err) {
            Some(constraint) => duplicate_error(&constraint, &name, req.module, req.action).into(),
            None => err.into(),
        });
    }

    tracing::info!(permission = %name, module = %req.module, action = %req.action, "permission registered");
    get(pool, id).await
}

pub async fn get(pool: &SqlitePool, id: Uuid) -> AppResult<Permission> {
    let row = sqlx::query_as::<_, DbPermission>(&format!("{SELECT_PERMISSION} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AccessError::not_found("permission", id))?;

    row.try_into()
}

/// Permissions matching `filter`, ordered by module then action.
pub async fn list(pool: &SqlitePool, filter: &PermissionListQuery) -> AppResult<Vec<Permission>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_PERMISSION);
    query.push(" WHERE 1 = 1");
    if let Some(module) = filter.module {
        query.push(" AND module = ").push_bind(module.as_str());
    }
    if let Some(active) = filter.active {
        query.push(" AND is_active = ").push_bind(active);
    }
    query.push(" ORDER BY module, action");

    let rows = query.build_query_as::<DbPermission>().fetch_all(pool).await?;
    rows.into_iter().map(Permission::try_from).collect()
}

pub async fn update(
    pool: &SqlitePool,
    id: Uuid,
    patch: PermissionUpdateRequest,
    updated_by: Option<Uuid>,
) -> AppResult<Permission> {
    let existing = get(pool, id).await?;

    let name = match patch.name.as_deref() {
        Some(raw) => normalize_name(raw)?,
        None => existing.name.clone(),
    };
    let description = match patch.description {
        Some(raw) => normalize_description(Some(raw))?,
        None => existing.description.clone(),
    };
    let module = patch.module.unwrap_or(existing.module);
    let action = patch.action.unwrap_or(existing.action);
    let is_active = patch.is_active.unwrap_or(existing.is_active);

    let updated = sqlx::query(
        "UPDATE permissions SET name = ?, module = ?, action = ?, description = ?, is_active = ?, updated_by = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(module.as_str())
    .bind(action.as_str())
    .bind(&description)
    .bind(is_active)
    .bind(updated_by.map(|id| id.to_string()))
    .bind(utc_now())
    .bind(id.to_string())
    .execute(pool)
    .await;

    if let Err(err) = updated {
        return Err(match unique_violation(&err) {
            Some(constraint) => duplicate_error(&constraint, &name, module, action).into(),
            None => err.into(),
        });
    }

    get(pool, id).await
}

/// Hard-deletes a permission no role references. Staff snapshots holding it
/// lose it through the cascading foreign key.
pub async fn retire(pool: &SqlitePool, id: Uuid) -> AppResult<Permission> {
    let permission = get(pool, id).await?;

    let referencing_roles: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM role_permissions WHERE permission_id = ?")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;

    if referencing_roles > 0 {
        return Err(AccessError::InUse {
            entity: "permission",
            detail: format!("'{}' is assigned to {referencing_roles} role(s)", permission.name),
        }
        .into());
    }

    let deleted = sqlx::query("DELETE FROM permissions WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await;

    match deleted {
        Ok(_) => {
            tracing::info!(permission = %permission.name, "permission retired");
            Ok(permission)
        }
        // a role picked it up between the check and the delete
        Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => Err(AccessError::InUse {
            entity: "permission",
            detail: format!("'{}' is assigned to a role", permission.name),
        }
        .into()),
        Err(err) => Err(err.into()),
    }
}

/// Resolves `ids` against active permissions, preserving the input order.
/// Fails with `InvalidPermission` naming every id that is unknown or inactive.
pub async fn resolve_active(pool: &SqlitePool, ids: &[Uuid]) -> AppResult<Vec<PermissionRef>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT id, name, module, action FROM permissions WHERE is_active = 1 AND id IN (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");

    let found: Vec<PermissionRef> = query
        .build_query_as::<DbPermissionRef>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(PermissionRef::try_from)
        .collect::<AppResult<_>>()?;

    let mut resolved = Vec::with_capacity(ids.len());
    let mut missing = Vec::new();
    for id in ids {
        match found.iter().find(|p| p.id == *id) {
            Some(permission) => resolved.push(permission.clone()),
            None => missing.push(id.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(AccessError::InvalidPermission { ids: missing }.into());
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_normalized() {
        assert_eq!(normalize_name("  Orders-Read ").unwrap(), "orders-read");
        assert!(matches!(
            normalize_name("orders_read"),
            Err(AccessError::Validation { field: "name", .. })
        ));
        assert!(normalize_name("   ").is_err());
        assert!(normalize_name("orders-read-2").is_err());
    }

    #[test]
    fn descriptions_are_trimmed_and_bounded() {
        assert_eq!(normalize_description(Some("  View orders ".into())).unwrap().as_deref(), Some("View orders"));
        assert_eq!(normalize_description(Some("   ".into())).unwrap(), None);
        assert!(normalize_description(Some("x".repeat(201))).is_err());
    }

    #[test]
    fn duplicate_error_names_the_colliding_field() {
        let err = duplicate_error("permissions.name", "orders-read", PermissionModule::Orders, PermissionAction::Read);
        assert_eq!(
            err,
            AccessError::DuplicateCapability { field: "name", value: "orders-read".into() }
        );

        let err = duplicate_error(
            "permissions.module, permissions.action",
            "orders-view",
            PermissionModule::Orders,
            PermissionAction::Read,
        );
        assert_eq!(
            err,
            AccessError::DuplicateCapability { field: "module/action", value: "orders:read".into() }
        );
    }
}

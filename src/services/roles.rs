//! Role catalog: named, leveled bundles of permissions.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{dedup_ids, permissions};
use crate::authz::{is_reserved_role_name, Principal};
use crate::db::unique_violation;
use crate::errors::{AccessError, AppResult};
use crate::models::permission::{DbPermissionRef, PermissionRef};
use crate::models::role::{
    AvailableRole, DbRole, Role, RoleCreateRequest, RoleListQuery, RoleUpdateRequest, MAX_ROLE_LEVEL,
    MAX_ROLE_NAME_LENGTH, MIN_ROLE_LEVEL,
};
use crate::utils::utc_now;

const SELECT_ROLE: &str =
    "SELECT id, name, level, is_system, is_active, created_by, updated_by, created_at, updated_at FROM roles";

pub fn normalize_role_name(raw: &str) -> Result<String, AccessError> {
    let name = raw.trim().to_string();
    if name.is_empty() {
        return Err(AccessError::validation("name", "must not be empty"));
    }
    if name.chars().count() > MAX_ROLE_NAME_LENGTH {
        return Err(AccessError::validation(
            "name",
            format!("must be at most {MAX_ROLE_NAME_LENGTH} characters"),
        ));
    }
    if is_reserved_role_name(&name) {
        return Err(AccessError::ReservedRoleName { name });
    }
    Ok(name)
}

pub fn validate_level(level: i64) -> Result<i64, AccessError> {
    if !(MIN_ROLE_LEVEL..=MAX_ROLE_LEVEL).contains(&level) {
        return Err(AccessError::validation(
            "level",
            format!("must be between {MIN_ROLE_LEVEL} and {MAX_ROLE_LEVEL}"),
        ));
    }
    Ok(level)
}

/// Role level at or above which `actor` may not hand out or edit roles.
/// `None` means no ceiling: the top-tier account, or an internal caller
/// acting without a principal.
pub async fn grant_ceiling(pool: &SqlitePool, actor: Option<&Principal>) -> AppResult<Option<i64>> {
    let Some(actor) = actor else {
        return Ok(None);
    };
    if actor.is_top_tier() {
        return Ok(None);
    }

    match actor.role.role_id() {
        Some(role_id) => Ok(Some(get(pool, role_id).await?.level)),
        // an account without a role sits below every level
        None => Ok(Some(MIN_ROLE_LEVEL)),
    }
}

pub fn ensure_below_ceiling(ceiling: Option<i64>, role_name: &str, level: i64) -> Result<(), AccessError> {
    match ceiling {
        Some(ceiling) if level >= ceiling => Err(AccessError::ForbiddenRoleAssignment(format!(
            "role '{role_name}' at level {level} is not below the caller's level {ceiling}"
        ))),
        _ => Ok(()),
    }
}

/// The role's permissions in grant order.
pub async fn permission_refs(pool: &SqlitePool, role_id: Uuid) -> AppResult<Vec<PermissionRef>> {
    let rows = sqlx::query_as::<_, DbPermissionRef>(
        r#"
        SELECT p.id, p.name, p.module, p.action
        FROM role_permissions rp
        INNER JOIN permissions p ON p.id = rp.permission_id
        WHERE rp.role_id = ?
        ORDER BY rp.position
        "#,
    )
    .bind(role_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(PermissionRef::try_from).collect()
}

async fn hydrate(pool: &SqlitePool, row: DbRole) -> AppResult<Role> {
    let id = crate::db::parse_uuid(&row.id)?;
    let permissions = permission_refs(pool, id).await?;
    row.into_role(permissions)
}

pub async fn get(pool: &SqlitePool, id: Uuid) -> AppResult<Role> {
    let row = sqlx::query_as::<_, DbRole>(&format!("{SELECT_ROLE} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AccessError::not_found("role", id))?;

    hydrate(pool, row).await
}

pub async fn find_by_name(pool: &SqlitePool, name: &str) -> AppResult<Option<Role>> {
    let row = sqlx::query_as::<_, DbRole>(&format!("{SELECT_ROLE} WHERE name = ?"))
        .bind(name.trim())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(Some(hydrate(pool, row).await?)),
        None => Ok(None),
    }
}

/// Roles ordered by level (highest first), then name.
pub async fn list(pool: &SqlitePool, filter: &RoleListQuery) -> AppResult<Vec<Role>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_ROLE);
    if let Some(active) = filter.active {
        query.push(" WHERE is_active = ").push_bind(active);
    }
    query.push(" ORDER BY level DESC, name");

    let rows = query.build_query_as::<DbRole>().fetch_all(pool).await?;
    let mut roles = Vec::with_capacity(rows.len());
    for row in rows {
        roles.push(hydrate(pool, row).await?);
    }
    Ok(roles)
}

/// Active roles that may be handed to staff; every spelling of the top-tier
/// role is filtered out.
pub async fn list_available(pool: &SqlitePool) -> AppResult<Vec<AvailableRole>> {
    let roles = list(pool, &RoleListQuery { active: Some(true) }).await?;
    Ok(roles
        .iter()
        .filter(|role| !is_reserved_role_name(&role.name))
        .map(AvailableRole::from)
        .collect())
}

async fn replace_permissions(conn: &mut SqliteConnection, role_id: Uuid, perms: &[PermissionRef]) -> AppResult<()> {
    sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
        .bind(role_id.to_string())
        .execute(&mut *conn)
        .await?;

    for (position, perm) in perms.iter().enumerate() {
        sqlx::query("INSERT INTO role_permissions (role_id, permission_id, position) VALUES (?, ?, ?)")
            .bind(role_id.to_string())
            .bind(perm.id.to_string())
            .bind(position as i64)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Inserts a role with an already-validated name, level and permission set.
pub(crate) async fn insert(
    pool: &SqlitePool,
    name: &str,
    perms: &[PermissionRef],
    level: i64,
    is_system: bool,
    created_by: Option<Uuid>,
) -> AppResult<Uuid> {
    let id = Uuid::new_v4();
    let now = utc_now();
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO roles (id, name, level, is_system, is_active, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(level)
    .bind(is_system)
    .bind(created_by.map(|id| id.to_string()))
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await;

    if let Err(err) = inserted {
        return Err(match unique_violation(&err) {
            Some(_) => AccessError::DuplicateRole { name: name.to_string() }.into(),
            None => err.into(),
        });
    }

    replace_permissions(&mut tx, id, perms).await?;
    tx.commit().await?;

    Ok(id)
}

pub async fn create(pool: &SqlitePool, req: RoleCreateRequest, created_by: Option<Uuid>) -> AppResult<Role> {
    let name = normalize_role_name(&req.name)?;
    let level = validate_level(req.level.unwrap_or(MIN_ROLE_LEVEL))?;
    let perms = permissions::resolve_active(pool, &dedup_ids(&req.permission_ids)).await?;

    let id = insert(pool, &name, &perms, level, false, created_by).await?;
    tracing::info!(role = %name, level, permissions = perms.len(), "role created");

    get(pool, id).await
}

/// Applies `patch` to a role. System roles may only be changed by the
/// top-tier account, and other callers may only touch roles below their own
/// level. Staff who already hold the role keep their previous permission
/// snapshot until the role is assigned to them again.
pub async fn update(pool: &SqlitePool, id: Uuid, patch: RoleUpdateRequest, actor: &Principal) -> AppResult<Role> {
    let existing = get(pool, id).await?;

    if existing.is_system && !actor.is_top_tier() {
        return Err(AccessError::ProtectedRole { name: existing.name }.into());
    }

    let ceiling = grant_ceiling(pool, Some(actor)).await?;
    ensure_below_ceiling(ceiling, &existing.name, existing.level)?;

    let name = match patch.name.as_deref() {
        Some(raw) => normalize_role_name(raw)?,
        None => existing.name.clone(),
    };
    let level = validate_level(patch.level.unwrap_or(existing.level))?;
    ensure_below_ceiling(ceiling, &name, level)?;
    let is_active = patch.is_active.unwrap_or(existing.is_active);
    let perms = match patch.permission_ids.as_deref() {
        Some(ids) => Some(permissions::resolve_active(pool, &dedup_ids(ids)).await?),
        None => None,
    };

    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE roles SET name = ?, level = ?, is_active = ?, updated_by = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(level)
        .bind(is_active)
        .bind(actor.staff_id.to_string())
        .bind(utc_now())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await;

    if let Err(err) = updated {
        return Err(match unique_violation(&err) {
            Some(_) => AccessError::DuplicateRole { name }.into(),
            None => err.into(),
        });
    }

    if let Some(perms) = &perms {
        replace_permissions(&mut tx, id, perms).await?;
    }

    tx.commit().await?;
    tracing::info!(role = %name, "role updated");

    get(pool, id).await
}

/// Deletes a non-system role that no staff member currently holds.
pub async fn delete(pool: &SqlitePool, id: Uuid) -> AppResult<Role> {
    let role = get(pool, id).await?;

    if role.is_system {
        return Err(AccessError::ProtectedRole { name: role.name }.into());
    }

    let holders: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM staff WHERE role_id = ?")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;

    if holders > 0 {
        return Err(AccessError::InUse {
            entity: "role",
            detail: format!("'{}' is assigned to {holders} staff member(s)", role.name),
        }
        .into());
    }

    let deleted = sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await;

    match deleted {
        Ok(_) => {
            tracing::info!(role = %role.name, "role deleted");
            Ok(role)
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => Err(AccessError::InUse {
            entity: "role",
            detail: format!("'{}' is assigned to a staff member", role.name),
        }
        .into()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_are_trimmed_and_bounded() {
        assert_eq!(normalize_role_name("  Agent ").unwrap(), "Agent");
        assert!(normalize_role_name("").is_err());
        assert!(normalize_role_name(&"r".repeat(51)).is_err());
    }

    #[test]
    fn reserved_names_cannot_become_roles() {
        assert_eq!(
            normalize_role_name("Super Admin"),
            Err(AccessError::ReservedRoleName { name: "Super Admin".into() })
        );
    }

    #[test]
    fn ceiling_allows_only_lower_levels() {
        assert!(ensure_below_ceiling(None, "Admin", 80).is_ok());
        assert!(ensure_below_ceiling(Some(40), "Support", 20).is_ok());
        assert!(matches!(
            ensure_below_ceiling(Some(40), "Agent", 40),
            Err(AccessError::ForbiddenRoleAssignment(_))
        ));
        assert!(ensure_below_ceiling(Some(1), "Intern", 1).is_err());
    }

    #[test]
    fn levels_must_be_in_range() {
        assert!(validate_level(0).is_err());
        assert!(validate_level(101).is_err());
        assert_eq!(validate_level(100).unwrap(), 100);
        assert_eq!(validate_level(1).unwrap(), 1);
    }
}

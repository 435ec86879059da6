//! Staff store: accounts, credentials and the materialized permission
//! snapshot each account carries.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{dedup_ids, permissions, roles};
use crate::authz::{is_reserved_role_name, Principal, TOP_TIER_LABEL};
use crate::db::{parse_uuid, unique_violation};
use crate::errors::{AccessError, AppResult};
use crate::jwt::JwtConfig;
use crate::models::permission::{DbPermissionRef, PermissionRef};
use crate::models::role::Role;
use crate::models::staff::{
    DbStaff, Pagination, RegisterStaffRequest, RoleCount, Staff, StaffListQuery, StaffPage, StaffUpdateRequest,
};
use crate::utils::{decoy_password_hash, hash_password, normalize_email, utc_now, verify_password};

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;
const MAX_NAME_LENGTH: usize = 100;

const SELECT_STAFF: &str = r#"
    SELECT s.id, s.name, s.email, s.password_hash, s.top_tier, s.role_id, r.name AS role_name,
           s.is_active, s.is_blocked, s.department, s.phone_number, s.last_login,
           s.created_by, s.updated_by, s.created_at, s.updated_at
    FROM staff s
    LEFT JOIN roles r ON r.id = s.role_id
"#;

pub fn validate_email(raw: &str) -> Result<String, AccessError> {
    let email = normalize_email(raw);
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
        }
        None => false,
    };
    if !valid {
        return Err(AccessError::validation("email", "must be a valid email address"));
    }
    Ok(email)
}

fn validate_name(raw: &str) -> Result<String, AccessError> {
    let name = raw.trim().to_string();
    if name.chars().count() < 2 || name.chars().count() > MAX_NAME_LENGTH {
        return Err(AccessError::validation(
            "name",
            format!("must be between 2 and {MAX_NAME_LENGTH} characters"),
        ));
    }
    Ok(name)
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// The staff member's materialized permissions in grant order.
pub async fn snapshot(pool: &SqlitePool, staff_id: Uuid) -> AppResult<Vec<PermissionRef>> {
    let rows = sqlx::query_as::<_, DbPermissionRef>(
        r#"
        SELECT p.id, p.name, p.module, p.action
        FROM staff_permissions sp
        INNER JOIN permissions p ON p.id = sp.permission_id
        WHERE sp.staff_id = ?
        ORDER BY sp.position
        "#,
    )
    .bind(staff_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(PermissionRef::try_from).collect()
}

/// Replaces the snapshot with a copy of `perms`.
pub(crate) async fn write_snapshot(conn: &mut SqliteConnection, staff_id: Uuid, perms: &[PermissionRef]) -> AppResult<()> {
    sqlx::query("DELETE FROM staff_permissions WHERE staff_id = ?")
        .bind(staff_id.to_string())
        .execute(&mut *conn)
        .await?;

    for (position, perm) in perms.iter().enumerate() {
        sqlx::query("INSERT INTO staff_permissions (staff_id, permission_id, position) VALUES (?, ?, ?)")
            .bind(staff_id.to_string())
            .bind(perm.id.to_string())
            .bind(position as i64)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

async fn hydrate(pool: &SqlitePool, row: DbStaff) -> AppResult<Staff> {
    let id = parse_uuid(&row.id)?;
    let permissions = snapshot(pool, id).await?;
    row.into_staff(permissions)
}

async fn fetch_row_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbStaff>> {
    Ok(sqlx::query_as::<_, DbStaff>(&format!("{SELECT_STAFF} WHERE s.email = ?"))
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await?)
}

pub async fn get(pool: &SqlitePool, id: Uuid) -> AppResult<Staff> {
    let row = sqlx::query_as::<_, DbStaff>(&format!("{SELECT_STAFF} WHERE s.id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AccessError::not_found("staff", id))?;

    hydrate(pool, row).await
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<Staff>> {
    match fetch_row_by_email(pool, email).await? {
        Some(row) => Ok(Some(hydrate(pool, row).await?)),
        None => Ok(None),
    }
}

pub async fn find_top_tier(pool: &SqlitePool) -> AppResult<Option<Staff>> {
    let row = sqlx::query_as::<_, DbStaff>(&format!("{SELECT_STAFF} WHERE s.top_tier = 1"))
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(Some(hydrate(pool, row).await?)),
        None => Ok(None),
    }
}

/// Resolves the role named at registration. The top-tier label is never
/// assignable here.
async fn initial_role(pool: &SqlitePool, name: &str) -> AppResult<Role> {
    if is_reserved_role_name(name) {
        return Err(AccessError::ForbiddenRoleAssignment(format!(
            "the {TOP_TIER_LABEL} role can only be created by the bootstrap seed"
        ))
        .into());
    }

    let role = roles::find_by_name(pool, name)
        .await?
        .ok_or_else(|| AccessError::not_found("role", name.trim()))?;

    if !role.is_active {
        return Err(AccessError::InactiveRole { name: role.name }.into());
    }

    Ok(role)
}

/// Non-top-tier callers may not act on their own account.
fn ensure_not_self(actor: Option<&Principal>, staff_id: Uuid, what: &str) -> Result<(), AccessError> {
    match actor {
        Some(actor) if !actor.is_top_tier() && actor.staff_id == staff_id => Err(AccessError::ForbiddenRoleAssignment(
            format!("staff cannot change their own {what}"),
        )),
        _ => Ok(()),
    }
}

/// Creates a staff account. The password is stored only as an argon2 hash.
/// A named initial role is materialized exactly as `assign_role` would, and
/// must sit below the creating `actor`'s own role level. `None` is an
/// internal caller with no such limit.
pub async fn register(pool: &SqlitePool, req: RegisterStaffRequest, actor: Option<&Principal>) -> AppResult<Staff> {
    let name = validate_name(&req.name)?;
    let email = validate_email(&req.email)?;
    let role = match req.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(role_name) => Some(initial_role(pool, role_name).await?),
        None => None,
    };
    if let Some(role) = &role {
        let ceiling = roles::grant_ceiling(pool, actor).await?;
        roles::ensure_below_ceiling(ceiling, &role.name, role.level)?;
    }
    let password_hash = hash_password(&req.password)?;
    let created_by = actor.map(|actor| actor.staff_id);

    let id = Uuid::new_v4();
    let now = utc_now();
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO staff (id, name, email, password_hash, top_tier, role_id, is_active, is_blocked,
                           department, phone_number, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, 0, ?, 1, 0, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&name)
    .bind(&email)
    .bind(password_hash)
    .bind(role.as_ref().map(|r| r.id.to_string()))
    .bind(trimmed(req.department))
    .bind(trimmed(req.phone_number))
    .bind(created_by.map(|id| id.to_string()))
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await;

    if let Err(err) = inserted {
        return Err(match unique_violation(&err) {
            Some(_) => AccessError::DuplicatePrincipal { email }.into(),
            None => err.into(),
        });
    }

    if let Some(role) = &role {
        write_snapshot(&mut tx, id, &role.permissions).await?;
    }

    tx.commit().await?;
    tracing::info!(staff_id = %id, role = role.as_ref().map(|r| r.name.as_str()).unwrap_or("unassigned"), "staff registered");

    get(pool, id).await
}

/// Gives `staff_id` the role and copies the role's current permission set
/// onto the account. The copy is not refreshed when the role later changes;
/// calling this again is the only way to refresh it.
///
/// An `actor` below the top tier cannot target their own account and can
/// only hand out roles below their own level.
pub async fn assign_role(pool: &SqlitePool, staff_id: Uuid, role_id: Uuid, actor: Option<&Principal>) -> AppResult<Staff> {
    let staff = get(pool, staff_id).await?;
    let role = roles::get(pool, role_id).await?;

    if staff.role.is_top_tier() {
        return Err(AccessError::ForbiddenRoleAssignment(format!(
            "the {TOP_TIER_LABEL} account cannot change role"
        ))
        .into());
    }
    if is_reserved_role_name(&role.name) {
        return Err(AccessError::ForbiddenRoleAssignment(format!("role '{}' is reserved", role.name)).into());
    }
    if !role.is_active {
        return Err(AccessError::InactiveRole { name: role.name }.into());
    }
    ensure_not_self(actor, staff_id, "role")?;
    let ceiling = roles::grant_ceiling(pool, actor).await?;
    roles::ensure_below_ceiling(ceiling, &role.name, role.level)?;

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE staff SET role_id = ?, updated_by = ?, updated_at = ? WHERE id = ?")
        .bind(role_id.to_string())
        .bind(actor.map(|actor| actor.staff_id.to_string()))
        .bind(utc_now())
        .bind(staff_id.to_string())
        .execute(&mut *tx)
        .await?;

    write_snapshot(&mut tx, staff_id, &role.permissions).await?;
    tx.commit().await?;

    tracing::info!(staff_id = %staff_id, role = %role.name, permissions = role.permissions.len(), "role assigned");
    get(pool, staff_id).await
}

/// Replaces the account's permission snapshot with `permission_ids`, in
/// request order and without repeats, leaving its role label untouched.
/// Every id must be an active permission. An `actor` below the top tier
/// cannot target their own account and can only grant permissions they hold.
pub async fn assign_permissions(
    pool: &SqlitePool,
    staff_id: Uuid,
    permission_ids: &[Uuid],
    actor: Option<&Principal>,
) -> AppResult<Staff> {
    let staff = get(pool, staff_id).await?;

    if staff.role.is_top_tier() {
        return Err(AccessError::ProtectedPrincipal {
            action: "given a custom permission set",
        }
        .into());
    }
    ensure_not_self(actor, staff_id, "permissions")?;

    let perms = permissions::resolve_active(pool, &dedup_ids(permission_ids)).await?;

    if let Some(actor) = actor.filter(|actor| !actor.is_top_tier()) {
        let not_held: Vec<&str> = perms
            .iter()
            .filter(|perm| !actor.has_capability(&perm.name))
            .map(|perm| perm.name.as_str())
            .collect();
        if !not_held.is_empty() {
            return Err(AccessError::ForbiddenRoleAssignment(format!(
                "cannot grant permissions the caller does not hold: {}",
                not_held.join(", ")
            ))
            .into());
        }
    }

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE staff SET updated_by = ?, updated_at = ? WHERE id = ?")
        .bind(actor.map(|actor| actor.staff_id.to_string()))
        .bind(utc_now())
        .bind(staff_id.to_string())
        .execute(&mut *tx)
        .await?;

    write_snapshot(&mut tx, staff_id, &perms).await?;
    tx.commit().await?;

    tracing::info!(staff_id = %staff_id, permissions = perms.len(), "permissions assigned");
    get(pool, staff_id).await
}

/// Checks `plaintext` against the stored hash for `email`. Unknown emails
/// are checked against a decoy hash so both failures take the same work.
pub async fn verify_credential(pool: &SqlitePool, email: &str, plaintext: &str) -> AppResult<bool> {
    let row = fetch_row_by_email(pool, email).await?;
    check_password(row.as_ref(), plaintext)
}

fn check_password(row: Option<&DbStaff>, plaintext: &str) -> AppResult<bool> {
    match row {
        Some(row) => verify_password(plaintext, &row.password_hash),
        None => {
            verify_password(plaintext, decoy_password_hash())?;
            Ok(false)
        }
    }
}

/// Login: credential check first, account status second, so a disabled
/// account is only reported to someone who knows its password.
pub async fn authenticate(pool: &SqlitePool, email: &str, password: &str) -> AppResult<Staff> {
    let row = fetch_row_by_email(pool, email).await?;
    if !check_password(row.as_ref(), password)? {
        return Err(AccessError::Unauthenticated.into());
    }
    let Some(row) = row else {
        return Err(AccessError::Unauthenticated.into());
    };

    if !row.is_active || row.is_blocked {
        return Err(AccessError::AccountDisabled.into());
    }

    sqlx::query("UPDATE staff SET last_login = ? WHERE id = ?")
        .bind(utc_now())
        .bind(&row.id)
        .execute(pool)
        .await?;

    let id = parse_uuid(&row.id)?;
    get(pool, id).await
}

pub async fn change_password(pool: &SqlitePool, staff_id: Uuid, current: &str, new: &str) -> AppResult<()> {
    let hash: String = sqlx::query_scalar("SELECT password_hash FROM staff WHERE id = ?")
        .bind(staff_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AccessError::not_found("staff", staff_id))?;

    if !verify_password(current, &hash)? {
        return Err(AccessError::Unauthenticated.into());
    }

    sqlx::query("UPDATE staff SET password_hash = ?, updated_by = ?, updated_at = ? WHERE id = ?")
        .bind(hash_password(new)?)
        .bind(staff_id.to_string())
        .bind(utc_now())
        .bind(staff_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Updates profile fields and the active/blocked flags. The top-tier account
/// is only editable by itself, and never deactivated or blocked.
pub async fn update_profile(
    pool: &SqlitePool,
    staff_id: Uuid,
    patch: StaffUpdateRequest,
    updated_by: Option<Uuid>,
) -> AppResult<Staff> {
    let existing = get(pool, staff_id).await?;

    if existing.role.is_top_tier() {
        let disabling = patch.is_active == Some(false) || patch.is_blocked == Some(true);
        if disabling {
            return Err(AccessError::ProtectedPrincipal { action: "disabled" }.into());
        }
        if updated_by != Some(existing.id) {
            return Err(AccessError::ProtectedPrincipal {
                action: "updated by another account",
            }
            .into());
        }
    }

    let name = match patch.name.as_deref() {
        Some(raw) => validate_name(raw)?,
        None => existing.name.clone(),
    };
    let department = match patch.department {
        Some(value) => trimmed(Some(value)),
        None => existing.department.clone(),
    };
    let phone_number = match patch.phone_number {
        Some(value) => trimmed(Some(value)),
        None => existing.phone_number.clone(),
    };

    sqlx::query(
        r#"
        UPDATE staff SET name = ?, department = ?, phone_number = ?, is_active = ?, is_blocked = ?,
                         updated_by = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&name)
    .bind(department)
    .bind(phone_number)
    .bind(patch.is_active.unwrap_or(existing.is_active))
    .bind(patch.is_blocked.unwrap_or(existing.is_blocked))
    .bind(updated_by.map(|id| id.to_string()))
    .bind(utc_now())
    .bind(staff_id.to_string())
    .execute(pool)
    .await?;

    get(pool, staff_id).await
}

/// A password reset issued for one account. Delivering `token` to its owner
/// is left to the caller.
#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub staff_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues a one-hour reset token for `email` and records it on the account,
/// replacing any earlier one. Unknown emails yield `None` so callers can
/// answer both cases the same way.
pub async fn request_password_reset(pool: &SqlitePool, jwt: &JwtConfig, email: &str) -> AppResult<Option<PasswordReset>> {
    let Some(row) = fetch_row_by_email(pool, email).await? else {
        tracing::debug!("password reset requested for an unknown email");
        return Ok(None);
    };

    let staff_id = parse_uuid(&row.id)?;
    let reset_id = Uuid::new_v4();
    let (token, expires_at) = jwt.encode_password_reset(staff_id, reset_id)?;

    sqlx::query("UPDATE staff SET reset_token_id = ?, reset_token_expires_at = ? WHERE id = ?")
        .bind(reset_id.to_string())
        .bind(expires_at)
        .bind(staff_id.to_string())
        .execute(pool)
        .await?;

    tracing::info!(staff_id = %staff_id, %expires_at, "password reset issued");
    Ok(Some(PasswordReset {
        staff_id,
        token,
        expires_at,
    }))
}

/// Sets a new password from a reset token. The token must be the latest one
/// issued for the account and unexpired; it is cleared on use. Every
/// rejection is the same `Unauthenticated`. Returns the account's id.
pub async fn reset_password(pool: &SqlitePool, jwt: &JwtConfig, token: &str, new_password: &str) -> AppResult<Uuid> {
    let claims = jwt.decode_password_reset(token).map_err(|err| {
        tracing::debug!(error = %err, "rejected password reset token");
        AccessError::Unauthenticated
    })?;
    let reset_id = claims.jti.ok_or(AccessError::Unauthenticated)?;

    let stored: Option<(Option<String>, Option<DateTime<Utc>>)> =
        sqlx::query_as("SELECT reset_token_id, reset_token_expires_at FROM staff WHERE id = ?")
            .bind(claims.sub.to_string())
            .fetch_optional(pool)
            .await?;

    let current = match stored {
        Some((Some(stored_id), Some(expires_at))) => stored_id == reset_id.to_string() && expires_at > utc_now(),
        _ => false,
    };
    if !current {
        return Err(AccessError::Unauthenticated.into());
    }

    let password_hash = hash_password(new_password)?;

    // the reset id in the WHERE clause makes concurrent uses of one token
    // succeed at most once
    let updated = sqlx::query(
        r#"
        UPDATE staff SET password_hash = ?, reset_token_id = NULL, reset_token_expires_at = NULL, updated_at = ?
        WHERE id = ? AND reset_token_id = ?
        "#,
    )
    .bind(password_hash)
    .bind(utc_now())
    .bind(claims.sub.to_string())
    .bind(reset_id.to_string())
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AccessError::Unauthenticated.into());
    }

    tracing::info!(staff_id = %claims.sub, "password reset");
    Ok(claims.sub)
}

/// Hard-deletes an ordinary account. The top-tier account is never deleted.
pub async fn delete(pool: &SqlitePool, staff_id: Uuid) -> AppResult<Staff> {
    let staff = get(pool, staff_id).await?;

    if staff.role.is_top_tier() {
        return Err(AccessError::ProtectedPrincipal { action: "deleted" }.into());
    }

    sqlx::query("DELETE FROM staff WHERE id = ?")
        .bind(staff_id.to_string())
        .execute(pool)
        .await?;

    tracing::info!(staff_id = %staff_id, "staff deleted");
    Ok(staff)
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &StaffListQuery) {
    query.push(" WHERE 1 = 1");
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.to_lowercase());
        query
            .push(" AND (lower(s.name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR s.email LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(role_id) = filter.role_id {
        query.push(" AND s.role_id = ").push_bind(role_id.to_string());
    }
    if let Some(active) = filter.active {
        query.push(" AND s.is_active = ").push_bind(active);
    }
}

/// One page of staff, newest first, with per-role head counts of active
/// accounts.
pub async fn list(pool: &SqlitePool, filter: &StaffListQuery) -> AppResult<StaffPage> {
    let page = filter.page.unwrap_or(1).max(1);
    let limit = filter.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = i64::from(page - 1) * i64::from(limit);

    let mut count_query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(1) FROM staff s LEFT JOIN roles r ON r.id = s.role_id");
    push_filters(&mut count_query, filter);
    let total: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_STAFF);
    push_filters(&mut query, filter);
    query
        .push(" ORDER BY s.created_at DESC LIMIT ")
        .push_bind(i64::from(limit))
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = query.build_query_as::<DbStaff>().fetch_all(pool).await?;
    let mut staff = Vec::with_capacity(rows.len());
    for row in rows {
        staff.push(hydrate(pool, row).await?);
    }

    let role_stats = sqlx::query_as::<_, (String, i64)>(&format!(
        r#"
        SELECT CASE WHEN s.top_tier = 1 THEN '{TOP_TIER_LABEL}' ELSE COALESCE(r.name, 'unassigned') END AS role,
               COUNT(1) AS holders
        FROM staff s
        LEFT JOIN roles r ON r.id = s.role_id
        WHERE s.is_active = 1
        GROUP BY role
        ORDER BY holders DESC, role
        "#
    ))
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(role, count)| RoleCount { role, count })
    .collect();

    let pages = (total + i64::from(limit) - 1) / i64::from(limit);

    Ok(StaffPage {
        staff,
        pagination: Pagination { page, limit, total, pages },
        role_stats,
    })
}

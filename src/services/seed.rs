//! Idempotent bootstrap: default permission catalogue, system roles and the
//! single top-tier account. Safe to run on every startup and concurrently.

use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{permissions, roles, staff};
use crate::db::unique_violation;
use crate::errors::{AccessError, AppError, AppResult};
use crate::models::permission::{PermissionAction, PermissionListQuery, PermissionModule, PermissionRef};
use crate::models::staff::StaffSummary;
use crate::utils::{hash_password, normalize_email, utc_now};

use PermissionAction::*;
use PermissionModule::*;

pub const DEFAULT_PERMISSIONS: &[(PermissionModule, &[PermissionAction])] = &[
    (Dashboard, &[Read, Export]),
    (Users, &[Create, Read, Update, Delete, Export]),
    (Orders, &[Create, Read, Update, Delete, Approve, Reject, Export]),
    (Payments, &[Create, Read, Update, Delete, Approve, Reject, Export]),
    (ForexServices, &[Create, Read, Update, Delete, Manage]),
    (Reports, &[Read, Export, Create]),
    (Settings, &[Read, Update, Manage]),
    (StaffManagement, &[Create, Read, Update, Delete, Manage]),
    (Notifications, &[Create, Read, Update, Delete, Manage]),
    (Analytics, &[Read, Export, Manage]),
];

pub struct DefaultRole {
    pub name: &'static str,
    pub level: i64,
    pub grants: fn(PermissionModule, PermissionAction) -> bool,
}

pub const DEFAULT_ROLES: &[DefaultRole] = &[
    DefaultRole {
        name: "Admin",
        level: 80,
        grants: |_, _| true,
    },
    DefaultRole {
        name: "Manager",
        level: 60,
        grants: |module, action| {
            matches!(action, Read | Export | Approve | Reject)
                || (matches!(action, Create | Update) && matches!(module, Users | Orders | Payments | ForexServices))
        },
    },
    DefaultRole {
        name: "Agent",
        level: 40,
        grants: |module, action| {
            (matches!(module, Orders | ForexServices) && matches!(action, Create | Read | Update))
                || (action == Read && matches!(module, Dashboard | Users | Payments | Notifications))
        },
    },
    DefaultRole {
        name: "Support",
        level: 20,
        grants: |module, action| {
            action == Read && matches!(module, Dashboard | Users | Orders | Payments | Notifications)
        },
    },
];

/// Credentials for the top-tier account created on first run.
#[derive(Debug, Clone)]
pub struct SuperAdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SeedOutcome {
    pub super_admin: StaffSummary,
    /// False when the top-tier account already existed.
    pub created: bool,
    pub permissions_created: u64,
    pub roles_created: u64,
}

fn describe_permission(module: PermissionModule, action: PermissionAction) -> String {
    let verb = match action {
        Read => "View",
        Create => "Create",
        Update => "Update",
        Delete => "Delete",
        Export => "Export",
        Import => "Import",
        Approve => "Approve",
        Reject => "Reject",
        Manage => "Manage",
    };
    format!("{verb} {}", module.as_str().replace('-', " "))
}

async fn seed_permissions(pool: &SqlitePool) -> AppResult<u64> {
    let mut created = 0;

    for (module, actions) in DEFAULT_PERMISSIONS {
        for action in actions.iter() {
            let now = utc_now();
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO permissions (id, name, module, action, description, is_active, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, 1, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(format!("{module}-{action}"))
            .bind(module.as_str())
            .bind(action.as_str())
            .bind(describe_permission(*module, *action))
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;

            created += result.rows_affected();
        }
    }

    Ok(created)
}

async fn seed_roles(pool: &SqlitePool, catalogue: &[PermissionRef]) -> AppResult<u64> {
    let mut created = 0;

    for role in DEFAULT_ROLES {
        if roles::find_by_name(pool, role.name).await?.is_some() {
            continue;
        }

        let perms: Vec<PermissionRef> = catalogue
            .iter()
            .filter(|p| (role.grants)(p.module, p.action))
            .cloned()
            .collect();

        match roles::insert(pool, role.name, &perms, role.level, true, None).await {
            Ok(_) => created += 1,
            Err(AppError::Access(AccessError::DuplicateRole { .. })) => {
                tracing::debug!(role = role.name, "role seeded concurrently");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(created)
}

/// Inserts the top-tier account unless one exists. A unique violation means
/// another seeder won the race; its account is returned instead.
async fn seed_super_admin(pool: &SqlitePool, seed: &SuperAdminSeed, catalogue: &[PermissionRef]) -> AppResult<(StaffSummary, bool)> {
    if let Some(existing) = staff::find_top_tier(pool).await? {
        return Ok((StaffSummary::from(&existing), false));
    }

    let email = staff::validate_email(&seed.email)?;
    let password_hash = hash_password(&seed.password)?;
    let id = Uuid::new_v4();
    let now = utc_now();
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO staff (id, name, email, password_hash, top_tier, role_id, is_active, is_blocked, created_at, updated_at)
        VALUES (?, ?, ?, ?, 1, NULL, 1, 0, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(seed.name.trim())
    .bind(&email)
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await;

    if let Err(err) = inserted {
        if unique_violation(&err).is_none() {
            return Err(err.into());
        }
        drop(tx);
        return match staff::find_top_tier(pool).await? {
            Some(existing) => Ok((StaffSummary::from(&existing), false)),
            None => Err(AccessError::DuplicatePrincipal {
                email: normalize_email(&seed.email),
            }
            .into()),
        };
    }

    staff::write_snapshot(&mut tx, id, catalogue).await?;
    tx.commit().await?;

    let created = staff::get(pool, id).await?;
    Ok((StaffSummary::from(&created), true))
}

pub async fn run(pool: &SqlitePool, seed: &SuperAdminSeed) -> AppResult<SeedOutcome> {
    let permissions_created = seed_permissions(pool).await?;

    let catalogue: Vec<PermissionRef> = permissions::list(pool, &PermissionListQuery::default())
        .await?
        .iter()
        .map(PermissionRef::from)
        .collect();

    let roles_created = seed_roles(pool, &catalogue).await?;
    let (super_admin, created) = seed_super_admin(pool, seed, &catalogue).await?;

    tracing::info!(
        permissions_created,
        roles_created,
        super_admin = %super_admin.email,
        created,
        "bootstrap seed complete"
    );

    Ok(SeedOutcome {
        super_admin,
        created,
        permissions_created,
        roles_created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_has_forty_five_unique_entries() {
        let mut names: Vec<String> = DEFAULT_PERMISSIONS
            .iter()
            .flat_map(|(module, actions)| actions.iter().map(move |action| format!("{module}-{action}")))
            .collect();
        assert_eq!(names.len(), 45);
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 45);
        assert!(names.contains(&"forex-services-manage".to_string()));
    }

    #[test]
    fn default_roles_are_ordered_by_level() {
        let levels: Vec<i64> = DEFAULT_ROLES.iter().map(|r| r.level).collect();
        assert_eq!(levels, vec![80, 60, 40, 20]);
    }

    #[test]
    fn lower_roles_grant_a_subset_of_higher_ones() {
        for (module, actions) in DEFAULT_PERMISSIONS {
            for action in actions.iter() {
                for pair in DEFAULT_ROLES.windows(2) {
                    if (pair[1].grants)(*module, *action) {
                        assert!((pair[0].grants)(*module, *action), "{} grants {module}-{action} but {} does not", pair[1].name, pair[0].name);
                    }
                }
            }
        }
    }

    #[test]
    fn descriptions_read_naturally() {
        assert_eq!(describe_permission(ForexServices, Read), "View forex services");
    }
}

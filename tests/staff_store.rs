mod common;

use anyhow::Result;
use uuid::Uuid;

use remit_access::authz::Principal;
use remit_access::errors::AccessError;
use remit_access::jwt::JwtConfig;
use remit_access::models::role::{RoleCreateRequest, RoleUpdateRequest};
use remit_access::models::staff::{RegisterStaffRequest, RoleLabel, StaffListQuery, StaffUpdateRequest};
use remit_access::services::{roles, staff};

fn names(perms: &[remit_access::models::permission::PermissionRef]) -> Vec<&str> {
    perms.iter().map(|p| p.name.as_str()).collect()
}

#[tokio::test]
async fn assign_role_copies_the_role_permissions() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    common::seed(&pool).await?;
    let role_id = common::role_with(&pool, "Reviewer", &["orders-read", "payments-read"]).await?;
    let member = common::register(&pool, "asha@remit.example", None).await?;
    assert_eq!(member.role, RoleLabel::Unassigned);
    assert!(member.permissions.is_empty());

    let assigned = staff::assign_role(&pool, member.id, role_id, None).await?;

    assert_eq!(assigned.role.role_id(), Some(role_id));
    assert_eq!(assigned.role.display_name(), "Reviewer");
    assert_eq!(names(&assigned.permissions), vec!["orders-read", "payments-read"]);
    Ok(())
}

#[tokio::test]
async fn role_edits_do_not_reach_existing_holders_until_reassigned() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    common::seed(&pool).await?;
    let role_id = common::role_with(&pool, "Reviewer", &["orders-read", "payments-read"]).await?;
    let member = common::register(&pool, "asha@remit.example", Some("Reviewer")).await?;
    assert_eq!(names(&member.permissions), vec!["orders-read", "payments-read"]);

    let only_orders = common::permission_ids(&pool, &["orders-read"]).await?;
    roles::update(
        &pool,
        role_id,
        RoleUpdateRequest {
            permission_ids: Some(only_orders),
            ..Default::default()
        },
        &common::top_tier_actor(),
    )
    .await?;

    let unchanged = staff::get(&pool, member.id).await?;
    assert_eq!(names(&unchanged.permissions), vec!["orders-read", "payments-read"]);

    let refreshed = staff::assign_role(&pool, member.id, role_id, None).await?;
    assert_eq!(names(&refreshed.permissions), vec!["orders-read"]);
    Ok(())
}

#[tokio::test]
async fn inactive_roles_cannot_be_assigned() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    common::seed(&pool).await?;
    let role_id = common::role_with(&pool, "Reviewer", &["orders-read"]).await?;
    roles::update(
        &pool,
        role_id,
        RoleUpdateRequest {
            is_active: Some(false),
            ..Default::default()
        },
        &common::top_tier_actor(),
    )
    .await?;
    let member = common::register(&pool, "asha@remit.example", None).await?;

    let err = staff::assign_role(&pool, member.id, role_id, None).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::InactiveRole { .. })));

    let err = common::register(&pool, "bo@remit.example", Some("Reviewer")).await.unwrap_err();
    assert!(err.to_string().contains("inactive"));
    Ok(())
}

#[tokio::test]
async fn top_tier_account_is_not_reassignable_deletable_or_disableable() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    let outcome = common::seed(&pool).await?;
    let root = outcome.super_admin.id;
    let agent = roles::find_by_name(&pool, "Agent").await?.expect("seeded");

    let err = staff::assign_role(&pool, root, agent.id, None).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::ForbiddenRoleAssignment(_))));

    let err = staff::delete(&pool, root).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::ProtectedPrincipal { .. })));

    for patch in [
        StaffUpdateRequest {
            is_active: Some(false),
            ..Default::default()
        },
        StaffUpdateRequest {
            is_blocked: Some(true),
            ..Default::default()
        },
    ] {
        let err = staff::update_profile(&pool, root, patch, None).await.unwrap_err();
        assert!(matches!(err.access(), Some(AccessError::ProtectedPrincipal { .. })));
    }

    let renamed = staff::update_profile(
        &pool,
        root,
        StaffUpdateRequest {
            name: Some("Head Office".to_string()),
            ..Default::default()
        },
        Some(root),
    )
    .await?;
    assert_eq!(renamed.name, "Head Office");
    assert!(renamed.role.is_top_tier());
    Ok(())
}

#[tokio::test]
async fn only_the_top_tier_account_edits_its_own_profile() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    let root = common::seed(&pool).await?.super_admin.id;
    let admin = common::register(&pool, "admin@remit.example", Some("Admin")).await?;
    let rename = || StaffUpdateRequest {
        name: Some("Taken Over".to_string()),
        department: Some("Elsewhere".to_string()),
        ..Default::default()
    };

    for updated_by in [Some(admin.id), None] {
        let err = staff::update_profile(&pool, root, rename(), updated_by).await.unwrap_err();
        assert_eq!(
            err.access(),
            Some(&AccessError::ProtectedPrincipal {
                action: "updated by another account"
            })
        );
    }
    assert_eq!(staff::get(&pool, root).await?.name, "Root");

    let own = staff::update_profile(&pool, root, rename(), Some(root)).await?;
    assert_eq!(own.department.as_deref(), Some("Elsewhere"));
    Ok(())
}

#[tokio::test]
async fn delegated_role_assignment_is_capped_and_never_self_serving() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    common::seed(&pool).await?;
    common::role_with(&pool, "Desk Lead", &["staff-management-manage", "staff-management-create"]).await?;
    let trainee = roles::create(
        &pool,
        RoleCreateRequest {
            name: "Trainee".to_string(),
            permission_ids: common::permission_ids(&pool, &["orders-read"]).await?,
            level: Some(10),
        },
        None,
    )
    .await?;
    let admin_role = roles::find_by_name(&pool, "Admin").await?.expect("seeded");
    let lead = common::register(&pool, "lead@remit.example", Some("Desk Lead")).await?;
    let member = common::register(&pool, "asha@remit.example", None).await?;
    let actor = Principal::from(&lead);

    let err = staff::assign_role(&pool, lead.id, admin_role.id, Some(&actor)).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::ForbiddenRoleAssignment(_))));
    let err = staff::assign_role(&pool, lead.id, trainee.id, Some(&actor)).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::ForbiddenRoleAssignment(_))));

    let err = staff::assign_role(&pool, member.id, admin_role.id, Some(&actor)).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::ForbiddenRoleAssignment(_))));
    assert_eq!(staff::get(&pool, member.id).await?.role, RoleLabel::Unassigned);

    let assigned = staff::assign_role(&pool, member.id, trainee.id, Some(&actor)).await?;
    assert_eq!(assigned.role.display_name(), "Trainee");
    assert_eq!(assigned.updated_by, Some(lead.id));

    let new_account = |role: &str| RegisterStaffRequest {
        name: "New Hire".to_string(),
        email: format!("{}@remit.example", role.to_lowercase()),
        password: common::STAFF_PASSWORD.to_string(),
        role: Some(role.to_string()),
        department: None,
        phone_number: None,
    };
    let err = staff::register(&pool, new_account("Admin"), Some(&actor)).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::ForbiddenRoleAssignment(_))));
    assert!(staff::find_by_email(&pool, "admin@remit.example").await?.is_none());

    let hired = staff::register(&pool, new_account("Trainee"), Some(&actor)).await?;
    assert_eq!(hired.created_by, Some(lead.id));
    Ok(())
}

#[tokio::test]
async fn assign_permissions_replaces_the_snapshot_and_keeps_the_role() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    let root = common::seed(&pool).await?.super_admin.id;
    let member = common::register(&pool, "asha@remit.example", Some("Support")).await?;
    let ids = common::permission_ids(&pool, &["payments-read", "orders-export"]).await?;

    let updated = staff::assign_permissions(&pool, member.id, &[ids[1], ids[0], ids[1]], None).await?;
    assert_eq!(names(&updated.permissions), vec!["orders-export", "payments-read"]);
    assert_eq!(updated.role.display_name(), "Support");

    let unknown = Uuid::new_v4();
    let err = staff::assign_permissions(&pool, member.id, &[ids[0], unknown], None)
        .await
        .unwrap_err();
    assert_eq!(
        err.access(),
        Some(&AccessError::InvalidPermission {
            ids: vec![unknown.to_string()]
        })
    );
    assert_eq!(names(&staff::get(&pool, member.id).await?.permissions), vec!["orders-export", "payments-read"]);

    let err = staff::assign_permissions(&pool, root, &ids, None).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::ProtectedPrincipal { .. })));
    Ok(())
}

#[tokio::test]
async fn delegated_permission_grants_are_limited_to_held_permissions() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    common::seed(&pool).await?;
    common::role_with(&pool, "Desk Lead", &["staff-management-manage", "orders-read"]).await?;
    let lead = common::register(&pool, "lead@remit.example", Some("Desk Lead")).await?;
    let member = common::register(&pool, "asha@remit.example", None).await?;
    let actor = Principal::from(&lead);
    let ids = common::permission_ids(&pool, &["orders-read", "settings-manage"]).await?;

    let err = staff::assign_permissions(&pool, lead.id, &ids[..1], Some(&actor)).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::ForbiddenRoleAssignment(_))));

    let err = staff::assign_permissions(&pool, member.id, &ids, Some(&actor)).await.unwrap_err();
    match err.access() {
        Some(AccessError::ForbiddenRoleAssignment(reason)) => assert!(reason.contains("settings-manage")),
        other => panic!("expected a forbidden grant, got {other:?}"),
    }

    let granted = staff::assign_permissions(&pool, member.id, &ids[..1], Some(&actor)).await?;
    assert_eq!(names(&granted.permissions), vec!["orders-read"]);
    Ok(())
}

#[tokio::test]
async fn password_reset_tokens_are_single_use_and_latest_only() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    let jwt = JwtConfig::new("test-secret", 1);
    let member = common::register(&pool, "asha@remit.example", None).await?;

    assert!(staff::request_password_reset(&pool, &jwt, "nobody@remit.example").await?.is_none());

    let first = staff::request_password_reset(&pool, &jwt, "ASHA@remit.example")
        .await?
        .expect("account exists");
    assert_eq!(first.staff_id, member.id);
    let second = staff::request_password_reset(&pool, &jwt, "asha@remit.example")
        .await?
        .expect("account exists");

    let err = staff::reset_password(&pool, &jwt, &first.token, "brand-new-pass").await.unwrap_err();
    assert_eq!(err.access(), Some(&AccessError::Unauthenticated));

    let err = staff::reset_password(&pool, &jwt, &second.token, "short").await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::Validation { field: "password", .. })));

    assert_eq!(staff::reset_password(&pool, &jwt, &second.token, "brand-new-pass").await?, member.id);
    assert!(staff::verify_credential(&pool, "asha@remit.example", "brand-new-pass").await?);

    let err = staff::reset_password(&pool, &jwt, &second.token, "another-pass-1").await.unwrap_err();
    assert_eq!(err.access(), Some(&AccessError::Unauthenticated));

    let session = jwt.encode(member.id)?;
    let err = staff::reset_password(&pool, &jwt, &session, "another-pass-1").await.unwrap_err();
    assert_eq!(err.access(), Some(&AccessError::Unauthenticated));
    Ok(())
}

#[tokio::test]
async fn lapsed_reset_is_rejected() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    let jwt = JwtConfig::new("test-secret", 1);
    common::register(&pool, "asha@remit.example", None).await?;
    let reset = staff::request_password_reset(&pool, &jwt, "asha@remit.example")
        .await?
        .expect("account exists");

    sqlx::query("UPDATE staff SET reset_token_expires_at = ? WHERE id = ?")
        .bind(chrono::Utc::now() - chrono::Duration::minutes(1))
        .bind(reset.staff_id.to_string())
        .execute(&pool)
        .await?;

    let err = staff::reset_password(&pool, &jwt, &reset.token, "brand-new-pass").await.unwrap_err();
    assert_eq!(err.access(), Some(&AccessError::Unauthenticated));
    assert!(staff::verify_credential(&pool, "asha@remit.example", common::STAFF_PASSWORD).await?);
    Ok(())
}

#[tokio::test]
async fn registration_validates_email_role_and_password() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    common::seed(&pool).await?;

    let created = common::register(&pool, "  Asha@Remit.Example ", Some("Agent")).await?;
    assert_eq!(created.email, "asha@remit.example");
    assert_eq!(created.role.display_name(), "Agent");
    assert!(!created.permissions.is_empty());

    let err = common::register(&pool, "ASHA@remit.example", None).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::DuplicatePrincipal { .. })));

    let err = common::register(&pool, "root2@remit.example", Some("Super Admin")).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::ForbiddenRoleAssignment(_))));

    let err = common::register(&pool, "ghost@remit.example", Some("Ghost")).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::NotFound { entity: "role", .. })));

    let err = staff::register(
        &pool,
        RegisterStaffRequest {
            name: "Short".to_string(),
            email: "short@remit.example".to_string(),
            password: "short".to_string(),
            role: None,
            department: None,
            phone_number: None,
        },
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::Validation { field: "password", .. })));
    Ok(())
}

#[tokio::test]
async fn authentication_failures_look_the_same() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    common::seed(&pool).await?;
    common::register(&pool, "asha@remit.example", None).await?;

    let wrong_password = staff::authenticate(&pool, "asha@remit.example", "not-the-password")
        .await
        .unwrap_err();
    let unknown_email = staff::authenticate(&pool, "nobody@remit.example", common::STAFF_PASSWORD)
        .await
        .unwrap_err();

    assert_eq!(wrong_password.access(), Some(&AccessError::Unauthenticated));
    assert_eq!(unknown_email.access(), Some(&AccessError::Unauthenticated));
    assert_eq!(wrong_password.to_string(), unknown_email.to_string());

    assert!(!staff::verify_credential(&pool, "nobody@remit.example", common::STAFF_PASSWORD).await?);
    assert!(staff::verify_credential(&pool, "ASHA@remit.example", common::STAFF_PASSWORD).await?);

    let logged_in = staff::authenticate(&pool, "asha@remit.example", common::STAFF_PASSWORD).await?;
    assert!(logged_in.last_login.is_some());
    Ok(())
}

#[tokio::test]
async fn disabled_accounts_cannot_log_in() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    common::seed(&pool).await?;
    let member = common::register(&pool, "asha@remit.example", None).await?;

    staff::update_profile(
        &pool,
        member.id,
        StaffUpdateRequest {
            is_blocked: Some(true),
            ..Default::default()
        },
        None,
    )
    .await?;

    let err = staff::authenticate(&pool, "asha@remit.example", common::STAFF_PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(err.access(), Some(&AccessError::AccountDisabled));

    // a wrong password on a disabled account still reads as bad credentials
    let err = staff::authenticate(&pool, "asha@remit.example", "not-the-password")
        .await
        .unwrap_err();
    assert_eq!(err.access(), Some(&AccessError::Unauthenticated));
    Ok(())
}

#[tokio::test]
async fn change_password_requires_the_current_one() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    let member = common::register(&pool, "asha@remit.example", None).await?;

    let err = staff::change_password(&pool, member.id, "wrong-password", "new-password-1")
        .await
        .unwrap_err();
    assert_eq!(err.access(), Some(&AccessError::Unauthenticated));

    staff::change_password(&pool, member.id, common::STAFF_PASSWORD, "new-password-1").await?;
    assert!(staff::verify_credential(&pool, "asha@remit.example", "new-password-1").await?);
    assert!(!staff::verify_credential(&pool, "asha@remit.example", common::STAFF_PASSWORD).await?);
    Ok(())
}

#[tokio::test]
async fn list_paginates_filters_and_counts_by_role() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    common::seed(&pool).await?;
    for i in 0..3 {
        common::register(&pool, &format!("agent{i}@remit.example"), Some("Agent")).await?;
    }
    let support = common::register(&pool, "help@remit.example", Some("Support")).await?;
    staff::update_profile(
        &pool,
        support.id,
        StaffUpdateRequest {
            is_active: Some(false),
            ..Default::default()
        },
        None,
    )
    .await?;

    let page = staff::list(
        &pool,
        &StaffListQuery {
            page: Some(2),
            limit: Some(2),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(page.pagination.total, 5);
    assert_eq!(page.pagination.pages, 3);
    assert_eq!(page.staff.len(), 2);

    let agent_id = roles::find_by_name(&pool, "Agent").await?.expect("seeded").id;
    let agents = staff::list(
        &pool,
        &StaffListQuery {
            role_id: Some(agent_id),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(agents.pagination.total, 3);

    let searched = staff::list(
        &pool,
        &StaffListQuery {
            search: Some("AGENT1".to_string()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(searched.staff.len(), 1);
    assert_eq!(searched.staff[0].email, "agent1@remit.example");

    let inactive = staff::list(
        &pool,
        &StaffListQuery {
            active: Some(false),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(inactive.staff.len(), 1);

    let counts: Vec<(String, i64)> = page.role_stats.into_iter().map(|c| (c.role, c.count)).collect();
    assert_eq!(counts, vec![("Agent".to_string(), 3), ("super-admin".to_string(), 1)]);
    Ok(())
}

#[tokio::test]
async fn unknown_ids_are_not_found() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    let err = staff::get(&pool, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::NotFound { entity: "staff", .. })));

    let member = common::register(&pool, "asha@remit.example", None).await?;
    let err = staff::assign_role(&pool, member.id, Uuid::new_v4(), None).await.unwrap_err();
    assert!(matches!(err.access(), Some(AccessError::NotFound { entity: "role", .. })));
    Ok(())
}

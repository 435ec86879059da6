#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`
use uuid::Uuid;

use remit_access::authz::Principal;
use remit_access::errors::AppResult;
use remit_access::models::permission::PermissionListQuery;
use remit_access::models::role::RoleCreateRequest;
use remit_access::models::staff::{RegisterStaffRequest, RoleLabel, Staff};
use remit_access::services::seed::{self, SeedOutcome, SuperAdminSeed};
use remit_access::services::{permissions, roles, staff};

pub const ADMIN_EMAIL: &str = "root@remit.example";
pub const ADMIN_PASSWORD: &str = "root-password";
pub const STAFF_PASSWORD: &str = "password123";

/// Fresh migrated database in a temp dir. Keep the `TempDir` alive for the
/// duration of the test.
pub async fn setup_db() -> Result<(TempDir, SqlitePool)> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    Ok((dir, pool))
}

pub fn super_admin_seed() -> SuperAdminSeed {
    SuperAdminSeed {
        name: "Root".to_string(),
        email: ADMIN_EMAIL.to_string(),
        password: ADMIN_PASSWORD.to_string(),
    }
}

pub async fn seed(pool: &SqlitePool) -> Result<SeedOutcome> {
    Ok(seed::run(pool, &super_admin_seed()).await?)
}

pub async fn app(pool: &SqlitePool) -> Result<Router> {
    std::env::set_var("JWT_SECRET", "test-secret");
    Ok(remit_access::create_app(pool.clone()).await?)
}

pub async fn permission_ids(pool: &SqlitePool, names: &[&str]) -> Result<Vec<Uuid>> {
    let all = permissions::list(pool, &PermissionListQuery::default()).await?;
    names
        .iter()
        .map(|name| {
            all.iter()
                .find(|p| p.name == *name)
                .map(|p| p.id)
                .with_context(|| format!("permission {name} not seeded"))
        })
        .collect()
}

/// A top-tier caller for service calls that take an acting principal.
pub fn top_tier_actor() -> Principal {
    Principal::new(Uuid::new_v4()).with_role(RoleLabel::TopTier)
}

/// Creates a role holding `names` and returns its id.
pub async fn role_with(pool: &SqlitePool, role_name: &str, names: &[&str]) -> Result<Uuid> {
    let role = roles::create(
        pool,
        RoleCreateRequest {
            name: role_name.to_string(),
            permission_ids: permission_ids(pool, names).await?,
            level: Some(30),
        },
        None,
    )
    .await?;
    Ok(role.id)
}

pub async fn register(pool: &SqlitePool, email: &str, role: Option<&str>) -> AppResult<Staff> {
    staff::register(
        pool,
        RegisterStaffRequest {
            name: "Test Staff".to_string(),
            email: email.to_string(),
            password: STAFF_PASSWORD.to_string(),
            role: role.map(str::to_string),
            department: None,
            phone_number: None,
        },
        None,
    )
    .await
}

pub async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

pub async fn login(app: &Router, email: &str, password: &str) -> Result<String> {
    let (status, body) = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(serde_json::json!({ "email": email, "password": password })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::OK, "login for {email} failed: {status} {body}");
    body.get("token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("missing token")
}

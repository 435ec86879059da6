mod common;

use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::json;
use sqlx::SqlitePool;

use common::{login, send, ADMIN_EMAIL, ADMIN_PASSWORD};

async fn wait_for_event(pool: &SqlitePool, name: &str) -> Result<(String, String, Option<String>)> {
    for _ in 0..50 {
        let row: Option<(String, String, Option<String>)> =
            sqlx::query_as("SELECT event_name, severity, actor_id FROM activity_log WHERE event_name = ?")
                .bind(name)
                .fetch_optional(pool)
                .await?;
        if let Some(row) = row {
            return Ok(row);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("event {name} was never recorded")
}

#[tokio::test]
async fn rbac_mutations_are_recorded_as_critical() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    let outcome = common::seed(&pool).await?;
    let app = common::app(&pool).await?;
    let root = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await?;

    let (status, role) = send(
        &app,
        "POST",
        "/rbac/roles",
        Some(&root),
        Some(json!({"name": "Reviewer", "permission_ids": [], "level": 10})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let role_id = role["id"].as_str().context("role id")?.to_string();

    let (event, severity, actor) = wait_for_event(&pool, "role.created").await?;
    assert_eq!(event, "role.created");
    assert_eq!(severity, "critical");
    assert_eq!(actor, Some(outcome.super_admin.id.to_string()));

    let (status, _) = send(&app, "DELETE", &format!("/rbac/roles/{role_id}"), Some(&root), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, severity, _) = wait_for_event(&pool, "role.deleted").await?;
    assert_eq!(severity, "critical");

    let (_, severity, _) = wait_for_event(&pool, "staff.login").await?;
    assert_eq!(severity, "noise");
    Ok(())
}

#[tokio::test]
async fn denied_requests_leave_no_trace() -> Result<()> {
    let (_dir, pool) = common::setup_db().await?;
    common::seed(&pool).await?;
    let app = common::app(&pool).await?;

    let (status, _) = send(
        &app,
        "POST",
        "/rbac/roles",
        None,
        Some(json!({"name": "Reviewer", "permission_ids": []})),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM activity_log").fetch_one(&pool).await?;
    assert_eq!(count, 0);
    Ok(())
}

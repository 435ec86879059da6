//! Activity log: handlers publish access-control changes on a broadcast bus
//! and a listener task projects them into the `activity_log` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: ActivityPayload,
}

pub type EventBus = broadcast::Sender<DomainEvent>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<DomainEvent>) {
    broadcast::channel(1024)
}

/// Caller details recorded alongside an activity entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    #[serde(rename = "new")]
    pub current: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    pub severity: Severity,
}

/// Publishes `<entity>.<action>` for `entity`, e.g. "role.deleted".
///
/// Fire and forget: a full or closed bus never fails the request.
pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        context,
        severity: entity.severity_for_action(action),
    };

    let event = DomainEvent {
        id: Uuid::new_v4(),
        name: format!("{}.{}", T::entity_type(), action),
        occurred_at: Utc::now(),
        actor_id,
        subject_id: Some(entity.subject_id()),
        payload,
    };

    if event_bus.send(event).is_err() {
        tracing::debug!("activity bus has no listener");
    }
}

pub fn describe(event_name: &str) -> &'static str {
    match event_name {
        "permission.created" => "Permission created",
        "permission.updated" => "Permission updated",
        "permission.deleted" => "Permission deleted",
        "role.created" => "Role created",
        "role.updated" => "Role updated",
        "role.deleted" => "Role deleted",
        "staff.registered" => "Staff member registered",
        "staff.updated" => "Staff member updated",
        "staff.deleted" => "Staff member deleted",
        "staff.role_assigned" => "Role assigned to staff member",
        "staff.password_changed" => "Staff password changed",
        "staff.password_reset_requested" => "Staff password reset requested",
        "staff.password_reset" => "Staff password reset",
        "staff.permissions_assigned" => "Permissions assigned to staff member",
        "staff.login" => "Staff member logged in",
        _ => "System event",
    }
}

pub async fn record(pool: &SqlitePool, event: &DomainEvent) -> Result<(), sqlx::Error> {
    let properties = serde_json::to_string(event).unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO activity_log (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id.to_string())
    .bind(&event.name)
    .bind(describe(&event.name))
    .bind(event.actor_id.map(|id| id.to_string()))
    .bind(event.subject_id.map(|id| id.to_string()))
    .bind(event.occurred_at)
    .bind(properties)
    .bind(event.payload.severity.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn start_activity_listener(mut rx: broadcast::Receiver<DomainEvent>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(err) = record(&pool, &event).await {
                    tracing::error!(event = %event.name, error = %err, "failed to save activity log");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{PermissionSource, PolicyEvaluator};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, health, permissions, roles, seed, staff};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub policy: Arc<dyn PolicyEvaluator>,
    pub event_bus: EventBus,
}

impl AppState {
    /// Builds the state and spawns the activity listener that drains the
    /// event bus into `activity_log`.
    pub fn new(pool: SqlitePool, jwt: JwtConfig, source: PermissionSource) -> Self {
        let (event_bus, rx) = init_event_bus();
        tokio::spawn(start_activity_listener(rx, pool.clone()));

        Self {
            policy: source.evaluator(pool.clone()),
            pool,
            jwt: Arc::new(jwt),
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let source = PermissionSource::from_env()?;
    tracing::info!(permission_source = ?source, "authorization policy selected");

    Ok(router(AppState::new(pool, jwt_config, source)))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let rbac_routes = Router::new()
        .merge(permissions::routes())
        .merge(roles::routes())
        .merge(staff::routes())
        .merge(seed::routes());

    Router::new()
        .nest("/auth", auth::routes())
        .nest("/rbac", rbac_routes)
        .route("/api/health", get(health::health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

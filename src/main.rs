use remit_access::config::AppConfig;
use remit_access::{app, db, docs, services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let config = AppConfig::from_env()?;
    let pool = db::init(&config.database_url).await?;

    if let Some(seed) = &config.seed {
        let outcome = services::seed::run(&pool, seed).await?;
        if outcome.created {
            tracing::info!(email = %outcome.super_admin.email, "top-tier account created");
        }
    }

    let jwt = remit_access::jwt::JwtConfig::from_env()?;
    let state = app::AppState::new(pool, jwt, config.permission_source);
    tracing::info!(permission_source = ?config.permission_source, "authorization policy selected");

    let openapi = docs::build_openapi(config.port)?;
    let app = app::router(state).merge(docs::swagger_routes(openapi)?);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

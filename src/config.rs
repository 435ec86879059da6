use crate::authz::PermissionSource;
use crate::errors::AppError;
use crate::services::seed::SuperAdminSeed;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SUPER_ADMIN_NAME: &str = "Super Admin";

/// Process configuration read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub permission_source: PermissionSource,
    /// Present when `SEED_ON_STARTUP` is enabled.
    pub seed: Option<SuperAdminSeed>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| AppError::configuration("DATABASE_URL not set"))?;

        let port = match std::env::var("APP_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?,
            Err(_) => DEFAULT_PORT,
        };

        let seed = if parse_flag("SEED_ON_STARTUP", true)? {
            Some(seed_from_env()?)
        } else {
            None
        };

        Ok(Self {
            database_url,
            port,
            permission_source: PermissionSource::from_env()?,
            seed,
        })
    }
}

/// Credentials for the bootstrap top-tier account.
pub fn seed_from_env() -> Result<SuperAdminSeed, AppError> {
    let email = std::env::var("SEED_SUPER_ADMIN_EMAIL")
        .map_err(|_| AppError::configuration("SEED_SUPER_ADMIN_EMAIL not set"))?;
    let password = std::env::var("SEED_SUPER_ADMIN_PASSWORD")
        .map_err(|_| AppError::configuration("SEED_SUPER_ADMIN_PASSWORD not set"))?;
    let name = std::env::var("SEED_SUPER_ADMIN_NAME").unwrap_or_else(|_| DEFAULT_SUPER_ADMIN_NAME.to_string());

    Ok(SuperAdminSeed { name, email, password })
}

fn parse_flag(key: &str, default: bool) -> Result<bool, AppError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(value) => parse_bool(&value).ok_or_else(|| AppError::configuration(format!("{key} must be true or false"))),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

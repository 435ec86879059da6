use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Principal;
use crate::errors::{AccessError, AppError};
use crate::models::staff::Staff;
use crate::services::staff;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;

        Ok(Self::new(secret, exp_hours))
    }

    pub fn new(secret: impl Into<String>, exp_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.into().into_bytes()),
            exp_hours,
        }
    }

    /// Session token for `staff_id`, valid for `exp_hours`.
    pub fn encode(&self, staff_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: staff_id,
            exp: (now + Duration::hours(self.exp_hours)).timestamp() as usize,
            iat: now.timestamp() as usize,
            purpose: TokenPurpose::Session,
            jti: None,
        };

        self.sign(&claims)
    }

    /// One-hour password reset token. `reset_id` is also stored on the staff
    /// record so that only the latest token is accepted, and only once.
    pub fn encode_password_reset(&self, staff_id: Uuid, reset_id: Uuid) -> Result<(String, DateTime<Utc>), AppError> {
        let now = Utc::now();
        let expires_at = now + Duration::minutes(PASSWORD_RESET_TTL_MINUTES);
        let claims = Claims {
            sub: staff_id,
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
            purpose: TokenPurpose::PasswordReset,
            jti: Some(reset_id),
        };

        Ok((self.sign(&claims)?, expires_at))
    }

    /// Decodes a session token. Tokens issued for any other purpose are
    /// rejected.
    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        self.decode_for(token, TokenPurpose::Session)
    }

    pub fn decode_password_reset(&self, token: &str) -> Result<Claims, AppError> {
        self.decode_for(token, TokenPurpose::PasswordReset)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        jsonwebtoken::encode(&Header::default(), claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    fn decode_for(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let claims = jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))?;

        if claims.purpose != purpose {
            return Err(AppError::token(format!("expected a {purpose:?} token, got {:?}", claims.purpose)));
        }
        Ok(claims)
    }
}

pub const PASSWORD_RESET_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    #[default]
    Session,
    PasswordReset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    #[serde(default)]
    pub purpose: TokenPurpose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<Uuid>,
}

/// The staff member behind the bearer token, loaded fresh on every request
/// so flag changes and role re-assignments apply immediately.
///
/// A missing or bad token and a token for a deleted account all reject with
/// the same `Unauthenticated` error.
#[derive(Debug, Clone)]
pub struct CurrentStaff {
    pub staff: Staff,
    pub principal: Principal,
}

impl CurrentStaff {
    pub fn id(&self) -> Uuid {
        self.staff.id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStaff {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AccessError::Unauthenticated)?;

        let claims = state.jwt.decode(token).map_err(|err| {
            tracing::debug!(error = %err, "rejected bearer token");
            AccessError::Unauthenticated
        })?;

        let staff = match staff::get(&state.pool, claims.sub).await {
            Ok(staff) => staff,
            Err(AppError::Access(AccessError::NotFound { .. })) => return Err(AccessError::Unauthenticated.into()),
            Err(err) => return Err(err),
        };

        let principal = Principal::from(&staff);
        Ok(CurrentStaff { staff, principal })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_carries_subject() {
        let jwt = JwtConfig::new("test-secret", 1);
        let id = Uuid::new_v4();
        let claims = jwt.decode(&jwt.encode(id).unwrap()).unwrap();
        assert_eq!(claims.sub, id);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn reset_and_session_tokens_are_not_interchangeable() {
        let jwt = JwtConfig::new("test-secret", 1);
        let (id, reset_id) = (Uuid::new_v4(), Uuid::new_v4());

        let (reset, expires_at) = jwt.encode_password_reset(id, reset_id).unwrap();
        assert!(expires_at > Utc::now() + Duration::minutes(59));
        let claims = jwt.decode_password_reset(&reset).unwrap();
        assert_eq!((claims.sub, claims.jti), (id, Some(reset_id)));
        assert!(matches!(jwt.decode(&reset), Err(AppError::Token(_))));

        let session = jwt.encode(id).unwrap();
        assert!(matches!(jwt.decode_password_reset(&session), Err(AppError::Token(_))));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = JwtConfig::new("one", 1).encode(Uuid::new_v4()).unwrap();
        assert!(matches!(JwtConfig::new("two", 1).decode(&token), Err(AppError::Token(_))));
    }
}

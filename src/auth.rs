use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

const DEV_USER_HEADER: &str = "x-user-id";
const DEV_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Landlord,
    Tenant,
    Maintenance,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landlord => "LANDLORD",
            Self::Tenant => "TENANT",
            Self::Maintenance => "MAINTENANCE",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LANDLORD" => Some(Self::Landlord),
            "TENANT" => Some(Self::Tenant),
            "MAINTENANCE" => Some(Self::Maintenance),
            _ => None,
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    role: String,
}

pub async fn require_identity(state: &AppState, headers: &HeaderMap) -> AppResult<Identity> {
    if let Some(token) = bearer_token(headers) {
        let Some(secret) = state.config.auth_jwt_secret.as_deref() else {
            return Err(AppError::Unauthorized(
                "Unauthorized: token authentication is not configured.".to_string(),
            ));
        };
        return identity_from_token(&token, secret);
    }

    if state.config.auth_dev_overrides_enabled() {
        if let Some(identity) = identity_from_dev_headers(headers)? {
            return Ok(identity);
        }
    }

    Err(AppError::Unauthorized(
        "Unauthorized: missing bearer token.".to_string(),
    ))
}

pub async fn require_role(
    state: &AppState,
    headers: &HeaderMap,
    allowed: &[Role],
) -> AppResult<Identity> {
    let identity = require_identity(state, headers).await?;
    if allowed.contains(&identity.role) {
        return Ok(identity);
    }
    Err(AppError::Forbidden(format!(
        "Forbidden: role '{}' is not allowed for this action.",
        identity.role.as_str()
    )))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let (scheme, token) = raw.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn identity_from_token(token: &str, secret: &str) -> AppResult<Identity> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|error| {
        tracing::debug!(error = %error, "Rejected bearer token");
        match error.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::Unauthorized("Unauthorized: token expired.".to_string())
            }
            _ => AppError::Unauthorized("Unauthorized: invalid token.".to_string()),
        }
    })?
    .claims;

    let id = Uuid::parse_str(claims.sub.trim())
        .map_err(|_| AppError::Unauthorized("Unauthorized: invalid subject.".to_string()))?;
    let role = Role::parse(&claims.role)
        .ok_or_else(|| AppError::Unauthorized("Unauthorized: unknown role.".to_string()))?;
    Ok(Identity { id, role })
}

fn identity_from_dev_headers(headers: &HeaderMap) -> AppResult<Option<Identity>> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    let Some(raw_id) = header(DEV_USER_HEADER) else {
        return Ok(None);
    };
    let id = Uuid::parse_str(raw_id)
        .map_err(|_| AppError::Unauthorized("Unauthorized: invalid x-user-id.".to_string()))?;
    let role = header(DEV_ROLE_HEADER)
        .and_then(Role::parse)
        .ok_or_else(|| AppError::Unauthorized("Unauthorized: invalid x-user-role.".to_string()))?;
    Ok(Some(Identity { id, role }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::http::{HeaderMap, HeaderValue};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use uuid::Uuid;

    use super::{require_identity, require_role, Role};
    use crate::{config::AppConfig, error::AppError, repository::MemoryStore, state::AppState};

    fn state_with(pairs: &[(&str, &str)]) -> AppState {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        let config = AppConfig::from_lookup(|key| vars.get(key).cloned());
        AppState::with_store(config, Arc::new(MemoryStore::new()))
    }

    fn token(secret: &str, sub: &str, role: &str, exp: i64) -> String {
        encode(
            &Header::default(),
            &json!({"sub": sub, "role": role, "exp": exp}),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("token")
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        headers
    }

    #[tokio::test]
    async fn accepts_valid_token() {
        let state = state_with(&[("AUTH_JWT_SECRET", "s3cret")]);
        let user = Uuid::new_v4();
        let exp = chrono::Utc::now().timestamp() + 3600;
        let headers = bearer(&token("s3cret", &user.to_string(), "tenant", exp));

        let identity = require_identity(&state, &headers).await.expect("identity");
        assert_eq!(identity.id, user);
        assert_eq!(identity.role, Role::Tenant);
    }

    #[tokio::test]
    async fn rejects_wrong_secret_and_expired_tokens() {
        let state = state_with(&[("AUTH_JWT_SECRET", "s3cret")]);
        let user = Uuid::new_v4().to_string();
        let future = chrono::Utc::now().timestamp() + 3600;
        let past = chrono::Utc::now().timestamp() - 3600;

        for headers in [
            bearer(&token("other", &user, "TENANT", future)),
            bearer(&token("s3cret", &user, "TENANT", past)),
            bearer(&token("s3cret", &user, "JANITOR", future)),
        ] {
            assert!(matches!(
                require_identity(&state, &headers).await,
                Err(AppError::Unauthorized(_))
            ));
        }
    }

    #[tokio::test]
    async fn dev_headers_only_when_enabled() {
        let user = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_str(&user.to_string()).expect("id"));
        headers.insert("x-user-role", HeaderValue::from_static("LANDLORD"));

        let disabled = state_with(&[]);
        assert!(require_identity(&disabled, &headers).await.is_err());

        let enabled = state_with(&[("DEV_AUTH_OVERRIDES_ENABLED", "true")]);
        let identity = require_identity(&enabled, &headers).await.expect("identity");
        assert_eq!(identity.role, Role::Landlord);

        let production = state_with(&[
            ("DEV_AUTH_OVERRIDES_ENABLED", "true"),
            ("ENVIRONMENT", "production"),
        ]);
        assert!(require_identity(&production, &headers).await.is_err());
    }

    #[tokio::test]
    async fn role_gate_returns_forbidden() {
        let state = state_with(&[("DEV_AUTH_OVERRIDES_ENABLED", "true")]);
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-user-id",
            HeaderValue::from_str(&Uuid::new_v4().to_string()).expect("id"),
        );
        headers.insert("x-user-role", HeaderValue::from_static("TENANT"));
        assert!(matches!(
            require_role(&state, &headers, &[Role::Landlord]).await,
            Err(AppError::Forbidden(_))
        ));
    }
}

//! Token validation and the authenticated-user extractor.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use log::warn;
use std::sync::Arc;

use super::{AuthConfig, AuthError, Claims, Role};

/// Cookie carrying the session token for browser clients.
const TOKEN_COOKIE: &str = "gantry_token";

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::InvalidAuthHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = parts.next().ok_or(AuthError::InvalidAuthHeader)?;
    if token.is_empty() || parts.next().is_some() {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok(token)
}

fn token_from_cookie_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name.trim() == cookie_name {
            Some(value.trim())
        } else {
            None
        }
    })
}

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    config: Arc<AuthConfig>,
    decoding_key: Option<DecodingKey>,
}

impl AuthState {
    pub fn new(config: AuthConfig) -> Self {
        let decoding_key = config
            .jwt_secret
            .as_ref()
            .map(|s| DecodingKey::from_secret(s.as_bytes()));

        Self {
            config: Arc::new(config),
            decoding_key,
        }
    }

    /// Get allowed CORS origins from config.
    pub fn allowed_origins(&self) -> &[String] {
        &self.config.allowed_origins
    }

    /// Validate a token and return its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        if self.config.dev_mode
            && let Some(user_id) = token.strip_prefix("dev:")
        {
            return self.dev_user_claims(user_id);
        }

        let decoding_key = self
            .decoding_key
            .as_ref()
            .ok_or_else(|| AuthError::Internal("no JWT secret configured".to_string()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims.clear();

        let token_data = decode::<Claims>(token, decoding_key, &validation).map_err(|e| {
            warn!("JWT validation failed: {:?}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }

    fn dev_user_claims(&self, user_id: &str) -> Result<Claims, AuthError> {
        let user = self
            .config
            .dev_users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or(AuthError::UserNotFound)?;

        Ok(Claims {
            sub: user.id.clone(),
            exp: chrono::Utc::now().timestamp() + 3600 * 24,
            email: user.email.clone(),
            role: user.role,
        })
    }

    /// Validate the token carried by a request, wherever it is carried.
    fn authenticate(&self, parts: &Parts) -> Result<Claims, AuthError> {
        if let Some(header) = parts.headers.get(AUTHORIZATION) {
            let value = header
                .to_str()
                .map_err(|_| AuthError::InvalidAuthHeader)?;
            return self.validate_token(bearer_token_from_header(value)?);
        }

        for cookie_header in parts.headers.get_all(COOKIE) {
            if let Ok(value) = cookie_header.to_str()
                && let Some(token) = token_from_cookie_header(value, TOKEN_COOKIE)
            {
                return self.validate_token(token);
            }
        }

        Err(AuthError::MissingToken)
    }
}

/// Authenticated user extracted from the request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub claims: Claims,
}

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.claims.sub
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    pub fn is_admin(&self) -> bool {
        self.claims.role == Role::Admin
    }

    /// Identity string used to derive workload names. Prefers the email so
    /// names stay recognizable across identity providers.
    pub fn key(&self) -> &str {
        self.claims.email.as_deref().unwrap_or(&self.claims.sub)
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthState::from_ref(state);
        let claims = auth.authenticate(parts)?;
        Ok(CurrentUser { claims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DevUser;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn dev_state() -> AuthState {
        AuthState::new(AuthConfig {
            dev_mode: true,
            dev_users: vec![
                DevUser {
                    id: "admin".to_string(),
                    email: Some("admin@localhost".to_string()),
                    role: Role::Admin,
                },
                DevUser {
                    id: "user".to_string(),
                    email: None,
                    role: Role::User,
                },
            ],
            jwt_secret: Some("test-secret-for-auth-tests-minimum-32-chars".to_string()),
            allowed_origins: vec![],
        })
    }

    #[test]
    fn bearer_parsing() {
        assert_eq!(bearer_token_from_header("Bearer abc").unwrap(), "abc");
        assert_eq!(bearer_token_from_header("bearer abc").unwrap(), "abc");
        assert!(bearer_token_from_header("Basic abc").is_err());
        assert!(bearer_token_from_header("Bearer").is_err());
        assert!(bearer_token_from_header("Bearer a b").is_err());
    }

    #[test]
    fn cookie_parsing() {
        let header = "other=1; gantry_token=tok-123; theme=dark";
        assert_eq!(token_from_cookie_header(header, TOKEN_COOKIE), Some("tok-123"));
        assert_eq!(token_from_cookie_header("other=1", TOKEN_COOKIE), None);
    }

    #[test]
    fn dev_tokens_resolve_configured_users() {
        let state = dev_state();

        let claims = state.validate_token("dev:admin").unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.role, Role::Admin);

        let claims = state.validate_token("dev:user").unwrap();
        assert_eq!(claims.role, Role::User);

        assert!(matches!(
            state.validate_token("dev:nobody"),
            Err(AuthError::UserNotFound)
        ));
    }

    #[test]
    fn jwt_round_trip() {
        let state = dev_state();
        let claims = Claims {
            sub: "alice".to_string(),
            exp: chrono::Utc::now().timestamp() + 600,
            email: Some("Alice.Admin@example".to_string()),
            role: Role::Admin,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("test-secret-for-auth-tests-minimum-32-chars".as_bytes()),
        )
        .unwrap();

        let validated = state.validate_token(&token).unwrap();
        assert_eq!(validated.sub, "alice");
        assert!(CurrentUser { claims: validated }.is_admin());
    }

    #[test]
    fn user_key_prefers_email() {
        let with_email = CurrentUser {
            claims: Claims {
                sub: "u1".to_string(),
                exp: 0,
                email: Some("a@b".to_string()),
                role: Role::User,
            },
        };
        assert_eq!(with_email.key(), "a@b");

        let without_email = CurrentUser {
            claims: Claims {
                sub: "u1".to_string(),
                exp: 0,
                email: None,
                role: Role::User,
            },
        };
        assert_eq!(without_email.key(), "u1");
    }
}

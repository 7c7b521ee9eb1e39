//! Authentication and authorization.

pub mod jwks;
pub mod policy;

pub use jwks::JwksClient;
pub use policy::{RolePolicy, UserAbility, UserPolicy};

use async_trait::async_trait;
use axum::http::HeaderMap;
use usergate_common::UserId;

/// Authenticated caller extracted from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Subject claim. For tokens issued to local users this is the numeric user id.
    pub sub: String,
    pub email: Option<String>,
    /// Roles and permissions granted by the identity provider.
    pub roles: Vec<String>,
    /// Local user record this caller maps to, filled in after authentication.
    pub local_id: Option<UserId>,
}

impl AuthUser {
    /// Check if the user has the "admin" role.
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == "admin")
    }

    /// Check if the user has a specific role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Local user id, if the caller has been matched to a stored user.
    pub fn user_id(&self) -> Option<UserId> {
        self.local_id
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingHeader,
    #[error("Invalid Authorization header format")]
    InvalidFormat,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("JWKS fetch error: {0}")]
    JwksFetchError(String),
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),
}

/// Resolves the caller of a request from its headers.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat)?;

    auth_header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidFormat)
}

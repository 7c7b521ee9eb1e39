//! Helpers shared by unit and integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::auth::{bearer_token, AuthError, AuthUser, Authenticator};
use crate::config::{
    Config, CorsConfig, DatabaseConfig, LoggingConfig, OidcConfig, PolicyConfig, ServerConfig,
    SettingsConfig,
};
use crate::store::SqliteUserRepository;
use crate::AppState;

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        },
        database: DatabaseConfig {
            url: ":memory:".to_string(),
        },
        oidc: OidcConfig {
            issuer: "https://test-issuer".to_string(),
            audience: Some("test-audience".to_string()),
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        cors: CorsConfig {
            origins: "*".to_string(),
        },
        settings: SettingsConfig::default(),
        policy: PolicyConfig::default(),
        bootstrap: None,
    }
}

/// Authenticator that accepts a fixed set of bearer tokens.
#[derive(Default)]
pub struct StaticAuthenticator {
    users: HashMap<String, AuthUser>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `user`.
    pub fn with_token(mut self, token: &str, user: AuthUser) -> Self {
        self.users.insert(token.to_string(), user);
        self
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let token = bearer_token(headers)?;
        self.users
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::InvalidToken("unknown test token".to_string()))
    }
}

/// Caller as the authenticator sees it, not yet matched to a stored user.
pub fn test_auth_user(sub: &str, email: Option<&str>, roles: Vec<&str>) -> AuthUser {
    AuthUser {
        sub: sub.to_string(),
        email: email.map(String::from),
        roles: roles.iter().map(|s| s.to_string()).collect(),
        local_id: None,
    }
}

/// State backed by an in-memory database. The repository is returned too so
/// tests can seed data directly.
pub fn create_test_state(
    config: Config,
    authenticator: StaticAuthenticator,
) -> Result<(Arc<AppState>, Arc<SqliteUserRepository>), crate::store::StoreError> {
    let repository = Arc::new(SqliteUserRepository::open(&config.database.url)?);
    let state = AppState::new(config, Arc::new(authenticator), repository.clone());
    Ok((Arc::new(state), repository))
}

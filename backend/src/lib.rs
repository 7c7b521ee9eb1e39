pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod routes;
pub mod store;
pub mod test_util;
pub mod users;

pub use auth::{AuthUser, Authenticator, JwksClient, RolePolicy, UserPolicy};
pub use config::Config;
pub use envelope::Envelope;
pub use error::ApiError;
pub use store::{SqliteUserRepository, UserRepository};
pub use users::{EndpointSettings, UserEndpoint, UserValidator};

use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Resolves bearer tokens to callers.
    pub authenticator: Arc<dyn Authenticator>,
    pub users: UserEndpoint,
    pub validator: UserValidator,
}

impl AppState {
    /// Wire the user endpoint with the role policy and settings from `config`.
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        repository: Arc<dyn UserRepository>,
    ) -> Self {
        let policy = Arc::new(RolePolicy::new(config.policy.guest_permissions.clone()));
        let settings = EndpointSettings::from(&config.settings);

        Self {
            users: UserEndpoint::new(repository.clone(), policy, settings),
            validator: UserValidator::new(repository),
            authenticator,
            config,
        }
    }
}

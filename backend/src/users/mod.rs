//! User management: request orchestration and its collaborators.

pub mod endpoint;
pub mod paginate;
pub mod relations;
pub mod validation;

pub use endpoint::UserEndpoint;
pub use paginate::PaginateUsers;
pub use validation::{UserValidator, ValidationErrors, ValidationMode};

use crate::config::SettingsConfig;

/// Deployment switches the endpoint consults, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSettings {
    /// Attach marketplace purchase codes to shown users.
    pub marketplace_integration: bool,
    /// The auth provider issues personal access tokens, so owners can see theirs.
    pub auth_provider_supports_tokens: bool,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self::from(&SettingsConfig::default())
    }
}

impl From<&SettingsConfig> for EndpointSettings {
    fn from(config: &SettingsConfig) -> Self {
        Self {
            marketplace_integration: config.marketplace_integration,
            auth_provider_supports_tokens: config.auth_provider_supports_tokens,
        }
    }
}

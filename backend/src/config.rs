//! Service configuration.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub oidc: OidcConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Admin account ensured at startup
    #[serde(default)]
    pub bootstrap: Option<BootstrapConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite path, optionally prefixed with `sqlite:`. `:memory:` is accepted.
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    pub issuer: String,
    /// Expected `aud` claim. Audience is not validated when unset.
    #[serde(default)]
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated allowed origins, or `*`
    #[serde(default = "default_cors_origins")]
    pub origins: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: default_cors_origins(),
        }
    }
}

/// Deployment-level switches that shape what the user endpoint returns.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    /// Third-party marketplace integration. Adds purchase codes to user records.
    #[serde(default)]
    pub marketplace_integration: bool,
    /// Whether the auth provider issues personal access tokens.
    #[serde(default = "default_true")]
    pub auth_provider_supports_tokens: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            marketplace_integration: false,
            auth_provider_supports_tokens: default_true(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyConfig {
    /// Permissions granted to unauthenticated callers, e.g. `["users.view"]`.
    #[serde(default)]
    pub guest_permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    pub admin_email: String,
    pub admin_password: String,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_database_url() -> String {
    "sqlite:./data/users.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cors_origins() -> String {
    "*".to_string()
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (USERGATE__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("database.url", default_database_url())?
            .set_default("logging.level", default_log_level())?
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("USERGATE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("policy.guest_permissions")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

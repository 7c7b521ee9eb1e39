//! Startup tasks run before the server accepts requests.

use usergate_common::{User, UserAttributes};

use crate::config::BootstrapConfig;
use crate::store::{SqliteUserRepository, StoreError, UserRepository};

/// Make sure the configured admin account exists and carries the admin flag.
///
/// An existing account keeps its password.
pub async fn ensure_admin(
    repository: &SqliteUserRepository,
    config: &BootstrapConfig,
) -> Result<User, StoreError> {
    let user = match repository.find_by_email(&config.admin_email).await? {
        Some(user) => user,
        None => {
            let attributes = UserAttributes {
                email: Some(config.admin_email.clone()),
                password: Some(config.admin_password.clone()),
                ..Default::default()
            };
            let user = repository.create(&attributes).await?;
            tracing::info!(user_id = user.id, "Created bootstrap admin account");
            user
        }
    };

    if !user.is_admin {
        repository.promote_to_admin(user.id)?;
        tracing::info!(user_id = user.id, "Promoted bootstrap account to admin");
    }

    Ok(repository.find(user.id).await?.unwrap_or(user))
}

//! User records and their public presentation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// Stored user record.
///
/// Holds the secret fields, so it is never serialized directly. Use
/// [`redact`] to build the outward-facing [`PublicUser`].
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Argon2 PHC string
    pub password: Option<String>,
    /// Secret API token, hidden unless the viewer owns the record
    pub api_token: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    /// Attached to newly created users that do not specify roles
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialProfile {
    pub id: i64,
    pub user_id: UserId,
    pub service_name: String,
    pub user_service_id: String,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseCode {
    pub id: i64,
    pub user_id: UserId,
    pub code: String,
    pub item_name: String,
    pub item_id: String,
    pub supported_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Personal access token metadata. The token itself is only returned once,
/// when it is issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A user with whichever relations were eager-loaded. `None` means the
/// relation was not requested, as opposed to loaded and empty.
#[derive(Debug, Clone, PartialEq)]
pub struct UserWithRelations {
    pub user: User,
    pub roles: Option<Vec<Role>>,
    pub social_profiles: Option<Vec<SocialProfile>>,
    pub purchase_codes: Option<Vec<PurchaseCode>>,
    pub tokens: Option<Vec<AccessToken>>,
}

impl UserWithRelations {
    pub fn bare(user: User) -> Self {
        Self {
            user,
            roles: None,
            social_profiles: None,
            purchase_codes: None,
            tokens: None,
        }
    }
}

/// Serialized form of a user as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Role>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_profiles: Option<Vec<SocialProfile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_codes: Option<Vec<PurchaseCode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<AccessToken>>,
}

/// Build the public view of a user for `viewer`.
///
/// The password hash is always dropped. The API token is only kept when the
/// viewer is the user being shown.
pub fn redact(record: UserWithRelations, viewer: Option<UserId>) -> PublicUser {
    let UserWithRelations {
        user,
        roles,
        social_profiles,
        purchase_codes,
        tokens,
    } = record;

    let api_token = if viewer == Some(user.id) {
        user.api_token
    } else {
        None
    };

    PublicUser {
        id: user.id,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        is_admin: user.is_admin,
        api_token,
        created_at: user.created_at,
        updated_at: user.updated_at,
        roles,
        social_profiles,
        purchase_codes,
        tokens,
    }
}

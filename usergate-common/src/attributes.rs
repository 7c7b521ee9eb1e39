//! Payload accepted by the create and update endpoints.

use serde::{Deserialize, Serialize};

/// User attributes for create/update requests.
///
/// Every field is optional at the type level; which ones are required
/// depends on the operation and is checked by the backend validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserAttributes {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Role ids to sync. `None` leaves roles untouched on update and
    /// attaches the default roles on create.
    #[serde(default)]
    pub roles: Option<Vec<i64>>,
}

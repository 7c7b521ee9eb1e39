//! Request orchestration for the user resource.
//!
//! [`UserEndpoint`] applies the authorization policy, decides which
//! relations to load and which fields to reveal, and delegates storage to
//! the repository. It holds no per-request state.

use std::collections::HashMap;
use std::sync::Arc;

use usergate_common::{redact, Relation, RelationSet, User, UserAttributes, UserId};

use super::paginate::PaginateUsers;
use super::relations::resolve_relations;
use super::EndpointSettings;
use crate::auth::{AuthUser, UserAbility, UserPolicy};
use crate::envelope::Envelope;
use crate::error::{ApiError, Result};
use crate::store::UserRepository;

pub struct UserEndpoint {
    repository: Arc<dyn UserRepository>,
    policy: Arc<dyn UserPolicy>,
    paginator: PaginateUsers,
    settings: EndpointSettings,
}

impl UserEndpoint {
    pub fn new(
        repository: Arc<dyn UserRepository>,
        policy: Arc<dyn UserPolicy>,
        settings: EndpointSettings,
    ) -> Self {
        Self {
            paginator: PaginateUsers::new(repository.clone()),
            repository,
            policy,
            settings,
        }
    }

    pub fn settings(&self) -> &EndpointSettings {
        &self.settings
    }

    /// Look up the target of a request, `NotFound` if it does not exist.
    pub async fn resolve(&self, id: UserId) -> Result<User> {
        self.repository.find(id).await?.ok_or(ApiError::NotFound)
    }

    /// Match an authenticated caller to a stored user.
    ///
    /// The identity provider subject is looked up first. Failing that, the
    /// `email` claim matches a user not yet linked to any subject, and the
    /// subject is recorded on that user.
    pub async fn identify(&self, mut caller: AuthUser) -> Result<AuthUser> {
        let mut user = self.repository.find_by_subject(&caller.sub).await?;

        if user.is_none() {
            if let Some(email) = caller.email.as_deref() {
                if let Some(found) = self.repository.find_by_email(email).await? {
                    if self.repository.link_subject(found.id, &caller.sub).await? {
                        tracing::info!(user_id = found.id, "Linked identity provider subject");
                        user = Some(found);
                    }
                }
            }
        }

        caller.local_id = user.map(|u| u.id);
        Ok(caller)
    }

    pub async fn list(
        &self,
        requester: Option<&AuthUser>,
        params: &HashMap<String, String>,
    ) -> Result<Envelope> {
        self.policy.authorize(requester, &UserAbility::Index)?;

        let pagination = self.paginator.execute(params).await?;

        Ok(Envelope::success().with("pagination", pagination))
    }

    /// Show a single user. `with` is the raw comma-separated relation list.
    pub async fn get(
        &self,
        requester: Option<&AuthUser>,
        user: User,
        with: Option<&str>,
    ) -> Result<Envelope> {
        let viewer = requester.and_then(AuthUser::user_id);
        let relations = resolve_relations(with, &self.settings, viewer == Some(user.id));

        // Authorize before touching storage; a denied request loads nothing.
        self.policy.authorize(requester, &UserAbility::Show(user.id))?;

        let relations = relations.map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let record = self.repository.load_relations(user, &relations).await?;

        Ok(Envelope::success().with("user", redact(record, viewer)))
    }

    pub async fn create(
        &self,
        requester: Option<&AuthUser>,
        attributes: &UserAttributes,
    ) -> Result<Envelope> {
        self.policy.authorize(requester, &UserAbility::Store)?;

        let user = self.repository.create(attributes).await?;
        tracing::info!(
            user_id = user.id,
            created_by = requester.map(|r| r.sub.as_str()).unwrap_or("guest"),
            "User created"
        );

        let record = self.repository.load_relations(user, &roles_only()).await?;
        Ok(Envelope::success().with("user", redact(record, None)).created())
    }

    pub async fn update(
        &self,
        requester: Option<&AuthUser>,
        user: User,
        attributes: &UserAttributes,
    ) -> Result<Envelope> {
        self.policy.authorize(requester, &UserAbility::Update(user.id))?;

        let user = self.repository.update(&user, attributes).await?;
        tracing::info!(user_id = user.id, "User updated");

        let record = self.repository.load_relations(user, &roles_only()).await?;
        Ok(Envelope::success().with("user", redact(record, None)))
    }

    /// Delete every user in the comma-separated `ids`.
    ///
    /// The whole batch is refused if it contains the requester or an admin;
    /// the first offending user (in id order) names the error.
    pub async fn delete(&self, requester: Option<&AuthUser>, ids: &str) -> Result<Envelope> {
        let ids = parse_id_list(ids)?;
        self.policy
            .authorize(requester, &UserAbility::Destroy(ids.clone()))?;

        let users = self.repository.find_many(&ids).await?;
        let requester_id = requester.and_then(AuthUser::user_id);

        for user in &users {
            if requester_id == Some(user.id) {
                tracing::warn!(user_id = user.id, "Refused to delete the requesting user");
                return Err(ApiError::GuardViolation(format!(
                    "Could not delete currently logged in user: {}",
                    user.email
                )));
            }

            if user.is_admin {
                tracing::warn!(user_id = user.id, "Refused to delete an admin user");
                return Err(ApiError::GuardViolation(format!(
                    "Could not delete admin user: {}",
                    user.email
                )));
            }
        }

        let found: Vec<UserId> = users.iter().map(|u| u.id).collect();
        let deleted = self.repository.delete_multiple(&found).await?;
        tracing::info!(requested = ids.len(), deleted, "Users deleted");

        Ok(Envelope::success())
    }
}

fn roles_only() -> RelationSet {
    [Relation::Roles].into_iter().collect()
}

/// Parse a comma-separated id list, skipping empty entries.
pub fn parse_id_list(raw: &str) -> Result<Vec<UserId>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<UserId>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid user id: {}", s)))
        })
        .collect::<Result<Vec<_>>>()?;

    if ids.is_empty() {
        return Err(ApiError::BadRequest("No user ids given".to_string()));
    }
    Ok(ids)
}

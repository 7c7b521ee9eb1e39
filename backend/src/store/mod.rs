//! User persistence.
//!
//! The [`UserRepository`] trait is the seam between the request handlers and
//! storage. [`SqliteUserRepository`] is the production implementation.

mod sqlite;

pub use sqlite::SqliteUserRepository;

use async_trait::async_trait;
use usergate_common::{Page, RelationSet, User, UserAttributes, UserId, UserWithRelations};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Email already taken: {0}")]
    DuplicateEmail(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Sortable user columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    Id,
    Email,
    FirstName,
    LastName,
    CreatedAt,
    #[default]
    UpdatedAt,
}

impl OrderBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "id" => Some(OrderBy::Id),
            "email" => Some(OrderBy::Email),
            "first_name" => Some(OrderBy::FirstName),
            "last_name" => Some(OrderBy::LastName),
            "created_at" => Some(OrderBy::CreatedAt),
            "updated_at" => Some(OrderBy::UpdatedAt),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            OrderBy::Id => "id",
            OrderBy::Email => "email",
            OrderBy::FirstName => "first_name",
            OrderBy::LastName => "last_name",
            OrderBy::CreatedAt => "created_at",
            OrderBy::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDir {
    Asc,
    #[default]
    Desc,
}

impl OrderDir {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(OrderDir::Asc),
            "desc" => Some(OrderDir::Desc),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
        }
    }
}

/// Filter, sort and page parameters for listing users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    /// Substring matched against email, first and last name
    pub search: Option<String>,
    pub role_id: Option<i64>,
    pub role_name: Option<String>,
    pub order_by: OrderBy,
    pub order_dir: OrderDir,
    pub page: u32,
    pub per_page: u32,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            search: None,
            role_id: None,
            role_name: None,
            order_by: OrderBy::default(),
            order_dir: OrderDir::default(),
            page: 1,
            per_page: 15,
        }
    }
}

/// Storage operations the user endpoints rely on.
///
/// Each call is atomic on its own; callers never get a transaction spanning
/// several calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// User linked to the identity provider subject `subject`.
    async fn find_by_subject(&self, subject: &str) -> Result<Option<User>, StoreError>;

    /// Record `subject` on a user that has none yet. Returns false when the
    /// user is already linked (or does not exist).
    async fn link_subject(&self, id: UserId, subject: &str) -> Result<bool, StoreError>;

    /// Users whose id is in `ids`, ordered by id. Missing ids are skipped.
    async fn find_many(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError>;

    async fn load_relations(
        &self,
        user: User,
        relations: &RelationSet,
    ) -> Result<UserWithRelations, StoreError>;

    /// One page of users with their roles loaded.
    async fn paginate(&self, query: &UserQuery) -> Result<Page<UserWithRelations>, StoreError>;

    async fn create(&self, attributes: &UserAttributes) -> Result<User, StoreError>;

    async fn update(&self, user: &User, attributes: &UserAttributes) -> Result<User, StoreError>;

    /// Delete the given users and everything attached to them. Returns the
    /// number of users removed.
    async fn delete_multiple(&self, ids: &[UserId]) -> Result<usize, StoreError>;
}

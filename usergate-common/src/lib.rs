//! usergate common types
//!
//! Shared types used by the backend service and its clients.

pub mod attributes;
pub mod pagination;
pub mod relation;
pub mod user;

pub use attributes::UserAttributes;
pub use pagination::Page;
pub use relation::{Relation, RelationSet, UnknownRelation};
pub use user::{
    redact, AccessToken, PublicUser, PurchaseCode, Role, SocialProfile, User, UserId,
    UserWithRelations,
};

//! Relation types for user records.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named related entity-sets that can be attached to a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Roles assigned to the user
    Roles,
    /// Linked social login accounts
    SocialProfiles,
    /// Marketplace purchase codes
    PurchaseCodes,
    /// Personal access tokens
    Tokens,
}

impl Relation {
    /// All relation variants for iteration.
    pub const ALL: [Relation; 4] = [
        Relation::Roles,
        Relation::SocialProfiles,
        Relation::PurchaseCodes,
        Relation::Tokens,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Roles => "roles",
            Relation::SocialProfiles => "social_profiles",
            Relation::PurchaseCodes => "purchase_codes",
            Relation::Tokens => "tokens",
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown relation: {0}")]
pub struct UnknownRelation(pub String);

impl FromStr for Relation {
    type Err = UnknownRelation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Relation::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRelation(s.to_string()))
    }
}

/// Insertion-ordered set of relations to eager-load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationSet(Vec<Relation>);

impl RelationSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a relation, keeping the position of its first insertion.
    pub fn insert(&mut self, relation: Relation) -> bool {
        if self.contains(relation) {
            return false;
        }
        self.0.push(relation);
        true
    }

    pub fn contains(&self, relation: Relation) -> bool {
        self.0.contains(&relation)
    }

    pub fn iter(&self) -> impl Iterator<Item = Relation> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Relation> for RelationSet {
    fn from_iter<I: IntoIterator<Item = Relation>>(iter: I) -> Self {
        let mut set = RelationSet::new();
        for relation in iter {
            set.insert(relation);
        }
        set
    }
}

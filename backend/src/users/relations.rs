//! Which relations to eager-load when showing a user.

use usergate_common::{Relation, RelationSet, UnknownRelation};

use super::EndpointSettings;

/// Relations every shown user carries.
pub const ALWAYS_LOADED: [Relation; 2] = [Relation::Roles, Relation::SocialProfiles];

/// Build the relation set for a show request.
///
/// `with` is the raw comma-separated query parameter; every relation it
/// names is loaded, except purchase codes, which follow the marketplace
/// setting regardless of what was requested. Tokens are added without being
/// asked for when the owner views their own record and the auth provider
/// issues tokens.
pub fn resolve_relations(
    with: Option<&str>,
    settings: &EndpointSettings,
    viewer_is_owner: bool,
) -> Result<RelationSet, UnknownRelation> {
    let mut relations: RelationSet = ALWAYS_LOADED.into_iter().collect();

    for relation in parse_with(with.unwrap_or_default())? {
        if relation != Relation::PurchaseCodes {
            relations.insert(relation);
        }
    }

    if settings.marketplace_integration {
        relations.insert(Relation::PurchaseCodes);
    }
    if viewer_is_owner && settings.auth_provider_supports_tokens {
        relations.insert(Relation::Tokens);
    }

    Ok(relations)
}

/// Parse a comma-separated relation list, skipping empty entries.
pub fn parse_with(raw: &str) -> Result<Vec<Relation>, UnknownRelation> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::parse)
        .collect()
}

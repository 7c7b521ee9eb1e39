//! Listing users: query parameter parsing and pagination.

use std::collections::HashMap;
use std::sync::Arc;

use usergate_common::{redact, Page, PublicUser};

use crate::store::{OrderBy, OrderDir, StoreError, UserQuery, UserRepository};

pub const DEFAULT_PER_PAGE: u32 = 15;
pub const MAX_PER_PAGE: u32 = 100;

/// Turns raw list query parameters into a page of public users.
pub struct PaginateUsers {
    repository: Arc<dyn UserRepository>,
}

impl PaginateUsers {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }

    pub async fn execute(&self, params: &HashMap<String, String>) -> Result<Page<PublicUser>, StoreError> {
        let query = query_from_params(params);
        let page = self.repository.paginate(&query).await?;

        // Listed users are never shown with their API token.
        Ok(page.map(|record| redact(record, None)))
    }
}

/// Build a [`UserQuery`] from query parameters. Values that do not parse
/// fall back to their defaults.
pub fn query_from_params(params: &HashMap<String, String>) -> UserQuery {
    let text = |key: &str| {
        params
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(String::from)
    };
    let number = |key: &str| params.get(key).and_then(|v| v.trim().parse::<i64>().ok());

    UserQuery {
        search: text("query"),
        role_id: number("role_id"),
        role_name: text("role_name"),
        order_by: params
            .get("order_by")
            .and_then(|v| OrderBy::parse(v))
            .unwrap_or_default(),
        order_dir: params
            .get("order_dir")
            .and_then(|v| OrderDir::parse(v))
            .unwrap_or_default(),
        page: number("page")
            .filter(|p| *p >= 1)
            .map(|p| p.min(u32::MAX as i64) as u32)
            .unwrap_or(1),
        per_page: number("per_page")
            .filter(|p| *p >= 1)
            .map(|p| p.min(MAX_PER_PAGE as i64) as u32)
            .unwrap_or(DEFAULT_PER_PAGE),
    }
}

//! User management routes.
//!
//! - `GET /users` list users (paginated)
//! - `GET /users/:id` show a user, anonymous callers allowed
//! - `POST /users` create a user
//! - `PUT|PATCH /users/:id` update a user
//! - `DELETE /users/:ids` delete one or more users (comma-separated ids)

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use usergate_common::{UserAttributes, UserId};

use crate::auth::AuthUser;
use crate::envelope::Envelope;
use crate::error::{ApiError, Result};
use crate::users::ValidationMode;
use crate::AppState;

/// Middleware that requires a valid bearer token. The caller, matched to its
/// stored user, is put in the request extensions for the handler.
async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let caller = match state.authenticator.authenticate(request.headers()).await {
        Ok(caller) => caller,
        Err(e) => {
            tracing::debug!("Rejected unauthenticated request: {}", e);
            return ApiError::Unauthenticated.into_response();
        }
    };

    match state.users.identify(caller).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ShowQuery {
    /// Comma-separated relation names
    pub with: Option<String>,
}

async fn index(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Envelope> {
    state.users.list(Some(&user), &params).await
}

async fn show(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<ShowQuery>,
) -> Result<Envelope> {
    // A missing or invalid token makes the caller a guest.
    let requester = match state.authenticator.authenticate(&headers).await {
        Ok(caller) => Some(state.users.identify(caller).await?),
        Err(_) => None,
    };

    let user = state.users.resolve(parse_user_id(&id)?).await?;
    state
        .users
        .get(requester.as_ref(), user, query.with.as_deref())
        .await
}

async fn store(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: std::result::Result<Json<UserAttributes>, JsonRejection>,
) -> Result<Envelope> {
    let Json(attributes) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    state
        .validator
        .validate(&attributes, ValidationMode::Create)
        .await?;
    state.users.create(Some(&user), &attributes).await
}

async fn update(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<UserAttributes>, JsonRejection>,
) -> Result<Envelope> {
    let target = state.users.resolve(parse_user_id(&id)?).await?;
    let Json(attributes) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    state
        .validator
        .validate(&attributes, ValidationMode::Update(target.id))
        .await?;
    state.users.update(Some(&user), target, &attributes).await
}

async fn destroy(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(ids): Path<String>,
) -> Result<Envelope> {
    state.users.delete(Some(&user), &ids).await
}

/// Non-numeric ids cannot name a stored user.
fn parse_user_id(raw: &str) -> Result<UserId> {
    raw.trim().parse().map_err(|_| ApiError::NotFound)
}

pub fn router(state: Arc<AppState>) -> Router {
    let auth = middleware::from_fn_with_state(state.clone(), require_auth);

    Router::new()
        .route(
            "/users",
            get(index).post(store).route_layer(auth.clone()),
        )
        .route(
            "/users/:id",
            get(show).merge(
                put(update)
                    .patch(update)
                    .delete(destroy)
                    .route_layer(auth),
            ),
        )
        .with_state(state)
}

//! HTTP routing.

pub mod health;
pub mod users;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::CorsConfig;
use crate::logging::request_logger;
use crate::AppState;

/// Build the full application router.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .merge(health::router())
        .merge(users::router(state))
        .layer(middleware::from_fn(request_logger))
        .layer(cors)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.origins.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

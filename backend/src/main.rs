use std::sync::Arc;

use tokio::net::TcpListener;

use usergate_backend::bootstrap::ensure_admin;
use usergate_backend::{logging, routes, AppState, Config, JwksClient, SqliteUserRepository};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    logging::init(&config.logging.level);

    tracing::info!("Starting usergate");

    // Initialize components
    let jwks_client =
        JwksClient::new(&config.oidc.issuer, config.oidc.audience.as_deref()).await?;
    let repository = Arc::new(SqliteUserRepository::open(&config.database.url)?);

    if let Some(bootstrap) = &config.bootstrap {
        let admin = ensure_admin(&repository, bootstrap).await?;
        tracing::info!("Admin account ready: {}", admin.email);
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, Arc::new(jwks_client), repository));
    let app = routes::app(state);

    // Start server
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

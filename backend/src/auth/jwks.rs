use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{bearer_token, AuthError, AuthUser, Authenticator};

/// JWKS key set response.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    #[allow(dead_code)]
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

/// JWT claims.
#[derive(Debug, Deserialize, Serialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    aud: serde_json::Value,
    exp: u64,
    iat: u64,
}

#[derive(Debug, Deserialize)]
struct OidcDiscovery {
    jwks_uri: String,
}

/// Client for fetching and caching the issuer's JWKS keys.
pub struct JwksClient {
    http_client: Client,
    jwks_uri: String,
    keys: Arc<RwLock<HashMap<String, DecodingKey>>>,
    issuer: String,
    audience: Option<String>,
}

impl JwksClient {
    pub async fn new(issuer: &str, audience: Option<&str>) -> Result<Self, AuthError> {
        let http_client = Client::new();

        // Fetch OIDC configuration to get JWKS URI
        let config_url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        let discovery: OidcDiscovery = http_client
            .get(&config_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        let client = Self {
            http_client,
            jwks_uri: discovery.jwks_uri,
            keys: Arc::new(RwLock::new(HashMap::new())),
            issuer: issuer.to_string(),
            audience: audience.map(String::from),
        };

        client.refresh_keys().await?;

        Ok(client)
    }

    async fn refresh_keys(&self) -> Result<(), AuthError> {
        tracing::info!("Fetching JWKS from {}", self.jwks_uri);

        let response: JwksResponse = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        let mut keys = self.keys.write().await;
        keys.clear();

        for jwk in response.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            if let (Some(n), Some(e)) = (&jwk.n, &jwk.e) {
                match DecodingKey::from_rsa_components(n, e) {
                    Ok(key) => {
                        keys.insert(jwk.kid.clone(), key);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse RSA key {}: {}", jwk.kid, e);
                    }
                }
            }
        }

        tracing::info!("Loaded {} JWKS keys", keys.len());
        Ok(())
    }

    /// Validate a raw JWT and return the user it was issued to.
    pub async fn validate_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("Missing kid in token header".to_string()))?;

        let keys = self.keys.read().await;
        let key = keys
            .get(&kid)
            .ok_or_else(|| AuthError::KeyNotFound(kid.clone()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<Claims>(token, key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(AuthUser {
            sub: token_data.claims.sub,
            email: token_data.claims.email,
            roles: token_data.claims.roles,
            local_id: None,
        })
    }
}

#[async_trait]
impl Authenticator for JwksClient {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let token = bearer_token(headers)?;
        self.validate_token(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_issuer() -> MockServer {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jwks_uri": format!("{}/.well-known/jwks.json", server.uri()),
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [
                    {"kid": "ec-key", "kty": "EC", "alg": "ES256"}
                ]
            })))
            .mount(&server)
            .await;

        server
    }

    #[tokio::test]
    async fn test_discovery_and_key_fetch() {
        let server = mock_issuer().await;
        let client = JwksClient::new(&server.uri(), None).await.unwrap();
        assert!(client.jwks_uri.ends_with("/.well-known/jwks.json"));
        assert!(client.keys.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_discovery_failure() {
        let server = MockServer::start().await;
        let result = JwksClient::new(&server.uri(), None).await;
        assert!(matches!(result, Err(AuthError::JwksFetchError(_))));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_garbage_token() {
        let server = mock_issuer().await;
        let client = JwksClient::new(&server.uri(), Some("usergate")).await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer not-a-jwt".parse().unwrap());

        let result = client.authenticate(&headers).await;
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn test_authenticate_requires_header() {
        let server = mock_issuer().await;
        let client = JwksClient::new(&server.uri(), None).await.unwrap();

        let result = client.authenticate(&HeaderMap::new()).await;
        assert!(matches!(result, Err(AuthError::MissingHeader)));
    }
}

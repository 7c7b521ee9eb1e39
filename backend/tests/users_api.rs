use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::Router;
use http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use usergate_backend::auth::policy::{DELETE_USERS, VIEW_USERS};
use usergate_backend::routes;
use usergate_backend::store::SqliteUserRepository;
use usergate_backend::test_util::{create_test_state, test_auth_user, test_config, StaticAuthenticator};
use usergate_backend::Config;
use usergate_backend::UserRepository;
use usergate_common::UserAttributes;

const ADMIN: &str = "admin-token";
const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";
const MANAGER: &str = "manager-token";
/// Alice as an external identity provider sees her: opaque subject, email claim.
const ALICE_OIDC: &str = "alice-oidc-token";

/// Users seeded in id order: 1 admin, 2 alice, 3 bob.
async fn setup(config: Config) -> (Router, Arc<SqliteUserRepository>) {
    let authenticator = StaticAuthenticator::new()
        .with_token(ADMIN, test_auth_user("1", Some("admin@example.com"), vec!["admin"]))
        .with_token(ALICE, test_auth_user("2", Some("alice@example.com"), vec![]))
        .with_token(BOB, test_auth_user("3", Some("bob@example.com"), vec![]))
        .with_token(
            ALICE_OIDC,
            test_auth_user(
                "f1e2d3c4-b5a6-4789-9abc-def012345678",
                Some("alice@example.com"),
                vec![DELETE_USERS],
            ),
        )
        .with_token(
            MANAGER,
            test_auth_user("42", None, vec![VIEW_USERS, DELETE_USERS]),
        );

    let (state, repository) = create_test_state(config, authenticator).unwrap();

    for email in ["admin@example.com", "alice@example.com", "bob@example.com"] {
        repository
            .create(&UserAttributes {
                email: Some(email.to_string()),
                password: Some("secret".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
    }
    repository.promote_to_admin(1).unwrap();

    (routes::app(state), repository)
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(&app, request(Method::GET, "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _) = setup(test_config()).await;

    for (method, uri) in [
        (Method::GET, "/users"),
        (Method::PUT, "/users/2"),
        (Method::PATCH, "/users/2"),
        (Method::DELETE, "/users/2"),
    ] {
        let (status, body) = send(&app, request(method, uri, None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"status": "error", "message": "Unauthenticated."}));
    }
}

#[tokio::test]
async fn test_auth_checked_before_body() {
    let (app, _) = setup(test_config()).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        request_with_raw_body(Method::POST, "/users", Some("unknown"), "{not json"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

fn request_with_raw_body(method: Method, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(
        &app,
        request_with_raw_body(Method::POST, "/users", Some(ADMIN), "{not json"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_list_users() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(
        &app,
        request(Method::GET, "/users?order_by=id&order_dir=asc&per_page=2", Some(MANAGER), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let pagination = &body["pagination"];
    assert_eq!(pagination["total"], 3);
    assert_eq!(pagination["per_page"], 2);
    assert_eq!(pagination["last_page"], 2);
    assert_eq!(pagination["from"], 1);
    assert_eq!(pagination["to"], 2);

    let data = pagination["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["email"], "admin@example.com");
    assert!(data[0].get("api_token").is_none());
    assert!(data[0].get("password").is_none());
    assert!(data[0]["roles"].is_array());
}

#[tokio::test]
async fn test_list_search() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(
        &app,
        request(Method::GET, "/users?query=alice", Some(ADMIN), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = body["pagination"]["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["email"], "alice@example.com");
}

#[tokio::test]
async fn test_list_forbidden_without_permission() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(&app, request(Method::GET, "/users", Some(ALICE), None)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "This action is unauthorized.");
}

#[tokio::test]
async fn test_show_self_reveals_token() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(&app, request(Method::GET, "/users/2", Some(ALICE), None)).await;

    assert_eq!(status, StatusCode::OK);
    let user = &body["user"];
    assert_eq!(user["email"], "alice@example.com");
    assert_eq!(user["api_token"].as_str().map(str::len), Some(40));
    assert!(user["roles"].is_array());
    assert!(user["social_profiles"].is_array());
    assert!(user["tokens"].is_array());
}

#[tokio::test]
async fn test_show_other_hides_api_token() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(
        &app,
        request(Method::GET, "/users/2?with=tokens", Some(MANAGER), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["user"].get("api_token").is_none());
    assert!(body["user"]["tokens"].is_array());
}

#[tokio::test]
async fn test_show_guest() {
    let (app, _) = setup(test_config()).await;
    let (status, _) = send(&app, request(Method::GET, "/users/2", None, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut config = test_config();
    config.policy.guest_permissions = vec![VIEW_USERS.to_string()];
    let (app, _) = setup(config).await;

    // An unrecognised token is treated like no token at all.
    let (status, body) = send(&app, request(Method::GET, "/users/2", Some("stale"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["user"].get("api_token").is_none());
}

#[tokio::test]
async fn test_show_missing_user() {
    let (app, _) = setup(test_config()).await;

    let (status, body) = send(&app, request(Method::GET, "/users/99", Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");

    let (status, _) = send(&app, request(Method::GET, "/users/abc", Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_show_unknown_relation() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(
        &app,
        request(Method::GET, "/users/2?with=roles,permissions", Some(ALICE), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Unknown relation: permissions");
}

#[tokio::test]
async fn test_show_purchase_codes_with_marketplace() {
    let mut config = test_config();
    config.settings.marketplace_integration = true;
    let (app, repository) = setup(config).await;
    repository
        .attach_purchase_code(2, "abc-123", "Theme", "8812", None)
        .unwrap();

    let (status, body) = send(&app, request(Method::GET, "/users/2", Some(ALICE), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["purchase_codes"][0]["code"], "abc-123");
}

#[tokio::test]
async fn test_create_user() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/users",
            Some(ADMIN),
            Some(json!({
                "email": "carol@example.com",
                "password": "secret",
                "first_name": "Carol"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["user"]["email"], "carol@example.com");
    assert_eq!(body["user"]["first_name"], "Carol");
    assert_eq!(body["user"]["roles"][0]["name"], "users");
    assert!(body["user"].get("api_token").is_none());
    assert!(body["user"].get("password").is_none());
}

#[tokio::test]
async fn test_create_validation() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/users",
            Some(ADMIN),
            Some(json!({"email": "alice@example.com"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "The given data was invalid.");
    assert_eq!(body["errors"]["email"][0], "The email has already been taken.");
    assert_eq!(body["errors"]["password"][0], "The password field is required.");
}

#[tokio::test]
async fn test_create_forbidden() {
    let (app, _) = setup(test_config()).await;
    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/users",
            Some(ALICE),
            Some(json!({"email": "dave@example.com", "password": "secret"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_update_self() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(
        &app,
        request(
            Method::PATCH,
            "/users/2",
            Some(ALICE),
            Some(json!({"last_name": "Liddell"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["last_name"], "Liddell");
    assert_eq!(body["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn test_update_other_forbidden() {
    let (app, _) = setup(test_config()).await;
    let (status, _) = send(
        &app,
        request(
            Method::PUT,
            "/users/3",
            Some(ALICE),
            Some(json!({"first_name": "Robert"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_update_missing_user() {
    let (app, _) = setup(test_config()).await;
    let (status, _) = send(
        &app,
        request(Method::PUT, "/users/99", Some(ADMIN), Some(json!({"first_name": "Nobody"}))),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_guards() {
    let (app, repository) = setup(test_config()).await;

    let (status, body) = send(&app, request(Method::DELETE, "/users/2", Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["message"],
        "Could not delete currently logged in user: alice@example.com"
    );

    let (status, body) = send(
        &app,
        request(Method::DELETE, "/users/3,1", Some(MANAGER), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "Could not delete admin user: admin@example.com");

    // Nothing was removed by the refused batch.
    assert!(repository.find(3).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_self_with_opaque_subject() {
    let (app, repository) = setup(test_config()).await;

    let (status, body) = send(
        &app,
        request(Method::DELETE, "/users/2", Some(ALICE_OIDC), None),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["message"],
        "Could not delete currently logged in user: alice@example.com"
    );
    assert!(repository.find(2).await.unwrap().is_some());
}

#[tokio::test]
async fn test_show_self_with_opaque_subject() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(
        &app,
        request(Method::GET, "/users/2", Some(ALICE_OIDC), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["user"]["api_token"].is_string());
}

#[tokio::test]
async fn test_delete_users() {
    let (app, _) = setup(test_config()).await;

    let (status, body) = send(
        &app,
        request(Method::DELETE, "/users/2,3", Some(MANAGER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let (status, _) = send(&app, request(Method::GET, "/users/2", Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_invalid_ids() {
    let (app, _) = setup(test_config()).await;
    let (status, body) = send(
        &app,
        request(Method::DELETE, "/users/2,abc", Some(ADMIN), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid user id: abc");
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let (app, _) = setup(test_config()).await;
    let response = app
        .oneshot(request(Method::GET, "/health", None, None))
        .await
        .unwrap();

    assert!(response.headers().contains_key("x-request-id"));
}

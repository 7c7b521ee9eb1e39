//! Uniform success/error response wrapper.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

/// Successful API response: `{"status": "success", <key>: <payload>, ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub status: StatusCode,
    pub data: Map<String, Value>,
}

impl Envelope {
    /// Empty success with status 200.
    pub fn success() -> Self {
        Self {
            status: StatusCode::OK,
            data: Map::new(),
        }
    }

    /// Attach a payload under `key`. A payload that fails to serialize is
    /// logged and stored as `null`.
    pub fn with(mut self, key: &str, payload: impl Serialize) -> Self {
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response payload {}: {}", key, e);
                Value::Null
            }
        };
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn created(mut self) -> Self {
        self.status = StatusCode::CREATED;
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("status".to_string(), Value::from("success"));
        for (key, value) in &self.data {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}

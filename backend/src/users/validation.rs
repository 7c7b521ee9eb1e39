//! Request validation for create and update payloads.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use usergate_common::{UserAttributes, UserId};

use crate::error::ApiError;
use crate::store::UserRepository;

/// Field name to messages, rendered under `errors` in the error envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Create,
    /// Updating the given user; their own email does not count as taken.
    Update(UserId),
}

/// Validates user payloads before they reach the endpoint.
pub struct UserValidator {
    repository: Arc<dyn UserRepository>,
}

impl UserValidator {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }

    pub async fn validate(&self, attributes: &UserAttributes, mode: ValidationMode) -> Result<(), ApiError> {
        let mut errors = check_fields(attributes, mode);

        if errors.get("email").is_none() {
            if let Some(email) = attributes.email.as_deref() {
                let taken = match self.repository.find_by_email(email).await? {
                    Some(existing) => mode != ValidationMode::Update(existing.id),
                    None => false,
                };
                if taken {
                    errors.add("email", "The email has already been taken.");
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::ValidationFailed(errors))
        }
    }
}

/// Checks that need no storage access.
pub fn check_fields(attributes: &UserAttributes, mode: ValidationMode) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    let creating = mode == ValidationMode::Create;

    match attributes.email.as_deref() {
        None if creating => errors.add("email", "The email field is required."),
        None => {}
        Some(email) => {
            check_length(&mut errors, "email", email, 3, 255);
            if !looks_like_email(email) {
                errors.add("email", "The email must be a valid email address.");
            }
        }
    }

    match attributes.password.as_deref() {
        None if creating => errors.add("password", "The password field is required."),
        None => {}
        Some(password) => check_length(&mut errors, "password", password, 3, 255),
    }

    if let Some(first_name) = attributes.first_name.as_deref() {
        check_length(&mut errors, "first_name", first_name, 2, 255);
    }
    if let Some(last_name) = attributes.last_name.as_deref() {
        check_length(&mut errors, "last_name", last_name, 2, 255);
    }

    errors
}

fn check_length(errors: &mut ValidationErrors, field: &str, value: &str, min: usize, max: usize) {
    let label = field.replace('_', " ");
    let len = value.chars().count();
    if len < min {
        errors.add(field, format!("The {} must be at least {} characters.", label, min));
    } else if len > max {
        errors.add(field, format!("The {} may not be greater than {} characters.", label, max));
    }
}

fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

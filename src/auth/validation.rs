//! Request Validation
//! Mission: Reject requests with missing required fields before they reach the service

use crate::auth::{
    error::ValidationError,
    models::{LoginRequest, RefreshTokenRequest, RegisterRequest, ValidateTokenRequest},
};

/// A request that can list its required fields as (name, value) pairs
pub trait Validatable {
    fn required_fields(&self) -> Vec<(&'static str, &str)>;
}

/// Fails on the first required field that is empty or whitespace
pub fn validate_required<R: Validatable + ?Sized>(request: &R) -> Result<(), ValidationError> {
    for (field, value) in request.required_fields() {
        if value.trim().is_empty() {
            return Err(ValidationError { field });
        }
    }
    Ok(())
}

impl Validatable for RegisterRequest {
    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![("Password", self.password.as_str()), ("Email", self.email.as_str())]
    }
}

impl Validatable for LoginRequest {
    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![("Password", self.password.as_str()), ("Email", self.email.as_str())]
    }
}

impl Validatable for ValidateTokenRequest {
    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![("Token", self.token.as_str())]
    }
}

impl Validatable for RefreshTokenRequest {
    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![("Token", self.token.as_str())]
    }
}

//! Authentication Models
//! Mission: Define account, user and token data structures

use serde::{Deserialize, Serialize};

/// Login credentials for a user. One account per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub created_at: String,
    pub updated_at: String,
}

/// Named permission group, many-to-many with users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

/// Postal address attached to a user
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub landline: Option<String>,
    pub mobile: Option<String>,
}

/// User profile, joined with its account and roles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub business_id: Option<i64>,
    pub account: Account,
    pub roles: Vec<Role>,
    pub address: Option<Address>,
    pub created_at: String,
}

impl User {
    /// Role names in the order the store returned them
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }
}

/// Insert payload for a user together with its account
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: Option<String>,
    pub business_id: Option<i64>,
    pub email: String,
    pub password_hash: String,
    pub roles: Vec<String>,
}

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: i64,
    pub account_id: i64,
    pub email: String,
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<i64>,
    pub iss: String,
    pub exp: i64, // expiration timestamp (seconds)
}

impl Claims {
    pub fn for_user(user: &User, issuer: &str, exp: i64) -> Self {
        Self {
            user_id: user.id,
            account_id: user.account.id,
            email: user.account.email.clone(),
            roles: user.role_names(),
            business_id: user.business_id,
            iss: issuer.to_string(),
            exp,
        }
    }
}

/// Access token plus refresh token handed to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

/// Outcome of an auth operation, mapped to wire codes by the transport
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Created,
    Conflict,
    Forbidden,
    NotFound,
    BadRequest,
    InternalError,
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Ok => "ok",
            Status::Created => "created",
            Status::Conflict => "conflict",
            Status::Forbidden => "forbidden",
            Status::NotFound => "not_found",
            Status::BadRequest => "bad_request",
            Status::InternalError => "internal_error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Ok | Status::Created)
    }
}

/// Register request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Login request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Validate request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidateTokenRequest {
    pub token: String,
}

/// Refresh request body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RefreshTokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RegisterResponse {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Returned by both login and refresh
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub status: Status,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResponse {
    pub fn issued(status: Status, pair: TokenPair) -> Self {
        Self {
            status,
            token: pair.token,
            refresh_token: pair.refresh_token,
            error: None,
        }
    }

    pub fn failed(status: Status, error: impl Into<String>) -> Self {
        Self {
            status,
            token: String::new(),
            refresh_token: String::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenResponse {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

//! Authentication Errors
//! Mission: Typed failures for every layer, collapsed to a closed status set at the edge

use crate::auth::models::Status;
use thiserror::Error;

/// Key material could not be read or parsed. Fatal at startup.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read key material '{id}': {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid key material '{id}': {reason}")]
    Format { id: String, reason: String },
}

/// Password hashing failures
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("stored password hash is malformed")]
    HashFormat,

    #[error("failed to hash password: {0}")]
    Hashing(#[source] bcrypt::BcryptError),
}

/// Opaque token rejection. The reason is logged, never returned.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("token has expired or is invalid")]
pub struct TokenError;

/// Minting a token failed (clock overflow or signer failure)
#[derive(Debug, Error)]
#[error("failed to sign token: {0}")]
pub struct SigningError(pub String);

/// Account/user store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    ConstraintViolation,

    #[error("stored row is inconsistent: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Missing required request field
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{field}: Field is required")]
pub struct ValidationError {
    pub field: &'static str,
}

/// Orchestrator-level failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("e-mail already exists")]
    Conflict,

    #[error("user not found")]
    NotFound,

    #[error("invalid email or password")]
    AuthFailed,

    #[error("invalid claim attributes")]
    ClaimsRejected,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            // A lost check-then-insert race surfaces here
            StoreError::ConstraintViolation => AuthError::Conflict,
            other => AuthError::Store(other),
        }
    }
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::Conflict => Status::Conflict,
            AuthError::NotFound => Status::NotFound,
            AuthError::AuthFailed | AuthError::ClaimsRejected => Status::Forbidden,
            AuthError::Token(_) | AuthError::Invalid(_) => Status::BadRequest,
            AuthError::Password(_) | AuthError::Signing(_) | AuthError::Store(_) => {
                Status::InternalError
            }
        }
    }

    /// Caller-visible message. Internal detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Password(_) | AuthError::Signing(_) | AuthError::Store(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

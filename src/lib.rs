//! Auth Service Library
//!
//! Credential lifecycle for the auth service: password hashing, ES256 token
//! minting and verification, and the register/login/validate/refresh flow.
//! Exposed for the server binary and integration tests.

pub mod auth;
pub mod config;

pub use auth::{CredentialService, JwtHandler, KeyPair, SqliteUserStore};
pub use config::AuthConfig;

//! Authentication Module
//! Mission: Issue, verify and refresh ES256 credentials for accounts in the user store

pub mod api;
pub mod error;
pub mod jwt;
pub mod keys;
pub mod models;
pub mod password;
pub mod service;
pub mod user_store;
pub mod validation;

pub use api::AuthState;
pub use error::{AuthError, KeyError, TokenError};
pub use jwt::JwtHandler;
pub use keys::{FileKeySource, KeyPair, KeySource};
pub use password::PasswordHasher;
pub use service::{CredentialService, ValidationMode};
pub use user_store::{SqliteUserStore, UserStore};

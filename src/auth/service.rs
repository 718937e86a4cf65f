//! Credential Service
//! Mission: Register, login, validate and refresh on top of the store, hasher and JWT handler

use crate::auth::{
    error::AuthError,
    jwt::JwtHandler,
    models::{
        LoginRequest, LoginResponse, NewUser, RefreshTokenRequest, RegisterRequest,
        RegisterResponse, Status, TokenPair, ValidateTokenRequest, ValidateTokenResponse,
    },
    password::PasswordHasher,
    user_store::UserStore,
    validation::validate_required,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// How much `validate_token` trusts the signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Re-fetch the account on every call; deleted accounts stop validating
    #[default]
    Store,
    /// Signature and expiry only; saves a store round-trip
    SignatureOnly,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "store" => Ok(ValidationMode::Store),
            "signature" | "signature_only" => Ok(ValidationMode::SignatureOnly),
            other => Err(format!("unknown validation mode: {}", other)),
        }
    }
}

/// Stateless per request; safe to share across threads
pub struct CredentialService {
    store: Arc<dyn UserStore>,
    jwt: JwtHandler,
    hasher: PasswordHasher,
    validation_mode: ValidationMode,
}

impl CredentialService {
    pub fn new(store: Arc<dyn UserStore>, jwt: JwtHandler, hasher: PasswordHasher) -> Self {
        Self {
            store,
            jwt,
            hasher,
            validation_mode: ValidationMode::default(),
        }
    }

    pub fn with_validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    #[instrument(name = "register", skip_all, fields(email = %req.email))]
    pub fn register(&self, req: &RegisterRequest) -> RegisterResponse {
        match self.try_register(req) {
            Ok(()) => RegisterResponse {
                status: Status::Created,
                error: None,
            },
            Err(e) => {
                log_rejection("register", &e);
                RegisterResponse {
                    status: e.status(),
                    error: Some(e.public_message()),
                }
            }
        }
    }

    #[instrument(name = "login", skip_all, fields(email = %req.email))]
    pub fn login(&self, req: &LoginRequest) -> LoginResponse {
        match self.try_login(req) {
            Ok(pair) => LoginResponse::issued(Status::Ok, pair),
            Err(e) => {
                log_rejection("login", &e);
                LoginResponse::failed(e.status(), e.public_message())
            }
        }
    }

    #[instrument(name = "validate_token", skip_all)]
    pub fn validate_token(&self, req: &ValidateTokenRequest) -> ValidateTokenResponse {
        match self.try_validate(req) {
            Ok(user_id) => ValidateTokenResponse {
                status: Status::Ok,
                user_id: Some(user_id),
                error: None,
            },
            Err(e) => {
                log_rejection("validate_token", &e);
                ValidateTokenResponse {
                    status: e.status(),
                    user_id: None,
                    error: Some(e.public_message()),
                }
            }
        }
    }

    #[instrument(name = "refresh_token", skip_all)]
    pub fn refresh_token(&self, req: &RefreshTokenRequest) -> LoginResponse {
        match self.try_refresh(req) {
            Ok(pair) => LoginResponse::issued(Status::Ok, pair),
            Err(e) => {
                log_rejection("refresh_token", &e);
                LoginResponse::failed(e.status(), e.public_message())
            }
        }
    }

    fn try_register(&self, req: &RegisterRequest) -> Result<(), AuthError> {
        validate_required(req)?;

        if self.store.find_account_by_email(&req.email)?.is_some() {
            return Err(AuthError::Conflict);
        }

        let password_hash = self.hasher.hash(&req.password)?;

        // A concurrent register can still win between the check and the insert;
        // the store's unique constraint turns that into Conflict as well.
        let user = self.store.create_user_with_account(NewUser {
            email: req.email.clone(),
            password_hash,
            ..NewUser::default()
        })?;

        info!(user_id = user.id, "✅ Registered new account");
        Ok(())
    }

    fn try_login(&self, req: &LoginRequest) -> Result<TokenPair, AuthError> {
        validate_required(req)?;

        let Some(user) = self
            .store
            .find_user_by_email_with_roles_and_account(&req.email)?
        else {
            self.hasher.verify_dummy(&req.password);
            info!("❌ Login rejected: no account for email");
            return Err(AuthError::AuthFailed);
        };

        if !self
            .hasher
            .verify(&req.password, &user.account.password_hash)?
        {
            warn!(user_id = user.id, "❌ Login rejected: wrong password");
            return Err(AuthError::AuthFailed);
        }

        let pair = self.jwt.generate_token_pair(&user, None)?;

        info!(
            user_id = user.id,
            roles = ?user.role_names(),
            "✅ Login successful"
        );
        Ok(pair)
    }

    fn try_validate(&self, req: &ValidateTokenRequest) -> Result<i64, AuthError> {
        validate_required(req)?;

        let claims = self.jwt.verify(&req.token)?;

        match self.validation_mode {
            ValidationMode::SignatureOnly => Ok(claims.user_id),
            ValidationMode::Store => {
                let account = self
                    .store
                    .find_account_by_id(claims.account_id)?
                    .ok_or(AuthError::NotFound)?;
                Ok(account.user_id)
            }
        }
    }

    fn try_refresh(&self, req: &RefreshTokenRequest) -> Result<TokenPair, AuthError> {
        validate_required(req)?;

        let claims = self.jwt.verify(&req.token)?;

        // By id, not email: the email may have changed since issuance
        let user = self
            .store
            .find_user_by_id_with_account(claims.user_id)?
            .ok_or(AuthError::ClaimsRejected)?;

        let pair = self.jwt.generate_token_pair(&user, Some(req.token.clone()))?;

        info!(user_id = user.id, "🔁 Access token refreshed");
        Ok(pair)
    }
}

fn log_rejection(operation: &str, err: &AuthError) {
    match err.status() {
        Status::InternalError => error!(operation, error = %err, "🚨 Request failed"),
        status => info!(operation, status = status.as_str(), "Request rejected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        error::StoreError,
        jwt::TokenKind,
        keys::fixtures::es256_key_pair,
        models::{Account, User},
        user_store::SqliteUserStore,
    };
    use tempfile::NamedTempFile;

    struct TestEnv {
        service: CredentialService,
        store: Arc<SqliteUserStore>,
        jwt: JwtHandler,
        _temp: NamedTempFile,
    }

    fn create_test_env() -> TestEnv {
        let temp = NamedTempFile::new().unwrap();
        let store = Arc::new(SqliteUserStore::new(temp.path().to_str().unwrap()).unwrap());
        let jwt = JwtHandler::new(Arc::new(es256_key_pair()), "auth-service-test", 15, 24);
        let service = CredentialService::new(store.clone(), jwt.clone(), PasswordHasher::new(4));
        TestEnv {
            service,
            store,
            jwt,
            _temp: temp,
        }
    }

    fn register(env: &TestEnv, email: &str, password: &str) -> RegisterResponse {
        env.service.register(&RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
    }

    fn login(env: &TestEnv, email: &str, password: &str) -> LoginResponse {
        env.service.login(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
    }

    /// Loses every check-then-insert race
    struct RacingStore;

    impl UserStore for RacingStore {
        fn find_account_by_email(&self, _email: &str) -> Result<Option<Account>, StoreError> {
            Ok(None)
        }
        fn find_user_by_email_with_roles_and_account(
            &self,
            _email: &str,
        ) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        fn find_user_by_id_with_account(&self, _id: i64) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        fn find_account_by_id(&self, _id: i64) -> Result<Option<Account>, StoreError> {
            Ok(None)
        }
        fn create_user_with_account(&self, _user: NewUser) -> Result<User, StoreError> {
            Err(StoreError::ConstraintViolation)
        }
        fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_register_then_conflict() {
        let env = create_test_env();

        assert_eq!(register(&env, "a@x.com", "pw1").status, Status::Created);

        let second = register(&env, "a@x.com", "pw2");
        assert_eq!(second.status, Status::Conflict);
        assert!(second.error.is_some());

        // The original password still works; the second one never landed
        assert_eq!(login(&env, "a@x.com", "pw1").status, Status::Ok);
        assert_eq!(login(&env, "a@x.com", "pw2").status, Status::Forbidden);
    }

    #[test]
    fn test_lost_insert_race_is_conflict() {
        let jwt = JwtHandler::new(Arc::new(es256_key_pair()), "auth-service-test", 15, 24);
        let service = CredentialService::new(Arc::new(RacingStore), jwt, PasswordHasher::new(4));

        let response = service.register(&RegisterRequest {
            email: "a@x.com".to_string(),
            password: "pw1".to_string(),
        });
        assert_eq!(response.status, Status::Conflict);
    }

    #[test]
    fn test_register_requires_fields() {
        let env = create_test_env();
        let response = register(&env, "", "pw1");

        assert_eq!(response.status, Status::BadRequest);
        assert_eq!(response.error.as_deref(), Some("Email: Field is required"));
    }

    #[test]
    fn test_login_issues_distinct_tokens() {
        let env = create_test_env();
        register(&env, "a@x.com", "pw1");

        let response = login(&env, "a@x.com", "pw1");
        assert_eq!(response.status, Status::Ok);
        assert!(!response.token.is_empty());
        assert!(!response.refresh_token.is_empty());
        assert_ne!(response.token, response.refresh_token);
        assert!(response.error.is_none());
    }

    #[test]
    fn test_unknown_email_and_wrong_password_look_the_same() {
        let env = create_test_env();
        register(&env, "a@x.com", "pw1");

        let wrong_password = login(&env, "a@x.com", "wrong");
        let unknown_email = login(&env, "nobody@x.com", "pw1");

        assert_eq!(wrong_password.status, Status::Forbidden);
        assert_eq!(wrong_password, unknown_email);
        assert!(wrong_password.token.is_empty());
        assert!(wrong_password.refresh_token.is_empty());
    }

    #[test]
    fn test_malformed_stored_hash_is_internal_error() {
        let env = create_test_env();
        env.store
            .create_user_with_account(NewUser {
                email: "broken@x.com".to_string(),
                password_hash: "not-a-bcrypt-hash".to_string(),
                ..NewUser::default()
            })
            .unwrap();

        let response = login(&env, "broken@x.com", "pw1");
        assert_eq!(response.status, Status::InternalError);
        assert_eq!(response.error.as_deref(), Some("internal server error"));
    }

    #[test]
    fn test_validate_returns_user_id() {
        let env = create_test_env();
        register(&env, "a@x.com", "pw1");
        let token = login(&env, "a@x.com", "pw1").token;

        let expected = env
            .store
            .find_account_by_email("a@x.com")
            .unwrap()
            .unwrap()
            .user_id;

        let response = env.service.validate_token(&ValidateTokenRequest { token });
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.user_id, Some(expected));
    }

    #[test]
    fn test_validate_rejects_garbage() {
        let env = create_test_env();
        let response = env.service.validate_token(&ValidateTokenRequest {
            token: "not.a.token".to_string(),
        });

        assert_eq!(response.status, Status::BadRequest);
        assert_eq!(response.user_id, None);
        assert_eq!(
            response.error.as_deref(),
            Some("token has expired or is invalid")
        );
    }

    #[test]
    fn test_validate_after_account_deletion() {
        let env = create_test_env();
        register(&env, "a@x.com", "pw1");
        let token = login(&env, "a@x.com", "pw1").token;
        let user_id = env
            .store
            .find_account_by_email("a@x.com")
            .unwrap()
            .unwrap()
            .user_id;

        env.store.soft_delete_user(user_id).unwrap();

        let response = env.service.validate_token(&ValidateTokenRequest {
            token: token.clone(),
        });
        assert_eq!(response.status, Status::NotFound);

        // Signature-only mode trusts the token until it expires
        let trusting = CredentialService::new(env.store.clone(), env.jwt.clone(), PasswordHasher::new(4))
            .with_validation_mode(ValidationMode::SignatureOnly);
        let response = trusting.validate_token(&ValidateTokenRequest { token });
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.user_id, Some(user_id));
    }

    #[test]
    fn test_refresh_keeps_refresh_token() {
        let env = create_test_env();
        register(&env, "a@x.com", "pw1");
        let first = login(&env, "a@x.com", "pw1");

        let refreshed = env.service.refresh_token(&RefreshTokenRequest {
            token: first.refresh_token.clone(),
        });

        assert_eq!(refreshed.status, Status::Ok);
        assert_eq!(refreshed.refresh_token, first.refresh_token);
        assert_ne!(refreshed.token, first.token);
        assert!(env.jwt.verify(&refreshed.token).is_ok());
    }

    #[test]
    fn test_refresh_picks_up_role_changes() {
        let env = create_test_env();
        register(&env, "a@x.com", "pw1");
        let first = login(&env, "a@x.com", "pw1");
        let claims = env.jwt.verify(&first.token).unwrap();
        assert!(claims.roles.is_empty());

        env.store.assign_role(claims.user_id, "admin").unwrap();

        let refreshed = env.service.refresh_token(&RefreshTokenRequest {
            token: first.refresh_token,
        });
        let claims = env.jwt.verify(&refreshed.token).unwrap();
        assert_eq!(claims.roles, vec!["admin"]);
    }

    #[test]
    fn test_refresh_for_deleted_user_is_forbidden() {
        let env = create_test_env();
        register(&env, "a@x.com", "pw1");
        let first = login(&env, "a@x.com", "pw1");
        let user_id = env.jwt.verify(&first.refresh_token).unwrap().user_id;

        env.store.soft_delete_user(user_id).unwrap();

        let response = env.service.refresh_token(&RefreshTokenRequest {
            token: first.refresh_token,
        });
        assert_eq!(response.status, Status::Forbidden);
        assert!(response.token.is_empty());
    }

    #[test]
    fn test_refresh_rejects_expired_token() {
        let env = create_test_env();
        register(&env, "a@x.com", "pw1");
        let user = env
            .store
            .find_user_by_email_with_roles_and_account("a@x.com")
            .unwrap()
            .unwrap();

        let past = chrono::Utc::now() - chrono::Duration::days(2);
        let stale = env.jwt.mint_at(&user, TokenKind::Refresh, past).unwrap();

        let response = env.service.refresh_token(&RefreshTokenRequest { token: stale });
        assert_eq!(response.status, Status::BadRequest);
    }

    #[test]
    fn test_validation_mode_parsing() {
        assert_eq!("store".parse::<ValidationMode>(), Ok(ValidationMode::Store));
        assert_eq!(
            "SIGNATURE".parse::<ValidationMode>(),
            Ok(ValidationMode::SignatureOnly)
        );
        assert!("sometimes".parse::<ValidationMode>().is_err());
    }
}

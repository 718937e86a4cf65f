//! JWT Token Handler
//! Mission: Mint and verify ES256 tokens bound to user claims

use crate::auth::{
    error::{SigningError, TokenError},
    keys::KeyPair,
    models::{Claims, TokenPair, User},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, errors::ErrorKind, Algorithm, Header, Validation};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The only algorithm this service signs with or accepts
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::ES256;

/// Selects the TTL a minted token gets. Not recorded in the token itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT handler for token operations
#[derive(Clone)]
pub struct JwtHandler {
    keys: Arc<KeyPair>,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl JwtHandler {
    /// Create a handler. Access TTL is in minutes, refresh TTL in hours.
    pub fn new(
        keys: Arc<KeyPair>,
        issuer: impl Into<String>,
        access_ttl_minutes: u32,
        refresh_ttl_hours: u32,
    ) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        // exp is compared against the caller's clock in verify_at, with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            keys,
            issuer,
            access_ttl: Duration::minutes(i64::from(access_ttl_minutes)),
            refresh_ttl: Duration::hours(i64::from(refresh_ttl_hours)),
            validation,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Mint a token of the given kind for a user, expiring per policy
    pub fn mint(&self, user: &User, kind: TokenKind) -> Result<String, SigningError> {
        self.mint_at(user, kind, Utc::now())
    }

    pub fn mint_at(
        &self,
        user: &User,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, SigningError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let expiration = now
            .checked_add_signed(ttl)
            .ok_or_else(|| SigningError("invalid expiration timestamp".to_string()))?;

        debug!(
            user_id = user.id,
            kind = ?kind,
            expires_at = %expiration.to_rfc3339(),
            "generating token"
        );

        let claims = Claims::for_user(user, &self.issuer, expiration.timestamp());
        self.sign(&claims)
    }

    /// Sign claims exactly as given
    pub fn sign(&self, claims: &Claims) -> Result<String, SigningError> {
        encode(
            &Header::new(SIGNING_ALGORITHM),
            claims,
            self.keys.encoding_key(),
        )
        .map_err(|e| SigningError(e.to_string()))
    }

    /// Fresh access token always; refresh token carried forward when one is given,
    /// minted only on first issuance.
    pub fn generate_token_pair(
        &self,
        user: &User,
        original_refresh_token: Option<String>,
    ) -> Result<TokenPair, SigningError> {
        let token = self.mint(user, TokenKind::Access)?;

        let refresh_token = match original_refresh_token {
            Some(existing) => existing,
            None => {
                info!(user_id = user.id, "🔁 Issuing new refresh token");
                self.mint(user, TokenKind::Refresh)?
            }
        };

        Ok(TokenPair {
            token,
            refresh_token,
        })
    }

    /// Validate a token and extract claims
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Validate against an explicit unix time. Valid only while `now < exp`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(|e| {
            debug!(reason = ?e.kind(), "token rejected: unreadable header");
            TokenError
        })?;

        if header.alg != SIGNING_ALGORITHM {
            warn!(alg = ?header.alg, "⚠️ token rejected: unexpected signing algorithm");
            return Err(TokenError);
        }

        let decoded = decode::<Claims>(token, self.keys.decoding_key(), &self.validation)
            .map_err(|e| {
                match e.kind() {
                    ErrorKind::InvalidSignature => warn!("⚠️ token rejected: bad signature"),
                    ErrorKind::InvalidIssuer => warn!("⚠️ token rejected: foreign issuer"),
                    ErrorKind::InvalidAlgorithm => warn!("⚠️ token rejected: algorithm mismatch"),
                    other => debug!(reason = ?other, "token rejected"),
                }
                TokenError
            })?;

        if now >= decoded.claims.exp {
            debug!(
                user_id = decoded.claims.user_id,
                exp = decoded.claims.exp,
                now,
                "token rejected: expired"
            );
            return Err(TokenError);
        }

        debug!("Validated JWT for user {}", decoded.claims.user_id);

        Ok(decoded.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::fixtures::{
        es256_key_pair, ES256_OTHER_PRIVATE, ES256_PUBLIC, ES384_PRIVATE,
    };
    use crate::auth::models::{Account, Role};
    use chrono::TimeZone;
    use jsonwebtoken::EncodingKey;

    const ISSUER: &str = "auth-service-test";
    const T0: i64 = 1_700_000_000;

    fn create_test_handler(access_minutes: u32, refresh_hours: u32) -> JwtHandler {
        JwtHandler::new(Arc::new(es256_key_pair()), ISSUER, access_minutes, refresh_hours)
    }

    fn create_test_user() -> User {
        User {
            id: 11,
            username: Some("testuser".to_string()),
            business_id: Some(5),
            account: Account {
                id: 21,
                user_id: 11,
                email: "test@example.com".to_string(),
                password_hash: "hash".to_string(),
                created_at: Utc::now().to_rfc3339(),
                updated_at: Utc::now().to_rfc3339(),
            },
            roles: vec![
                Role { id: 1, name: "admin".to_string() },
                Role { id: 2, name: "viewer".to_string() },
            ],
            address: None,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    #[test]
    fn test_jwt_generation_and_validation() {
        let handler = create_test_handler(15, 24);
        let user = create_test_user();

        let token = handler.mint_at(&user, TokenKind::Access, at(T0)).unwrap();
        assert!(!token.is_empty());

        let claims = handler.verify_at(&token, T0 + 1).unwrap();
        assert_eq!(claims, Claims::for_user(&user, ISSUER, T0 + 15 * 60));
    }

    #[test]
    fn test_round_trip_with_current_clock() {
        let handler = create_test_handler(5, 1);
        let user = create_test_user();

        let token = handler.mint(&user, TokenKind::Access).unwrap();
        let claims = handler.verify(&token).unwrap();

        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.account_id, user.account.id);
        assert_eq!(claims.email, user.account.email);
        assert_eq!(claims.roles, vec!["admin", "viewer"]);
        assert_eq!(claims.iss, ISSUER);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_sign_preserves_claims() {
        let handler = create_test_handler(15, 24);
        let claims = Claims {
            user_id: 1,
            account_id: 2,
            email: "a@x.com".to_string(),
            roles: vec![],
            business_id: None,
            iss: ISSUER.to_string(),
            exp: T0 + 30,
        };

        let token = handler.sign(&claims).unwrap();
        assert_eq!(handler.verify_at(&token, T0).unwrap(), claims);
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let handler = create_test_handler(0, 0);
        let token = handler
            .mint_at(&create_test_user(), TokenKind::Access, at(T0))
            .unwrap();

        assert_eq!(handler.verify_at(&token, T0 + 1), Err(TokenError));
    }

    #[test]
    fn test_expiry_boundary() {
        let handler = create_test_handler(1, 1);
        let token = handler
            .mint_at(&create_test_user(), TokenKind::Access, at(T0))
            .unwrap();
        let exp = T0 + 60;

        assert!(handler.verify_at(&token, exp - 1).is_ok());
        assert_eq!(handler.verify_at(&token, exp), Err(TokenError));
    }

    #[test]
    fn test_refresh_token_outlives_access_token() {
        let handler = create_test_handler(15, 24);
        let user = create_test_user();

        let refresh = handler.mint_at(&user, TokenKind::Refresh, at(T0)).unwrap();
        let claims = handler.verify_at(&refresh, T0 + 3600).unwrap();
        assert_eq!(claims.exp, T0 + 24 * 3600);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let handler = create_test_handler(15, 24);
        assert_eq!(handler.verify("invalid.token.here"), Err(TokenError));
        assert_eq!(handler.verify(""), Err(TokenError));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let minting = JwtHandler::new(Arc::new(es256_key_pair()), "someone-else", 15, 24);
        let verifying = create_test_handler(15, 24);

        let token = minting
            .mint_at(&create_test_user(), TokenKind::Access, at(T0))
            .unwrap();
        assert_eq!(verifying.verify_at(&token, T0), Err(TokenError));
    }

    #[test]
    fn test_signature_from_other_key_rejected() {
        let handler = create_test_handler(15, 24);
        let claims = Claims::for_user(&create_test_user(), ISSUER, T0 + 60);

        let other_key = EncodingKey::from_ec_pem(ES256_OTHER_PRIVATE.as_bytes()).unwrap();
        let forged = encode(&Header::new(Algorithm::ES256), &claims, &other_key).unwrap();

        assert_eq!(handler.verify_at(&forged, T0), Err(TokenError));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let handler = create_test_handler(15, 24);
        let mut other_user = create_test_user();
        other_user.id = 99;

        let genuine = handler
            .mint_at(&create_test_user(), TokenKind::Access, at(T0))
            .unwrap();
        let donor = handler
            .mint_at(&other_user, TokenKind::Access, at(T0))
            .unwrap();

        let parts: Vec<&str> = genuine.split('.').collect();
        let donor_parts: Vec<&str> = donor.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], donor_parts[1], parts[2]);

        assert_eq!(handler.verify_at(&spliced, T0), Err(TokenError));
    }

    #[test]
    fn test_hmac_with_public_key_as_secret_rejected() {
        let handler = create_test_handler(15, 24);
        let claims = Claims::for_user(&create_test_user(), ISSUER, T0 + 60);

        let hmac_key = EncodingKey::from_secret(ES256_PUBLIC.as_bytes());
        let forged = encode(&Header::new(Algorithm::HS256), &claims, &hmac_key).unwrap();

        assert_eq!(handler.verify_at(&forged, T0), Err(TokenError));
    }

    #[test]
    fn test_other_ecdsa_family_member_rejected() {
        let handler = create_test_handler(15, 24);
        let claims = Claims::for_user(&create_test_user(), ISSUER, T0 + 60);

        let p384 = EncodingKey::from_ec_pem(ES384_PRIVATE.as_bytes()).unwrap();
        let forged = encode(&Header::new(Algorithm::ES384), &claims, &p384).unwrap();

        assert_eq!(handler.verify_at(&forged, T0), Err(TokenError));
    }

    #[test]
    fn test_unsigned_token_rejected() {
        let handler = create_test_handler(15, 24);
        let genuine = handler
            .mint_at(&create_test_user(), TokenKind::Access, at(T0))
            .unwrap();
        let payload = genuine.split('.').nth(1).unwrap();

        // {"alg":"none","typ":"JWT"}
        let unsigned = format!("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{}.", payload);
        assert_eq!(handler.verify_at(&unsigned, T0), Err(TokenError));
    }

    #[test]
    fn test_new_pair_mints_refresh_token() {
        let handler = create_test_handler(15, 24);
        let user = create_test_user();

        let pair = handler.generate_token_pair(&user, None).unwrap();
        assert!(!pair.token.is_empty());
        assert!(!pair.refresh_token.is_empty());
        assert_ne!(pair.token, pair.refresh_token);

        let access = handler.verify(&pair.token).unwrap();
        let refresh = handler.verify(&pair.refresh_token).unwrap();
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn test_pair_carries_refresh_token_forward() {
        let handler = create_test_handler(15, 24);
        let user = create_test_user();

        let first = handler.generate_token_pair(&user, None).unwrap();
        let second = handler
            .generate_token_pair(&user, Some(first.refresh_token.clone()))
            .unwrap();

        assert_eq!(second.refresh_token, first.refresh_token);
        assert_ne!(second.token, first.token);
    }
}

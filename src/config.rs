//! Service configuration from environment variables

use crate::auth::{keys::default_public_key_id, ValidationMode};
use anyhow::{anyhow, Context, Result};
use bcrypt::DEFAULT_COST;

/// One week
pub const MAX_ACCESS_TTL_MINUTES: u32 = 7 * 24 * 60;
/// One year
pub const MAX_REFRESH_TTL_HOURS: u32 = 365 * 24;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub port: u16,
    pub database_path: String,
    pub issuer: String,
    pub access_token_ttl_minutes: u32,
    pub refresh_token_ttl_hours: u32,
    pub private_key_path: String,
    pub public_key_path: String,
    pub bcrypt_cost: u32,
    pub validation_mode: ValidationMode,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or(&lookup, "PORT", 8080u16)?;

        let database_path = lookup("AUTH_DB_PATH").unwrap_or_else(|| "./auth.db".to_string());

        let issuer = lookup("AUTH_TOKEN_ISSUER").unwrap_or_else(|| "auth-service".to_string());

        let access_token_ttl_minutes = parse_or(&lookup, "AUTH_TOKEN_TTL_MINUTES", 15u32)?;
        ensure_range(
            "AUTH_TOKEN_TTL_MINUTES",
            access_token_ttl_minutes,
            MAX_ACCESS_TTL_MINUTES,
        )?;
        let refresh_token_ttl_hours = parse_or(&lookup, "AUTH_REFRESH_TOKEN_TTL_HOURS", 24u32)?;
        ensure_range(
            "AUTH_REFRESH_TOKEN_TTL_HOURS",
            refresh_token_ttl_hours,
            MAX_REFRESH_TTL_HOURS,
        )?;

        let private_key_path = lookup("AUTH_PRIVATE_KEY_PATH")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("AUTH_PRIVATE_KEY_PATH must be set"))?;
        let public_key_path = lookup("AUTH_PUBLIC_KEY_PATH")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default_public_key_id(&private_key_path));

        let bcrypt_cost = parse_or(&lookup, "AUTH_BCRYPT_COST", DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(anyhow!("AUTH_BCRYPT_COST must be between 4 and 31"));
        }

        let validation_mode = match lookup("AUTH_VALIDATION_MODE") {
            Some(v) => v.parse::<ValidationMode>().map_err(|e| anyhow!(e))?,
            None => ValidationMode::default(),
        };

        Ok(Self {
            port,
            database_path,
            issuer,
            access_token_ttl_minutes,
            refresh_token_ttl_hours,
            private_key_path,
            public_key_path,
            bcrypt_cost,
            validation_mode,
        })
    }
}

// Zero would expire every token on issue; huge values overflow the expiry timestamp
fn ensure_range(key: &str, value: u32, max: u32) -> Result<()> {
    if !(1..=max).contains(&value) {
        return Err(anyhow!("{} must be between 1 and {}, got {}", key, max, value));
    }
    Ok(())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid {}: {}", key, raw)),
        None => Ok(default),
    }
}

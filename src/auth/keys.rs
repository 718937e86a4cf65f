//! Key Material Loader
//! Mission: Turn PEM bytes from an injected source into an ES256 key pair

use crate::auth::error::KeyError;
use jsonwebtoken::{crypto, Algorithm, DecodingKey, EncodingKey};
use p256::pkcs8::{EncodePrivateKey, LineEnding};
use std::io;
use tracing::{debug, info};

const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";
const SEC1_PRIVATE_KEY_LABEL: &str = "EC PRIVATE KEY";
const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// Source of raw key bytes, addressed by a path-like identifier
pub trait KeySource: Send + Sync {
    fn read(&self, id: &str) -> io::Result<Vec<u8>>;
}

/// Reads keys from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileKeySource;

impl KeySource for FileKeySource {
    fn read(&self, id: &str) -> io::Result<Vec<u8>> {
        std::fs::read(id)
    }
}

impl<F> KeySource for F
where
    F: Fn(&str) -> io::Result<Vec<u8>> + Send + Sync,
{
    fn read(&self, id: &str) -> io::Result<Vec<u8>> {
        self(id)
    }
}

/// Public key identifier used when none is configured
pub fn default_public_key_id(private_key_id: &str) -> String {
    format!("{}.pub", private_key_id)
}

/// Signing and verification halves of the service key.
/// Immutable for the process lifetime; reload requires a restart.
#[derive(Clone)]
pub struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyPair(ES256)")
    }
}

impl KeyPair {
    /// Load both halves and prove they belong together
    pub fn load(
        source: &dyn KeySource,
        private_key_id: &str,
        public_key_id: &str,
    ) -> Result<Self, KeyError> {
        let encoding = load_private_key(source, private_key_id)?;
        let decoding = load_public_key(source, public_key_id)?;

        let pair = Self { encoding, decoding };
        pair.ensure_matching(private_key_id)?;

        info!(
            private_key = private_key_id,
            public_key = public_key_id,
            "🔑 ES256 key pair loaded"
        );
        Ok(pair)
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    // jsonwebtoken only parses the PEM envelope; ring sees the key at first signature.
    // A P-384 key or a foreign public key fails here instead of on the first login.
    fn ensure_matching(&self, id: &str) -> Result<(), KeyError> {
        let probe = b"key-pair-probe";
        let signature = crypto::sign(probe, &self.encoding, Algorithm::ES256).map_err(|e| {
            KeyError::Format {
                id: id.to_string(),
                reason: format!("private key cannot sign ES256: {}", e),
            }
        })?;

        let verified = crypto::verify(&signature, probe, &self.decoding, Algorithm::ES256)
            .unwrap_or(false);
        if !verified {
            return Err(KeyError::Format {
                id: id.to_string(),
                reason: "public key does not match private key".to_string(),
            });
        }

        debug!("key pair probe signature verified");
        Ok(())
    }
}

/// Load a P-256 private key from a PKCS#8 `PRIVATE KEY` or SEC1 `EC PRIVATE KEY` block
pub fn load_private_key(source: &dyn KeySource, id: &str) -> Result<EncodingKey, KeyError> {
    let bytes = read_key(source, id)?;
    let label = pem_label(&bytes, id)?;

    let pkcs8 = match label.as_str() {
        PRIVATE_KEY_LABEL => bytes,
        SEC1_PRIVATE_KEY_LABEL => sec1_to_pkcs8(&bytes, id)?,
        other => return Err(unexpected_label(id, "'PRIVATE KEY' or 'EC PRIVATE KEY'", other)),
    };

    EncodingKey::from_ec_pem(&pkcs8).map_err(|e| KeyError::Format {
        id: id.to_string(),
        reason: format!("not an elliptic-curve private key: {}", e),
    })
}

/// Load an SPKI elliptic-curve public key
pub fn load_public_key(source: &dyn KeySource, id: &str) -> Result<DecodingKey, KeyError> {
    let bytes = read_key(source, id)?;
    let label = pem_label(&bytes, id)?;
    if label != PUBLIC_KEY_LABEL {
        return Err(unexpected_label(id, "'PUBLIC KEY'", &label));
    }

    DecodingKey::from_ec_pem(&bytes).map_err(|e| KeyError::Format {
        id: id.to_string(),
        reason: format!("not an elliptic-curve public key: {}", e),
    })
}

fn read_key(source: &dyn KeySource, id: &str) -> Result<Vec<u8>, KeyError> {
    source.read(id).map_err(|e| KeyError::Io {
        id: id.to_string(),
        source: e,
    })
}

fn pem_text<'a>(bytes: &'a [u8], id: &str) -> Result<&'a str, KeyError> {
    std::str::from_utf8(bytes).map_err(|_| KeyError::Format {
        id: id.to_string(),
        reason: "key material is not PEM text".to_string(),
    })
}

fn pem_label(bytes: &[u8], id: &str) -> Result<String, KeyError> {
    pem_text(bytes, id)?
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("-----BEGIN "))
        .and_then(|rest| rest.strip_suffix("-----"))
        .map(str::to_string)
        .ok_or_else(|| KeyError::Format {
            id: id.to_string(),
            reason: "no PEM block found".to_string(),
        })
}

fn unexpected_label(id: &str, expected: &str, found: &str) -> KeyError {
    KeyError::Format {
        id: id.to_string(),
        reason: format!("expected PEM block {}, found '{}'", expected, found),
    }
}

// jsonwebtoken only reads PKCS#8. Re-encoding through p256 also rejects SEC1 keys on other curves.
fn sec1_to_pkcs8(bytes: &[u8], id: &str) -> Result<Vec<u8>, KeyError> {
    let secret = p256::SecretKey::from_sec1_pem(pem_text(bytes, id)?).map_err(|e| {
        KeyError::Format {
            id: id.to_string(),
            reason: format!("not a P-256 SEC1 private key: {}", e),
        }
    })?;

    let pkcs8 = secret
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeyError::Format {
            id: id.to_string(),
            reason: format!("failed to re-encode SEC1 key as PKCS#8: {}", e),
        })?;

    debug!(key = id, "SEC1 private key re-encoded as PKCS#8");
    Ok(pkcs8.as_bytes().to_vec())
}

//! Id-token signature verification against the provider's JWKS
//!
//! Keys are fetched from the JWKS endpoint at startup and cached by key id.
//! An unknown `kid` triggers one refetch before failing, which covers
//! provider key rotation without restarting the service.

use std::collections::HashMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rsa::{pkcs1v15::VerifyingKey, signature::Verifier, RsaPublicKey};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum JwtVerifyError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("signing key not found: {0}")]
    KeyNotFound(String),
    #[error("failed to decode signing key: {0}")]
    KeyDecodingFailed(String),
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("token has expired")]
    TokenExpired,
    #[error("failed to fetch JWKS: {0}")]
    JwksFetchFailed(String),
}

#[derive(Debug, Deserialize)]
struct JwtHeader {
    alg: String,
    kid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKey {
    pub kty: String,
    pub kid: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

/// Verifies RS256 id-token signatures using keys from the provider's JWKS
/// endpoint
pub struct JwtVerifier {
    jwks_uri: String,
    client: reqwest::Client,
    keys: RwLock<HashMap<String, JsonWebKey>>,
    clock_skew_seconds: i64,
}

impl JwtVerifier {
    /// Create a verifier and fetch the initial key set
    ///
    /// # Errors
    ///
    /// Returns an error if the JWKS endpoint cannot be fetched or parsed;
    /// callers treat this as fatal at startup
    pub async fn new(jwks_uri: &str, client: reqwest::Client) -> Result<Self, JwtVerifyError> {
        let verifier = Self {
            jwks_uri: jwks_uri.to_string(),
            client,
            keys: RwLock::new(HashMap::new()),
            clock_skew_seconds: 300,
        };
        verifier.refetch_keys().await?;
        Ok(verifier)
    }

    /// Verify the token signature and expiry, returning the claims payload
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, signed with anything but
    /// RS256, signed by an unknown key, carries a bad signature, or has
    /// expired
    pub async fn verify(&self, token: &str) -> Result<serde_json::Value, JwtVerifyError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(JwtVerifyError::InvalidToken("not a JWT".to_string()));
        }

        let header: JwtHeader = decode_part(parts[0], "header")?;
        if header.alg != "RS256" {
            return Err(JwtVerifyError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header
            .kid
            .ok_or_else(|| JwtVerifyError::InvalidToken("missing kid".to_string()))?;

        let key = self.get_key(&kid).await?;
        Self::verify_rsa_signature(&parts, &key)?;

        let claims: serde_json::Value = decode_part(parts[1], "claims")?;
        self.check_expiry(&claims)?;

        Ok(claims)
    }

    /// Look up a key by id, refetching the JWKS once on a miss
    async fn get_key(&self, kid: &str) -> Result<JsonWebKey, JwtVerifyError> {
        {
            let keys = self.keys.read().await;
            if let Some(key) = keys.get(kid) {
                return Ok(key.clone());
            }
        }

        log::info!("Signing key '{kid}' not cached, refetching JWKS");
        self.refetch_keys().await?;

        let keys = self.keys.read().await;
        keys.get(kid)
            .cloned()
            .ok_or_else(|| JwtVerifyError::KeyNotFound(kid.to_string()))
    }

    async fn refetch_keys(&self) -> Result<(), JwtVerifyError> {
        let jwks: JsonWebKeySet = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| JwtVerifyError::JwksFetchFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| JwtVerifyError::JwksFetchFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| JwtVerifyError::JwksFetchFailed(e.to_string()))?;

        let mut keys = self.keys.write().await;
        keys.clear();
        for key in jwks.keys {
            if key.kty != "RSA" {
                continue;
            }
            if let Some(kid) = &key.kid {
                keys.insert(kid.clone(), key);
            }
        }
        log::debug!("Cached {} signing keys", keys.len());
        Ok(())
    }

    fn verify_rsa_signature(parts: &[&str], key: &JsonWebKey) -> Result<(), JwtVerifyError> {
        let n = key
            .n
            .as_ref()
            .ok_or_else(|| JwtVerifyError::KeyDecodingFailed("missing modulus".to_string()))?;
        let e = key
            .e
            .as_ref()
            .ok_or_else(|| JwtVerifyError::KeyDecodingFailed("missing exponent".to_string()))?;

        let n_bytes = URL_SAFE_NO_PAD
            .decode(n)
            .map_err(|e| JwtVerifyError::KeyDecodingFailed(format!("bad modulus: {e}")))?;
        let e_bytes = URL_SAFE_NO_PAD
            .decode(e)
            .map_err(|e| JwtVerifyError::KeyDecodingFailed(format!("bad exponent: {e}")))?;

        let rsa_key = RsaPublicKey::new(
            rsa::BigUint::from_bytes_be(&n_bytes),
            rsa::BigUint::from_bytes_be(&e_bytes),
        )
        .map_err(|e| JwtVerifyError::KeyDecodingFailed(format!("invalid RSA key: {e}")))?;

        let signature_bytes = URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|e| JwtVerifyError::InvalidToken(format!("bad signature encoding: {e}")))?;
        let signature = rsa::pkcs1v15::Signature::try_from(signature_bytes.as_slice())
            .map_err(|e| JwtVerifyError::InvalidToken(format!("bad signature format: {e}")))?;

        let signing_input = format!("{}.{}", parts[0], parts[1]);
        let verifying_key = VerifyingKey::<Sha256>::new(rsa_key);
        verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| JwtVerifyError::SignatureInvalid)
    }

    fn check_expiry(&self, claims: &serde_json::Value) -> Result<(), JwtVerifyError> {
        if let Some(exp) = claims.get("exp").and_then(serde_json::Value::as_i64) {
            let now = chrono::Utc::now().timestamp();
            if now > exp + self.clock_skew_seconds {
                return Err(JwtVerifyError::TokenExpired);
            }
        }
        Ok(())
    }
}

fn decode_part<T: serde::de::DeserializeOwned>(
    encoded: &str,
    part: &str,
) -> Result<T, JwtVerifyError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| JwtVerifyError::InvalidToken(format!("invalid {part} encoding: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| JwtVerifyError::InvalidToken(format!("invalid {part} JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_part_rejects_bad_encoding() {
        let result: Result<serde_json::Value, _> = decode_part("%%%", "header");
        assert!(matches!(result, Err(JwtVerifyError::InvalidToken(_))));

        let not_json = URL_SAFE_NO_PAD.encode(b"not-json");
        let result: Result<serde_json::Value, _> = decode_part(&not_json, "header");
        assert!(matches!(result, Err(JwtVerifyError::InvalidToken(_))));
    }

    #[test]
    fn test_header_parsing() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","kid":"key-1"}"#);
        let parsed: JwtHeader = decode_part(&header, "header").unwrap();
        assert_eq!(parsed.alg, "RS256");
        assert_eq!(parsed.kid.as_deref(), Some("key-1"));
    }

    #[test]
    fn test_verify_rsa_signature_rejects_garbage() {
        let key = JsonWebKey {
            kty: "RSA".to_string(),
            kid: Some("key-1".to_string()),
            key_use: Some("sig".to_string()),
            // Too-small modulus, still decodes as base64url
            n: Some(URL_SAFE_NO_PAD.encode([7u8; 32])),
            e: Some("AQAB".to_string()),
        };
        let sig = URL_SAFE_NO_PAD.encode([0u8; 32]);
        let parts = ["aGVhZGVy", "cGF5bG9hZA", sig.as_str()];

        assert!(JwtVerifier::verify_rsa_signature(&parts, &key).is_err());
    }

    #[test]
    fn test_verify_rsa_signature_requires_key_material() {
        let key = JsonWebKey {
            kty: "RSA".to_string(),
            kid: Some("key-1".to_string()),
            key_use: None,
            n: None,
            e: Some("AQAB".to_string()),
        };
        let parts = ["a", "b", "c"];
        assert!(matches!(
            JwtVerifier::verify_rsa_signature(&parts, &key),
            Err(JwtVerifyError::KeyDecodingFailed(_))
        ));
    }
}

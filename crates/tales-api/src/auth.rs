//! JWT issuing and verification.
//!
//! Login issues an HS256 token whose `sub` claim is the user id and whose
//! `role` claim is the role at login time. Every bearer-protected route
//! verifies the signature, `exp`, and (when configured) `iss`.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use tales_core::id::UserId;
use tales_core::model::UserRole;
use tales_core::{Error, Result};

use crate::config::JwtConfig;

const GENERATED_SECRET_LEN: usize = 48;

/// Claims carried by issued tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id, as a decimal string.
    pub sub: String,
    /// Role at issue time.
    pub role: UserRole,
    /// Issued-at (seconds since epoch).
    pub iat: i64,
    /// Expiry (seconds since epoch).
    pub exp: i64,
    /// Issuer, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    /// Parses the subject back into a user id.
    ///
    /// # Errors
    ///
    /// Returns an error if `sub` is not an integer.
    pub fn user_id(&self) -> Result<UserId> {
        self.sub.parse()
    }
}

/// Signs and verifies bearer tokens with a shared HS256 secret.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: Option<String>,
    ttl_secs: u64,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("keys", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl TokenService {
    /// Builds the service from configuration.
    ///
    /// In debug mode a missing secret is replaced by a random per-process one,
    /// so tokens stop verifying after a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if no secret is configured outside debug mode.
    pub fn from_config(jwt: &JwtConfig, debug: bool) -> Result<Self> {
        let secret = match jwt.hs256_secret.as_deref() {
            Some(secret) => secret.to_string(),
            None if debug => {
                tracing::warn!(
                    "TALES_JWT_SECRET not set; using a random per-process secret (debug only)"
                );
                generate_secret()
            }
            None => {
                return Err(Error::InvalidInput(
                    "jwt.hs256_secret is required when debug=false".to_string(),
                ));
            }
        };

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: jwt.issuer.clone(),
            ttl_secs: jwt.ttl_secs,
        })
    }

    /// Issues a token for `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self, user: UserId, role: UserRole) -> Result<String> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user.to_string(),
            role,
            iat: now,
            exp: now.saturating_add(ttl),
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            Error::Internal {
                message: format!("failed to sign token: {e}"),
            }
        })
    }

    /// Verifies a token and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns the underlying error for a bad signature, an expired token, or
    /// a wrong issuer.
    pub fn verify(&self, token: &str) -> std::result::Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &self.validation()).map(|data| data.claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.validate_nbf = true;

        if let Some(iss) = self.issuer.as_deref() {
            validation.set_issuer(&[iss]);
            validation.set_required_spec_claims(&["exp", "iss"]);
        }

        validation
    }
}

fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect()
}

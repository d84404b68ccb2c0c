//! Server configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use tales_core::otp::DEFAULT_OTP_TTL_SECS;
use tales_core::{Error, Result};

use crate::rate_limit::RateLimitConfig;

/// Minimum HS256 secret length accepted outside debug mode.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// Configuration for the YourTales API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interface the HTTP listener binds to.
    pub http_host: String,

    /// HTTP server port.
    pub http_port: u16,

    /// Enable debug mode.
    ///
    /// When enabled:
    /// - the caller may be identified with an `X-User-Id` header instead of a bearer token
    /// - a random JWT secret is generated if none is configured
    /// - logs are pretty-printed instead of JSON
    pub debug: bool,

    /// SQLite database file.
    pub database_path: PathBuf,

    /// JWT issuing and verification.
    #[serde(default)]
    pub jwt: JwtConfig,

    /// Lifetime of one-time passcodes in seconds.
    #[serde(default = "default_otp_ttl_secs")]
    pub otp_ttl_secs: u64,

    /// CORS configuration.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Outbound mail delivery.
    #[serde(default)]
    pub mail: MailConfig,
}

const fn default_otp_ttl_secs() -> u64 {
    DEFAULT_OTP_TTL_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_host: "127.0.0.1".to_string(),
            http_port: 8000,
            debug: false,
            database_path: PathBuf::from("tales.db"),
            jwt: JwtConfig::default(),
            otp_ttl_secs: default_otp_ttl_secs(),
            cors: CorsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `TALES_*` environment variables.
    ///
    /// Unset or blank variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if any environment variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = env_string("TALES_HTTP_HOST") {
            config.http_host = host;
        }
        if let Some(port) = env_u16("TALES_HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(debug) = env_bool("TALES_DEBUG")? {
            config.debug = debug;
        }
        if let Some(path) = env_string("TALES_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(secret) = env_string("TALES_JWT_SECRET") {
            config.jwt.hs256_secret = Some(secret);
        }
        if let Some(issuer) = env_string("TALES_JWT_ISSUER") {
            config.jwt.issuer = Some(issuer);
        }
        if let Some(ttl) = env_u64("TALES_JWT_TTL_SECS")? {
            if ttl == 0 {
                return Err(Error::InvalidInput(
                    "TALES_JWT_TTL_SECS must be greater than 0".to_string(),
                ));
            }
            config.jwt.ttl_secs = ttl;
        }
        if let Some(ttl) = env_u64("TALES_OTP_TTL_SECS")? {
            if ttl == 0 {
                return Err(Error::InvalidInput(
                    "TALES_OTP_TTL_SECS must be greater than 0".to_string(),
                ));
            }
            config.otp_ttl_secs = ttl;
        }

        if let Some(origins) = env_string("TALES_CORS_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = parse_cors_allowed_origins(&origins);
        }
        if let Some(max_age) = env_u64("TALES_CORS_MAX_AGE_SECONDS")? {
            config.cors.max_age_seconds = max_age;
        }

        if let Some(enabled) = env_bool("TALES_RATE_LIMIT_ENABLED")? {
            config.rate_limit.enabled = enabled;
        }
        if let Some(limit) = env_u32("TALES_RATE_LIMIT_DEFAULT_PER_MINUTE")? {
            config.rate_limit.default_requests_per_minute = limit;
        }
        if let Some(limit) = env_u32("TALES_RATE_LIMIT_AUTH_PER_MINUTE")? {
            config.rate_limit.auth_requests_per_minute = limit;
        }
        if let Some(burst) = env_u32("TALES_RATE_LIMIT_BURST")? {
            config.rate_limit.burst_size = burst;
        }
        if let Some(trust) = env_bool("TALES_RATE_LIMIT_TRUST_FORWARDED_FOR")? {
            config.rate_limit.trust_forwarded_for = trust;
        }

        if let Some(url) = env_string("TALES_MAIL_RELAY_URL") {
            config.mail.relay_url = Some(url);
        }
        if let Some(token) = env_string("TALES_MAIL_RELAY_TOKEN") {
            config.mail.relay_token = Some(token);
        }
        if let Some(from) = env_string("TALES_MAIL_FROM") {
            config.mail.from = from;
        }

        Ok(config)
    }

    /// Checks settings that are only unsafe outside debug mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the JWT secret is missing or short, or CORS allows any origin.
    pub fn validate(&self) -> Result<()> {
        if self.debug {
            return Ok(());
        }

        if self
            .cors
            .allowed_origins
            .iter()
            .any(|origin| origin == "*")
        {
            return Err(Error::InvalidInput(
                "cors.allowed_origins cannot include '*' when debug=false".to_string(),
            ));
        }

        match self.jwt.hs256_secret.as_deref() {
            None => Err(Error::InvalidInput(
                "jwt.hs256_secret is required when debug=false".to_string(),
            )),
            Some(secret) if secret.len() < MIN_JWT_SECRET_BYTES => {
                Err(Error::InvalidInput(format!(
                    "jwt.hs256_secret must be at least {MIN_JWT_SECRET_BYTES} bytes when debug=false"
                )))
            }
            Some(_) => Ok(()),
        }
    }
}

/// JWT configuration for issuing and verifying bearer tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HS256 signing secret.
    ///
    /// Delivered via `TALES_JWT_SECRET`; never checked into config files.
    #[serde(default)]
    pub hs256_secret: Option<String>,

    /// Optional issuer (`iss`) stamped on issued tokens and enforced on verification.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Lifetime of issued tokens in seconds.
    #[serde(default = "default_jwt_ttl_secs")]
    pub ttl_secs: u64,
}

const fn default_jwt_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            hs256_secret: None,
            issuer: None,
            ttl_secs: default_jwt_ttl_secs(),
        }
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field(
                "hs256_secret",
                &self.hs256_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("issuer", &self.issuer)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

/// CORS configuration for browser-based access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins. Use `["*"]` to allow all origins (development only).
    /// Empty list disables CORS entirely.
    pub allowed_origins: Vec<String>,

    /// Max age for preflight cache (seconds).
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_age_seconds: 3600,
        }
    }
}

/// Outbound mail delivery settings.
///
/// Without a relay URL, messages are written to the log instead of being sent.
#[derive(Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Endpoint accepting `{from, to, subject, html}` JSON posts.
    #[serde(default)]
    pub relay_url: Option<String>,
    /// Bearer token sent to the relay.
    #[serde(default)]
    pub relay_token: Option<String>,
    /// Sender address.
    #[serde(default = "default_mail_from")]
    pub from: String,
}

fn default_mail_from() -> String {
    "YourTales Support <no-reply@yourtales.local>".to_string()
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            relay_token: None,
            from: default_mail_from(),
        }
    }
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("relay_url", &self.relay_url)
            .field(
                "relay_token",
                &self.relay_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("from", &self.from)
            .finish()
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u16(name: &str) -> Result<Option<u16>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u16>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u16: {e}")))
}

fn env_u32(name: &str) -> Result<Option<u32>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u32>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u32: {e}")))
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u64>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_bool(name, &v).map(Some)
}

fn parse_cors_allowed_origins(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed == "*" {
        return vec!["*".to_string()];
    }

    trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production_config(secret: &str) -> Config {
        Config {
            jwt: JwtConfig {
                hs256_secret: Some(secret.to_string()),
                ..JwtConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn parse_bool_accepts_true_values() {
        for value in ["true", "TRUE", "1", "yes", "y"] {
            assert!(parse_bool("TEST", value).unwrap());
        }
    }

    #[test]
    fn parse_bool_accepts_false_values() {
        for value in ["false", "False", "0", "no", "n"] {
            assert!(!parse_bool("TEST", value).unwrap());
        }
    }

    #[test]
    fn parse_bool_rejects_invalid_values() {
        let err = parse_bool("TALES_DEBUG", "maybe").unwrap_err();
        assert!(err.to_string().contains("TALES_DEBUG"));
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        assert_eq!(
            parse_cors_allowed_origins(" https://a.example , ,https://b.example "),
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(parse_cors_allowed_origins("*"), vec!["*"]);
        assert!(parse_cors_allowed_origins("  ").is_empty());
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.http_host, "127.0.0.1");
        assert_eq!(config.http_port, 8000);
        assert_eq!(config.jwt.ttl_secs, 604_800);
        assert_eq!(config.otp_ttl_secs, 600);
        assert_eq!(config.database_path, PathBuf::from("tales.db"));
    }

    #[test]
    fn validate_requires_long_secret_outside_debug() {
        assert!(Config::default().validate().is_err());
        assert!(production_config("short").validate().is_err());
        assert!(production_config(&"k".repeat(MIN_JWT_SECRET_BYTES)).validate().is_ok());
    }

    #[test]
    fn validate_rejects_wildcard_cors_outside_debug() {
        let mut config = production_config(&"k".repeat(40));
        config.cors.allowed_origins = vec!["*".to_string()];
        assert!(config.validate().is_err());

        config.debug = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = production_config("super-secret-value-that-is-long-enough");
        config.mail.relay_token = Some("relay-token".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret-value"));
        assert!(!rendered.contains("relay-token"));
        assert!(rendered.contains("[REDACTED]"));
    }
}

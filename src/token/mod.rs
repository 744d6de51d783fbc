//! Trust token integrity.
//!
//! A trust token certifies that content with hash `contentHash` was produced
//! by sanitizing content with hash `originalHash`, using the listed rules, at
//! a given time. Tokens are signed with HMAC-SHA256 under a server-held
//! secret and expire by wall-clock comparison.
//!
//! # Wire Format
//!
//! ```text
//! {
//!   "contentHash":         "<sha256 hex of sanitized content>",
//!   "originalHash":        "<sha256 hex of original content>",
//!   "sanitizationVersion": "1.0",
//!   "rulesApplied":        ["unicode-normalization", ...],
//!   "timestamp":           "2026-10-17T12:00:00.000Z",
//!   "expiresAt":           "2026-10-18T12:00:00.000Z",
//!   "signature":           "<hmac-sha256 hex>"
//! }
//! ```
//!
//! The signature covers the compact JSON of the first six fields, in the
//! order above. Changing any of them invalidates the token.
//!
//! # Advisory Only
//!
//! Validation never gates sanitization. The pipeline re-runs every stage
//! whether or not a presented token validates; the outcome is only logged.

mod signer;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tracing::Span;

pub use signer::{
    SigningKey, TokenSigner, GENERATED_KEY_SIZE, MIN_KEY_SIZE, SECRET_ENV_VAR, SIGNATURE_SIZE,
};

use crate::config::TrustTokenConfig;
use crate::hash::content_hash;

/// Errors from trust token operations
#[derive(Debug, Error)]
pub enum TokenError {
    /// Secret shorter than [`MIN_KEY_SIZE`]
    #[error("Signing secret too short: {0} bytes (minimum {MIN_KEY_SIZE})")]
    KeyTooShort(usize),

    /// No secret configured
    #[error("No signing secret configured; set {0}")]
    MissingSecret(String),

    /// MAC rejected the key
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    /// Expiry offset cannot be represented
    #[error("Invalid expiration: {0}")]
    InvalidExpiration(String),

    /// Signature did not verify
    #[error("Signature verification failed")]
    VerificationFailed,

    /// Canonical serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Signed certificate of sanitization.
///
/// Every field deserializes with a default so that a wire token with
/// missing fields can still be handed to [`TrustTokenIntegrity::validate`],
/// which reports the first missing one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrustToken {
    /// SHA-256 hex of the sanitized content
    pub content_hash: String,
    /// SHA-256 hex of the original content
    pub original_hash: String,
    /// Sanitization rule-set version
    pub sanitization_version: String,
    /// Stage names, in the order they ran. An empty list is a valid
    /// value; only an absent one counts as missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_applied: Option<Vec<String>>,
    /// Issue time (ISO-8601)
    pub timestamp: String,
    /// Expiry time (ISO-8601)
    pub expires_at: String,
    /// HMAC-SHA256 hex over the other fields
    pub signature: String,
}

/// Signed subset of a token, in canonical field order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedFields<'a> {
    content_hash: &'a str,
    original_hash: &'a str,
    sanitization_version: &'a str,
    rules_applied: &'a [String],
    timestamp: &'a str,
    expires_at: &'a str,
}

impl TrustToken {
    /// Parse a wire token.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse a wire token from an already-decoded value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Bytes covered by the signature.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, TokenError> {
        let fields = SignedFields {
            content_hash: &self.content_hash,
            original_hash: &self.original_hash,
            sanitization_version: &self.sanitization_version,
            rules_applied: self.rules_applied.as_deref().unwrap_or_default(),
            timestamp: &self.timestamp,
            expires_at: &self.expires_at,
        };
        Ok(serde_json::to_vec(&fields)?)
    }

    /// First required field that is absent or empty.
    fn missing_field(&self) -> Option<&'static str> {
        [
            ("contentHash", self.content_hash.is_empty()),
            ("originalHash", self.original_hash.is_empty()),
            ("sanitizationVersion", self.sanitization_version.is_empty()),
            ("rulesApplied", self.rules_applied.is_none()),
            ("timestamp", self.timestamp.is_empty()),
            ("expiresAt", self.expires_at.is_empty()),
            ("signature", self.signature.is_empty()),
        ]
        .into_iter()
        .find_map(|(name, missing)| missing.then_some(name))
    }
}

/// Per-mint overrides.
#[derive(Debug, Clone, Default)]
pub struct MintOptions {
    /// Version string (default from config)
    pub version: Option<String>,
    /// Lifetime (default from config)
    pub expiration: Option<TimeDelta>,
    /// Issue time (default now)
    pub issued_at: Option<DateTime<Utc>>,
}

impl MintOptions {
    /// Override the version string
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Override the lifetime
    pub fn with_expiration(mut self, expiration: TimeDelta) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Override the issue time
    pub fn issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.issued_at = Some(at);
        self
    }
}

/// Why a token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRejection {
    /// A required field is absent or empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// `expiresAt` is not strictly in the future
    #[error("Token has expired")]
    Expired,

    /// `expiresAt` is not ISO-8601
    #[error("Malformed expiresAt: {0}")]
    MalformedExpiry(String),

    /// Signature does not match the signed fields
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Validation could not be carried out
    #[error("Validation error: {0}")]
    Internal(String),
}

/// Outcome of [`TrustTokenIntegrity::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValidation {
    /// Token is authentic and unexpired
    Valid,
    /// Token was rejected
    Invalid(TokenRejection),
}

impl TokenValidation {
    /// True for [`TokenValidation::Valid`]
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenValidation::Valid)
    }

    /// Rejection message, if any
    pub fn error(&self) -> Option<String> {
        match self {
            TokenValidation::Valid => None,
            TokenValidation::Invalid(reason) => Some(reason.to_string()),
        }
    }
}

impl Serialize for TokenValidation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Wire {
            is_valid: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<String>,
        }

        Wire {
            is_valid: self.is_valid(),
            error: self.error(),
        }
        .serialize(serializer)
    }
}

/// Default token lifetime in hours
pub const DEFAULT_EXPIRATION_HOURS: u32 = 24;

/// Default sanitization version
pub const DEFAULT_VERSION: &str = "1.0";

/// Mints and validates trust tokens.
#[derive(Debug, Clone)]
pub struct TrustTokenIntegrity {
    signer: TokenSigner,
    expiration: TimeDelta,
    version: String,
    span: Span,
}

impl TrustTokenIntegrity {
    /// Create with default lifetime and version
    pub fn new(key: SigningKey) -> Self {
        Self {
            signer: TokenSigner::new(key),
            expiration: TimeDelta::hours(i64::from(DEFAULT_EXPIRATION_HOURS)),
            version: DEFAULT_VERSION.to_string(),
            span: tracing::info_span!("trust_token"),
        }
    }

    /// Build from configuration.
    ///
    /// The secret comes from `config.secret`, then `TRUST_TOKEN_SECRET`.
    pub fn from_config(config: &TrustTokenConfig) -> Result<Self, TokenError> {
        let key = match config.secret.as_deref() {
            Some(secret) => SigningKey::from_secret(secret)?,
            None => SigningKey::from_env()?,
        };
        let integrity = Self::new(key).with_expiration_hours(config.expiration_hours)?;
        Ok(integrity.with_version(config.version.clone()))
    }

    /// Set the default lifetime
    pub fn with_expiration_hours(mut self, hours: u32) -> Result<Self, TokenError> {
        self.expiration = TimeDelta::try_hours(i64::from(hours))
            .ok_or_else(|| TokenError::InvalidExpiration(format!("{hours} hours")))?;
        Ok(self)
    }

    /// Set the default version string
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Attach a tracing span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Mint a token for `sanitized`, derived from `original` by `rules`.
    pub fn mint(
        &self,
        sanitized: &str,
        original: &str,
        rules: &[String],
        options: &MintOptions,
    ) -> Result<TrustToken, TokenError> {
        let issued_at = options.issued_at.unwrap_or_else(Utc::now);
        let lifetime = options.expiration.unwrap_or(self.expiration);
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .ok_or_else(|| TokenError::InvalidExpiration(format!("{lifetime}")))?;

        let mut token = TrustToken {
            content_hash: content_hash(sanitized),
            original_hash: content_hash(original),
            sanitization_version: options
                .version
                .clone()
                .unwrap_or_else(|| self.version.clone()),
            rules_applied: Some(rules.to_vec()),
            timestamp: iso8601(issued_at),
            expires_at: iso8601(expires_at),
            signature: String::new(),
        };
        token.signature = self.signer.sign(&token.canonical_bytes()?)?;

        tracing::debug!(
            parent: &self.span,
            content_hash = %token.content_hash,
            expires_at = %token.expires_at,
            "Minted trust token"
        );
        Ok(token)
    }

    /// Validate against the current time.
    pub fn validate(&self, token: &TrustToken) -> TokenValidation {
        self.validate_at(token, Utc::now())
    }

    /// Validate against `now`.
    pub fn validate_at(&self, token: &TrustToken, now: DateTime<Utc>) -> TokenValidation {
        let outcome = self.check(token, now);
        if let TokenValidation::Invalid(reason) = &outcome {
            tracing::debug!(parent: &self.span, %reason, "Trust token rejected");
        }
        outcome
    }

    fn check(&self, token: &TrustToken, now: DateTime<Utc>) -> TokenValidation {
        if let Some(field) = token.missing_field() {
            return TokenValidation::Invalid(TokenRejection::MissingField(field));
        }

        match DateTime::parse_from_rfc3339(&token.expires_at) {
            Ok(expires_at) if expires_at.with_timezone(&Utc) <= now => {
                return TokenValidation::Invalid(TokenRejection::Expired);
            },
            Ok(_) => {},
            Err(e) => {
                return TokenValidation::Invalid(TokenRejection::MalformedExpiry(e.to_string()));
            },
        }

        let payload = match token.canonical_bytes() {
            Ok(payload) => payload,
            Err(e) => return TokenValidation::Invalid(TokenRejection::Internal(e.to_string())),
        };

        match self.signer.verify(&payload, &token.signature) {
            Ok(()) => TokenValidation::Valid,
            Err(TokenError::VerificationFailed) => {
                TokenValidation::Invalid(TokenRejection::InvalidSignature)
            },
            Err(e) => TokenValidation::Invalid(TokenRejection::Internal(e.to_string())),
        }
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
fn iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

//! HMAC-SHA256 signing for trust tokens.
//!
//! Signatures are hex encoded. Verification goes through
//! [`Mac::verify_slice`], which compares in constant time.

use std::fmt;

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// Minimum secret size in bytes
pub const MIN_KEY_SIZE: usize = 16;

/// Size of generated secrets in bytes
pub const GENERATED_KEY_SIZE: usize = 32;

/// HMAC-SHA256 tag size in bytes
pub const SIGNATURE_SIZE: usize = 32;

/// Environment variable holding the server secret
pub const SECRET_ENV_VAR: &str = "TRUST_TOKEN_SECRET";

/// Server-held signing secret.
///
/// Wiped on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey {
    bytes: Vec<u8>,
}

impl SigningKey {
    /// Wrap raw secret bytes.
    pub fn new(bytes: Vec<u8>) -> Result<Self, TokenError> {
        if bytes.len() < MIN_KEY_SIZE {
            return Err(TokenError::KeyTooShort(bytes.len()));
        }
        Ok(Self { bytes })
    }

    /// Use the UTF-8 bytes of a configured secret.
    pub fn from_secret(secret: &str) -> Result<Self, TokenError> {
        Self::new(secret.as_bytes().to_vec())
    }

    /// Read the secret from `TRUST_TOKEN_SECRET`.
    pub fn from_env() -> Result<Self, TokenError> {
        let secret = std::env::var(SECRET_ENV_VAR)
            .map_err(|_| TokenError::MissingSecret(SECRET_ENV_VAR.to_string()))?;
        Self::from_secret(&secret)
    }

    /// Fresh random secret from the system CSPRNG, hex encoded for use as
    /// `TRUST_TOKEN_SECRET`.
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; GENERATED_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        let secret = hex::encode(bytes);
        bytes.zeroize();
        secret
    }

    /// Secret length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false for a constructed key
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey([REDACTED, {} bytes])", self.bytes.len())
    }
}

/// Computes and checks token signatures.
#[derive(Debug, Clone)]
pub struct TokenSigner {
    key: SigningKey,
}

impl TokenSigner {
    /// Create a signer for `key`
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.key.as_bytes())
            .map_err(|e| TokenError::InvalidKey(e.to_string()))
    }

    /// Raw HMAC-SHA256 tag for `data`
    pub fn compute_tag(&self, data: &[u8]) -> Result<[u8; SIGNATURE_SIZE], TokenError> {
        let mut mac = self.mac()?;
        mac.update(data);

        let mut tag = [0u8; SIGNATURE_SIZE];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Ok(tag)
    }

    /// Hex signature for `data`
    pub fn sign(&self, data: &[u8]) -> Result<String, TokenError> {
        Ok(hex::encode(self.compute_tag(data)?))
    }

    /// Check a hex signature against `data`.
    pub fn verify(&self, data: &[u8], signature_hex: &str) -> Result<(), TokenError> {
        let tag = hex::decode(signature_hex).map_err(|_| TokenError::VerificationFailed)?;

        let mut mac = self.mac()?;
        mac.update(data);
        mac.verify_slice(&tag)
            .map_err(|_| TokenError::VerificationFailed)
    }
}

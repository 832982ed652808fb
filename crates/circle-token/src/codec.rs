use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

pub const SEPARATOR: char = '.';

const HEADER: &str = r#"{"alg":"HS256","typ":"CIRCLE"}"#;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token secret must not be empty")]
    EmptySecret,

    #[error("identity must not be empty")]
    EmptyIdentity,

    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token identity does not exist")]
    UnknownIdentity,

    #[error("identity lookup failed: {0}")]
    Directory(String),
}

impl TokenError {
    /// True for every failure a caller should see as "unauthenticated".
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::Malformed | Self::InvalidSignature | Self::UnknownIdentity
        )
    }
}

/// Where `verify` confirms that a decoded identity still exists.
pub trait IdentityDirectory {
    type Error: fmt::Display;

    fn identity_exists(&self, identity: &str) -> Result<bool, Self::Error>;
}

/// Issues and verifies bearer tokens with one process-wide secret.
///
/// Stateless apart from the keyed MAC, so one codec can be shared across
/// every request task.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
    header: String,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::EmptySecret)?;
        Ok(Self {
            mac,
            header: B64.encode(HEADER),
        })
    }

    /// Build a token for `identity`.
    pub fn issue(&self, identity: &str) -> Result<String, TokenError> {
        if identity.is_empty() {
            return Err(TokenError::EmptyIdentity);
        }

        let payload = B64.encode(identity);
        let signature = self.sign(&payload);

        // The URL-safe alphabet has no separator, so this never fires.
        debug_assert!(!signature.contains(SEPARATOR));

        Ok(format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.header, payload, signature
        ))
    }

    /// Resolve a token back to its identity.
    ///
    /// Checks run in a fixed order: shape, signature, payload decoding, then
    /// existence in `directory`.
    pub fn verify<D>(&self, token: &str, directory: &D) -> Result<String, TokenError>
    where
        D: IdentityDirectory + ?Sized,
    {
        let segments: Vec<&str> = token.split(SEPARATOR).collect();
        let [header, payload, signature] = segments.as_slice() else {
            return Err(TokenError::Malformed);
        };
        if header.is_empty() || payload.is_empty() || signature.is_empty() {
            return Err(TokenError::Malformed);
        }

        let signature = B64
            .decode(signature)
            .map_err(|_| TokenError::InvalidSignature)?;
        let mut mac = self.mac.clone();
        mac.update(header.as_bytes());
        mac.update(&[SEPARATOR as u8]);
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let identity = B64
            .decode(payload)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .filter(|id| !id.is_empty())
            .ok_or(TokenError::Malformed)?;

        match directory.identity_exists(&identity) {
            Ok(true) => Ok(identity),
            Ok(false) => {
                debug!("Token for unknown identity {}", identity);
                Err(TokenError::UnknownIdentity)
            }
            Err(e) => Err(TokenError::Directory(e.to_string())),
        }
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(self.header.as_bytes());
        mac.update(&[SEPARATOR as u8]);
        mac.update(payload.as_bytes());
        B64.encode(mac.finalize().into_bytes())
    }
}

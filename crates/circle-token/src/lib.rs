//! Circle bearer tokens.
//!
//! A token is `header.payload.signature`:
//! - header: constant JSON metadata
//! - payload: the raw identity
//! - signature: HMAC-SHA256 over `header.payload` with the server secret
//!
//! All three segments are URL-safe base64 without padding. Tokens carry no
//! expiry; a token is valid while its signature verifies and its identity
//! still exists in the directory.

pub mod codec;

pub use codec::{IdentityDirectory, SEPARATOR, TokenCodec, TokenError};

use std::fmt;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::identity::Identity;

/// The access/refresh token pair issued at login.
///
/// Both tokens are wiped from memory when the pair is dropped and never
/// appear in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct TokenPair {
    /// The bearer token attached to every request.
    pub access_token: String,
    /// The refresh token. Stored alongside the access token, never exchanged.
    pub refresh_token: String,
}

impl TokenPair {
    /// Creates a new `TokenPair`.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// A copy of the current session.
///
/// Built from the token store on every read; the identity is decoded from the
/// access token at that moment and is never carried across a replacement.
#[derive(Debug, Clone)]
pub struct Session {
    /// The stored token pair.
    pub tokens: TokenPair,
    /// The identity decoded from the access token, if it decodes.
    pub identity: Option<Identity>,
}

impl Session {
    /// Builds a `Session` by decoding the access token of `tokens`.
    pub fn from_tokens(tokens: TokenPair) -> Self {
        let identity = crate::crypto::claims::decode(&tokens.access_token);
        Self { tokens, identity }
    }
}

/// The two states of the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// A token pair is stored and has not been rejected.
    Authenticated,
    /// No usable session; the user must log in.
    Anonymous,
}

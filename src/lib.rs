//! Session and secure-transfer client for the SecureVault file vault.
//!
//! The vault encrypts on the server; this crate authenticates, decides what
//! the user may see, keeps the session alive or ends it, and drives uploads
//! and downloads against the vault's HTTP API.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod state;

pub mod crypto {
    pub mod claims;
    pub mod digest;
}

pub mod models {
    pub mod audit;
    pub mod file;
    pub mod identity;
    pub mod key;
    pub mod session;
    pub mod timestamp;
    pub mod transfer;
    pub mod user;
}

pub mod repositories {
    pub mod token;
}

pub mod services {
    pub mod audit;
    pub mod auth;
    pub mod authz;
    pub mod files;
    pub mod keys;
    pub mod session;
    pub mod transfer;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod auth;
}

pub use client::ApiClient;
pub use config::Config;
pub use error::{AppError, FailureKind, Result};
pub use state::AppState;

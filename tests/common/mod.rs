#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Value, json};
use tempfile::TempDir;

use securevault_client::{
    config::Config,
    models::session::TokenPair,
    repositories::token::{MemoryTokenStore, TokenStore},
    state::AppState,
};

/// Serves `router` on an ephemeral local port and returns the API base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/api", addr)
}

/// Builds an unsigned token carrying `claims`.
pub fn token_with(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

/// A token for subject `sub` with `roles`, expiring `ttl_secs` from now.
pub fn token(sub: &str, roles: &[&str], ttl_secs: i64) -> String {
    token_with(json!({
        "sub": sub,
        "usuario": format!("user{}", sub),
        "roles": roles,
        "exp": chrono::Utc::now().timestamp() + ttl_secs,
    }))
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryTokenStore>,
    pub downloads: TempDir,
}

impl Harness {
    pub fn new(base_url: &str) -> Self {
        Self::with_config(base_url, |_| {})
    }

    pub fn with_config(base_url: &str, tweak: impl FnOnce(&mut Config)) -> Self {
        Self::build(base_url, None, tweak)
    }

    /// A harness whose store already holds a session for `access_token`.
    pub fn logged_in(base_url: &str, access_token: &str) -> Self {
        Self::build(base_url, Some(access_token), |_| {})
    }

    fn build(base_url: &str, access_token: Option<&str>, tweak: impl FnOnce(&mut Config)) -> Self {
        let downloads = tempfile::tempdir().unwrap();

        let mut config = Config::for_base_url(base_url);
        config.request_timeout = Duration::from_secs(5);
        config.download_dir = downloads.path().to_path_buf();
        tweak(&mut config);

        let store = Arc::new(MemoryTokenStore::new());
        if let Some(access_token) = access_token {
            store
                .set(TokenPair::new(access_token, "refresh-token"))
                .unwrap();
        }

        let state = AppState::with_store(&config, store.clone()).unwrap();
        Self { state, store, downloads }
    }

    pub fn stored_access_token(&self) -> Option<String> {
        self.store.get().map(|pair| pair.access_token.clone())
    }
}

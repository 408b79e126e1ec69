use std::sync::Arc;

use crate::client::ApiClient;
use crate::config::Config;
use crate::error::Result;
use crate::repositories::token::{FileTokenStore, TokenStore};
use crate::services::keys::KeyManager;
use crate::services::session::SessionController;
use crate::services::transfer::TransferOrchestrator;

/// The client's state: one token store, one session, one transport.
#[derive(Clone)]
pub struct AppState {
    /// The client configuration.
    pub config: Config,
    /// The session lifecycle controller.
    pub session: SessionController,
    /// The transport client.
    pub client: ApiClient,
    /// The transfer orchestrator.
    pub transfers: TransferOrchestrator,
    /// The key reference manager.
    pub keys: KeyManager,
}

impl AppState {
    /// Creates a new `AppState` backed by the durable token store.
    ///
    /// # Arguments
    ///
    /// * `config` - The client configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub fn new(config: &Config) -> Result<Self> {
        let store = FileTokenStore::open(&config.token_dir, &config.api_base_url);
        tracing::info!("✅ Token store at {}", store.path().display());
        Self::with_store(config, Arc::new(store))
    }

    /// Creates a new `AppState` over an existing token store.
    pub fn with_store(config: &Config, store: Arc<dyn TokenStore>) -> Result<Self> {
        let session = SessionController::new(store, config.expiry_grace_secs);
        tracing::info!("✅ Session controller initialized ({:?})", session.state());

        let http = crate::http::create_http_client(config)?;
        let client = ApiClient::new(http, config, session.clone());
        tracing::info!("✅ API client initialized for {}", client.base_url());

        let transfers = TransferOrchestrator::new(client.clone(), config);
        let keys = KeyManager::new(client.clone());

        Ok(AppState {
            config: config.clone(),
            session,
            client,
            transfers,
            keys,
        })
    }
}

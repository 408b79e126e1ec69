use crate::client::ApiClient;
use crate::error::{AppError, Result};
use crate::models::key::{GenerateKeyRequest, KeyDescriptor};

/// Client view of the server-held wrapping key.
///
/// Only descriptors cross the wire; key material never leaves the server.
#[derive(Clone)]
pub struct KeyManager {
    client: ApiClient,
}

impl KeyManager {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Fetches the active key descriptor.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when no key has been generated yet. Transport and server
    /// failures stay errors.
    pub async fn fetch_active(&self) -> Result<Option<KeyDescriptor>> {
        match self.client.get_json::<KeyDescriptor>("/claves/activa").await {
            Ok(key) => {
                tracing::debug!("🔑 Active key: {}", key.label);
                Ok(Some(key))
            }
            Err(AppError::NotFound(message)) => {
                tracing::info!("No active key: {}", message);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Generates a new active key, retiring the previous one on the server.
    ///
    /// Not idempotent: every successful call creates a key. Callers re-fetch
    /// rather than patching a previously held descriptor.
    pub async fn generate(&self, label: Option<&str>) -> Result<KeyDescriptor> {
        let request = GenerateKeyRequest::new(label);
        let key: KeyDescriptor = self.client.post_json("/claves/generar", &request).await?;
        tracing::info!("🔐 Generated key {:?} (active: {})", key.label, key.is_active);
        Ok(key)
    }
}

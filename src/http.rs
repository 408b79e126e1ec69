use std::time::Duration;
use reqwest::Client;

use crate::config::Config;
use crate::error::{AppError, Result};

/// The `User-Agent` sent with every request.
const USER_AGENT: &str = concat!("securevault-client/", env!("CARGO_PKG_VERSION"));

/// Creates the HTTP client shared by every request.
///
/// # Arguments
///
/// * `config` - The client configuration; its request timeout bounds every
///   call, connection setup included.
///
/// # Returns
///
/// A `Result` containing the `Client`.
pub fn create_http_client(config: &Config) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.request_timeout)
        .connect_timeout(config.request_timeout.min(Duration::from_secs(5)))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(8)
        .build()
        .map_err(|e| AppError::Transport(format!("failed to build HTTP client: {}", e)))
}

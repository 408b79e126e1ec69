use std::env;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::{Context, Result};

/// The default API base URL, including the `/api` prefix.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";
/// The default bounded timeout for every network call.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
/// The default grace window for the access-token expiry pre-check.
pub const DEFAULT_EXPIRY_GRACE_SECS: i64 = 60;
/// The default local upload ceiling (1 GiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024 * 1024;

/// The client's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The API base URL, e.g. `http://127.0.0.1:8000/api`.
    pub api_base_url: String,
    /// The timeout applied to every network call.
    pub request_timeout: Duration,
    /// Tokens expiring within this many seconds are treated as expired.
    pub expiry_grace_secs: i64,
    /// Whether the transport client checks token expiry before sending.
    pub expiry_precheck: bool,
    /// The directory holding the durable token store.
    pub token_dir: PathBuf,
    /// The directory downloads are saved into.
    pub download_dir: PathBuf,
    /// Whether upload payloads are digested before submission.
    pub digest_uploads: bool,
    /// Uploads larger than this are rejected locally.
    pub max_upload_bytes: u64,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let api_base_url = env::var("VAULT_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        validate_base_url(&api_base_url)?;

        let request_timeout_secs: u64 = env::var("VAULT_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_REQUEST_TIMEOUT_SECS.to_string())
            .parse()
            .context("Invalid VAULT_REQUEST_TIMEOUT_SECS")?;

        if request_timeout_secs == 0 {
            anyhow::bail!("VAULT_REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        Ok(Self {
            api_base_url,
            request_timeout: Duration::from_secs(request_timeout_secs),
            expiry_grace_secs: env::var("VAULT_TOKEN_EXPIRY_GRACE_SECS")
                .unwrap_or_else(|_| DEFAULT_EXPIRY_GRACE_SECS.to_string())
                .parse()
                .context("Invalid VAULT_TOKEN_EXPIRY_GRACE_SECS")?,
            expiry_precheck: parse_bool("VAULT_EXPIRY_PRECHECK", true)?,
            token_dir: env::var("VAULT_TOKEN_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_token_dir()),
            download_dir: env::var("VAULT_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            digest_uploads: parse_bool("VAULT_DIGEST_UPLOADS", false)?,
            max_upload_bytes: env::var("VAULT_MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_BYTES.to_string())
                .parse()
                .context("Invalid VAULT_MAX_UPLOAD_BYTES")?,
        })
    }

    /// Creates a `Config` with defaults for everything but the base URL.
    pub fn for_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            expiry_grace_secs: DEFAULT_EXPIRY_GRACE_SECS,
            expiry_precheck: true,
            token_dir: default_token_dir(),
            download_dir: PathBuf::from("."),
            digest_uploads: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn validate_base_url(url: &str) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("VAULT_API_URL must start with http:// or https://");
    }
    Ok(())
}

fn parse_bool(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("Invalid {}: expected true or false", name),
        },
    }
}

fn default_token_dir() -> PathBuf {
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(".securevault"))
        .unwrap_or_else(|_| PathBuf::from(".securevault"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_base_url_uses_defaults() {
        let config = Config::for_base_url("http://localhost:9000/api");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.expiry_grace_secs, 60);
        assert!(config.expiry_precheck);
        assert!(!config.digest_uploads);
    }

    #[test]
    fn base_url_must_be_http() {
        assert!(validate_base_url("https://vault.example/api").is_ok());
        assert!(validate_base_url("ftp://vault.example").is_err());
    }
}

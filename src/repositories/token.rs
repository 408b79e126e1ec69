use std::path::{Path, PathBuf};
use std::sync::RwLock;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::models::session::TokenPair;

/// Persistent storage for the session's token pair.
///
/// The store is the only source of truth for "is a session active". Absence
/// is a normal state: `get` returns `None` and `clear` on an empty store
/// succeeds.
pub trait TokenStore: Send + Sync {
    /// Returns a copy of the current pair, if any.
    fn get(&self) -> Option<TokenPair>;

    /// Replaces the stored pair. Both tokens are written together.
    fn set(&self, pair: TokenPair) -> Result<()>;

    /// Removes both tokens.
    fn clear(&self) -> Result<()>;

    /// Clears the store only if it still holds `access_token`.
    ///
    /// Returns `true` if the store was cleared.
    fn clear_if_current(&self, access_token: &str) -> Result<bool> {
        match self.get() {
            Some(current) if tokens_match(&current.access_token, access_token) => {
                self.clear()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Constant-time token comparison.
pub(crate) fn tokens_match(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// An in-process token store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryTokenStore {
    pair: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    /// Creates an empty `MemoryTokenStore`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<TokenPair> {
        self.pair.read().ok().and_then(|pair| pair.clone())
    }

    fn set(&self, pair: TokenPair) -> Result<()> {
        let mut slot = self
            .pair
            .write()
            .map_err(|_| AppError::Io(std::io::Error::other("token store lock poisoned")))?;
        *slot = Some(pair);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self
            .pair
            .write()
            .map_err(|_| AppError::Io(std::io::Error::other("token store lock poisoned")))?;
        *slot = None;
        Ok(())
    }

    fn clear_if_current(&self, access_token: &str) -> Result<bool> {
        let mut slot = self
            .pair
            .write()
            .map_err(|_| AppError::Io(std::io::Error::other("token store lock poisoned")))?;
        let current = slot
            .as_ref()
            .is_some_and(|pair| tokens_match(&pair.access_token, access_token));
        if current {
            *slot = None;
        }
        Ok(current)
    }
}

/// A token store persisted to a JSON file, one file per API origin.
///
/// The file holds `{"access_token": .., "refresh_token": ..}` and is replaced
/// atomically (write to a temporary file, then rename). Reads are served from
/// an in-memory mirror loaded at open time.
pub struct FileTokenStore {
    path: PathBuf,
    mirror: RwLock<Option<TokenPair>>,
}

/// Returns the origin (`scheme://host[:port]`) of `url`.
fn origin_of(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.origin().ascii_serialization(),
        Err(_) => url.trim_end_matches('/').to_ascii_lowercase(),
    }
}

/// Returns the file name used to store the session for `base_url`'s origin.
pub fn session_file_name(base_url: &str) -> String {
    let digest = Sha256::digest(origin_of(base_url).as_bytes());
    format!("session-{}.json", &hex::encode(digest)[..16])
}

impl FileTokenStore {
    /// Opens (or prepares) the store for `base_url` inside `dir`.
    ///
    /// # Arguments
    ///
    /// * `dir` - The directory holding session files. Created on first write.
    /// * `base_url` - The API base URL; only its origin selects the file.
    ///
    /// # Returns
    ///
    /// A `FileTokenStore`. A missing or unreadable file opens as empty.
    pub fn open(dir: &Path, base_url: &str) -> Self {
        let path = dir.join(session_file_name(base_url));
        let mirror = load(&path);

        tracing::debug!(
            "Token store opened at {} (session present: {})",
            path.display(),
            mirror.is_some()
        );

        Self {
            path,
            mirror: RwLock::new(mirror),
        }
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, pair: &TokenPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut body = sonic_rs::to_vec(pair)?;
        let tmp = self.path.with_extension("json.tmp");
        let written = std::fs::write(&tmp, &body);
        zeroize::Zeroize::zeroize(&mut body);
        written?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn load(path: &Path) -> Option<TokenPair> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("⚠️ Could not read token store {}: {}", path.display(), e);
            return None;
        }
    };

    match sonic_rs::from_slice::<TokenPair>(&bytes) {
        Ok(pair) if !pair.access_token.is_empty() => Some(pair),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("⚠️ Ignoring corrupt token store {}: {}", path.display(), e);
            None
        }
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<TokenPair> {
        self.mirror.read().ok().and_then(|pair| pair.clone())
    }

    fn set(&self, pair: TokenPair) -> Result<()> {
        let mut slot = self
            .mirror
            .write()
            .map_err(|_| AppError::Io(std::io::Error::other("token store lock poisoned")))?;
        self.write_file(&pair)?;
        *slot = Some(pair);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self
            .mirror
            .write()
            .map_err(|_| AppError::Io(std::io::Error::other("token store lock poisoned")))?;
        remove_file(&self.path)?;
        *slot = None;
        Ok(())
    }

    fn clear_if_current(&self, access_token: &str) -> Result<bool> {
        let mut slot = self
            .mirror
            .write()
            .map_err(|_| AppError::Io(std::io::Error::other("token store lock poisoned")))?;
        let current = slot
            .as_ref()
            .is_some_and(|pair| tokens_match(&pair.access_token, access_token));
        if current {
            remove_file(&self.path)?;
            *slot = None;
        }
        Ok(current)
    }
}

fn remove_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

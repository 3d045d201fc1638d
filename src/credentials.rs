//! Client-local provider API key
//!
//! The key the user supplies is kept in a [`CredentialHolder`] for the
//! lifetime of the client process and persisted to client-local storage
//! under [`API_KEY_STORAGE_KEY`]. It is never part of the `/chat` or
//! `/analyze` HTTP contracts.
//!
//! Code running inside [`provide`] reaches the holder with [`current`].
//! Calling [`current`] anywhere else is a programming error and fails with
//! [`CredentialError::NoActiveScope`].

use crate::config::ProviderConfig;
use std::collections::BTreeMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

/// Fixed key name of the persisted entry
pub const API_KEY_STORAGE_KEY: &str = "stackrelay_api_key";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error(
        "credentials::current() called outside of an active credential scope; \
        wrap the caller in credentials::provide(holder, ...)"
    )]
    NoActiveScope,

    #[error("No configuration directory available for the credential file")]
    NoConfigDir,

    #[error("Credential storage at '{path}' failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Credential file '{path}' is not valid JSON: {source}")]
    Serialization {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistence seam for the API key
pub trait CredentialStore: Send + Sync {
    /// Read the stored key, `None` when nothing was stored
    fn load(&self) -> Result<Option<String>, CredentialError>;

    /// Store the key, or remove it when `None`
    fn save(&self, api_key: Option<&str>) -> Result<(), CredentialError>;
}

/// JSON key-value file in the platform configuration directory
///
/// Other entries in the file are preserved on save.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/stackrelay/credentials.json`
    pub fn default_location() -> Result<Self, CredentialError> {
        let dir = dirs::config_dir().ok_or(CredentialError::NoConfigDir)?;
        Ok(Self::new(dir.join("stackrelay").join("credentials.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, CredentialError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|source| CredentialError::Serialization {
            path: self.path.display().to_string(),
            source,
        })
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.read_entries()?.remove(API_KEY_STORAGE_KEY))
    }

    fn save(&self, api_key: Option<&str>) -> Result<(), CredentialError> {
        let mut entries = self.read_entries()?;
        match api_key {
            Some(key) => {
                entries.insert(API_KEY_STORAGE_KEY.to_string(), key.to_string());
            }
            None => {
                entries.remove(API_KEY_STORAGE_KEY);
            }
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let content = serde_json::to_string_pretty(&entries).map_err(|source| {
            CredentialError::Serialization {
                path: self.path.display().to_string(),
                source,
            }
        })?;

        // Write-then-rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, content.as_bytes()).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), stored = api_key.is_some(), "Saved credentials");
        Ok(())
    }
}

/// Write a file readable only by the current user (mode 0600 on unix)
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // Mode only applies on creation; a leftover temp file keeps its old bits
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(content)?;
    file.sync_all()
}

/// Process-memory store, used by tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    value: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(api_key.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<String>, CredentialError> {
        Ok(self
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, api_key: Option<&str>) -> Result<(), CredentialError> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = api_key.map(str::to_string);
        Ok(())
    }
}

/// Current API key for one client context
pub struct CredentialHolder {
    store: Arc<dyn CredentialStore>,
    api_key: RwLock<Option<String>>,
}

impl std::fmt::Debug for CredentialHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHolder")
            .field("is_configured", &self.is_configured())
            .finish_non_exhaustive()
    }
}

impl CredentialHolder {
    /// Create a holder, reading the persisted key once
    pub fn load(store: Arc<dyn CredentialStore>) -> Result<Self, CredentialError> {
        let api_key = store.load()?.filter(|k| !k.trim().is_empty());
        Ok(Self {
            store,
            api_key: RwLock::new(api_key),
        })
    }

    /// Empty holder backed by process memory only
    pub fn ephemeral() -> Self {
        Self {
            store: Arc::new(MemoryCredentialStore::new()),
            api_key: RwLock::new(None),
        }
    }

    /// The current key, if one is set
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a key is set
    pub fn is_configured(&self) -> bool {
        self.api_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Replace the key and persist it
    ///
    /// The in-memory value is updated first, so later reads in this session
    /// see the new key even if persisting fails. A blank key clears.
    pub fn set_api_key(&self, api_key: impl Into<String>) -> Result<(), CredentialError> {
        let api_key = api_key.into();
        let api_key = api_key.trim();
        let value = (!api_key.is_empty()).then(|| api_key.to_string());

        *self.api_key.write().unwrap_or_else(PoisonError::into_inner) = value.clone();
        self.store.save(value.as_deref())
    }

    /// Remove the key from memory and storage
    pub fn clear(&self) -> Result<(), CredentialError> {
        *self.api_key.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.store.save(None)
    }
}

tokio::task_local! {
    /// Holder installed by `provide` for the duration of a future
    static CURRENT: Arc<CredentialHolder>;
}

/// Run `future` with `holder` as the active credential holder
pub async fn provide<F>(holder: Arc<CredentialHolder>, future: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(holder, future).await
}

/// The active credential holder
///
/// # Errors
///
/// [`CredentialError::NoActiveScope`] when called outside [`provide`].
pub fn current() -> Result<Arc<CredentialHolder>, CredentialError> {
    CURRENT
        .try_with(Arc::clone)
        .map_err(|_| CredentialError::NoActiveScope)
}

/// Provider API key for the server
///
/// Order: `provider.api_key`, then the variable named by
/// `provider.api_key_env`, then the holder of the active scope.
///
/// # Errors
///
/// [`CredentialError::NoActiveScope`] when the stored key is needed and no
/// scope is active.
pub fn resolve_api_key(config: &ProviderConfig) -> Result<Option<String>, CredentialError> {
    match config.resolve_api_key() {
        Some(key) => Ok(Some(key)),
        None => Ok(current()?.api_key()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_holder() -> Arc<CredentialHolder> {
        Arc::new(CredentialHolder::ephemeral())
    }

    #[test]
    fn test_new_holder_is_not_configured() {
        let holder = memory_holder();
        assert!(!holder.is_configured());
        assert!(holder.api_key().is_none());
    }

    #[test]
    fn test_set_updates_memory_and_store() {
        let store = Arc::new(MemoryCredentialStore::new());
        let holder = CredentialHolder::load(store.clone()).unwrap();

        holder.set_api_key("sk-first").unwrap();
        holder.set_api_key("sk-second").unwrap();

        assert_eq!(holder.api_key().as_deref(), Some("sk-second"));
        assert!(holder.is_configured());
        assert_eq!(store.load().unwrap().as_deref(), Some("sk-second"));
    }

    #[test]
    fn test_blank_key_clears() {
        let holder = CredentialHolder::load(Arc::new(MemoryCredentialStore::with_key("sk-x")))
            .unwrap();
        assert!(holder.is_configured());

        holder.set_api_key("   ").unwrap();
        assert!(!holder.is_configured());
    }

    #[test]
    fn test_current_outside_scope_fails_fast() {
        let err = current().unwrap_err();
        assert!(matches!(err, CredentialError::NoActiveScope));
        assert!(err.to_string().contains("provide"));
    }

    #[tokio::test]
    async fn test_current_inside_scope_sees_latest_set() {
        let holder = memory_holder();

        provide(holder.clone(), async {
            let active = current().expect("scope is active");
            assert!(!active.is_configured());

            active.set_api_key("sk-live").unwrap();
            assert_eq!(current().unwrap().api_key().as_deref(), Some("sk-live"));
        })
        .await;

        assert_eq!(holder.api_key().as_deref(), Some("sk-live"));
        assert!(current().is_err());
    }
}

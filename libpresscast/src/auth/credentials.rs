//! Credential persistence
//!
//! The host owns where credentials live; the core goes through the
//! [`CredentialStore`] trait. The file-backed implementation keeps a single
//! TOML document with the OAuth credentials and, while an authorization is in
//! flight, the transient PKCE session.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// OAuth2 client and token material. Mutated only by a successful exchange
/// or refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Unix timestamp of the last successful exchange or refresh; 0 = never
    #[serde(default)]
    pub last_refresh_at: i64,
}

impl Credentials {
    /// True iff client id, client secret, and access token are all present
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
            && !self.client_secret.is_empty()
            && !self.access_token.is_empty()
    }
}

/// Transient PKCE authorization state, consumed exactly once by the callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthSession {
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
}

/// Storage interface for credentials and the in-flight OAuth session.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Credentials, AuthError>;
    fn store(&self, credentials: &Credentials) -> Result<(), AuthError>;
    fn load_session(&self) -> Result<Option<OAuthSession>, AuthError>;
    fn store_session(&self, session: &OAuthSession) -> Result<(), AuthError>;
    fn clear_session(&self) -> Result<(), AuthError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    credentials: Credentials,
    #[serde(default)]
    session: Option<OAuthSession>,
}

/// TOML file-backed store. The file is created with owner-only permissions.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Expand `~` and environment variables in a configured path.
    pub fn from_config_path(path: &str) -> Result<Self, AuthError> {
        let expanded = shellexpand::full(path)
            .map_err(|e| AuthError::Storage(format!("failed to expand path: {}", e)))?;
        Ok(Self::new(expanded.to_string()))
    }

    fn read_state(&self) -> Result<StoredState, AuthError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| AuthError::Storage(format!("failed to parse credential file: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredState::default()),
            Err(e) => Err(AuthError::Storage(format!(
                "failed to read credential file: {}",
                e
            ))),
        }
    }

    fn write_state(&self, state: &StoredState) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuthError::Storage(format!("failed to create directory: {}", e)))?;
        }

        let content = toml::to_string_pretty(state)
            .map_err(|e| AuthError::Storage(format!("failed to serialize credentials: {}", e)))?;
        std::fs::write(&self.path, content)
            .map_err(|e| AuthError::Storage(format!("failed to write credential file: {}", e)))?;

        set_owner_only(&self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<(), AuthError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| AuthError::Storage(format!("failed to set permissions: {}", e)))
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<(), AuthError> {
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Credentials, AuthError> {
        Ok(self.read_state()?.credentials)
    }

    fn store(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let mut state = self.read_state()?;
        state.credentials = credentials.clone();
        self.write_state(&state)
    }

    fn load_session(&self) -> Result<Option<OAuthSession>, AuthError> {
        Ok(self.read_state()?.session)
    }

    fn store_session(&self, session: &OAuthSession) -> Result<(), AuthError> {
        let mut state = self.read_state()?;
        state.session = Some(session.clone());
        self.write_state(&state)
    }

    fn clear_session(&self) -> Result<(), AuthError> {
        let mut state = self.read_state()?;
        state.session = None;
        self.write_state(&state)
    }
}

/// In-memory store for tests and embeddings that manage persistence
/// themselves.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<StoredState>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            inner: Mutex::new(StoredState {
                credentials,
                session: None,
            }),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Credentials, AuthError> {
        Ok(self.inner.lock().unwrap().credentials.clone())
    }

    fn store(&self, credentials: &Credentials) -> Result<(), AuthError> {
        self.inner.lock().unwrap().credentials = credentials.clone();
        Ok(())
    }

    fn load_session(&self) -> Result<Option<OAuthSession>, AuthError> {
        Ok(self.inner.lock().unwrap().session.clone())
    }

    fn store_session(&self, session: &OAuthSession) -> Result<(), AuthError> {
        self.inner.lock().unwrap().session = Some(session.clone());
        Ok(())
    }

    fn clear_session(&self) -> Result<(), AuthError> {
        self.inner.lock().unwrap().session = None;
        Ok(())
    }
}

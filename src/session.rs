//! Session and identity state.
//!
//! ARCHITECTURE
//! ============
//! Two layers: [`SessionStore`] owns the bearer token and its on-disk copy,
//! and is shared by reference with every request-issuing code path.
//! [`Session`] sits above it with the cached profile the UI renders from.
//! Request paths only read the token; login/verify write it; logout and any
//! 401 clear it, after which authenticated calls fail until the next login.
//!
//! TRADE-OFFS
//! ==========
//! The token file is plain text under the user's home directory, same trust
//! model as browser local storage in the production client. Clearing is
//! destructive (file removed) so a revoked session cannot be replayed from
//! disk.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::types::User;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not read token file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write token file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not remove token file {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },
}

// =============================================================================
// TOKEN STORE
// =============================================================================

/// Bearer token with optional file persistence.
///
/// With a path, the token survives process restarts; without one the session
/// lives and dies with the process (tests, embedders).
#[derive(Debug)]
pub struct SessionStore {
    token: RwLock<Option<String>>,
    path: Option<PathBuf>,
}

impl SessionStore {
    /// Open the store, loading any token persisted at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Read`] when the token file exists but cannot
    /// be read.
    pub fn open(path: Option<PathBuf>) -> Result<Self, SessionError> {
        let token = match &path {
            Some(path) => read_token_file(path)?,
            None => None,
        };
        if token.is_some() {
            debug!("loaded persisted session token");
        }
        Ok(Self {
            token: RwLock::new(token),
            path,
        })
    }

    /// In-memory store with no persistence and no token.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            token: RwLock::new(None),
            path: None,
        }
    }

    /// Current token, if any.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token().is_some()
    }

    /// Replace the token and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Write`] when the token file cannot be written;
    /// the in-memory token is updated regardless so the current process can
    /// keep working.
    pub fn set(&self, token: &str) -> Result<(), SessionError> {
        *self
            .token
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(token.to_owned());
        if let Some(path) = &self.path {
            write_token_file(path, token)?;
            debug!("session token persisted");
        }
        Ok(())
    }

    /// Drop the token and its on-disk copy.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Remove`] when the token file exists but cannot
    /// be deleted. The in-memory token is cleared first either way.
    pub fn clear(&self) -> Result<(), SessionError> {
        *self
            .token
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        if let Some(path) = &self.path {
            remove_token_file(path)?;
        }
        Ok(())
    }
}

fn read_token_file(path: &Path) -> Result<Option<String>, SessionError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let token = raw.trim();
            if token.is_empty() {
                Ok(None)
            } else {
                Ok(Some(token.to_owned()))
            }
        }
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SessionError::Read {
            path: path.to_owned(),
            source,
        }),
    }
}

fn write_token_file(path: &Path, token: &str) -> Result<(), SessionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SessionError::Write {
            path: path.to_owned(),
            source,
        })?;
    }
    std::fs::write(path, token).map_err(|source| SessionError::Write {
        path: path.to_owned(),
        source,
    })
}

fn remove_token_file(path: &Path) -> Result<(), SessionError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SessionError::Remove {
            path: path.to_owned(),
            source,
        }),
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// The signed-in user as the UI sees them: profile plus a loading flag while
/// the bootstrap fetch is in flight.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub user: Option<User>,
    pub loading: bool,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Resolve the persisted token into a profile at startup.
    ///
    /// A missing or rejected token is the signed-out state, not an error;
    /// only transport and storage failures propagate.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] or [`ApiError::Session`] faults; auth
    /// rejections are absorbed (the store was already cleared by the 401
    /// path).
    pub async fn bootstrap(&mut self, api: &ApiClient) -> Result<(), ApiError> {
        self.loading = true;
        if !api.has_session() {
            self.user = None;
            self.loading = false;
            return Ok(());
        }
        match api.me().await {
            Ok(user) => {
                info!(user_id = user.id, role = %user.role, "session restored");
                self.user = Some(user);
                self.loading = false;
                Ok(())
            }
            Err(ApiError::Auth(_) | ApiError::Forbidden(_)) => {
                warn!("persisted token rejected; starting signed out");
                self.user = None;
                self.loading = false;
                Ok(())
            }
            Err(error) => {
                self.loading = false;
                Err(error)
            }
        }
    }

    /// Exchange credentials for a token and refresh the cached profile.
    ///
    /// # Errors
    ///
    /// Propagates login and profile-fetch failures unchanged.
    pub async fn login(&mut self, api: &ApiClient, email: &str, password: &str) -> Result<&User, ApiError> {
        api.login(email, password).await?;
        let user = api.me().await?;
        info!(user_id = user.id, role = %user.role, "logged in");
        self.loading = false;
        Ok(self.user.insert(user))
    }

    /// Clear the token and the cached profile.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Session`] when the token file cannot be removed.
    pub fn logout(&mut self, api: &ApiClient) -> Result<(), ApiError> {
        api.logout()?;
        self.user = None;
        self.loading = false;
        info!("logged out");
        Ok(())
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

//! Session registry
//!
//! Hosts that serve several clients address sessions by handle. Calls on
//! one session are serialized by its lock; different sessions run
//! concurrently on tokio's blocking pool.

use super::ExecutionSession;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::ExecutionResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Opaque identity of a registered session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type SharedSession = Arc<Mutex<ExecutionSession>>;

/// Sessions addressed by handle
///
/// Cloning the registry shares it. Calls on one session run in submission
/// order; calls on different sessions run concurrently on blocking threads.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionHandle, SharedSession>>>,
    config: Arc<Config>,
}

impl SessionRegistry {
    /// Empty registry whose sessions are created from `config`
    pub fn new(config: Config) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register a session set up from the registry's configuration
    pub async fn create(&self) -> Result<SessionHandle> {
        let session = ExecutionSession::from_config(&self.config.session)?;
        Ok(self.create_with(session).await)
    }

    /// Register an already constructed session
    pub async fn create_with(&self, session: ExecutionSession) -> SessionHandle {
        let handle = SessionHandle::new();
        self.sessions
            .write()
            .await
            .insert(handle, Arc::new(Mutex::new(session)));
        info!("Created session {}", handle);
        handle
    }

    async fn session(&self, handle: SessionHandle) -> Result<SharedSession> {
        self.sessions
            .read()
            .await
            .get(&handle)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound {
                handle: handle.to_string(),
            })
    }

    /// Run `text` in the session behind `handle`
    pub async fn run(&self, handle: SessionHandle, text: &str) -> Result<ExecutionResult> {
        let session = self.session(handle).await?;
        let mut guard = session.lock_owned().await;
        let text = text.to_string();
        tokio::task::spawn_blocking(move || guard.run(&text))
            .await
            .map_err(|e| Error::Other(format!("session task failed: {}", e)))?
    }

    /// Abandon pending input of a session
    pub async fn reset(&self, handle: SessionHandle) -> Result<()> {
        let session = self.session(handle).await?;
        session.lock().await.reset();
        Ok(())
    }

    /// Unregister a session, terminating its running jobs
    pub async fn remove(&self, handle: SessionHandle) -> Result<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&handle)
            .ok_or_else(|| Error::SessionNotFound {
                handle: handle.to_string(),
            })?;

        let grace = self.grace_period();
        let guard = session.lock_owned().await;
        tokio::task::spawn_blocking(move || guard.shutdown(grace))
            .await
            .map_err(|e| Error::Other(format!("session shutdown failed: {}", e)))?;
        info!("Removed session {}", handle);
        Ok(())
    }

    /// Whether `handle` names a registered session
    pub async fn contains(&self, handle: SessionHandle) -> bool {
        self.sessions.read().await.contains_key(&handle)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Handles of every registered session, in no particular order
    pub async fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.keys().copied().collect()
    }

    fn grace_period(&self) -> Duration {
        self.config.jobs.kill_grace_period()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

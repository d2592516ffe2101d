//! The shared set of active sessions.
//!
//! Every operation takes the same lock and releases it before returning,
//! so the lock is never held across network I/O. Fan-out works from a
//! snapshot rather than iterating under the lock.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::Mutex;

use crate::session::{SessionHandle, SessionId};

#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    sessions: Mutex<BTreeMap<SessionId, SessionHandle>>,
    next_id: AtomicU64,
}

impl Default for RegistryInner {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> SessionId {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn add(&self, session: SessionHandle) {
        let mut sessions = self.inner.sessions.lock().await;
        sessions.insert(session.id(), session);
    }

    /// Removes a session. Unknown or already-removed ids are a no-op and
    /// return `None`, so racing cleanup paths can both call this.
    pub async fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        let mut sessions = self.inner.sessions.lock().await;
        sessions.remove(&id)
    }

    pub async fn snapshot_all(&self) -> Vec<SessionHandle> {
        let sessions = self.inner.sessions.lock().await;
        sessions.values().cloned().collect()
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        let sessions = self.inner.sessions.lock().await;
        sessions.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        let sessions = self.inner.sessions.lock().await;
        sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

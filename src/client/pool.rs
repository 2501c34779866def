//! Live set of connected sessions

use crate::client::session::SessionHandle;
use crate::common::SessionId;

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Sessions that connected and have not finished yet
#[derive(Clone, Default)]
pub struct SessionPool {
    sessions: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, handle: SessionHandle) {
        self.sessions.write().await.insert(handle.id(), handle);
    }

    pub async fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.write().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Copy of the live handles; the lock is released before returning
    pub async fn snapshot(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Attempt to close every live session, logging failures.
    ///
    /// Returns the number of sessions a close was attempted on.
    pub async fn close_all(&self) -> usize {
        let handles = self.snapshot().await;
        if handles.is_empty() {
            return 0;
        }
        info!("Closing {} live sessions", handles.len());

        let results = join_all(handles.iter().map(|handle| handle.close())).await;
        for (handle, result) in handles.iter().zip(results) {
            if let Err(e) = result {
                warn!(
                    "{} T{} {} failed to close: {}",
                    handle.kind().client_type(),
                    handle.id(),
                    handle.client_id(),
                    e
                );
            }
        }
        handles.len()
    }
}

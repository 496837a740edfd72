//! Registry of open update sessions, keyed by document URL.
//!
//! A host with several editors keeps one `UpdateSession` per document here,
//! so replacing or closing a document always disposes its session.

use std::sync::Arc;

use dashmap::DashMap;
use url::Url;

use super::collaborators::SyntaxModel;
use super::session::UpdateSession;

const LOG_TARGET: &str = "reparse_scheduler::store";

/// Open update sessions, one per document.
pub struct SessionStore<M: SyntaxModel> {
    sessions: DashMap<Url, Arc<UpdateSession<M>>>,
}

impl<M: SyntaxModel> Default for SessionStore<M> {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl<M: SyntaxModel> SessionStore<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, disposing any session previously open for `uri`.
    pub fn insert(&self, uri: Url, session: UpdateSession<M>) -> Arc<UpdateSession<M>> {
        let session = Arc::new(session);
        if let Some(previous) = self.sessions.insert(uri.clone(), Arc::clone(&session)) {
            log::debug!(target: LOG_TARGET, "Replacing open session for {}", uri);
            previous.dispose();
        }
        session
    }

    pub fn get(&self, uri: &Url) -> Option<Arc<UpdateSession<M>>> {
        self.sessions.get(uri).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and dispose the session for `uri`. Returns whether one was open.
    pub fn close(&self, uri: &Url) -> bool {
        match self.sessions.remove(uri) {
            Some((_, session)) => {
                session.dispose();
                log::debug!(target: LOG_TARGET, "Closed session for {}", uri);
                true
            }
            None => false,
        }
    }

    /// Dispose every open session (host shutdown).
    pub fn dispose_all(&self) {
        let uris: Vec<Url> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        for uri in &uris {
            self.close(uri);
        }
    }

    pub fn uris(&self) -> Vec<Url> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

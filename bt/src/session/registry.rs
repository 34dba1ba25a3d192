//! SessionRegistry - creates and releases build sessions

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::config::Config;
use crate::store::EventStore;

use super::handle::{SessionHandle, SessionId};

/// Registry of live build sessions
///
/// Each session gets its own [`EventStore`]; nothing is shared between
/// sessions and nothing is global.
pub struct SessionRegistry {
    config: Config,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(config: Config) -> Self {
        debug!(?config, "SessionRegistry::new: called");
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new, empty session
    ///
    /// `root_title` names the root node when the build's root start carries
    /// no title of its own.
    pub fn new_session(&self, root_title: &str) -> SessionHandle {
        let id = SessionId::generate();
        let store = Arc::new(EventStore::with_config(root_title, &self.config));
        let handle = SessionHandle::new(id.clone(), root_title, store);
        self.sessions().insert(id.clone(), handle.clone());
        info!(session_id = %id, %root_title, "new_session: session created");
        handle
    }

    /// Close a session and release its retained tree
    ///
    /// Every handle clone sees the session as closed afterwards. Returns false
    /// if the session was not registered (already closed).
    pub fn close_session(&self, handle: &SessionHandle) -> bool {
        let removed = self.sessions().remove(handle.id());
        match removed {
            Some(session) => {
                session.close();
                info!(session_id = %handle.id(), "close_session: session closed");
                true
            }
            None => {
                debug!(session_id = %handle.id(), "close_session: not registered");
                false
            }
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions().get(id).cloned()
    }

    /// Ids of all live sessions
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::info;

use super::AssistantSession;
use crate::metrics;

pub type SharedSession = Arc<Mutex<AssistantSession>>;

/// Sessions held by the HTTP server, keyed by id.
///
/// Each session sits behind its own async mutex, so exchanges within a session
/// run one at a time while different sessions never contend.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SharedSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> (String, SharedSession) {
        self.insert(AssistantSession::new())
    }

    pub fn insert(&self, session: AssistantSession) -> (String, SharedSession) {
        let id = session.conversation().id().to_string();
        let shared = Arc::new(Mutex::new(session));
        self.sessions.insert(id.clone(), Arc::clone(&shared));
        metrics::inc_sessions();
        info!("Created session {}", id);
        (id, shared)
    }

    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            metrics::dec_sessions();
            info!("Removed session {}", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

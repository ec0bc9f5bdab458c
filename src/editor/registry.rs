//! Session registry
//!
//! Shared mapping from correlation key (the session's temp file path)
//! to live [`EditorSession`]. Every request-handling task reads it;
//! the task that creates a session and the task that observes its exit
//! mutate it. All access goes through one mutex, and the create path
//! runs its factory under the lock so two requests racing on the same
//! key cannot both spawn an editor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::editor::error::SessionError;
use crate::editor::session::EditorSession;

/// Shared key -> session map, cheap to clone into handler state
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, Arc<EditorSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an existing session or create a new one
    ///
    /// An absent key always creates. A supplied key that is not in the
    /// map (evicted or never existed) logs a warning and falls open to
    /// creating a fresh session rather than failing the client. Newly
    /// created sessions are indexed under their own temp file path.
    pub fn find_or_create<F>(
        &self,
        key: Option<&str>,
        factory: F,
    ) -> Result<Arc<EditorSession>, SessionError>
    where
        F: FnOnce() -> Result<EditorSession, SessionError>,
    {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let mut sessions = self.sessions.lock().unwrap();
        debug!("there are {} active editors", sessions.len());

        if let Some(key) = key {
            if let Some(existing) = sessions.get(key) {
                debug!("reusing editor for file: {}", key);
                return Ok(Arc::clone(existing));
            }
            warn!(
                "Could not find existing editor - creating new one for key: {}",
                key
            );
        }

        let session = Arc::new(factory()?);
        sessions.insert(session.key(), Arc::clone(&session));
        Ok(session)
    }

    /// Remove a session, called by the task that observed its exit
    pub fn remove(&self, key: &str) {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let removed = self.sessions.lock().unwrap().remove(key);
        debug!(
            "removed session for {}: {}",
            key,
            if removed.is_some() { "found" } else { "already gone" }
        );
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================

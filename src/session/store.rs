//! Session store: lookup, double-checked creation, expiry.
//!
//! Concurrent requests addressing the same conversation are serialized by the
//! per-session mutex, held by the sequencer for the entire phase sequence.
//! Creation of a new conversation uses double-checked locking keyed by the
//! conversation path so concurrent first hits create exactly one session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use super::PortSession;

/// Shared handle to a locked session.
pub type SessionHandle = Arc<Mutex<PortSession>>;

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Server-side session storage, one entry per conversation path.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    lifetime: Duration,
    callback_prefix: String,
}

impl SessionStore {
    /// Create a store with the given idle lifetime.
    pub fn new(lifetime: Duration, callback_prefix: impl Into<String>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            lifetime,
            callback_prefix: callback_prefix.into(),
        }
    }

    /// The configured idle lifetime.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Look up the session for a path, creating it on first hit.
    ///
    /// Fast path: a read lock and a clone of the handle. Miss: take the write
    /// lock and check again before inserting, so two concurrent first hits
    /// agree on one session.
    pub fn obtain(&self, path: &str) -> SessionHandle {
        {
            let sessions = self.sessions.read().unwrap_or_else(|p| p.into_inner());
            if let Some(handle) = sessions.get(path) {
                return Arc::clone(handle);
            }
        }
        let mut sessions = self.sessions.write().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = sessions.get(path) {
            return Arc::clone(handle);
        }
        tracing::info!(path, "session created");
        let handle = Arc::new(Mutex::new(PortSession::new(
            path,
            self.callback_prefix.clone(),
        )));
        sessions.insert(path.to_owned(), Arc::clone(&handle));
        handle
    }

    /// The session for a path, if one exists. Never creates.
    pub fn peek(&self, path: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(path)
            .map(Arc::clone)
    }

    /// Explicitly destroy a session.
    pub fn invalidate(&self, path: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(path)
            .is_some();
        if removed {
            tracing::info!(path, "session invalidated");
        }
        removed
    }

    /// Remaining lifetime for a path's session, `None` if absent. Zero means
    /// expired but not yet swept.
    pub fn remaining_lifetime(&self, path: &str, now: Instant) -> Option<Duration> {
        let handle = self.peek(path)?;
        let session = handle.lock().unwrap_or_else(|p| p.into_inner());
        Some(self.lifetime.saturating_sub(session.idle_for(now)))
    }

    /// Drop every session idle past the lifetime. Sessions currently locked
    /// by a dispatch are in use and kept. Returns the number removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(|p| p.into_inner());
        let before = sessions.len();
        let lifetime = self.lifetime;
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => session.idle_for(now) <= lifetime,
            Err(_) => true,
        });
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!(removed, "expired sessions swept");
        }
        removed
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(60), "")
    }

    #[test]
    fn obtain_creates_once() {
        let store = store();
        assert!(store.is_empty());
        let a = store.obtain("/p");
        let b = store.obtain("/p");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn obtain_separates_paths() {
        let store = store();
        let a = store.obtain("/a");
        let b = store.obtain("/b");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn peek_never_creates() {
        let store = store();
        assert!(store.peek("/p").is_none());
        store.obtain("/p");
        assert!(store.peek("/p").is_some());
    }

    #[test]
    fn invalidate_removes() {
        let store = store();
        store.obtain("/p");
        assert!(store.invalidate("/p"));
        assert!(!store.invalidate("/p"));
        assert!(store.peek("/p").is_none());
    }

    #[test]
    fn concurrent_first_hits_agree() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || store.obtain("/p")));
        }
        let sessions: Vec<SessionHandle> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for session in &sessions[1..] {
            assert!(Arc::ptr_eq(&sessions[0], session));
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remaining_lifetime_counts_down() {
        let store = SessionStore::new(Duration::from_millis(100), "");
        let handle = store.obtain("/p");
        let now = Instant::now();
        handle
            .lock()
            .unwrap()
            .touch(now);
        let remaining = store
            .remaining_lifetime("/p", now + Duration::from_millis(40))
            .unwrap();
        assert!(remaining <= Duration::from_millis(60));
        assert_eq!(store.remaining_lifetime("/missing", now), None);
    }

    #[test]
    fn sweep_removes_idle_sessions() {
        let store = SessionStore::new(Duration::from_millis(10), "");
        let handle = store.obtain("/old");
        let now = Instant::now();
        handle.lock().unwrap().touch(now);
        let removed = store.sweep(now + Duration::from_millis(50));
        assert_eq!(removed, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_keeps_fresh_sessions() {
        let store = SessionStore::new(Duration::from_secs(60), "");
        let handle = store.obtain("/fresh");
        let now = Instant::now();
        handle.lock().unwrap().touch(now);
        assert_eq!(store.sweep(now + Duration::from_secs(1)), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sweep_skips_locked_sessions() {
        let store = SessionStore::new(Duration::from_millis(10), "");
        let handle = store.obtain("/busy");
        let now = Instant::now();
        handle.lock().unwrap().touch(now);
        let guard = handle.lock().unwrap();
        assert_eq!(store.sweep(now + Duration::from_secs(5)), 0);
        drop(guard);
        assert_eq!(store.sweep(now + Duration::from_secs(5)), 1);
    }
}

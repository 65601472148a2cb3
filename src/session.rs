//! Viewer sessions for Agora.
//!
//! A session carries the viewer's identity (if logged in) and the threads the
//! viewer has already opened, so a thread's view counter moves once per
//! session.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::member::Identity;

/// Per-viewer context consulted by services.
pub trait ViewerSession: Send + Sync {
    /// The logged-in viewer, None for anonymous visitors.
    fn current_identity(&self) -> Option<Identity>;

    /// Whether this session has already opened the thread.
    fn has_seen(&self, thread_id: i64) -> bool;

    /// Remember the thread as opened. Returns true when it was not seen before.
    fn mark_seen(&self, thread_id: i64) -> bool;
}

/// In-process session.
#[derive(Debug)]
pub struct MemorySession {
    /// Unique session key (UUID v4).
    pub key: String,
    pub created_at: DateTime<Utc>,
    identity: Mutex<Option<Identity>>,
    seen_threads: Mutex<HashSet<i64>>,
}

impl MemorySession {
    /// Create an anonymous session.
    pub fn anonymous() -> Self {
        Self {
            key: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            identity: Mutex::new(None),
            seen_threads: Mutex::new(HashSet::new()),
        }
    }

    /// Create a session for a logged-in member.
    pub fn for_identity(identity: Identity) -> Self {
        let session = Self::anonymous();
        *lock(&session.identity) = Some(identity);
        session
    }

    /// Attach an identity after login.
    pub fn login(&self, identity: Identity) {
        *lock(&self.identity) = Some(identity);
    }

    /// Drop the identity; seen threads are kept.
    pub fn logout(&self) {
        *lock(&self.identity) = None;
    }

    pub fn seen_count(&self) -> usize {
        lock(&self.seen_threads).len()
    }
}

impl ViewerSession for MemorySession {
    fn current_identity(&self) -> Option<Identity> {
        lock(&self.identity).clone()
    }

    fn has_seen(&self, thread_id: i64) -> bool {
        lock(&self.seen_threads).contains(&thread_id)
    }

    fn mark_seen(&self, thread_id: i64) -> bool {
        lock(&self.seen_threads).insert(thread_id)
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

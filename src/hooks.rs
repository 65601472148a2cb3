//! Extension points for Agora.
//!
//! Observers are told about committed writes. They run after the transaction
//! that made the change, in registration order; a failing observer is logged
//! and skipped.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::forum::{ForumThread, Post};
use crate::member::Member;
use crate::Result;

/// Receives forum and member events.
#[async_trait]
pub trait ForumObserver: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str {
        "observer"
    }

    async fn on_thread_created(&self, _thread: &ForumThread, _first_post: &Post) -> Result<()> {
        Ok(())
    }

    /// Called for every new post, whatever its status.
    async fn on_post_created(&self, _post: &Post, _thread: &ForumThread) -> Result<()> {
        Ok(())
    }

    /// Called when an awaiting post is approved.
    async fn on_post_published(&self, _post: &Post, _thread: &ForumThread) -> Result<()> {
        Ok(())
    }

    async fn on_post_edited(&self, _post: &Post, _thread: &ForumThread) -> Result<()> {
        Ok(())
    }

    async fn on_post_deleted(&self, _post: &Post) -> Result<()> {
        Ok(())
    }

    async fn on_thread_deleted(&self, _thread: &ForumThread) -> Result<()> {
        Ok(())
    }

    async fn on_member_registered(&self, _member: &Member) -> Result<()> {
        Ok(())
    }

    async fn on_profile_updated(&self, _member: &Member) -> Result<()> {
        Ok(())
    }
}

/// Ordered list of observers.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn ForumObserver>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer; it runs after those already registered.
    pub fn register(&mut self, observer: Arc<dyn ForumObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub async fn thread_created(&self, thread: &ForumThread, first_post: &Post) {
        for observer in &self.observers {
            let result = observer.on_thread_created(thread, first_post).await;
            log_failure(observer.as_ref(), "thread_created", result);
        }
    }

    pub async fn post_created(&self, post: &Post, thread: &ForumThread) {
        for observer in &self.observers {
            let result = observer.on_post_created(post, thread).await;
            log_failure(observer.as_ref(), "post_created", result);
        }
    }

    pub async fn post_published(&self, post: &Post, thread: &ForumThread) {
        for observer in &self.observers {
            let result = observer.on_post_published(post, thread).await;
            log_failure(observer.as_ref(), "post_published", result);
        }
    }

    pub async fn post_edited(&self, post: &Post, thread: &ForumThread) {
        for observer in &self.observers {
            let result = observer.on_post_edited(post, thread).await;
            log_failure(observer.as_ref(), "post_edited", result);
        }
    }

    pub async fn post_deleted(&self, post: &Post) {
        for observer in &self.observers {
            let result = observer.on_post_deleted(post).await;
            log_failure(observer.as_ref(), "post_deleted", result);
        }
    }

    pub async fn thread_deleted(&self, thread: &ForumThread) {
        for observer in &self.observers {
            let result = observer.on_thread_deleted(thread).await;
            log_failure(observer.as_ref(), "thread_deleted", result);
        }
    }

    pub async fn member_registered(&self, member: &Member) {
        for observer in &self.observers {
            let result = observer.on_member_registered(member).await;
            log_failure(observer.as_ref(), "member_registered", result);
        }
    }

    pub async fn profile_updated(&self, member: &Member) {
        for observer in &self.observers {
            let result = observer.on_profile_updated(member).await;
            log_failure(observer.as_ref(), "profile_updated", result);
        }
    }
}

fn log_failure(observer: &dyn ForumObserver, event: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!(observer = observer.name(), event, error = %e, "Observer failed");
    }
}

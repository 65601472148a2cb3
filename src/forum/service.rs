//! Forum service for Agora.
//!
//! High-level thread and post operations with access checks, transactional
//! first-post maintenance, cascade deletes and observer notification.
//! Denied writes fail with a permission error; reads of things the viewer
//! may not see fail as not found.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::attachment::{AttachmentRepository, AttachmentStore, NewAttachment, PostAttachment};
use super::post::{show_link, NewPost, Post, PostStatus};
use super::post_repository::{ForumStats, PostRepository, PostVisibility, RecentPostsFilter};
use super::repository::ForumRepository;
use super::thread::{ForumThread, NewThread, ThreadUpdate};
use super::thread_repository::{Popularity, ThreadRepository};
use super::types::{Forum, ForumHolder};
use crate::access::{AccessEvaluator, ForumScope, PostScope, ThreadScope};
use crate::config::{AttachmentsConfig, ForumConfig};
use crate::db::{Database, DbTransaction, SQL_NOW};
use crate::hooks::ObserverRegistry;
use crate::member::{ForumStatus, Identity, MemberRepository};
use crate::render::{censor, renderer_for};
use crate::session::ViewerSession;
use crate::{AgoraError, Result};

/// Number of threads in the popular listing.
pub const POPULAR_LIMIT: i64 = 20;

/// Number of posts in a member's latest posts listing.
pub const MEMBER_LATEST_LIMIT: i64 = 10;

/// Pagination parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pagination {
    /// Number of items to skip.
    pub offset: i64,
    /// Maximum number of items to return.
    pub limit: i64,
}

impl Pagination {
    /// Create new pagination parameters.
    pub fn new(offset: i64, limit: i64) -> Self {
        Self { offset, limit }
    }

    /// Create pagination for the first page with given limit.
    pub fn first(limit: i64) -> Self {
        Self { offset: 0, limit }
    }
}

/// Result of a paginated query.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    /// The items in this page.
    pub items: Vec<T>,
    /// Total number of items (across all pages).
    pub total: i64,
    /// Current offset.
    pub offset: i64,
    /// Limit used for this query.
    pub limit: i64,
}

impl<T> PaginatedResult<T> {
    /// Check if there are more items after this page.
    pub fn has_more(&self) -> bool {
        self.offset + (self.items.len() as i64) < self.total
    }

    /// Get the next page pagination, or None if no more pages.
    pub fn next_page(&self) -> Option<Pagination> {
        if self.has_more() {
            Some(Pagination::new(self.offset + self.limit, self.limit))
        } else {
            None
        }
    }
}

/// A forum loaded with its holder.
struct ForumContext {
    forum: Forum,
    holder: Option<ForumHolder>,
}

impl ForumContext {
    fn scope(&self) -> ForumScope<'_> {
        ForumScope::new(&self.forum, self.holder.as_ref())
    }
}

/// A thread loaded with its forum and holder.
struct ThreadContext {
    forum: ForumContext,
    thread: ForumThread,
}

impl ThreadContext {
    fn scope(&self) -> ThreadScope<'_> {
        ThreadScope::new(&self.thread, self.forum.scope())
    }
}

/// Service for thread and post operations.
pub struct ForumService<'a> {
    db: &'a Database,
    settings: ForumConfig,
    evaluator: AccessEvaluator,
    observers: ObserverRegistry,
    store: Option<&'a dyn AttachmentStore>,
    max_attachment_bytes: u64,
}

impl<'a> ForumService<'a> {
    /// Create a new ForumService evaluating access on today's date in the
    /// configured timezone.
    pub fn new(db: &'a Database, settings: &ForumConfig) -> Self {
        Self {
            db,
            settings: settings.clone(),
            evaluator: AccessEvaluator::today(&settings.timezone),
            observers: ObserverRegistry::new(),
            store: None,
            max_attachment_bytes: AttachmentsConfig::default().max_size_mb * 1024 * 1024,
        }
    }

    /// Use a specific evaluator (e.g. pinned to a date).
    pub fn with_evaluator(mut self, evaluator: AccessEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_observers(mut self, observers: ObserverRegistry) -> Self {
        self.observers = observers;
        self
    }

    /// Enable attachments backed by `store`.
    pub fn with_attachments(mut self, store: &'a dyn AttachmentStore, config: &AttachmentsConfig) -> Self {
        self.store = Some(store);
        self.max_attachment_bytes = config.max_size_mb * 1024 * 1024;
        self
    }

    pub fn evaluator(&self) -> AccessEvaluator {
        self.evaluator
    }

    // ========== Loading ==========

    async fn load_forum(&self, forum_id: i64) -> Result<ForumContext> {
        let repo = ForumRepository::new(self.db.pool());
        let forum = repo
            .get_by_id(forum_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("forum".to_string()))?;
        let holder = match forum.holder_id {
            Some(holder_id) => repo.get_holder(holder_id).await?,
            None => None,
        };
        Ok(ForumContext { forum, holder })
    }

    async fn load_thread(&self, thread_id: i64) -> Result<ThreadContext> {
        let thread = ThreadRepository::new(self.db.pool())
            .get_by_id(thread_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("thread".to_string()))?;
        let forum = self.load_forum(thread.forum_id).await?;
        Ok(ThreadContext { forum, thread })
    }

    async fn load_post(&self, post_id: i64) -> Result<(Post, ThreadContext, ForumStatus)> {
        let post = PostRepository::new(self.db.pool())
            .get_by_id(post_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("post".to_string()))?;
        let ctx = self.load_thread(post.thread_id).await?;
        let status = self.author_status(&post).await?;
        Ok((post, ctx, status))
    }

    /// Standing of the post's author; deleted authors count as normal.
    async fn author_status(&self, post: &Post) -> Result<ForumStatus> {
        let Some(author_id) = post.author_id else {
            return Ok(ForumStatus::Normal);
        };
        Ok(MemberRepository::new(self.db.pool())
            .get_by_id(author_id)
            .await?
            .map(|m| m.forum_status)
            .unwrap_or_default())
    }

    // ========== Reads ==========

    /// Get a forum the viewer may see.
    pub async fn get_forum(&self, forum_id: i64, who: Option<&Identity>) -> Result<Forum> {
        let ctx = self.load_forum(forum_id).await?;
        if !self.evaluator.can_view(ctx.scope(), who) {
            return Err(AgoraError::NotFound("forum".to_string()));
        }
        Ok(ctx.forum)
    }

    /// Get a thread the viewer may see.
    pub async fn get_thread(&self, thread_id: i64, who: Option<&Identity>) -> Result<ForumThread> {
        let ctx = self.load_thread(thread_id).await?;
        if !self.evaluator.can_view_thread(ctx.scope(), who) {
            return Err(AgoraError::NotFound("thread".to_string()));
        }
        Ok(ctx.thread)
    }

    /// Get a post the viewer may see.
    pub async fn get_post(&self, post_id: i64, who: Option<&Identity>) -> Result<Post> {
        let (post, ctx, status) = self.load_post(post_id).await?;
        if !self
            .evaluator
            .can_view_post(PostScope::new(&post, status, ctx.scope()), who)
        {
            return Err(AgoraError::NotFound("post".to_string()));
        }
        Ok(post)
    }

    /// Count a thread view once per viewer session.
    ///
    /// Returns true when the counter moved.
    pub async fn record_view(&self, thread_id: i64, session: &dyn ViewerSession) -> Result<bool> {
        let identity = session.current_identity();
        let ctx = self.load_thread(thread_id).await?;
        if !self.evaluator.can_view_thread(ctx.scope(), identity.as_ref()) {
            return Err(AgoraError::NotFound("thread".to_string()));
        }

        if !session.mark_seen(thread_id) {
            return Ok(false);
        }
        ThreadRepository::new(self.db.pool())
            .increment_views(thread_id)
            .await
    }

    /// Posts of a thread, oldest first.
    ///
    /// Moderators also see posts awaiting approval. Posts by banned or
    /// ghosted members are hidden, except a ghost's own posts from the ghost.
    pub async fn list_posts(
        &self,
        thread_id: i64,
        who: Option<&Identity>,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Post>> {
        let ctx = self.load_thread(thread_id).await?;
        if !self.evaluator.can_view_thread(ctx.scope(), who) {
            return Err(AgoraError::NotFound("thread".to_string()));
        }

        let visibility = PostVisibility {
            include_awaiting: self.evaluator.can_see_awaiting(&ctx.forum.forum, who),
            viewer_id: who.map(|i| i.member_id),
        };
        let repo = PostRepository::new(self.db.pool());
        let items = repo
            .list_by_thread(thread_id, visibility, pagination.offset, pagination.limit)
            .await?;
        let total = repo.count_by_thread(thread_id, visibility).await?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    /// Page size for a forum's thread listings.
    pub fn page_size(&self, forum: &Forum) -> i64 {
        forum.page_size(self.settings.posts_per_page)
    }

    /// Link to a post within its paginated thread.
    pub async fn post_link(&self, post: &Post) -> Result<String> {
        let ctx = self.load_thread(post.thread_id).await?;
        let rank = PostRepository::new(self.db.pool()).rank(post).await?;
        Ok(show_link(
            &ctx.thread.link(),
            post.id,
            rank,
            self.page_size(&ctx.forum.forum),
        ))
    }

    /// The first post of a thread, if the viewer may see it.
    pub async fn first_post(&self, thread_id: i64, who: Option<&Identity>) -> Result<Option<Post>> {
        let ctx = self.load_thread(thread_id).await?;
        if !self.evaluator.can_view_thread(ctx.scope(), who) {
            return Err(AgoraError::NotFound("thread".to_string()));
        }
        let Some(post) = PostRepository::new(self.db.pool())
            .first_post(thread_id)
            .await?
        else {
            return Ok(None);
        };
        let status = self.author_status(&post).await?;
        let visible = self
            .evaluator
            .can_view_post(PostScope::new(&post, status, ctx.scope()), who);
        Ok(visible.then_some(post))
    }

    /// The latest published post of a thread, if the viewer may see it.
    pub async fn latest_post(&self, thread_id: i64, who: Option<&Identity>) -> Result<Option<Post>> {
        let ctx = self.load_thread(thread_id).await?;
        if !self.evaluator.can_view_thread(ctx.scope(), who) {
            return Err(AgoraError::NotFound("thread".to_string()));
        }
        let Some(post) = PostRepository::new(self.db.pool())
            .latest_post(thread_id)
            .await?
        else {
            return Ok(None);
        };
        let status = self.author_status(&post).await?;
        let visible = self
            .evaluator
            .can_view_post(PostScope::new(&post, status, ctx.scope()), who);
        Ok(visible.then_some(post))
    }

    /// Non-sticky threads of a forum, most recently answered first.
    pub async fn list_topics(
        &self,
        forum_id: i64,
        who: Option<&Identity>,
        pagination: Pagination,
    ) -> Result<PaginatedResult<ForumThread>> {
        self.get_forum(forum_id, who).await?;

        let repo = ThreadRepository::new(self.db.pool());
        let items = repo
            .list_topics(forum_id, pagination.offset, pagination.limit)
            .await?;
        let total = repo.count_topics(forum_id).await?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    /// Sticky threads of a forum, optionally with its holder's global stickies.
    pub async fn sticky_topics(
        &self,
        forum_id: i64,
        who: Option<&Identity>,
        include_global: bool,
    ) -> Result<Vec<ForumThread>> {
        self.get_forum(forum_id, who).await?;
        let threads = ThreadRepository::new(self.db.pool())
            .sticky_topics(forum_id, include_global)
            .await?;
        self.visible_threads(threads, who).await
    }

    /// Global sticky threads of a holder the viewer may see.
    pub async fn global_announcements(
        &self,
        holder_id: i64,
        who: Option<&Identity>,
    ) -> Result<Vec<ForumThread>> {
        let threads = ThreadRepository::new(self.db.pool())
            .global_announcements(holder_id)
            .await?;
        self.visible_threads(threads, who).await
    }

    /// Most popular threads of a forum.
    pub async fn popular_threads(
        &self,
        forum_id: i64,
        who: Option<&Identity>,
        by: Popularity,
    ) -> Result<Vec<ForumThread>> {
        self.get_forum(forum_id, who).await?;
        ThreadRepository::new(self.db.pool())
            .popular(forum_id, by, POPULAR_LIMIT)
            .await
    }

    /// Newest published posts matching the filter that the viewer may see.
    pub async fn recent_posts(
        &self,
        filter: RecentPostsFilter,
        who: Option<&Identity>,
    ) -> Result<Vec<Post>> {
        let posts = PostRepository::new(self.db.pool())
            .recent_posts(filter)
            .await?;

        let mut visible_forums: HashMap<i64, bool> = HashMap::new();
        let mut visible = Vec::with_capacity(posts.len());
        for post in posts {
            if self.forum_visible(post.forum_id, who, &mut visible_forums).await? {
                visible.push(post);
            }
        }
        Ok(visible)
    }

    /// A member's latest posts, as seen by the viewer.
    pub async fn member_latest_posts(
        &self,
        member_id: i64,
        who: Option<&Identity>,
    ) -> Result<Vec<Post>> {
        let Some(member) = MemberRepository::new(self.db.pool())
            .get_by_id(member_id)
            .await?
        else {
            return Err(AgoraError::NotFound("member".to_string()));
        };
        let posts = PostRepository::new(self.db.pool())
            .member_latest_posts(member_id, MEMBER_LATEST_LIMIT)
            .await?;

        let mut contexts: HashMap<i64, ThreadContext> = HashMap::new();
        let mut visible = Vec::with_capacity(posts.len());
        for post in posts {
            if !contexts.contains_key(&post.thread_id) {
                let ctx = self.load_thread(post.thread_id).await?;
                contexts.insert(post.thread_id, ctx);
            }
            let Some(ctx) = contexts.get(&post.thread_id) else {
                continue;
            };
            let scope = PostScope::new(&post, member.forum_status, ctx.scope());
            if self.evaluator.can_view_post(scope, who) {
                visible.push(post);
            }
        }
        Ok(visible)
    }

    /// Statistics of a forum, counting posts by normal authors only.
    pub async fn forum_stats(&self, forum_id: i64, who: Option<&Identity>) -> Result<ForumStats> {
        self.get_forum(forum_id, who).await?;
        PostRepository::new(self.db.pool()).forum_stats(forum_id).await
    }

    /// Statistics of a holder, counting posts by normal authors only.
    pub async fn holder_stats(&self, holder_id: i64) -> Result<ForumStats> {
        ForumRepository::new(self.db.pool())
            .get_holder(holder_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("forum holder".to_string()))?;
        PostRepository::new(self.db.pool()).holder_stats(holder_id).await
    }

    async fn visible_threads(
        &self,
        threads: Vec<ForumThread>,
        who: Option<&Identity>,
    ) -> Result<Vec<ForumThread>> {
        let mut visible_forums: HashMap<i64, bool> = HashMap::new();
        let mut visible = Vec::with_capacity(threads.len());
        for thread in threads {
            if self
                .forum_visible(thread.forum_id, who, &mut visible_forums)
                .await?
            {
                visible.push(thread);
            }
        }
        Ok(visible)
    }

    async fn forum_visible(
        &self,
        forum_id: i64,
        who: Option<&Identity>,
        cache: &mut HashMap<i64, bool>,
    ) -> Result<bool> {
        if let Some(visible) = cache.get(&forum_id) {
            return Ok(*visible);
        }
        let ctx = self.load_forum(forum_id).await?;
        let visible = self.evaluator.can_view(ctx.scope(), who);
        cache.insert(forum_id, visible);
        Ok(visible)
    }

    // ========== Writes ==========

    /// Start a thread with its first post.
    pub async fn create_thread(
        &self,
        forum_id: i64,
        who: Option<&Identity>,
        title: &str,
        content: &str,
    ) -> Result<(ForumThread, Post)> {
        self.validate_title(title)?;
        self.validate_body(content)?;

        let ctx = self.load_forum(forum_id).await?;
        if !self.evaluator.can_view(ctx.scope(), who) {
            return Err(AgoraError::NotFound("forum".to_string()));
        }
        if !self.evaluator.can_post(ctx.scope(), who) {
            return Err(AgoraError::Permission(
                "cannot start a thread in this forum".to_string(),
            ));
        }

        let new_thread = NewThread::new(forum_id, title.trim());
        let status = self.initial_status(&ctx.forum, who);

        let mut tx = self.db.begin_write().await?;

        let thread_id: i64 =
            sqlx::query_scalar("INSERT INTO threads (forum_id, title) VALUES (?, ?) RETURNING id")
                .bind(new_thread.forum_id)
                .bind(&new_thread.title)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| AgoraError::Database(e.to_string()))?;

        let new_post = NewPost::new(thread_id, who.map(|i| i.member_id), content).with_status(status);
        let post_id = insert_post(&mut tx, &new_post, forum_id).await?;

        tx.commit()
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        let thread = ThreadRepository::new(self.db.pool())
            .get_by_id(thread_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("thread".to_string()))?;
        let post = PostRepository::new(self.db.pool())
            .get_by_id(post_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("post".to_string()))?;

        info!(thread_id, post_id, forum_id, "Thread created");
        self.observers.thread_created(&thread, &post).await;
        self.observers.post_created(&post, &thread).await;

        Ok((thread, post))
    }

    /// Add a post to a thread.
    pub async fn reply(&self, thread_id: i64, who: Option<&Identity>, content: &str) -> Result<Post> {
        self.validate_body(content)?;

        let ctx = self.load_thread(thread_id).await?;
        if !self.evaluator.can_view_thread(ctx.scope(), who) {
            return Err(AgoraError::NotFound("thread".to_string()));
        }
        if !self.evaluator.can_create_post(ctx.scope(), who) {
            return Err(AgoraError::Permission(
                "cannot post in this thread".to_string(),
            ));
        }

        let new_post = NewPost::new(thread_id, who.map(|i| i.member_id), content)
            .with_status(self.initial_status(&ctx.forum.forum, who));

        let mut tx = self.db.begin_write().await?;
        let post_id = insert_post(&mut tx, &new_post, ctx.thread.forum_id).await?;

        let touch_sql = format!("UPDATE threads SET updated_at = {SQL_NOW} WHERE id = ?");
        sqlx::query(&touch_sql)
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        let post = PostRepository::new(self.db.pool())
            .get_by_id(post_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("post".to_string()))?;

        debug!(thread_id, post_id, status = %post.status, "Reply posted");
        self.observers.post_created(&post, &ctx.thread).await;

        Ok(post)
    }

    /// Replace a post's content.
    pub async fn edit_post(&self, post_id: i64, who: Option<&Identity>, content: &str) -> Result<Post> {
        self.validate_body(content)?;

        let (post, ctx, status) = self.load_post(post_id).await?;
        let scope = PostScope::new(&post, status, ctx.scope());
        if !self.evaluator.can_view_post(scope, who) {
            return Err(AgoraError::NotFound("post".to_string()));
        }
        if !self.evaluator.can_edit_post(scope, who) {
            return Err(AgoraError::Permission("cannot edit this post".to_string()));
        }

        let post = PostRepository::new(self.db.pool())
            .update_content(post_id, content)
            .await?
            .ok_or_else(|| AgoraError::NotFound("post".to_string()))?;

        self.observers.post_edited(&post, &ctx.thread).await;
        Ok(post)
    }

    /// Delete a post with its attachments.
    ///
    /// When the first post goes, the next lowest post becomes first.
    pub async fn delete_post(&self, post_id: i64, who: Option<&Identity>) -> Result<()> {
        let (post, ctx, status) = self.load_post(post_id).await?;
        if !self
            .evaluator
            .can_delete_post(PostScope::new(&post, status, ctx.scope()), who)
        {
            return Err(AgoraError::Permission("cannot delete this post".to_string()));
        }

        let mut tx = self.db.begin_write().await?;

        let stored_names: Vec<String> =
            sqlx::query_scalar("SELECT stored_name FROM post_attachments WHERE post_id = ?")
                .bind(post_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| AgoraError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM post_attachments WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        if post.is_first_post {
            sqlx::query(
                "UPDATE posts SET is_first_post = 1
                 WHERE id = (SELECT MIN(id) FROM posts WHERE thread_id = ?)",
            )
            .bind(post.thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        self.release_files(&stored_names);
        info!(post_id, thread_id = post.thread_id, "Post deleted");
        self.observers.post_deleted(&post).await;
        Ok(())
    }

    /// Delete a thread with its posts, attachments and subscriptions.
    pub async fn delete_thread(&self, thread_id: i64, who: Option<&Identity>) -> Result<()> {
        let ctx = self.load_thread(thread_id).await?;
        if !self.evaluator.can_delete_thread(ctx.scope(), who) {
            return Err(AgoraError::Permission(
                "cannot delete this thread".to_string(),
            ));
        }

        let mut tx = self.db.begin_write().await?;

        let stored_names: Vec<String> = sqlx::query_scalar(
            "SELECT a.stored_name FROM post_attachments a
             JOIN posts p ON p.id = a.post_id
             WHERE p.thread_id = ?",
        )
        .bind(thread_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;

        let statements = [
            "DELETE FROM post_attachments WHERE post_id IN (SELECT id FROM posts WHERE thread_id = ?)",
            "DELETE FROM posts WHERE thread_id = ?",
            "DELETE FROM thread_subscriptions WHERE thread_id = ?",
            "DELETE FROM threads WHERE id = ?",
        ];
        for sql in statements {
            sqlx::query(sql)
                .bind(thread_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| AgoraError::Database(e.to_string()))?;
        }

        let orphans: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM posts WHERE thread_id = ?)
                  + (SELECT COUNT(*) FROM thread_subscriptions WHERE thread_id = ?)
                  + (SELECT COUNT(*) FROM post_attachments
                     WHERE post_id NOT IN (SELECT id FROM posts))",
        )
        .bind(thread_id)
        .bind(thread_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;

        if orphans > 0 {
            warn!(thread_id, orphans, "Thread delete left orphans, rolling back");
            tx.rollback()
                .await
                .map_err(|e| AgoraError::Database(e.to_string()))?;
            return Err(AgoraError::Integrity(format!(
                "{orphans} rows left behind by thread {thread_id}"
            )));
        }

        tx.commit()
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        self.release_files(&stored_names);
        info!(thread_id, forum_id = ctx.thread.forum_id, "Thread deleted");
        self.observers.thread_deleted(&ctx.thread).await;
        Ok(())
    }

    /// Move a thread, and every post's forum reference, to another forum.
    ///
    /// The viewer must moderate both forums.
    pub async fn move_thread(
        &self,
        thread_id: i64,
        target_forum_id: i64,
        who: Option<&Identity>,
    ) -> Result<ForumThread> {
        let ctx = self.load_thread(thread_id).await?;
        let target = self.load_forum(target_forum_id).await?;
        if !self.evaluator.can_edit_thread(ctx.scope(), who)
            || !self.evaluator.can_moderate(&target.forum, who)
        {
            return Err(AgoraError::Permission("cannot move this thread".to_string()));
        }

        let mut tx = self.db.begin_write().await?;

        let move_sql = format!("UPDATE threads SET forum_id = ?, updated_at = {SQL_NOW} WHERE id = ?");
        sqlx::query(&move_sql)
            .bind(target_forum_id)
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        sqlx::query("UPDATE posts SET forum_id = ? WHERE thread_id = ?")
            .bind(target_forum_id)
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        info!(thread_id, from = ctx.thread.forum_id, to = target_forum_id, "Thread moved");
        ThreadRepository::new(self.db.pool())
            .get_by_id(thread_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("thread".to_string()))
    }

    /// Update sticky, global sticky, read-only flags or the title.
    pub async fn update_thread(
        &self,
        thread_id: i64,
        who: Option<&Identity>,
        update: &ThreadUpdate,
    ) -> Result<ForumThread> {
        if let Some(ref title) = update.title {
            self.validate_title(title)?;
        }

        let ctx = self.load_thread(thread_id).await?;
        if !self.evaluator.can_edit_thread(ctx.scope(), who) {
            return Err(AgoraError::Permission("cannot edit this thread".to_string()));
        }

        ThreadRepository::new(self.db.pool())
            .update(thread_id, update)
            .await?
            .ok_or_else(|| AgoraError::NotFound("thread".to_string()))
    }

    // ========== Moderation ==========

    /// Approve, reject or archive a post.
    pub async fn set_post_status(
        &self,
        post_id: i64,
        who: Option<&Identity>,
        status: PostStatus,
    ) -> Result<Post> {
        let (post, ctx, _) = self.load_post(post_id).await?;
        if !self.evaluator.can_moderate(&ctx.forum.forum, who) {
            return Err(AgoraError::Permission("cannot moderate this post".to_string()));
        }

        let repo = PostRepository::new(self.db.pool());
        repo.set_status(post_id, status).await?;
        let updated = repo
            .get_by_id(post_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("post".to_string()))?;

        info!(post_id, from = %post.status, to = %status, "Post status changed");
        if !post.is_published() && updated.is_published() {
            self.observers.post_published(&updated, &ctx.thread).await;
        }
        Ok(updated)
    }

    /// Reject a post as spam and ghost its author.
    pub async fn mark_as_spam(&self, post_id: i64, who: Option<&Identity>) -> Result<Post> {
        let (post, ctx, status) = self.load_post(post_id).await?;
        if !self
            .evaluator
            .can_mark_as_spam(PostScope::new(&post, status, ctx.scope()), who)
        {
            return Err(AgoraError::Permission(
                "cannot mark this post as spam".to_string(),
            ));
        }

        let mut tx = self.db.begin_write().await?;

        sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(PostStatus::Rejected.as_str())
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        if let Some(author_id) = post.author_id {
            sqlx::query("UPDATE members SET forum_status = ? WHERE id = ?")
                .bind(ForumStatus::Ghost.as_str())
                .bind(author_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| AgoraError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        info!(post_id, author_id = ?post.author_id, "Post marked as spam");
        PostRepository::new(self.db.pool())
            .get_by_id(post_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("post".to_string()))
    }

    /// Ban, ghost or restore a member, as a moderator of `forum_id`.
    pub async fn set_member_status(
        &self,
        forum_id: i64,
        member_id: i64,
        who: Option<&Identity>,
        status: ForumStatus,
    ) -> Result<()> {
        self.require_moderator(forum_id, member_id, who).await?;

        if !MemberRepository::new(self.db.pool())
            .set_status(member_id, status)
            .await?
        {
            return Err(AgoraError::NotFound("member".to_string()));
        }
        info!(member_id, forum_id, status = %status, "Member status changed");
        Ok(())
    }

    /// Suspend a member until `until` (exclusive), or lift it with None.
    pub async fn suspend_member(
        &self,
        forum_id: i64,
        member_id: i64,
        who: Option<&Identity>,
        until: Option<NaiveDate>,
    ) -> Result<()> {
        self.require_moderator(forum_id, member_id, who).await?;

        if !MemberRepository::new(self.db.pool())
            .suspend_until(member_id, until)
            .await?
        {
            return Err(AgoraError::NotFound("member".to_string()));
        }
        info!(member_id, forum_id, until = ?until, "Member suspension changed");
        Ok(())
    }

    async fn require_moderator(
        &self,
        forum_id: i64,
        member_id: i64,
        who: Option<&Identity>,
    ) -> Result<()> {
        let ctx = self.load_forum(forum_id).await?;
        if !self.evaluator.can_moderate(&ctx.forum, who) {
            return Err(AgoraError::Permission(
                "cannot moderate members of this forum".to_string(),
            ));
        }
        if who.is_some_and(|i| i.member_id == member_id) {
            return Err(AgoraError::Validation(
                "moderators cannot change their own status".to_string(),
            ));
        }
        Ok(())
    }

    // ========== Content ==========

    /// Render a post to sanitized HTML with forbidden words censored.
    pub async fn render_post(&self, post: &Post) -> Result<String> {
        let ctx = self.load_forum(post.forum_id).await?;
        let mut words = self.settings.forbidden_words.clone();
        if let Some(ref holder) = ctx.holder {
            words.extend(holder.forbidden_words.iter().cloned());
        }

        let renderer = renderer_for(self.settings.content_parser)?;
        Ok(renderer.render(&censor(&post.content, &words)))
    }

    /// Store a file and attach it to a post.
    pub async fn attach_file(
        &self,
        post_id: i64,
        who: Option<&Identity>,
        file_name: &str,
        content: &[u8],
    ) -> Result<PostAttachment> {
        let store = self
            .store
            .ok_or_else(|| AgoraError::Config("attachment storage is not configured".to_string()))?;

        let (post, ctx, status) = self.load_post(post_id).await?;
        let scope = PostScope::new(&post, status, ctx.scope());
        if !self.evaluator.can_attach(&ctx.forum.forum) || !self.evaluator.can_edit_post(scope, who) {
            return Err(AgoraError::Permission(
                "cannot attach files to this post".to_string(),
            ));
        }
        if file_name.trim().is_empty() {
            return Err(AgoraError::Validation("file name is required".to_string()));
        }
        if content.len() as u64 > self.max_attachment_bytes {
            return Err(AgoraError::Validation(format!(
                "attachment exceeds {} bytes",
                self.max_attachment_bytes
            )));
        }

        let stored_name = store.save(content, file_name)?;
        let record = NewAttachment::new(post_id, &stored_name, file_name, content.len() as i64);
        match AttachmentRepository::new(self.db.pool()).create(&record).await {
            Ok(attachment) => {
                debug!(post_id, attachment_id = attachment.id, "File attached");
                Ok(attachment)
            }
            Err(e) => {
                self.release_files(&[stored_name]);
                Err(e)
            }
        }
    }

    /// Remove an attachment and its stored file.
    pub async fn delete_attachment(&self, attachment_id: i64, who: Option<&Identity>) -> Result<()> {
        let repo = AttachmentRepository::new(self.db.pool());
        let attachment = repo
            .get_by_id(attachment_id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("attachment".to_string()))?;

        let (post, ctx, status) = self.load_post(attachment.post_id).await?;
        if !self
            .evaluator
            .can_delete_attachment(PostScope::new(&post, status, ctx.scope()), who)
        {
            return Err(AgoraError::Permission(
                "cannot delete this attachment".to_string(),
            ));
        }

        repo.delete(attachment_id).await?;
        self.release_files(&[attachment.stored_name]);
        Ok(())
    }

    // ========== Helpers ==========

    fn initial_status(&self, forum: &Forum, who: Option<&Identity>) -> PostStatus {
        if self.settings.require_approval && !self.evaluator.can_moderate(forum, who) {
            PostStatus::Awaiting
        } else {
            PostStatus::Moderated
        }
    }

    fn validate_title(&self, title: &str) -> Result<()> {
        if title.trim().is_empty() {
            return Err(AgoraError::Validation("title is required".to_string()));
        }
        if title.chars().count() > self.settings.max_title_length {
            return Err(AgoraError::Validation(format!(
                "title must be at most {} characters",
                self.settings.max_title_length
            )));
        }
        Ok(())
    }

    fn validate_body(&self, body: &str) -> Result<()> {
        if body.trim().is_empty() {
            return Err(AgoraError::Validation("content is required".to_string()));
        }
        if body.chars().count() > self.settings.max_body_length {
            return Err(AgoraError::Validation(format!(
                "content must be at most {} characters",
                self.settings.max_body_length
            )));
        }
        Ok(())
    }

    /// Remove stored files after the rows pointing at them are gone.
    fn release_files(&self, stored_names: &[String]) {
        let Some(store) = self.store else {
            return;
        };
        for name in stored_names {
            if let Err(e) = store.release(name) {
                warn!(stored_name = %name, error = %e, "Failed to release attachment");
            }
        }
    }
}

/// Insert a post inside `tx`, flagging it first when the thread has no post yet.
async fn insert_post(tx: &mut DbTransaction, new_post: &NewPost, forum_id: i64) -> Result<i64> {
    sqlx::query_scalar(
        "INSERT INTO posts (thread_id, forum_id, author_id, content, status, is_first_post)
         VALUES (?, ?, ?, ?, ?, NOT EXISTS(SELECT 1 FROM posts WHERE thread_id = ?))
         RETURNING id",
    )
    .bind(new_post.thread_id)
    .bind(forum_id)
    .bind(new_post.author_id)
    .bind(&new_post.content)
    .bind(new_post.status.as_str())
    .bind(new_post.thread_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AgoraError::Database(e.to_string()))
}

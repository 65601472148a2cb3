//! Post repository for Agora.
//!
//! Inserts and first-post maintenance happen inside the service's
//! transactions; this repository covers reads and single-row updates.

use sqlx::QueryBuilder;

use super::post::{Post, PostStatus};
use crate::db::{DbPool, SQL_NOW};
use crate::{AgoraError, Result};

const POST_COLUMNS: &str = "p.id, p.thread_id, p.forum_id, p.author_id, p.content, p.status,
    p.is_first_post, p.created_at, p.last_edited";

/// Author filter shared by listings and statistics: posts by normal or
/// deleted authors.
const NORMAL_AUTHOR: &str = "(m.id IS NULL OR m.forum_status = 'normal')";

/// Which posts a listing shows to its viewer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostVisibility {
    /// Include posts waiting for approval.
    pub include_awaiting: bool,
    /// The viewing member; a ghost sees their own posts.
    pub viewer_id: Option<i64>,
}

/// Filter for the recent posts listing.
#[derive(Debug, Clone, Copy)]
pub struct RecentPostsFilter {
    pub limit: i64,
    pub forum_id: Option<i64>,
    pub thread_id: Option<i64>,
    /// Only posts with a greater ID.
    pub after_id: Option<i64>,
}

impl RecentPostsFilter {
    pub fn new(limit: i64) -> Self {
        Self {
            limit,
            forum_id: None,
            thread_id: None,
            after_id: None,
        }
    }

    pub fn in_forum(mut self, forum_id: i64) -> Self {
        self.forum_id = Some(forum_id);
        self
    }

    pub fn in_thread(mut self, thread_id: i64) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn after(mut self, post_id: i64) -> Self {
        self.after_id = Some(post_id);
        self
    }
}

/// Post, topic and author counts of a forum or holder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct ForumStats {
    pub num_posts: i64,
    pub num_topics: i64,
    pub num_authors: i64,
}

/// Repository for post reads and updates.
pub struct PostRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> PostRepository<'a> {
    /// Create a new PostRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Get a post by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?");
        let row: Option<PostRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        Ok(row.map(PostRow::into_post))
    }

    /// Posts of a thread visible under `visibility`, oldest first.
    pub async fn list_by_thread(
        &self,
        thread_id: i64,
        visibility: PostVisibility,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Post>> {
        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT {POST_COLUMNS} FROM posts p LEFT JOIN members m ON m.id = p.author_id WHERE p.thread_id = "
        ));
        query.push_bind(thread_id);
        push_visibility(&mut query, visibility);
        query.push(" ORDER BY p.id ASC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let rows: Vec<PostRow> = query
            .build_query_as()
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }

    /// Count posts of a thread visible under `visibility`.
    pub async fn count_by_thread(&self, thread_id: i64, visibility: PostVisibility) -> Result<i64> {
        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT COUNT(*) FROM posts p LEFT JOIN members m ON m.id = p.author_id WHERE p.thread_id = ",
        );
        query.push_bind(thread_id);
        push_visibility(&mut query, visibility);

        let count: i64 = query
            .build_query_scalar()
            .fetch_one(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(count)
    }

    /// Number of published posts before this one in its thread.
    pub async fn rank(&self, post: &Post) -> Result<i64> {
        let rank: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM posts WHERE thread_id = ? AND id < ? AND status = 'moderated'",
        )
        .bind(post.thread_id)
        .bind(post.id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(rank)
    }

    /// The post flagged as first of its thread.
    pub async fn first_post(&self, thread_id: i64) -> Result<Option<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts p WHERE p.thread_id = ? AND p.is_first_post = 1"
        );
        let row: Option<PostRow> = sqlx::query_as(&sql)
            .bind(thread_id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        Ok(row.map(PostRow::into_post))
    }

    /// Latest published post of a thread.
    pub async fn latest_post(&self, thread_id: i64) -> Result<Option<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts p
             WHERE p.thread_id = ? AND p.status = 'moderated'
             ORDER BY p.created_at DESC, p.id DESC LIMIT 1"
        );
        let row: Option<PostRow> = sqlx::query_as(&sql)
            .bind(thread_id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        Ok(row.map(PostRow::into_post))
    }

    /// Change a post's moderation status.
    pub async fn set_status(&self, id: i64, status: PostStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace a post's content and stamp the edit time.
    pub async fn update_content(&self, id: i64, content: &str) -> Result<Option<Post>> {
        let sql = format!("UPDATE posts SET content = ?, last_edited = {SQL_NOW} WHERE id = ?");
        let result = sqlx::query(&sql)
            .bind(content)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    /// Published posts by normal authors, newest first.
    pub async fn recent_posts(&self, filter: RecentPostsFilter) -> Result<Vec<Post>> {
        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT {POST_COLUMNS} FROM posts p LEFT JOIN members m ON m.id = p.author_id
             WHERE p.status = 'moderated' AND {NORMAL_AUTHOR}"
        ));
        if let Some(forum_id) = filter.forum_id {
            query.push(" AND p.forum_id = ");
            query.push_bind(forum_id);
        }
        if let Some(thread_id) = filter.thread_id {
            query.push(" AND p.thread_id = ");
            query.push_bind(thread_id);
        }
        if let Some(after_id) = filter.after_id {
            query.push(" AND p.id > ");
            query.push_bind(after_id);
        }
        query.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        query.push_bind(filter.limit);

        let rows: Vec<PostRow> = query
            .build_query_as()
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }

    /// Latest published posts written by a member.
    pub async fn member_latest_posts(&self, member_id: i64, limit: i64) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts p
             WHERE p.author_id = ? AND p.status = 'moderated'
             ORDER BY p.created_at DESC, p.id DESC LIMIT ?"
        );
        let rows: Vec<PostRow> = sqlx::query_as(&sql)
            .bind(member_id)
            .bind(limit)
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }

    /// Statistics of a forum, counting published posts by normal authors.
    pub async fn forum_stats(&self, forum_id: i64) -> Result<ForumStats> {
        let sql = format!(
            "SELECT COUNT(p.id) AS num_posts,
                    COUNT(DISTINCT p.thread_id) AS num_topics,
                    COUNT(DISTINCT p.author_id) AS num_authors
             FROM posts p LEFT JOIN members m ON m.id = p.author_id
             WHERE p.forum_id = ? AND p.status = 'moderated' AND {NORMAL_AUTHOR}"
        );
        sqlx::query_as(&sql)
            .bind(forum_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Statistics over every forum of a holder.
    pub async fn holder_stats(&self, holder_id: i64) -> Result<ForumStats> {
        let sql = format!(
            "SELECT COUNT(p.id) AS num_posts,
                    COUNT(DISTINCT p.thread_id) AS num_topics,
                    COUNT(DISTINCT p.author_id) AS num_authors
             FROM posts p
             JOIN forums f ON f.id = p.forum_id
             LEFT JOIN members m ON m.id = p.author_id
             WHERE f.holder_id = ? AND p.status = 'moderated' AND {NORMAL_AUTHOR}"
        );
        sqlx::query_as(&sql)
            .bind(holder_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Count every post in the database.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(count)
    }
}

fn push_visibility(query: &mut QueryBuilder<'_, sqlx::Sqlite>, visibility: PostVisibility) {
    if visibility.include_awaiting {
        query.push(" AND p.status IN ('moderated', 'awaiting')");
    } else {
        query.push(" AND p.status = 'moderated'");
    }
    match visibility.viewer_id {
        Some(viewer_id) => {
            query.push(" AND (m.id IS NULL OR m.forum_status = 'normal' OR (m.id = ");
            query.push_bind(viewer_id);
            query.push(" AND m.forum_status = 'ghost'))");
        }
        None => {
            query.push(" AND ");
            query.push(NORMAL_AUTHOR);
        }
    }
}

/// Internal struct for mapping database rows to Post.
#[derive(sqlx::FromRow)]
pub(crate) struct PostRow {
    id: i64,
    thread_id: i64,
    forum_id: i64,
    author_id: Option<i64>,
    content: String,
    status: String,
    is_first_post: bool,
    created_at: String,
    last_edited: Option<String>,
}

impl PostRow {
    pub(crate) fn into_post(self) -> Post {
        Post {
            id: self.id,
            thread_id: self.thread_id,
            forum_id: self.forum_id,
            author_id: self.author_id,
            content: self.content,
            status: self.status.parse().unwrap_or_default(),
            is_first_post: self.is_first_post,
            created_at: self.created_at,
            last_edited: self.last_edited,
        }
    }
}

//! Thread repository for Agora.

use sqlx::QueryBuilder;

use super::thread::{ForumThread, NewThread, ThreadUpdate};
use crate::db::{DbPool, SQL_NOW};
use crate::{AgoraError, Result};

const THREAD_COLUMNS: &str = "t.id, t.forum_id, t.title, t.num_views, t.is_sticky,
    t.is_global_sticky, t.is_read_only, t.created_at, t.updated_at";

/// Ordering for the popular threads listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popularity {
    /// Most published posts first.
    Posts,
    /// Most views first.
    Views,
}

/// Repository for thread CRUD and listings.
pub struct ThreadRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ThreadRepository<'a> {
    /// Create a new ThreadRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new thread without posts.
    pub async fn create(&self, new_thread: &NewThread) -> Result<ForumThread> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO threads (forum_id, title) VALUES (?, ?) RETURNING id")
                .bind(new_thread.forum_id)
                .bind(&new_thread.title)
                .fetch_one(self.pool)
                .await
                .map_err(|e| AgoraError::Database(e.to_string()))?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("thread".to_string()))
    }

    /// Get a thread by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<ForumThread>> {
        let sql = format!("SELECT {THREAD_COLUMNS} FROM threads t WHERE t.id = ?");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Update moderator-controlled thread fields.
    ///
    /// Returns the updated thread, or None if not found.
    pub async fn update(&self, id: i64, update: &ThreadUpdate) -> Result<Option<ForumThread>> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE threads SET ");
        let mut separated = query.separated(", ");

        if let Some(ref title) = update.title {
            separated.push("title = ");
            separated.push_bind_unseparated(title.clone());
        }
        if let Some(sticky) = update.is_sticky {
            separated.push("is_sticky = ");
            separated.push_bind_unseparated(sticky);
        }
        if let Some(sticky) = update.is_global_sticky {
            separated.push("is_global_sticky = ");
            separated.push_bind_unseparated(sticky);
        }
        if let Some(read_only) = update.is_read_only {
            separated.push("is_read_only = ");
            separated.push_bind_unseparated(read_only);
        }
        separated.push(format!("updated_at = {SQL_NOW}"));

        query.push(" WHERE id = ");
        query.push_bind(id);

        let result = query
            .build()
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Add one view in a single statement.
    pub async fn increment_views(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE threads SET num_views = num_views + 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Non-sticky threads of a forum, most recently answered first.
    ///
    /// Threads are ordered by their latest published post's creation time,
    /// then by that post's ID; threads without a published post come last.
    pub async fn list_topics(
        &self,
        forum_id: i64,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ForumThread>> {
        let sql = format!(
            "SELECT {THREAD_COLUMNS} FROM threads t
             LEFT JOIN posts p ON p.id = (
                 SELECT id FROM posts
                 WHERE thread_id = t.id AND status = 'moderated'
                 ORDER BY created_at DESC, id DESC LIMIT 1
             )
             WHERE t.forum_id = ? AND t.is_sticky = 0 AND t.is_global_sticky = 0
             ORDER BY p.created_at IS NULL, p.created_at DESC, p.id DESC, t.id DESC
             LIMIT ? OFFSET ?"
        );
        sqlx::query_as(&sql)
            .bind(forum_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Count non-sticky threads of a forum.
    pub async fn count_topics(&self, forum_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM threads WHERE forum_id = ? AND is_sticky = 0 AND is_global_sticky = 0",
        )
        .bind(forum_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(count)
    }

    /// Sticky threads of a forum, optionally with the global stickies of its holder.
    pub async fn sticky_topics(&self, forum_id: i64, include_global: bool) -> Result<Vec<ForumThread>> {
        let sql = if include_global {
            format!(
                "SELECT {THREAD_COLUMNS} FROM threads t
                 JOIN forums f ON f.id = t.forum_id
                 WHERE (t.forum_id = ? AND (t.is_sticky = 1 OR t.is_global_sticky = 1))
                    OR (t.is_global_sticky = 1 AND f.holder_id IS NOT NULL
                        AND f.holder_id = (SELECT holder_id FROM forums WHERE id = ?))
                 ORDER BY t.is_global_sticky DESC, t.id DESC"
            )
        } else {
            format!(
                "SELECT {THREAD_COLUMNS} FROM threads t
                 WHERE t.forum_id = ? AND t.is_sticky = 1
                 ORDER BY t.id DESC"
            )
        };

        let mut query = sqlx::query_as::<_, ForumThread>(&sql).bind(forum_id);
        if include_global {
            query = query.bind(forum_id);
        }
        query
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Global sticky threads of every forum in a holder.
    pub async fn global_announcements(&self, holder_id: i64) -> Result<Vec<ForumThread>> {
        let sql = format!(
            "SELECT {THREAD_COLUMNS} FROM threads t
             JOIN forums f ON f.id = t.forum_id
             WHERE f.holder_id = ? AND t.is_global_sticky = 1
             ORDER BY t.id DESC"
        );
        sqlx::query_as(&sql)
            .bind(holder_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Most popular threads of a forum.
    pub async fn popular(
        &self,
        forum_id: i64,
        by: Popularity,
        limit: i64,
    ) -> Result<Vec<ForumThread>> {
        let sql = match by {
            Popularity::Posts => format!(
                "SELECT {THREAD_COLUMNS} FROM threads t
                 LEFT JOIN posts p ON p.thread_id = t.id AND p.status = 'moderated'
                 WHERE t.forum_id = ?
                 GROUP BY t.id
                 ORDER BY COUNT(p.id) DESC, t.id DESC
                 LIMIT ?"
            ),
            Popularity::Views => format!(
                "SELECT {THREAD_COLUMNS} FROM threads t
                 WHERE t.forum_id = ?
                 ORDER BY t.num_views DESC, t.id DESC
                 LIMIT ?"
            ),
        };
        sqlx::query_as(&sql)
            .bind(forum_id)
            .bind(limit)
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Count all threads of a forum.
    pub async fn count_by_forum(&self, forum_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM threads WHERE forum_id = ?")
            .bind(forum_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(count)
    }
}

//! Forum and holder repository for Agora.

use sqlx::QueryBuilder;

use super::types::{
    CanPostType, CanViewType, Forum, ForumCategory, ForumHolder, ForumUpdate, NewForum,
    NewForumHolder,
};
use crate::db::DbPool;
use crate::{AgoraError, Result};

const FORUM_COLUMNS: &str = "id, holder_id, category_id, title, description, can_post_type,
    can_view_type, moderator_id, can_attach_files, posts_per_page, sort_order, created_at";

/// Which side of a group policy a group list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRole {
    Poster,
    Viewer,
}

/// Repository for holders, categories and forums.
pub struct ForumRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ForumRepository<'a> {
    /// Create a new ForumRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    // ========== Holders ==========

    /// Create a new holder.
    pub async fn create_holder(&self, new_holder: &NewForumHolder) -> Result<ForumHolder> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO forum_holders (title, can_post_type, can_view_type, forbidden_words, display_signatures)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&new_holder.title)
        .bind(new_holder.can_post_type.as_str())
        .bind(new_holder.can_view_type.as_str())
        .bind(new_holder.forbidden_words.join("\n"))
        .bind(new_holder.display_signatures)
        .fetch_one(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;

        self.get_holder(id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("forum holder".to_string()))
    }

    /// Get a holder by ID, with its group lists.
    pub async fn get_holder(&self, id: i64) -> Result<Option<ForumHolder>> {
        let row: Option<HolderRow> = sqlx::query_as(
            "SELECT id, title, can_post_type, can_view_type, forbidden_words, display_signatures, created_at
             FROM forum_holders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let poster_groups = self.holder_groups(id, GroupRole::Poster).await?;
        let viewer_groups = self.holder_groups(id, GroupRole::Viewer).await?;
        Ok(Some(row.into_holder(poster_groups, viewer_groups)))
    }

    /// List all holders.
    pub async fn list_holders(&self) -> Result<Vec<ForumHolder>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM forum_holders ORDER BY id")
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        let mut holders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(holder) = self.get_holder(id).await? {
                holders.push(holder);
            }
        }
        Ok(holders)
    }

    /// Change a holder's posting policy.
    pub async fn set_holder_post_policy(&self, id: i64, policy: CanPostType) -> Result<bool> {
        let result = sqlx::query("UPDATE forum_holders SET can_post_type = ? WHERE id = ?")
            .bind(policy.as_str())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the holder's forbidden word list.
    pub async fn set_forbidden_words(&self, id: i64, words: &[String]) -> Result<bool> {
        let result = sqlx::query("UPDATE forum_holders SET forbidden_words = ? WHERE id = ?")
            .bind(words.join("\n"))
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Grant a group posting or viewing rights on a holder.
    pub async fn add_holder_group(&self, holder_id: i64, group_id: i64, role: GroupRole) -> Result<()> {
        let sql = match role {
            GroupRole::Poster => {
                "INSERT INTO holder_poster_groups (holder_id, group_id) VALUES (?, ?) ON CONFLICT DO NOTHING"
            }
            GroupRole::Viewer => {
                "INSERT INTO holder_viewer_groups (holder_id, group_id) VALUES (?, ?) ON CONFLICT DO NOTHING"
            }
        };
        sqlx::query(sql)
            .bind(holder_id)
            .bind(group_id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(())
    }

    async fn holder_groups(&self, holder_id: i64, role: GroupRole) -> Result<Vec<i64>> {
        let sql = match role {
            GroupRole::Poster => {
                "SELECT group_id FROM holder_poster_groups WHERE holder_id = ? ORDER BY group_id"
            }
            GroupRole::Viewer => {
                "SELECT group_id FROM holder_viewer_groups WHERE holder_id = ? ORDER BY group_id"
            }
        };
        sqlx::query_scalar(sql)
            .bind(holder_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))
    }

    // ========== Categories ==========

    /// Create a category in a holder.
    pub async fn create_category(
        &self,
        holder_id: i64,
        title: &str,
        stack_order: i32,
    ) -> Result<ForumCategory> {
        let category: ForumCategory = sqlx::query_as(
            "INSERT INTO forum_categories (holder_id, title, stack_order) VALUES (?, ?, ?)
             RETURNING id, holder_id, title, stack_order",
        )
        .bind(holder_id)
        .bind(title)
        .bind(stack_order.clamp(1, 99))
        .fetch_one(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(category)
    }

    /// Categories of a holder, highest stack order first.
    pub async fn list_categories(&self, holder_id: i64) -> Result<Vec<ForumCategory>> {
        sqlx::query_as(
            "SELECT id, holder_id, title, stack_order FROM forum_categories
             WHERE holder_id = ? ORDER BY stack_order DESC, id ASC",
        )
        .bind(holder_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))
    }

    // ========== Forums ==========

    /// Create a new forum.
    pub async fn create(&self, new_forum: &NewForum) -> Result<Forum> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO forums (holder_id, category_id, title, description, can_post_type, can_view_type,
                                 moderator_id, can_attach_files, posts_per_page, sort_order)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(new_forum.holder_id)
        .bind(new_forum.category_id)
        .bind(&new_forum.title)
        .bind(&new_forum.description)
        .bind(new_forum.can_post_type.as_str())
        .bind(new_forum.can_view_type.as_str())
        .bind(new_forum.moderator_id)
        .bind(new_forum.can_attach_files)
        .bind(new_forum.posts_per_page)
        .bind(new_forum.sort_order)
        .fetch_one(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("forum".to_string()))
    }

    /// Get a forum by ID, with its group lists.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Forum>> {
        let sql = format!("SELECT {FORUM_COLUMNS} FROM forums WHERE id = ?");
        let row: Option<ForumRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(self.with_groups(row).await?)),
            None => Ok(None),
        }
    }

    /// Forums of a holder, in display order.
    pub async fn list_by_holder(&self, holder_id: i64) -> Result<Vec<Forum>> {
        let sql = format!(
            "SELECT {FORUM_COLUMNS} FROM forums WHERE holder_id = ? ORDER BY sort_order ASC, id ASC"
        );
        let rows: Vec<ForumRow> = sqlx::query_as(&sql)
            .bind(holder_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        let mut forums = Vec::with_capacity(rows.len());
        for row in rows {
            forums.push(self.with_groups(row).await?);
        }
        Ok(forums)
    }

    /// Update a forum by ID.
    ///
    /// Returns the updated forum, or None if not found.
    pub async fn update(&self, id: i64, update: &ForumUpdate) -> Result<Option<Forum>> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE forums SET ");
        let mut separated = query.separated(", ");

        if let Some(ref title) = update.title {
            separated.push("title = ");
            separated.push_bind_unseparated(title.clone());
        }
        if let Some(ref description) = update.description {
            separated.push("description = ");
            separated.push_bind_unseparated(description.clone());
        }
        if let Some(policy) = update.can_post_type {
            separated.push("can_post_type = ");
            separated.push_bind_unseparated(policy.as_str());
        }
        if let Some(policy) = update.can_view_type {
            separated.push("can_view_type = ");
            separated.push_bind_unseparated(policy.as_str());
        }
        if let Some(moderator_id) = update.moderator_id {
            separated.push("moderator_id = ");
            separated.push_bind_unseparated(moderator_id);
        }
        if let Some(allowed) = update.can_attach_files {
            separated.push("can_attach_files = ");
            separated.push_bind_unseparated(allowed);
        }
        if let Some(per_page) = update.posts_per_page {
            separated.push("posts_per_page = ");
            separated.push_bind_unseparated(per_page);
        }
        if let Some(order) = update.sort_order {
            separated.push("sort_order = ");
            separated.push_bind_unseparated(order);
        }

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

    /// Delete a forum. Threads, posts and subscriptions go with it.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM forums WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Grant a group posting or viewing rights on a forum.
    pub async fn add_forum_group(&self, forum_id: i64, group_id: i64, role: GroupRole) -> Result<()> {
        let sql = match role {
            GroupRole::Poster => {
                "INSERT INTO forum_poster_groups (forum_id, group_id) VALUES (?, ?) ON CONFLICT DO NOTHING"
            }
            GroupRole::Viewer => {
                "INSERT INTO forum_viewer_groups (forum_id, group_id) VALUES (?, ?) ON CONFLICT DO NOTHING"
            }
        };
        sqlx::query(sql)
            .bind(forum_id)
            .bind(group_id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(())
    }

    async fn forum_groups(&self, forum_id: i64, role: GroupRole) -> Result<Vec<i64>> {
        let sql = match role {
            GroupRole::Poster => {
                "SELECT group_id FROM forum_poster_groups WHERE forum_id = ? ORDER BY group_id"
            }
            GroupRole::Viewer => {
                "SELECT group_id FROM forum_viewer_groups WHERE forum_id = ? ORDER BY group_id"
            }
        };
        sqlx::query_scalar(sql)
            .bind(forum_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))
    }

    async fn with_groups(&self, row: ForumRow) -> Result<Forum> {
        let poster_groups = self.forum_groups(row.id, GroupRole::Poster).await?;
        let viewer_groups = self.forum_groups(row.id, GroupRole::Viewer).await?;
        Ok(row.into_forum(poster_groups, viewer_groups))
    }

    // ========== Moderators ==========

    /// Add a co-moderator. Adding twice is a no-op.
    pub async fn add_moderator(&self, forum_id: i64, member_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO forum_moderators (forum_id, member_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(forum_id)
        .bind(member_id)
        .execute(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(())
    }

    /// Remove a co-moderator.
    pub async fn remove_moderator(&self, forum_id: i64, member_id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM forum_moderators WHERE forum_id = ? AND member_id = ?")
                .bind(forum_id)
                .bind(member_id)
                .execute(self.pool)
                .await
                .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Designated moderator and co-moderators of a forum.
    pub async fn moderator_ids(&self, forum_id: i64) -> Result<Vec<i64>> {
        sqlx::query_scalar(
            "SELECT member_id FROM forum_moderators WHERE forum_id = ?
             UNION
             SELECT moderator_id FROM forums WHERE id = ? AND moderator_id IS NOT NULL
             ORDER BY 1",
        )
        .bind(forum_id)
        .bind(forum_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Count every forum in the database.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM forums")
            .fetch_one(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(count)
    }
}

/// Internal struct for mapping database rows to ForumHolder.
#[derive(sqlx::FromRow)]
struct HolderRow {
    id: i64,
    title: String,
    can_post_type: String,
    can_view_type: String,
    forbidden_words: String,
    display_signatures: bool,
    created_at: String,
}

impl HolderRow {
    fn into_holder(self, poster_groups: Vec<i64>, viewer_groups: Vec<i64>) -> ForumHolder {
        ForumHolder {
            id: self.id,
            title: self.title,
            can_post_type: self.can_post_type.parse().unwrap_or(CanPostType::LoggedInUsers),
            poster_groups,
            can_view_type: self.can_view_type.parse().unwrap_or(CanViewType::Anyone),
            viewer_groups,
            forbidden_words: self
                .forbidden_words
                .lines()
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(str::to_string)
                .collect(),
            display_signatures: self.display_signatures,
            created_at: self.created_at,
        }
    }
}

/// Internal struct for mapping database rows to Forum.
#[derive(sqlx::FromRow)]
struct ForumRow {
    id: i64,
    holder_id: Option<i64>,
    category_id: Option<i64>,
    title: String,
    description: Option<String>,
    can_post_type: String,
    can_view_type: String,
    moderator_id: Option<i64>,
    can_attach_files: bool,
    posts_per_page: Option<i64>,
    sort_order: i32,
    created_at: String,
}

impl ForumRow {
    fn into_forum(self, poster_groups: Vec<i64>, viewer_groups: Vec<i64>) -> Forum {
        Forum {
            id: self.id,
            holder_id: self.holder_id,
            category_id: self.category_id,
            title: self.title,
            description: self.description,
            can_post_type: self.can_post_type.parse().unwrap_or(CanPostType::Inherit),
            poster_groups,
            can_view_type: self.can_view_type.parse().unwrap_or(CanViewType::Inherit),
            viewer_groups,
            moderator_id: self.moderator_id,
            can_attach_files: self.can_attach_files,
            posts_per_page: self.posts_per_page,
            sort_order: self.sort_order,
            created_at: self.created_at,
        }
    }
}

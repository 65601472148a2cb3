//! Member repository for Agora.

use std::collections::HashSet;

use chrono::NaiveDate;
use sqlx::QueryBuilder;

use super::identity::Identity;
use super::types::{ForumStatus, Group, Member, MemberUpdate, NewMember};
use crate::datetime::{format_date, parse_date};
use crate::db::DbPool;
use crate::{AgoraError, Result};

const MEMBER_COLUMNS: &str = "id, email, nickname, first_name, first_name_public, forum_status,
    suspended_until, is_admin, forum_rank, signature, created_at";

/// Repository for member, group and identity lookups.
pub struct MemberRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> MemberRepository<'a> {
    /// Create a new MemberRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new member.
    pub async fn create(&self, new_member: &NewMember) -> Result<Member> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO members (email, nickname, first_name, first_name_public, is_admin)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&new_member.email)
        .bind(&new_member.nickname)
        .bind(&new_member.first_name)
        .bind(new_member.first_name_public)
        .bind(new_member.is_admin)
        .fetch_one(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| AgoraError::NotFound("member".to_string()))
    }

    /// Get a member by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Member>> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?");
        let row: Option<MemberRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        Ok(row.map(MemberRow::into_member))
    }

    /// Get a member by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Member>> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE email = ?");
        let row: Option<MemberRow> = sqlx::query_as(&sql)
            .bind(email)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        Ok(row.map(MemberRow::into_member))
    }

    /// Get a member by nickname (case-insensitive).
    pub async fn get_by_nickname(&self, nickname: &str) -> Result<Option<Member>> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE nickname = ?");
        let row: Option<MemberRow> = sqlx::query_as(&sql)
            .bind(nickname)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        Ok(row.map(MemberRow::into_member))
    }

    /// Load several members at once.
    pub async fn get_many(&self, ids: &[i64]) -> Result<Vec<Member>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new(format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id IN ("));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<MemberRow> = query
            .build_query_as()
            .fetch_all(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(MemberRow::into_member).collect())
    }

    /// Update a member's profile fields.
    ///
    /// Returns the updated member, or None if not found.
    pub async fn update(&self, id: i64, update: &MemberUpdate) -> Result<Option<Member>> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE members SET ");
        let mut separated = query.separated(", ");

        if let Some(ref email) = update.email {
            separated.push("email = ");
            separated.push_bind_unseparated(email.clone());
        }
        if let Some(ref nickname) = update.nickname {
            separated.push("nickname = ");
            separated.push_bind_unseparated(nickname.clone());
        }
        if let Some(ref first_name) = update.first_name {
            separated.push("first_name = ");
            separated.push_bind_unseparated(first_name.clone());
        }
        if let Some(public) = update.first_name_public {
            separated.push("first_name_public = ");
            separated.push_bind_unseparated(public);
        }
        if let Some(ref rank) = update.forum_rank {
            separated.push("forum_rank = ");
            separated.push_bind_unseparated(rank.clone());
        }
        if let Some(ref signature) = update.signature {
            separated.push("signature = ");
            separated.push_bind_unseparated(signature.clone());
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

    /// Delete a member. Their posts remain with no author.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM members WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Change a member's forum standing.
    pub async fn set_status(&self, id: i64, status: ForumStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE members SET forum_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Suspend a member until the given date, or lift the suspension with None.
    pub async fn suspend_until(&self, id: i64, until: Option<NaiveDate>) -> Result<bool> {
        let result = sqlx::query("UPDATE members SET suspended_until = ? WHERE id = ?")
            .bind(until.map(format_date))
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Check whether an email is taken by someone other than `except_id`.
    pub async fn email_taken(&self, email: &str, except_id: Option<i64>) -> Result<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM members WHERE email = ? AND id != COALESCE(?, -1))",
        )
        .bind(email)
        .bind(except_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(taken)
    }

    /// Check whether a nickname is taken by someone other than `except_id`.
    pub async fn nickname_taken(&self, nickname: &str, except_id: Option<i64>) -> Result<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM members WHERE nickname = ? AND id != COALESCE(?, -1))",
        )
        .bind(nickname)
        .bind(except_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(taken)
    }

    // ========== Groups ==========

    /// Create a member group.
    pub async fn create_group(&self, code: &str, title: &str) -> Result<Group> {
        let group: Group = sqlx::query_as(
            "INSERT INTO forum_groups (code, title) VALUES (?, ?) RETURNING id, code, title",
        )
        .bind(code)
        .bind(title)
        .fetch_one(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(group)
    }

    /// Add a member to a group. Adding twice is a no-op.
    pub async fn add_to_group(&self, member_id: i64, group_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO member_groups (member_id, group_id) VALUES (?, ?)
             ON CONFLICT (member_id, group_id) DO NOTHING",
        )
        .bind(member_id)
        .bind(group_id)
        .execute(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(())
    }

    /// Remove a member from a group.
    pub async fn remove_from_group(&self, member_id: i64, group_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM member_groups WHERE member_id = ? AND group_id = ?")
            .bind(member_id)
            .bind(group_id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// IDs of the groups a member belongs to.
    pub async fn group_ids(&self, member_id: i64) -> Result<HashSet<i64>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT group_id FROM member_groups WHERE member_id = ?")
                .bind(member_id)
                .fetch_all(self.pool)
                .await
                .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(ids.into_iter().collect())
    }

    // ========== Identity ==========

    /// Forums the member moderates, as co-moderator or designated moderator.
    pub async fn moderated_forum_ids(&self, member_id: i64) -> Result<HashSet<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT forum_id FROM forum_moderators WHERE member_id = ?
             UNION
             SELECT id FROM forums WHERE moderator_id = ?",
        )
        .bind(member_id)
        .bind(member_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(ids.into_iter().collect())
    }

    /// Build the identity used for access checks.
    pub async fn load_identity(&self, member_id: i64) -> Result<Option<Identity>> {
        let Some(member) = self.get_by_id(member_id).await? else {
            return Ok(None);
        };

        Ok(Some(Identity {
            member_id: member.id,
            status: member.forum_status,
            suspended_until: member.suspended_until,
            is_admin: member.is_admin,
            moderated_forums: self.moderated_forum_ids(member_id).await?,
            groups: self.group_ids(member_id).await?,
        }))
    }

    /// Rank title shown next to the member's posts.
    pub async fn forum_rank(&self, member: &Member) -> Result<String> {
        let moderated = self.moderated_forum_ids(member.id).await?;
        Ok(member.rank_title(!moderated.is_empty()))
    }

    /// Number of published posts written by a member.
    pub async fn count_posts(&self, member_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM posts WHERE author_id = ? AND status = 'moderated'",
        )
        .bind(member_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(count)
    }

    /// Count all members.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members")
            .fetch_one(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(count)
    }
}

/// Internal struct for mapping database rows to Member.
#[derive(sqlx::FromRow)]
struct MemberRow {
    id: i64,
    email: Option<String>,
    nickname: Option<String>,
    first_name: Option<String>,
    first_name_public: bool,
    forum_status: String,
    suspended_until: Option<String>,
    is_admin: bool,
    forum_rank: Option<String>,
    signature: Option<String>,
    created_at: String,
}

impl MemberRow {
    fn into_member(self) -> Member {
        Member {
            id: self.id,
            email: self.email,
            nickname: self.nickname,
            first_name: self.first_name,
            first_name_public: self.first_name_public,
            forum_status: self.forum_status.parse().unwrap_or(ForumStatus::Normal),
            suspended_until: self.suspended_until.as_deref().and_then(parse_date),
            is_admin: self.is_admin,
            forum_rank: self.forum_rank,
            signature: self.signature,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn setup_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_member() {
        let db = setup_db().await;
        let repo = MemberRepository::new(db.pool());

        let member = repo
            .create(&NewMember::new("alice").with_email("alice@example.com"))
            .await
            .unwrap();

        assert_eq!(member.id, 1);
        assert_eq!(member.nickname.as_deref(), Some("alice"));
        assert_eq!(member.forum_status, ForumStatus::Normal);
        assert!(member.suspended_until.is_none());
        assert!(!member.is_admin);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = setup_db().await;
        let repo = MemberRepository::new(db.pool());

        repo.create(&NewMember::new("a").with_email("same@example.com"))
            .await
            .unwrap();
        let result = repo
            .create(&NewMember::new("b").with_email("SAME@example.com"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_lookup_by_email_and_nickname() {
        let db = setup_db().await;
        let repo = MemberRepository::new(db.pool());
        let created = repo
            .create(&NewMember::new("Bob").with_email("bob@example.com"))
            .await
            .unwrap();

        let by_email = repo.get_by_email("BOB@example.com").await.unwrap().unwrap();
        let by_nick = repo.get_by_nickname("bob").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert_eq!(by_nick.id, created.id);
        assert!(repo.get_by_nickname("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_member() {
        let db = setup_db().await;
        let repo = MemberRepository::new(db.pool());
        let member = repo.create(&NewMember::new("dave")).await.unwrap();

        let updated = repo
            .update(
                member.id,
                &MemberUpdate::new()
                    .signature(Some("-- dave".to_string()))
                    .forum_rank(Some("Veteran".to_string())),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.signature.as_deref(), Some("-- dave"));
        assert_eq!(updated.forum_rank.as_deref(), Some("Veteran"));

        assert!(repo
            .update(999, &MemberUpdate::new().nickname("ghost"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_status_and_suspension() {
        let db = setup_db().await;
        let repo = MemberRepository::new(db.pool());
        let member = repo.create(&NewMember::new("eve")).await.unwrap();
        let until = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();

        assert!(repo.set_status(member.id, ForumStatus::Ghost).await.unwrap());
        assert!(repo
            .suspend_until(member.id, Some(until))
            .await
            .unwrap());

        let reloaded = repo.get_by_id(member.id).await.unwrap().unwrap();
        assert_eq!(reloaded.forum_status, ForumStatus::Ghost);
        assert_eq!(reloaded.suspended_until, Some(until));

        repo.suspend_until(member.id, None).await.unwrap();
        let reloaded = repo.get_by_id(member.id).await.unwrap().unwrap();
        assert!(reloaded.suspended_until.is_none());
    }

    #[tokio::test]
    async fn test_groups() {
        let db = setup_db().await;
        let repo = MemberRepository::new(db.pool());
        let member = repo.create(&NewMember::new("frank")).await.unwrap();
        let staff = repo.create_group("staff", "Staff").await.unwrap();
        let vip = repo.create_group("vip", "VIP").await.unwrap();

        repo.add_to_group(member.id, staff.id).await.unwrap();
        repo.add_to_group(member.id, staff.id).await.unwrap();
        repo.add_to_group(member.id, vip.id).await.unwrap();
        assert_eq!(repo.group_ids(member.id).await.unwrap().len(), 2);

        assert!(repo.remove_from_group(member.id, vip.id).await.unwrap());
        let groups = repo.group_ids(member.id).await.unwrap();
        assert_eq!(groups, HashSet::from([staff.id]));
    }

    #[tokio::test]
    async fn test_load_identity_includes_designated_and_co_moderation() {
        let db = setup_db().await;
        let repo = MemberRepository::new(db.pool());
        let member = repo.create(&NewMember::new("mod")).await.unwrap();

        sqlx::query("INSERT INTO forums (title, moderator_id) VALUES ('A', ?)")
            .bind(member.id)
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO forums (title) VALUES ('B')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO forum_moderators (forum_id, member_id) VALUES (2, ?)")
            .bind(member.id)
            .execute(db.pool())
            .await
            .unwrap();

        let identity = repo.load_identity(member.id).await.unwrap().unwrap();
        assert_eq!(identity.moderated_forums, HashSet::from([1, 2]));
        assert_eq!(
            repo.forum_rank(&member).await.unwrap(),
            super::super::types::MODERATOR_RANK
        );
        assert!(repo.load_identity(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_taken_checks_exclude_self() {
        let db = setup_db().await;
        let repo = MemberRepository::new(db.pool());
        let member = repo
            .create(&NewMember::new("gina").with_email("gina@example.com"))
            .await
            .unwrap();

        assert!(repo.email_taken("gina@example.com", None).await.unwrap());
        assert!(!repo
            .email_taken("gina@example.com", Some(member.id))
            .await
            .unwrap());
        assert!(repo.nickname_taken("GINA", None).await.unwrap());
        assert!(!repo.nickname_taken("hank", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_member() {
        let db = setup_db().await;
        let repo = MemberRepository::new(db.pool());
        let member = repo.create(&NewMember::new("ivy")).await.unwrap();

        assert!(repo.delete(member.id).await.unwrap());
        assert!(!repo.delete(member.id).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}

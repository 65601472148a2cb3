//! Member model for Agora.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

/// Name shown when a member has neither a nickname nor a public first name.
pub const ANONYMOUS_NAME: &str = "Anonymous user";

/// Rank shown for members without a custom rank.
pub const DEFAULT_RANK: &str = "Community Member";

/// Rank shown for members who moderate at least one forum.
pub const MODERATOR_RANK: &str = "Forum Moderator";

/// Forum-specific standing of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ForumStatus {
    /// Regular member.
    #[default]
    Normal,
    /// Banned; cannot post anywhere, posts hidden from everyone.
    Banned,
    /// Ghosted; posts visible only to the member themselves.
    Ghost,
}

impl ForumStatus {
    /// Convert status to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ForumStatus::Normal => "normal",
            ForumStatus::Banned => "banned",
            ForumStatus::Ghost => "ghost",
        }
    }
}

impl fmt::Display for ForumStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ForumStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(ForumStatus::Normal),
            "banned" => Ok(ForumStatus::Banned),
            "ghost" => Ok(ForumStatus::Ghost),
            _ => Err(format!("unknown forum status: {s}")),
        }
    }
}

/// Member entity.
#[derive(Debug, Clone)]
pub struct Member {
    /// Unique member ID.
    pub id: i64,
    /// Email address (notifications are sent here).
    pub email: Option<String>,
    /// Public nickname.
    pub nickname: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Whether the first name may be shown to others.
    pub first_name_public: bool,
    /// Forum standing.
    pub forum_status: ForumStatus,
    /// Member may not post before this date (exclusive).
    pub suspended_until: Option<NaiveDate>,
    /// Site administrator.
    pub is_admin: bool,
    /// Custom rank title.
    pub forum_rank: Option<String>,
    /// Signature appended to posts.
    pub signature: Option<String>,
    /// Registration timestamp.
    pub created_at: String,
}

impl Member {
    /// Name shown next to the member's posts.
    pub fn display_name(&self) -> String {
        if let Some(nickname) = self.nickname.as_deref().filter(|n| !n.trim().is_empty()) {
            return nickname.to_string();
        }
        if self.first_name_public {
            if let Some(first) = self.first_name.as_deref().filter(|n| !n.trim().is_empty()) {
                return first.to_string();
            }
        }
        ANONYMOUS_NAME.to_string()
    }

    pub fn is_banned(&self) -> bool {
        self.forum_status == ForumStatus::Banned
    }

    pub fn is_ghost(&self) -> bool {
        self.forum_status == ForumStatus::Ghost
    }

    /// Suspended on `today` if `today` is strictly before the suspension end.
    pub fn is_suspended_on(&self, today: NaiveDate) -> bool {
        self.suspended_until.is_some_and(|until| today < until)
    }

    /// Rank title, given whether the member moderates any forum.
    pub fn rank_title(&self, moderates_any: bool) -> String {
        if moderates_any {
            return MODERATOR_RANK.to_string();
        }
        self.forum_rank
            .clone()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RANK.to_string())
    }

    /// Message shown to a suspended member, or None when not suspended.
    pub fn suspension_message(&self, today: NaiveDate, admin_email: Option<&str>) -> Option<String> {
        if !self.is_suspended_on(today) {
            return None;
        }
        let until = self.suspended_until?;
        let mut message = format!(
            "You have been suspended from the forum until {}.",
            until.format("%Y-%m-%d")
        );
        if let Some(email) = admin_email {
            message.push_str(&format!(
                " Please contact {email} if you believe this is in error."
            ));
        }
        Some(message)
    }
}

/// Data for creating a new member.
#[derive(Debug, Clone, Default)]
pub struct NewMember {
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub first_name: Option<String>,
    pub first_name_public: bool,
    pub is_admin: bool,
}

impl NewMember {
    /// Create a new member with a nickname.
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            nickname: Some(nickname.into()),
            ..Default::default()
        }
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the first name and whether it is public.
    pub fn with_first_name(mut self, first_name: impl Into<String>, public: bool) -> Self {
        self.first_name = Some(first_name.into());
        self.first_name_public = public;
        self
    }

    /// Make the member a site administrator.
    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// Data for updating an existing member's profile.
#[derive(Debug, Clone, Default)]
pub struct MemberUpdate {
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub first_name: Option<Option<String>>,
    pub first_name_public: Option<bool>,
    pub forum_rank: Option<Option<String>>,
    pub signature: Option<Option<String>>,
}

impl MemberUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn first_name(mut self, first_name: Option<String>) -> Self {
        self.first_name = Some(first_name);
        self
    }

    pub fn first_name_public(mut self, public: bool) -> Self {
        self.first_name_public = Some(public);
        self
    }

    pub fn forum_rank(mut self, rank: Option<String>) -> Self {
        self.forum_rank = Some(rank);
        self
    }

    pub fn signature(mut self, signature: Option<String>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Check if any fields are set.
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.nickname.is_none()
            && self.first_name.is_none()
            && self.first_name_public.is_none()
            && self.forum_rank.is_none()
            && self.signature.is_none()
    }
}

/// A named group of members, used by `OnlyTheseUsers` policies.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Group {
    pub id: i64,
    pub code: String,
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> Member {
        Member {
            id: 1,
            email: Some("jo@example.com".to_string()),
            nickname: None,
            first_name: None,
            first_name_public: false,
            forum_status: ForumStatus::Normal,
            suspended_until: None,
            is_admin: false,
            forum_rank: None,
            signature: None,
            created_at: "2024-01-01 00:00:00".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_forum_status_parse() {
        assert_eq!("normal".parse::<ForumStatus>(), Ok(ForumStatus::Normal));
        assert_eq!("BANNED".parse::<ForumStatus>(), Ok(ForumStatus::Banned));
        assert_eq!("ghost".parse::<ForumStatus>(), Ok(ForumStatus::Ghost));
        assert!("deleted".parse::<ForumStatus>().is_err());
        assert_eq!(ForumStatus::Ghost.to_string(), "ghost");
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut m = member();
        assert_eq!(m.display_name(), ANONYMOUS_NAME);

        m.first_name = Some("Jo".to_string());
        assert_eq!(m.display_name(), ANONYMOUS_NAME);

        m.first_name_public = true;
        assert_eq!(m.display_name(), "Jo");

        m.nickname = Some("jojo".to_string());
        assert_eq!(m.display_name(), "jojo");
    }

    #[test]
    fn test_suspension_is_date_only_and_exclusive() {
        let mut m = member();
        assert!(!m.is_suspended_on(date(2024, 5, 1)));

        m.suspended_until = Some(date(2024, 5, 10));
        assert!(m.is_suspended_on(date(2024, 5, 9)));
        assert!(!m.is_suspended_on(date(2024, 5, 10)));
        assert!(!m.is_suspended_on(date(2024, 5, 11)));
    }

    #[test]
    fn test_suspension_message() {
        let mut m = member();
        m.suspended_until = Some(date(2024, 5, 10));

        let msg = m
            .suspension_message(date(2024, 5, 1), Some("admin@example.com"))
            .unwrap();
        assert!(msg.contains("2024-05-10"));
        assert!(msg.contains("admin@example.com"));
        assert!(m.suspension_message(date(2024, 6, 1), None).is_none());
    }

    #[test]
    fn test_rank_title() {
        let mut m = member();
        assert_eq!(m.rank_title(false), DEFAULT_RANK);
        m.forum_rank = Some("Regular".to_string());
        assert_eq!(m.rank_title(false), "Regular");
        assert_eq!(m.rank_title(true), MODERATOR_RANK);
    }

    #[test]
    fn test_member_update_is_empty() {
        assert!(MemberUpdate::new().is_empty());
        assert!(!MemberUpdate::new().signature(None).is_empty());
    }
}

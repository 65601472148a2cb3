//! Forum and holder models for Agora.
//!
//! A holder is the top-level venue; forums sit beneath it and may inherit its
//! posting and viewing policies.

use std::fmt;
use std::str::FromStr;

/// Who may post in a forum or holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanPostType {
    /// Use the parent holder's policy. Only meaningful on forums.
    #[default]
    Inherit,
    Anyone,
    LoggedInUsers,
    /// Members of at least one poster group.
    OnlyTheseUsers,
    NoOne,
}

impl CanPostType {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CanPostType::Inherit => "inherit",
            CanPostType::Anyone => "anyone",
            CanPostType::LoggedInUsers => "logged_in_users",
            CanPostType::OnlyTheseUsers => "only_these_users",
            CanPostType::NoOne => "no_one",
        }
    }
}

impl fmt::Display for CanPostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CanPostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inherit" => Ok(CanPostType::Inherit),
            "anyone" => Ok(CanPostType::Anyone),
            "logged_in_users" => Ok(CanPostType::LoggedInUsers),
            "only_these_users" => Ok(CanPostType::OnlyTheseUsers),
            "no_one" => Ok(CanPostType::NoOne),
            _ => Err(format!("unknown post policy: {s}")),
        }
    }
}

/// Who may view a forum or holder page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanViewType {
    #[default]
    Inherit,
    Anyone,
    LoggedInUsers,
    OnlyTheseUsers,
}

impl CanViewType {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CanViewType::Inherit => "inherit",
            CanViewType::Anyone => "anyone",
            CanViewType::LoggedInUsers => "logged_in_users",
            CanViewType::OnlyTheseUsers => "only_these_users",
        }
    }
}

impl fmt::Display for CanViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CanViewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inherit" => Ok(CanViewType::Inherit),
            "anyone" => Ok(CanViewType::Anyone),
            "logged_in_users" => Ok(CanViewType::LoggedInUsers),
            "only_these_users" => Ok(CanViewType::OnlyTheseUsers),
            _ => Err(format!("unknown view policy: {s}")),
        }
    }
}

/// Top-level container of forums.
#[derive(Debug, Clone)]
pub struct ForumHolder {
    pub id: i64,
    pub title: String,
    /// Holder policy; `Inherit` here means nobody can post.
    pub can_post_type: CanPostType,
    pub poster_groups: Vec<i64>,
    pub can_view_type: CanViewType,
    pub viewer_groups: Vec<i64>,
    /// Words censored in rendered posts.
    pub forbidden_words: Vec<String>,
    pub display_signatures: bool,
    pub created_at: String,
}

/// A category grouping forums inside a holder.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ForumCategory {
    pub id: i64,
    pub holder_id: i64,
    pub title: String,
    /// Higher values are listed first.
    pub stack_order: i32,
}

/// A posting venue.
#[derive(Debug, Clone)]
pub struct Forum {
    pub id: i64,
    pub holder_id: Option<i64>,
    pub category_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub can_post_type: CanPostType,
    pub poster_groups: Vec<i64>,
    pub can_view_type: CanViewType,
    pub viewer_groups: Vec<i64>,
    /// Designated moderator; co-moderators live in a separate table.
    pub moderator_id: Option<i64>,
    pub can_attach_files: bool,
    /// Overrides the configured page size when set.
    pub posts_per_page: Option<i64>,
    pub sort_order: i32,
    pub created_at: String,
}

impl Forum {
    /// Page size for thread listings, falling back to `default`.
    pub fn page_size(&self, default: i64) -> i64 {
        self.posts_per_page.filter(|p| *p > 0).unwrap_or(default)
    }

    /// Relative link to the forum.
    pub fn link(&self) -> String {
        format!("/forum/{}", self.id)
    }
}

/// Data for creating a new holder.
#[derive(Debug, Clone)]
pub struct NewForumHolder {
    pub title: String,
    pub can_post_type: CanPostType,
    pub can_view_type: CanViewType,
    pub forbidden_words: Vec<String>,
    pub display_signatures: bool,
}

impl NewForumHolder {
    /// Create a holder open to logged-in posters and public viewers.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            can_post_type: CanPostType::LoggedInUsers,
            can_view_type: CanViewType::Anyone,
            forbidden_words: Vec::new(),
            display_signatures: true,
        }
    }

    pub fn with_can_post_type(mut self, policy: CanPostType) -> Self {
        self.can_post_type = policy;
        self
    }

    pub fn with_can_view_type(mut self, policy: CanViewType) -> Self {
        self.can_view_type = policy;
        self
    }

    pub fn with_forbidden_words(mut self, words: Vec<String>) -> Self {
        self.forbidden_words = words;
        self
    }
}

/// Data for creating a new forum.
#[derive(Debug, Clone)]
pub struct NewForum {
    pub title: String,
    pub holder_id: Option<i64>,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub can_post_type: CanPostType,
    pub can_view_type: CanViewType,
    pub moderator_id: Option<i64>,
    pub can_attach_files: bool,
    pub posts_per_page: Option<i64>,
    pub sort_order: i32,
}

impl NewForum {
    /// Create a forum that inherits both policies from its holder.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            holder_id: None,
            category_id: None,
            description: None,
            can_post_type: CanPostType::Inherit,
            can_view_type: CanViewType::Inherit,
            moderator_id: None,
            can_attach_files: true,
            posts_per_page: None,
            sort_order: 0,
        }
    }

    pub fn in_holder(mut self, holder_id: i64) -> Self {
        self.holder_id = Some(holder_id);
        self
    }

    pub fn in_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_can_post_type(mut self, policy: CanPostType) -> Self {
        self.can_post_type = policy;
        self
    }

    pub fn with_can_view_type(mut self, policy: CanViewType) -> Self {
        self.can_view_type = policy;
        self
    }

    pub fn with_moderator(mut self, member_id: i64) -> Self {
        self.moderator_id = Some(member_id);
        self
    }

    pub fn with_attachments(mut self, allowed: bool) -> Self {
        self.can_attach_files = allowed;
        self
    }

    pub fn with_posts_per_page(mut self, per_page: i64) -> Self {
        self.posts_per_page = Some(per_page);
        self
    }
}

/// Data for updating an existing forum.
#[derive(Debug, Clone, Default)]
pub struct ForumUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub can_post_type: Option<CanPostType>,
    pub can_view_type: Option<CanViewType>,
    pub moderator_id: Option<Option<i64>>,
    pub can_attach_files: Option<bool>,
    pub posts_per_page: Option<Option<i64>>,
    pub sort_order: Option<i32>,
}

impl ForumUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn can_post_type(mut self, policy: CanPostType) -> Self {
        self.can_post_type = Some(policy);
        self
    }

    pub fn can_view_type(mut self, policy: CanViewType) -> Self {
        self.can_view_type = Some(policy);
        self
    }

    pub fn moderator_id(mut self, member_id: Option<i64>) -> Self {
        self.moderator_id = Some(member_id);
        self
    }

    pub fn can_attach_files(mut self, allowed: bool) -> Self {
        self.can_attach_files = Some(allowed);
        self
    }

    pub fn posts_per_page(mut self, per_page: Option<i64>) -> Self {
        self.posts_per_page = Some(per_page);
        self
    }

    pub fn sort_order(mut self, order: i32) -> Self {
        self.sort_order = Some(order);
        self
    }

    /// Check if any fields are set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.can_post_type.is_none()
            && self.can_view_type.is_none()
            && self.moderator_id.is_none()
            && self.can_attach_files.is_none()
            && self.posts_per_page.is_none()
            && self.sort_order.is_none()
    }
}

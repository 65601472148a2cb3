//! Post model for Agora.
//!
//! Also holds the pure helpers deriving a post's title and its position in
//! the paginated thread listing.

use std::fmt;
use std::str::FromStr;

use super::thread::ForumThread;

/// Prefix for reply titles.
pub const REPLY_PREFIX: &str = "Re: ";

/// Moderation status of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PostStatus {
    /// Waiting for a moderator.
    Awaiting,
    /// Published.
    #[default]
    Moderated,
    /// Rejected by a moderator or flagged as spam.
    Rejected,
    /// Hidden but kept.
    Archived,
}

impl PostStatus {
    /// Convert status to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Awaiting => "awaiting",
            PostStatus::Moderated => "moderated",
            PostStatus::Rejected => "rejected",
            PostStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "awaiting" => Ok(PostStatus::Awaiting),
            "moderated" => Ok(PostStatus::Moderated),
            "rejected" => Ok(PostStatus::Rejected),
            "archived" => Ok(PostStatus::Archived),
            _ => Err(format!("unknown post status: {s}")),
        }
    }
}

/// A message in a thread.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: i64,
    pub thread_id: i64,
    /// Denormalized copy of the thread's forum.
    pub forum_id: i64,
    /// None once the author's account has been deleted.
    pub author_id: Option<i64>,
    /// Raw markup as entered.
    pub content: String,
    pub status: PostStatus,
    /// Lowest-ID post of its thread.
    pub is_first_post: bool,
    pub created_at: String,
    pub last_edited: Option<String>,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Moderated
    }

    pub fn is_author(&self, member_id: i64) -> bool {
        self.author_id == Some(member_id)
    }
}

/// Data for creating a new post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub thread_id: i64,
    /// None for anonymous posters.
    pub author_id: Option<i64>,
    pub content: String,
    pub status: PostStatus,
}

impl NewPost {
    pub fn new(thread_id: i64, author_id: Option<i64>, content: impl Into<String>) -> Self {
        Self {
            thread_id,
            author_id,
            content: content.into(),
            status: PostStatus::Moderated,
        }
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = status;
        self
    }
}

/// Title of a post: the thread title for the first post, a reply title otherwise.
pub fn title_of(post: &Post, thread: &ForumThread) -> String {
    if post.is_first_post {
        thread.title.clone()
    } else {
        format!("{REPLY_PREFIX}{}", thread.title)
    }
}

/// The first post among a thread's posts: the one with the lowest ID.
pub fn first_post_of(posts: &[Post]) -> Option<&Post> {
    posts.iter().min_by_key(|p| p.id)
}

/// Listing offset of the page holding the post at `rank` (0-based).
pub fn page_offset(rank: i64, page_size: i64) -> i64 {
    if page_size <= 0 {
        return 0;
    }
    (rank / page_size) * page_size
}

/// Link to a post inside its thread listing.
///
/// The page offset is added when the post is not on the first page, the
/// anchor when the post is not the first one shown.
pub fn show_link(thread_link: &str, post_id: i64, rank: i64, page_size: i64) -> String {
    let mut link = thread_link.to_string();
    let offset = page_offset(rank, page_size);
    if offset > 0 {
        link.push_str(&format!("?start={offset}"));
    }
    if rank > 0 {
        link.push_str(&format!("#post{post_id}"));
    }
    link
}

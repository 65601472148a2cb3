//! Thread model for Agora.

/// A discussion thread inside a forum.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ForumThread {
    pub id: i64,
    pub forum_id: i64,
    pub title: String,
    /// Number of distinct viewer sessions that opened the thread.
    pub num_views: i64,
    /// Pinned to the top of its forum.
    pub is_sticky: bool,
    /// Pinned to the top of every forum in the holder.
    pub is_global_sticky: bool,
    /// Replies are closed; moderators may still delete posts.
    pub is_read_only: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ForumThread {
    /// Relative link to the thread.
    pub fn link(&self) -> String {
        format!("/forum/{}/thread/{}", self.forum_id, self.id)
    }
}

/// Data for creating a new thread.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub forum_id: i64,
    pub title: String,
}

impl NewThread {
    pub fn new(forum_id: i64, title: impl Into<String>) -> Self {
        Self {
            forum_id,
            title: title.into(),
        }
    }
}

/// Moderator-controlled thread fields.
#[derive(Debug, Clone, Default)]
pub struct ThreadUpdate {
    pub title: Option<String>,
    pub is_sticky: Option<bool>,
    pub is_global_sticky: Option<bool>,
    pub is_read_only: Option<bool>,
}

impl ThreadUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn sticky(mut self, sticky: bool) -> Self {
        self.is_sticky = Some(sticky);
        self
    }

    pub fn global_sticky(mut self, sticky: bool) -> Self {
        self.is_global_sticky = Some(sticky);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.is_read_only = Some(read_only);
        self
    }

    /// Check if any fields are set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.is_sticky.is_none()
            && self.is_global_sticky.is_none()
            && self.is_read_only.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_link() {
        let thread = ForumThread {
            id: 12,
            forum_id: 3,
            title: "Hello".to_string(),
            num_views: 0,
            is_sticky: false,
            is_global_sticky: false,
            is_read_only: false,
            created_at: "2024-01-01 00:00:00".to_string(),
            updated_at: "2024-01-01 00:00:00".to_string(),
        };
        assert_eq!(thread.link(), "/forum/3/thread/12");
    }

    #[test]
    fn test_thread_update() {
        assert!(ThreadUpdate::new().is_empty());
        let update = ThreadUpdate::new().sticky(true).read_only(false);
        assert_eq!(update.is_sticky, Some(true));
        assert_eq!(update.is_read_only, Some(false));
        assert!(update.is_global_sticky.is_none());
        assert!(!update.is_empty());
    }
}

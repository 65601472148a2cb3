//! Forum module for Agora.
//!
//! This module provides the forum domain:
//! - Holders, categories and forums with their posting and viewing policies
//! - Threads with sticky, global sticky and read-only flags
//! - Posts with moderation status and first-post tracking
//! - Attachments stored outside the database
//! - The service tying access checks, transactions and observers together

mod attachment;
mod post;
mod post_repository;
mod repository;
mod service;
mod thread;
mod thread_repository;
mod types;

pub use attachment::{
    AttachmentRepository, AttachmentStore, LocalAttachmentStore, NewAttachment, PostAttachment,
};
pub use post::{
    first_post_of, page_offset, show_link, title_of, NewPost, Post, PostStatus, REPLY_PREFIX,
};
pub use post_repository::{ForumStats, PostRepository, PostVisibility, RecentPostsFilter};
pub use repository::{ForumRepository, GroupRole};
pub use service::{
    ForumService, PaginatedResult, Pagination, MEMBER_LATEST_LIMIT, POPULAR_LIMIT,
};
pub use thread::{ForumThread, NewThread, ThreadUpdate};
pub use thread_repository::{Popularity, ThreadRepository};
pub use types::{
    CanPostType, CanViewType, Forum, ForumCategory, ForumHolder, ForumUpdate, NewForum,
    NewForumHolder,
};

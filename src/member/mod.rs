//! Members, groups and identities for Agora.
//!
//! A member's forum standing (normal, banned, ghost) and suspension date feed
//! the access evaluator through an [`Identity`].

mod identity;
mod repository;
mod service;
mod types;

pub use identity::Identity;
pub use repository::MemberRepository;
pub use service::{MemberService, MAX_EMAIL_LENGTH, MAX_NICKNAME_LENGTH};
pub use types::{
    ForumStatus, Group, Member, MemberUpdate, NewMember, ANONYMOUS_NAME, DEFAULT_RANK,
    MODERATOR_RANK,
};

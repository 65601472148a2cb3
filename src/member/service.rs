//! Member registration and profile service for Agora.

use tracing::info;

use super::repository::MemberRepository;
use super::types::{Member, MemberUpdate, NewMember};
use crate::db::Database;
use crate::hooks::ObserverRegistry;
use crate::{AgoraError, Result};

/// Maximum nickname length (in characters).
pub const MAX_NICKNAME_LENGTH: usize = 40;

/// Maximum email length.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Validate a nickname.
fn validate_nickname(nickname: &str) -> Result<()> {
    if nickname.trim().is_empty() {
        return Err(AgoraError::Validation("nickname is required".to_string()));
    }
    if nickname.chars().count() > MAX_NICKNAME_LENGTH {
        return Err(AgoraError::Validation(format!(
            "nickname must be at most {MAX_NICKNAME_LENGTH} characters"
        )));
    }
    if nickname.chars().any(char::is_control) {
        return Err(AgoraError::Validation(
            "nickname contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Validate an email address.
fn validate_email(email: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(AgoraError::Validation("email is required".to_string()));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(AgoraError::Validation(format!(
            "email must be at most {MAX_EMAIL_LENGTH} characters"
        )));
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') =>
        {
            Ok(())
        }
        _ => Err(AgoraError::Validation("invalid email format".to_string())),
    }
}

/// Service for member registration and profile edits.
pub struct MemberService<'a> {
    db: &'a Database,
    observers: ObserverRegistry,
}

impl<'a> MemberService<'a> {
    /// Create a new MemberService with the given database reference.
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            observers: ObserverRegistry::new(),
        }
    }

    /// Attach observers notified of registrations and profile changes.
    pub fn with_observers(mut self, observers: ObserverRegistry) -> Self {
        self.observers = observers;
        self
    }

    /// Register a new member.
    ///
    /// Nickname and email are required and must both be unused.
    pub async fn register(&self, new_member: &NewMember) -> Result<Member> {
        let nickname = new_member.nickname.as_deref().unwrap_or("");
        let email = new_member.email.as_deref().unwrap_or("");
        validate_nickname(nickname)?;
        validate_email(email)?;

        let repo = MemberRepository::new(self.db.pool());
        if repo.nickname_taken(nickname, None).await? {
            return Err(AgoraError::Validation(
                "nickname is already in use".to_string(),
            ));
        }
        if repo.email_taken(email, None).await? {
            return Err(AgoraError::Validation("email is already in use".to_string()));
        }

        let member = repo.create(new_member).await?;
        info!(member_id = member.id, nickname, "Member registered");

        self.observers.member_registered(&member).await;
        Ok(member)
    }

    /// Update a member's profile.
    ///
    /// A changed nickname or email must not belong to another member.
    pub async fn update_profile(&self, member_id: i64, update: &MemberUpdate) -> Result<Member> {
        let repo = MemberRepository::new(self.db.pool());

        if let Some(ref nickname) = update.nickname {
            validate_nickname(nickname)?;
            if repo.nickname_taken(nickname, Some(member_id)).await? {
                return Err(AgoraError::Validation(
                    "nickname is already in use".to_string(),
                ));
            }
        }
        if let Some(ref email) = update.email {
            validate_email(email)?;
            if repo.email_taken(email, Some(member_id)).await? {
                return Err(AgoraError::Validation("email is already in use".to_string()));
            }
        }

        let member = repo
            .update(member_id, update)
            .await?
            .ok_or_else(|| AgoraError::NotFound("member".to_string()))?;

        if !update.is_empty() {
            self.observers.profile_updated(&member).await;
        }
        Ok(member)
    }
}

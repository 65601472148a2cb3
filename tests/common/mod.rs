//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use agora::config::{ForumConfig, NotificationConfig};
use agora::forum::{
    CanPostType, CanViewType, Forum, ForumHolder, ForumRepository, NewForum, NewForumHolder,
};
use agora::hooks::ObserverRegistry;
use agora::member::{Identity, MemberRepository, NewMember};
use agora::subscription::{DeliveryError, Notification, NotificationTransport, SubscriptionNotifier};
use agora::{Database, ForumService};

/// Open a fresh in-memory database.
pub async fn setup_db() -> Database {
    Database::open_in_memory().await.unwrap()
}

/// Open a fresh database file under `dir`, with the production pool settings.
pub async fn setup_file_db(dir: &std::path::Path) -> Database {
    Database::open(dir.join("forum.db")).await.unwrap()
}

/// Create a member with an `@example.com` address and return their ID.
pub async fn create_member(db: &Database, nickname: &str) -> i64 {
    MemberRepository::new(db.pool())
        .create(&NewMember::new(nickname).with_email(format!("{nickname}@example.com")))
        .await
        .unwrap()
        .id
}

/// Create a global admin and return their ID.
pub async fn create_admin(db: &Database, nickname: &str) -> i64 {
    MemberRepository::new(db.pool())
        .create(
            &NewMember::new(nickname)
                .with_email(format!("{nickname}@example.com"))
                .admin(),
        )
        .await
        .unwrap()
        .id
}

/// Load the current identity of a member.
pub async fn identity(db: &Database, member_id: i64) -> Identity {
    MemberRepository::new(db.pool())
        .load_identity(member_id)
        .await
        .unwrap()
        .unwrap()
}

/// Create a holder with the given posting policy.
pub async fn create_holder(db: &Database, can_post: CanPostType) -> ForumHolder {
    ForumRepository::new(db.pool())
        .create_holder(
            &NewForumHolder::new("Community")
                .with_can_post_type(can_post)
                .with_can_view_type(CanViewType::Anyone),
        )
        .await
        .unwrap()
}

/// Create a forum inheriting both policies from `holder`.
pub async fn create_forum(db: &Database, holder: &ForumHolder, moderator: Option<i64>) -> Forum {
    let mut new_forum = NewForum::new("General").in_holder(holder.id);
    if let Some(id) = moderator {
        new_forum = new_forum.with_moderator(id);
    }
    ForumRepository::new(db.pool())
        .create(&new_forum)
        .await
        .unwrap()
}

/// Service over `db` with default settings and no observers.
pub fn service(db: &Database) -> ForumService<'_> {
    ForumService::new(db, &ForumConfig::default())
}

/// Service notifying subscribers through `transport`.
pub fn notifying_service(db: &Database, transport: Arc<RecordingTransport>) -> ForumService<'_> {
    notifying_service_with(db, transport, &ForumConfig::default())
}

/// Service and notifier sharing the same forum settings.
pub fn notifying_service_with<'a>(
    db: &'a Database,
    transport: Arc<RecordingTransport>,
    settings: &ForumConfig,
) -> ForumService<'a> {
    let notifier =
        SubscriptionNotifier::new(db.clone(), transport, NotificationConfig::default(), settings);
    let mut observers = ObserverRegistry::new();
    observers.register(Arc::new(notifier));
    ForumService::new(db, settings).with_observers(observers)
}

/// Transport that records deliveries and rejects configured addresses.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Notification>>,
    failing: HashSet<String>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every delivery to `address`.
    pub fn failing_for(mut self, address: &str) -> Self {
        self.failing.insert(address.to_string());
        self
    }

    /// Sorted recipient addresses of successful deliveries.
    pub fn recipients(&self) -> Vec<String> {
        let mut list: Vec<String> = self
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.recipient.clone())
            .collect();
        list.sort();
        list
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        if self.failing.contains(&notification.recipient) {
            return Err(DeliveryError::Unavailable(notification.recipient.clone()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

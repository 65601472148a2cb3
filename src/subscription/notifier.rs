//! New-post notifications for thread subscribers.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::repository::SubscriptionRepository;
use crate::config::{ForumConfig, NotificationConfig};
use crate::db::Database;
use crate::forum::{show_link, title_of, ForumRepository, ForumThread, Post, PostRepository};
use crate::hooks::ForumObserver;
use crate::member::{Member, MemberRepository, ANONYMOUS_NAME};
use crate::{AgoraError, Result};

/// A message ready for a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Recipient address.
    pub recipient: String,
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Values a templating transport may use instead of `body`.
    pub context: serde_json::Value,
}

/// Why a single delivery failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The transport could not be reached.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The transport refused the recipient.
    #[error("recipient rejected: {0}")]
    Rejected(String),
}

impl From<DeliveryError> for AgoraError {
    fn from(e: DeliveryError) -> Self {
        AgoraError::Delivery(e.to_string())
    }
}

/// Sends notifications somewhere.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, notification: &Notification) -> std::result::Result<(), DeliveryError>;
}

/// Transport that only writes deliveries to the log.
#[derive(Debug, Clone)]
pub struct LogTransport {
    from_address: String,
}

impl LogTransport {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
        }
    }
}

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, notification: &Notification) -> std::result::Result<(), DeliveryError> {
        info!(
            from = %self.from_address,
            to = %notification.recipient,
            subject = %notification.subject,
            "Notification sent"
        );
        Ok(())
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Deliveries handed to the transport.
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Subscribers skipped: banned or without an address.
    pub suppressed: usize,
}

/// Notifies thread subscribers about new posts.
pub struct SubscriptionNotifier {
    db: Database,
    transport: Arc<dyn NotificationTransport>,
    config: NotificationConfig,
    /// Posts per page when the forum sets none.
    page_size: i64,
}

impl SubscriptionNotifier {
    /// Post links page the same way as the forum service built from `forum`.
    pub fn new(
        db: Database,
        transport: Arc<dyn NotificationTransport>,
        config: NotificationConfig,
        forum: &ForumConfig,
    ) -> Self {
        Self {
            db,
            transport,
            config,
            page_size: forum.posts_per_page,
        }
    }

    /// Subscribe a member to a thread. Subscribing twice is a no-op.
    pub async fn subscribe(&self, thread_id: i64, member_id: i64) -> Result<bool> {
        SubscriptionRepository::new(self.db.pool())
            .subscribe(thread_id, member_id)
            .await
    }

    /// Unsubscribe a member from a thread. Unsubscribing twice is a no-op.
    pub async fn unsubscribe(&self, thread_id: i64, member_id: i64) -> Result<bool> {
        SubscriptionRepository::new(self.db.pool())
            .unsubscribe(thread_id, member_id)
            .await
    }

    pub async fn is_subscribed(&self, thread_id: i64, member_id: i64) -> Result<bool> {
        SubscriptionRepository::new(self.db.pool())
            .is_subscribed(thread_id, member_id)
            .await
    }

    /// Member IDs subscribed to a thread.
    pub async fn subscribers(&self, thread_id: i64) -> Result<Vec<i64>> {
        let subscriptions = SubscriptionRepository::new(self.db.pool())
            .subscribers(thread_id)
            .await?;
        Ok(subscriptions.into_iter().map(|s| s.member_id).collect())
    }

    /// Notify every subscriber of the post's thread except its author.
    ///
    /// Each subscriber gets at most one delivery attempt. Failures are logged
    /// and counted; they never stop the other deliveries.
    pub async fn notify_new_post(&self, post: &Post, thread: &ForumThread) -> Result<NotifyReport> {
        if !self.config.enabled {
            return Ok(NotifyReport::default());
        }

        let ids = SubscriptionRepository::new(self.db.pool())
            .recipient_ids(thread.id, post.author_id)
            .await?;
        let report = self.deliver(post, thread, &ids, true).await?;

        info!(
            post_id = post.id,
            thread_id = thread.id,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            suppressed = report.suppressed,
            "Subscribers notified"
        );
        Ok(report)
    }

    /// Notify the forum's moderators about a new post, if enabled.
    pub async fn notify_moderators(&self, post: &Post, thread: &ForumThread) -> Result<NotifyReport> {
        if !self.config.enabled || !self.config.notify_moderators {
            return Ok(NotifyReport::default());
        }

        let ids: Vec<i64> = ForumRepository::new(self.db.pool())
            .moderator_ids(thread.forum_id)
            .await?
            .into_iter()
            .filter(|id| Some(*id) != post.author_id)
            .collect();
        self.deliver(post, thread, &ids, false).await
    }

    async fn deliver(
        &self,
        post: &Post,
        thread: &ForumThread,
        member_ids: &[i64],
        subscribed: bool,
    ) -> Result<NotifyReport> {
        let mut report = NotifyReport::default();
        if member_ids.is_empty() {
            return Ok(report);
        }

        let members = MemberRepository::new(self.db.pool());
        let recipients = members.get_many(member_ids).await?;
        let author_name = match post.author_id {
            Some(id) => members
                .get_by_id(id)
                .await?
                .map(|m| m.display_name())
                .unwrap_or_else(|| ANONYMOUS_NAME.to_string()),
            None => ANONYMOUS_NAME.to_string(),
        };

        let title = title_of(post, thread);
        let post_link = self.post_link(post, thread).await?;
        let unsubscribe_link = format!(
            "{}/forum/{}/unsubscribe/{}",
            self.base_url(),
            post.forum_id,
            post.id
        );

        let mut outgoing = Vec::new();
        for member in &recipients {
            match deliverable_address(member) {
                Some(address) => {
                    let unsubscribe = subscribed.then_some(unsubscribe_link.as_str());
                    outgoing.push((
                        member.id,
                        build_notification(
                            address,
                            &member.display_name(),
                            &author_name,
                            &title,
                            &post_link,
                            unsubscribe,
                        ),
                    ));
                }
                None => {
                    debug!(member_id = member.id, "Notification suppressed");
                    report.suppressed += 1;
                }
            }
        }
        report.attempted = outgoing.len();

        let transport = &self.transport;
        let results: Vec<(i64, std::result::Result<(), DeliveryError>)> = stream::iter(outgoing)
            .map(|(member_id, notification)| async move {
                (member_id, transport.send(&notification).await)
            })
            .buffer_unordered(self.config.max_concurrent_deliveries.max(1))
            .collect()
            .await;

        let subscriptions = SubscriptionRepository::new(self.db.pool());
        for (member_id, result) in results {
            match result {
                Ok(()) => {
                    report.delivered += 1;
                    if subscribed {
                        subscriptions.touch_last_sent(thread.id, member_id).await?;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(member_id, post_id = post.id, error = %e, "Notification delivery failed");
                }
            }
        }

        Ok(report)
    }

    async fn post_link(&self, post: &Post, thread: &ForumThread) -> Result<String> {
        let page_size = ForumRepository::new(self.db.pool())
            .get_by_id(thread.forum_id)
            .await?
            .map(|f| f.page_size(self.page_size))
            .unwrap_or(self.page_size);
        let rank = PostRepository::new(self.db.pool()).rank(post).await?;
        Ok(format!(
            "{}{}",
            self.base_url(),
            show_link(&thread.link(), post.id, rank, page_size)
        ))
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}

/// Address to notify, or None when the member must not be notified.
fn deliverable_address(member: &Member) -> Option<&str> {
    if member.is_banned() {
        return None;
    }
    member
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
}

fn build_notification(
    recipient: &str,
    member_name: &str,
    author_name: &str,
    post_title: &str,
    post_link: &str,
    unsubscribe_link: Option<&str>,
) -> Notification {
    let mut body = format!(
        "Hello {member_name},\n\n{author_name} posted in \"{post_title}\".\n\nRead it here: {post_link}\n"
    );
    if let Some(link) = unsubscribe_link {
        body.push_str(&format!("\nTo stop receiving these notifications, visit {link}\n"));
    }

    Notification {
        recipient: recipient.to_string(),
        subject: format!("New reply for {post_title}"),
        body,
        context: json!({
            "member": member_name,
            "author": author_name,
            "post_title": post_title,
            "post_link": post_link,
            "unsubscribe_link": unsubscribe_link,
        }),
    }
}

#[async_trait]
impl ForumObserver for SubscriptionNotifier {
    fn name(&self) -> &str {
        "subscription-notifier"
    }

    async fn on_post_created(&self, post: &Post, thread: &ForumThread) -> Result<()> {
        if post.is_published() {
            self.notify_new_post(post, thread).await?;
        }
        self.notify_moderators(post, thread).await?;
        Ok(())
    }

    async fn on_post_published(&self, post: &Post, thread: &ForumThread) -> Result<()> {
        self.notify_new_post(post, thread).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forum::{NewForum, NewThread, PostStatus, ThreadRepository};
    use crate::member::{ForumStatus, NewMember};
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Notification>>,
        failing: HashSet<String>,
    }

    #[async_trait]
    impl NotificationTransport for RecordingTransport {
        async fn send(&self, notification: &Notification) -> std::result::Result<(), DeliveryError> {
            if self.failing.contains(&notification.recipient) {
                return Err(DeliveryError::Rejected(notification.recipient.clone()));
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    impl RecordingTransport {
        fn recipients(&self) -> Vec<String> {
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
    }

    async fn add_member(db: &Database, name: &str) -> i64 {
        MemberRepository::new(db.pool())
            .create(&NewMember::new(name).with_email(format!("{name}@example.com")))
            .await
            .unwrap()
            .id
    }

    async fn add_post(db: &Database, thread: &ForumThread, author: i64) -> Post {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO posts (thread_id, forum_id, author_id, content, is_first_post)
             VALUES (?, ?, ?, 'x', NOT EXISTS(SELECT 1 FROM posts WHERE thread_id = ?))
             RETURNING id",
        )
        .bind(thread.id)
        .bind(thread.forum_id)
        .bind(author)
        .bind(thread.id)
        .fetch_one(db.pool())
        .await
        .unwrap();
        PostRepository::new(db.pool())
            .get_by_id(id)
            .await
            .unwrap()
            .unwrap()
    }

    async fn thread(db: &Database) -> ForumThread {
        let forum = ForumRepository::new(db.pool())
            .create(&NewForum::new("F"))
            .await
            .unwrap();
        ThreadRepository::new(db.pool())
            .create(&NewThread::new(forum.id, "Welcome"))
            .await
            .unwrap()
    }

    fn notifier(db: &Database, transport: Arc<RecordingTransport>) -> SubscriptionNotifier {
        let config = NotificationConfig {
            base_url: "https://forum.example.com/".to_string(),
            ..Default::default()
        };
        SubscriptionNotifier::new(db.clone(), transport, config, &ForumConfig::default())
    }

    #[test]
    fn test_delivery_error_converts() {
        let err: AgoraError = DeliveryError::Unavailable("smtp down".to_string()).into();
        assert_eq!(err.to_string(), "delivery error: transport unavailable: smtp down");
    }

    #[tokio::test]
    async fn test_notifies_everyone_but_the_author() {
        let db = Database::open_in_memory().await.unwrap();
        let a = add_member(&db, "a").await;
        let b = add_member(&db, "b").await;
        let c = add_member(&db, "c").await;
        let thread = thread(&db).await;

        add_post(&db, &thread, a).await;
        add_post(&db, &thread, b).await;
        let p3 = add_post(&db, &thread, a).await;

        let transport = Arc::new(RecordingTransport::default());
        let notifier = notifier(&db, transport.clone());
        for member in [a, b, c] {
            notifier.subscribe(thread.id, member).await.unwrap();
        }

        let report = notifier.notify_new_post(&p3, &thread).await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(
            transport.recipients(),
            vec!["b@example.com", "c@example.com"]
        );

        let sent = transport.sent.lock().unwrap();
        let first = &sent[0];
        assert_eq!(first.subject, "New reply for Re: Welcome");
        assert_eq!(
            first.context["unsubscribe_link"],
            format!("https://forum.example.com/forum/{}/unsubscribe/{}", p3.forum_id, p3.id)
        );
        assert_eq!(
            first.context["post_link"],
            format!(
                "https://forum.example.com/forum/{}/thread/{}#post{}",
                thread.forum_id, thread.id, p3.id
            )
        );
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_deliveries() {
        let db = Database::open_in_memory().await.unwrap();
        let author = add_member(&db, "author").await;
        let b = add_member(&db, "b").await;
        let c = add_member(&db, "c").await;
        let thread = thread(&db).await;
        let post = add_post(&db, &thread, author).await;

        let transport = Arc::new(RecordingTransport {
            failing: HashSet::from(["b@example.com".to_string()]),
            ..Default::default()
        });
        let notifier = notifier(&db, transport.clone());
        notifier.subscribe(thread.id, b).await.unwrap();
        notifier.subscribe(thread.id, c).await.unwrap();

        let report = notifier.notify_new_post(&post, &thread).await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(transport.recipients(), vec!["c@example.com"]);

        let subs = SubscriptionRepository::new(db.pool())
            .subscribers(thread.id)
            .await
            .unwrap();
        let sent_to_c = subs.iter().find(|s| s.member_id == c).unwrap();
        let sent_to_b = subs.iter().find(|s| s.member_id == b).unwrap();
        assert!(sent_to_c.last_sent.is_some());
        assert!(sent_to_b.last_sent.is_none());
    }

    #[tokio::test]
    async fn test_banned_and_addressless_members_suppressed() {
        let db = Database::open_in_memory().await.unwrap();
        let author = add_member(&db, "author").await;
        let banned = add_member(&db, "banned").await;
        let members = MemberRepository::new(db.pool());
        members.set_status(banned, ForumStatus::Banned).await.unwrap();
        let no_email = members.create(&NewMember::new("quiet")).await.unwrap().id;
        let thread = thread(&db).await;
        let post = add_post(&db, &thread, author).await;

        let transport = Arc::new(RecordingTransport::default());
        let notifier = notifier(&db, transport.clone());
        notifier.subscribe(thread.id, banned).await.unwrap();
        notifier.subscribe(thread.id, no_email).await.unwrap();

        let report = notifier.notify_new_post(&post, &thread).await.unwrap();
        assert_eq!(report.suppressed, 2);
        assert_eq!(report.attempted, 0);
        assert!(transport.recipients().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_notifications_send_nothing() {
        let db = Database::open_in_memory().await.unwrap();
        let author = add_member(&db, "author").await;
        let b = add_member(&db, "b").await;
        let thread = thread(&db).await;
        let post = add_post(&db, &thread, author).await;

        let transport = Arc::new(RecordingTransport::default());
        let config = NotificationConfig {
            enabled: false,
            ..Default::default()
        };
        let notifier =
            SubscriptionNotifier::new(db.clone(), transport.clone(), config, &ForumConfig::default());
        notifier.subscribe(thread.id, b).await.unwrap();

        let report = notifier.notify_new_post(&post, &thread).await.unwrap();
        assert_eq!(report, NotifyReport::default());
        assert!(transport.recipients().is_empty());
    }

    #[tokio::test]
    async fn test_moderators_notified_when_enabled() {
        let db = Database::open_in_memory().await.unwrap();
        let author = add_member(&db, "author").await;
        let moderator = add_member(&db, "moderator").await;
        let forum = ForumRepository::new(db.pool())
            .create(&NewForum::new("F").with_moderator(moderator))
            .await
            .unwrap();
        let thread = ThreadRepository::new(db.pool())
            .create(&NewThread::new(forum.id, "T"))
            .await
            .unwrap();
        let post = add_post(&db, &thread, author).await;
        PostRepository::new(db.pool())
            .set_status(post.id, PostStatus::Awaiting)
            .await
            .unwrap();
        let post = PostRepository::new(db.pool())
            .get_by_id(post.id)
            .await
            .unwrap()
            .unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let config = NotificationConfig {
            notify_moderators: true,
            ..Default::default()
        };
        let notifier =
            SubscriptionNotifier::new(db.clone(), transport.clone(), config, &ForumConfig::default());

        notifier.on_post_created(&post, &thread).await.unwrap();
        assert_eq!(transport.recipients(), vec!["moderator@example.com"]);
        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].context["unsubscribe_link"].is_null());
    }
}

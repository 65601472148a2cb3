//! End-to-end forum flows: posting, moderation, deletion and notifications.

mod common;

use std::sync::Arc;

use agora::config::AttachmentsConfig;
use agora::forum::{
    AttachmentRepository, CanPostType, ForumRepository, LocalAttachmentStore, NewForum, Pagination,
    PostRepository, PostStatus, ThreadUpdate,
};
use agora::member::ForumStatus;
use agora::subscription::SubscriptionRepository;
use agora::AgoraError;

use common::*;

#[tokio::test]
async fn test_first_post_is_lowest_id() {
    let db = setup_db().await;
    let holder = create_holder(&db, CanPostType::LoggedInUsers).await;
    let forum = create_forum(&db, &holder, None).await;
    let alice = identity(&db, create_member(&db, "alice").await).await;
    let bob = identity(&db, create_member(&db, "bob").await).await;

    let service = service(&db);
    let (thread, first) = service
        .create_thread(forum.id, Some(&alice), "Welcome", "Hello all")
        .await
        .unwrap();
    for i in 0..4 {
        service
            .reply(thread.id, Some(&bob), &format!("reply {i}"))
            .await
            .unwrap();
    }

    let posts = service
        .list_posts(thread.id, None, Pagination::first(20))
        .await
        .unwrap();
    assert_eq!(posts.total, 5);
    let flagged: Vec<i64> = posts
        .items
        .iter()
        .filter(|p| p.is_first_post)
        .map(|p| p.id)
        .collect();
    let min_id = posts.items.iter().map(|p| p.id).min().unwrap();
    assert_eq!(flagged, vec![first.id]);
    assert_eq!(first.id, min_id);

    assert_eq!(agora::forum::title_of(&posts.items[0], &thread), "Welcome");
    assert_eq!(agora::forum::title_of(&posts.items[1], &thread), "Re: Welcome");
}

#[tokio::test]
async fn test_delete_thread_cascades() {
    let db = setup_db().await;
    let dir = tempfile::tempdir().unwrap();
    let store = LocalAttachmentStore::new(dir.path()).unwrap();

    let holder = create_holder(&db, CanPostType::LoggedInUsers).await;
    let moderator = create_member(&db, "mod").await;
    let forum = create_forum(&db, &holder, Some(moderator)).await;
    let moderator = identity(&db, moderator).await;
    let alice = identity(&db, create_member(&db, "alice").await).await;

    let service = service(&db).with_attachments(&store, &AttachmentsConfig::default());
    let (thread, first) = service
        .create_thread(forum.id, Some(&alice), "Photos", "Look")
        .await
        .unwrap();
    let reply = service.reply(thread.id, Some(&alice), "More").await.unwrap();
    let a1 = service
        .attach_file(first.id, Some(&alice), "cat.png", b"png-bytes")
        .await
        .unwrap();
    let a2 = service
        .attach_file(reply.id, Some(&alice), "notes.txt", b"text")
        .await
        .unwrap();
    assert!(a1.is_image());
    assert!(store.exists(&a1.stored_name));

    SubscriptionRepository::new(db.pool())
        .subscribe(thread.id, alice.member_id)
        .await
        .unwrap();

    let denied = service.delete_thread(thread.id, Some(&alice)).await;
    assert!(matches!(denied, Err(AgoraError::Permission(_))));

    service.delete_thread(thread.id, Some(&moderator)).await.unwrap();

    assert_eq!(PostRepository::new(db.pool()).count().await.unwrap(), 0);
    assert_eq!(AttachmentRepository::new(db.pool()).count().await.unwrap(), 0);
    assert!(SubscriptionRepository::new(db.pool())
        .subscribers(thread.id)
        .await
        .unwrap()
        .is_empty());
    assert!(!store.exists(&a1.stored_name));
    assert!(!store.exists(&a2.stored_name));
    assert!(matches!(
        service.get_thread(thread.id, None).await,
        Err(AgoraError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_attachment_rules() {
    let db = setup_db().await;
    let dir = tempfile::tempdir().unwrap();
    let store = LocalAttachmentStore::new(dir.path()).unwrap();

    let holder = create_holder(&db, CanPostType::LoggedInUsers).await;
    let forum = create_forum(&db, &holder, None).await;
    let alice = identity(&db, create_member(&db, "alice").await).await;
    let bob = identity(&db, create_member(&db, "bob").await).await;

    let without_store = service(&db);
    let (_, post) = without_store
        .create_thread(forum.id, Some(&alice), "T", "x")
        .await
        .unwrap();
    assert!(matches!(
        without_store
            .attach_file(post.id, Some(&alice), "a.txt", b"a")
            .await,
        Err(AgoraError::Config(_))
    ));

    let config = AttachmentsConfig {
        max_size_mb: 1,
        ..Default::default()
    };
    let service = service(&db).with_attachments(&store, &config);
    assert!(matches!(
        service.attach_file(post.id, Some(&bob), "a.txt", b"a").await,
        Err(AgoraError::Permission(_))
    ));
    let too_big = vec![0u8; 1024 * 1024 + 1];
    assert!(matches!(
        service.attach_file(post.id, Some(&alice), "big.bin", &too_big).await,
        Err(AgoraError::Validation(_))
    ));

    let attachment = service
        .attach_file(post.id, Some(&alice), "a.txt", b"a")
        .await
        .unwrap();
    service
        .delete_attachment(attachment.id, Some(&alice))
        .await
        .unwrap();
    assert!(!store.exists(&attachment.stored_name));

    ForumRepository::new(db.pool())
        .update(
            forum.id,
            &agora::forum::ForumUpdate::new().can_attach_files(false),
        )
        .await
        .unwrap();
    assert!(matches!(
        service.attach_file(post.id, Some(&alice), "b.txt", b"b").await,
        Err(AgoraError::Permission(_))
    ));
}

#[tokio::test]
async fn test_notify_skips_author() {
    let db = setup_db().await;
    let holder = create_holder(&db, CanPostType::LoggedInUsers).await;
    let forum = create_forum(&db, &holder, None).await;
    let a = identity(&db, create_member(&db, "a").await).await;
    let b = identity(&db, create_member(&db, "b").await).await;
    let c = identity(&db, create_member(&db, "c").await).await;

    let transport = Arc::new(RecordingTransport::new());
    let service = notifying_service(&db, transport.clone());

    let (thread, _p1) = service
        .create_thread(forum.id, Some(&a), "Plans", "P1")
        .await
        .unwrap();
    service.reply(thread.id, Some(&b), "P2").await.unwrap();

    let subscriptions = SubscriptionRepository::new(db.pool());
    for member in [&a, &b, &c] {
        assert!(subscriptions
            .subscribe(thread.id, member.member_id)
            .await
            .unwrap());
    }
    transport.clear();

    let p3 = service.reply(thread.id, Some(&a), "P3").await.unwrap();

    assert_eq!(
        transport.recipients(),
        vec!["b@example.com".to_string(), "c@example.com".to_string()]
    );
    let sent = transport.sent();
    assert!(sent.iter().all(|n| n.subject == "New reply for Re: Plans"));
    let unsubscribe = format!("http://localhost/forum/{}/unsubscribe/{}", forum.id, p3.id);
    assert!(sent
        .iter()
        .all(|n| n.context["unsubscribe_link"] == unsubscribe.as_str()));

    let subs = subscriptions.subscribers(thread.id).await.unwrap();
    let stamped: Vec<i64> = subs
        .iter()
        .filter(|s| s.last_sent.is_some())
        .map(|s| s.member_id)
        .collect();
    assert_eq!(stamped, vec![b.member_id, c.member_id]);
}

#[tokio::test]
async fn test_failed_delivery_does_not_block_others() {
    let db = setup_db().await;
    let holder = create_holder(&db, CanPostType::LoggedInUsers).await;
    let forum = create_forum(&db, &holder, None).await;
    let a = identity(&db, create_member(&db, "a").await).await;
    let b = create_member(&db, "b").await;
    let c = create_member(&db, "c").await;

    let transport = Arc::new(RecordingTransport::new().failing_for("b@example.com"));
    let service = notifying_service(&db, transport.clone());
    let (thread, _) = service
        .create_thread(forum.id, Some(&a), "T", "x")
        .await
        .unwrap();

    let subscriptions = SubscriptionRepository::new(db.pool());
    subscriptions.subscribe(thread.id, b).await.unwrap();
    subscriptions.subscribe(thread.id, c).await.unwrap();

    let reply = service.reply(thread.id, Some(&a), "news").await;
    assert!(reply.is_ok());
    assert_eq!(transport.recipients(), vec!["c@example.com".to_string()]);
}

#[tokio::test]
async fn test_awaiting_post_notifies_on_approval() {
    let db = setup_db().await;
    let holder = create_holder(&db, CanPostType::LoggedInUsers).await;
    let moderator = create_member(&db, "mod").await;
    let forum = create_forum(&db, &holder, Some(moderator)).await;
    let moderator = identity(&db, moderator).await;
    let a = identity(&db, create_member(&db, "a").await).await;
    let b = create_member(&db, "b").await;

    let transport = Arc::new(RecordingTransport::new());
    let settings = agora::config::ForumConfig {
        require_approval: true,
        ..Default::default()
    };
    let service = notifying_service_with(&db, transport.clone(), &settings);

    let (thread, _) = service
        .create_thread(forum.id, Some(&moderator), "T", "x")
        .await
        .unwrap();
    SubscriptionRepository::new(db.pool())
        .subscribe(thread.id, b)
        .await
        .unwrap();

    let pending = service.reply(thread.id, Some(&a), "hi").await.unwrap();
    assert_eq!(pending.status, PostStatus::Awaiting);
    assert!(transport.recipients().is_empty());

    service
        .set_post_status(pending.id, Some(&moderator), PostStatus::Moderated)
        .await
        .unwrap();
    assert_eq!(transport.recipients(), vec!["b@example.com".to_string()]);
}

#[tokio::test]
async fn test_post_link_on_second_page() {
    let db = setup_db().await;
    let holder = create_holder(&db, CanPostType::LoggedInUsers).await;
    let forum = create_forum(&db, &holder, None).await;
    let alice = identity(&db, create_member(&db, "alice").await).await;

    let service = service(&db);
    let (thread, _) = service
        .create_thread(forum.id, Some(&alice), "Long", "0")
        .await
        .unwrap();
    let mut posts = Vec::new();
    for i in 1..=9 {
        posts.push(service.reply(thread.id, Some(&alice), &i.to_string()).await.unwrap());
    }

    // Rank 7 is the last post of the first page.
    let seventh = &posts[6];
    assert_eq!(
        service.post_link(seventh).await.unwrap(),
        format!("{}#post{}", thread.link(), seventh.id)
    );
    let ninth = &posts[8];
    assert_eq!(
        service.post_link(ninth).await.unwrap(),
        format!("{}?start=8#post{}", thread.link(), ninth.id)
    );
}

#[tokio::test]
async fn test_notification_link_uses_configured_page_size() {
    let db = setup_db().await;
    let holder = create_holder(&db, CanPostType::LoggedInUsers).await;
    let forum = create_forum(&db, &holder, None).await;
    let alice = identity(&db, create_member(&db, "alice").await).await;
    let bob = create_member(&db, "bob").await;

    let settings = agora::config::ForumConfig {
        posts_per_page: 20,
        ..Default::default()
    };
    let transport = Arc::new(RecordingTransport::new());
    let service = notifying_service_with(&db, transport.clone(), &settings);

    let (thread, _) = service
        .create_thread(forum.id, Some(&alice), "Long", "0")
        .await
        .unwrap();
    for i in 1..=8 {
        service.reply(thread.id, Some(&alice), &i.to_string()).await.unwrap();
    }
    SubscriptionRepository::new(db.pool())
        .subscribe(thread.id, bob)
        .await
        .unwrap();

    // Rank 9 would open the second page at eight posts per page.
    let ninth = service.reply(thread.id, Some(&alice), "9").await.unwrap();
    let link = service.post_link(&ninth).await.unwrap();
    assert_eq!(link, format!("{}#post{}", thread.link(), ninth.id));

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].context["post_link"],
        format!("http://localhost{link}").as_str()
    );
}

#[tokio::test]
async fn test_no_one_holder_closes_inheriting_forum() {
    let db = setup_db().await;
    let holder = create_holder(&db, CanPostType::NoOne).await;
    let admin = create_admin(&db, "root").await;
    let forum = create_forum(&db, &holder, Some(admin)).await;
    let admin = identity(&db, admin).await;
    let alice = identity(&db, create_member(&db, "alice").await).await;

    let service = service(&db);
    for who in [Some(&admin), Some(&alice), None] {
        let result = service.create_thread(forum.id, who, "T", "x").await;
        assert!(matches!(result, Err(AgoraError::Permission(_))));
    }
}

#[tokio::test]
async fn test_banned_member_cannot_post_unless_moderator() {
    let db = setup_db().await;
    let holder = create_holder(&db, CanPostType::LoggedInUsers).await;
    let moderator = create_member(&db, "mod").await;
    // Moderators only keep their edit rights under the forum's own policy.
    let forum = ForumRepository::new(db.pool())
        .create(
            &NewForum::new("Open")
                .in_holder(holder.id)
                .with_can_post_type(CanPostType::Anyone)
                .with_moderator(moderator),
        )
        .await
        .unwrap();
    let alice = create_member(&db, "alice").await;

    let members = agora::MemberRepository::new(db.pool());
    members.set_status(alice, ForumStatus::Banned).await.unwrap();
    members.set_status(moderator, ForumStatus::Banned).await.unwrap();

    let service = service(&db);
    let alice = identity(&db, alice).await;
    assert!(matches!(
        service.create_thread(forum.id, Some(&alice), "T", "x").await,
        Err(AgoraError::Permission(_))
    ));

    let moderator = identity(&db, moderator).await;
    service
        .create_thread(forum.id, Some(&moderator), "T", "x")
        .await
        .unwrap();

    // Anonymous posting is open in an Anyone forum.
    let (_, anonymous) = service
        .create_thread(forum.id, None, "Guest", "hello")
        .await
        .unwrap();
    assert_eq!(anonymous.author_id, None);
}

#[tokio::test]
async fn test_ghost_sees_own_posts_only() {
    let db = setup_db().await;
    let holder = create_holder(&db, CanPostType::LoggedInUsers).await;
    let moderator = create_member(&db, "mod").await;
    let forum = create_forum(&db, &holder, Some(moderator)).await;
    let moderator = identity(&db, moderator).await;
    let alice = identity(&db, create_member(&db, "alice").await).await;
    let bob = identity(&db, create_member(&db, "bob").await).await;

    let service = service(&db);
    let (thread, _) = service
        .create_thread(forum.id, Some(&bob), "T", "x")
        .await
        .unwrap();
    let ghost_post = service.reply(thread.id, Some(&alice), "psst").await.unwrap();

    service
        .set_member_status(forum.id, alice.member_id, Some(&moderator), ForumStatus::Ghost)
        .await
        .unwrap();
    let alice = identity(&db, alice.member_id).await;

    let own = service
        .list_posts(thread.id, Some(&alice), Pagination::first(10))
        .await
        .unwrap();
    assert!(own.items.iter().any(|p| p.id == ghost_post.id));
    assert!(service.get_post(ghost_post.id, Some(&alice)).await.is_ok());

    let others = service
        .list_posts(thread.id, Some(&bob), Pagination::first(10))
        .await
        .unwrap();
    assert!(others.items.iter().all(|p| p.id != ghost_post.id));
    assert!(matches!(
        service.get_post(ghost_post.id, Some(&bob)).await,
        Err(AgoraError::NotFound(_))
    ));
    assert!(matches!(
        service.get_post(ghost_post.id, None).await,
        Err(AgoraError::NotFound(_))
    ));

    // Ghost posts stay out of the statistics.
    let stats = service.forum_stats(forum.id, None).await.unwrap();
    assert_eq!(stats.num_posts, 1);
    assert_eq!(stats.num_authors, 1);
}

#[tokio::test]
async fn test_move_thread_updates_posts() {
    let db = setup_db().await;
    let holder = create_holder(&db, CanPostType::LoggedInUsers).await;
    let source = create_forum(&db, &holder, None).await;
    let target = create_forum(&db, &holder, None).await;
    let admin = identity(&db, create_admin(&db, "root").await).await;
    let alice = identity(&db, create_member(&db, "alice").await).await;

    let service = service(&db);
    let (thread, _) = service
        .create_thread(source.id, Some(&alice), "Misplaced", "x")
        .await
        .unwrap();
    service.reply(thread.id, Some(&alice), "y").await.unwrap();

    assert!(matches!(
        service.move_thread(thread.id, target.id, Some(&alice)).await,
        Err(AgoraError::Permission(_))
    ));

    let moved = service
        .move_thread(thread.id, target.id, Some(&admin))
        .await
        .unwrap();
    assert_eq!(moved.forum_id, target.id);

    let posts = service
        .list_posts(thread.id, None, Pagination::first(10))
        .await
        .unwrap();
    assert!(posts.items.iter().all(|p| p.forum_id == target.id));
    assert_eq!(
        service
            .list_topics(source.id, None, Pagination::first(10))
            .await
            .unwrap()
            .total,
        0
    );
}

#[tokio::test]
async fn test_sticky_and_read_only_flags() {
    let db = setup_db().await;
    let holder = create_holder(&db, CanPostType::LoggedInUsers).await;
    let moderator = create_member(&db, "mod").await;
    let forum = create_forum(&db, &holder, Some(moderator)).await;
    let moderator = identity(&db, moderator).await;
    let alice = identity(&db, create_member(&db, "alice").await).await;

    let service = service(&db);
    let (rules, _) = service
        .create_thread(forum.id, Some(&moderator), "Rules", "x")
        .await
        .unwrap();
    let (chat, _) = service
        .create_thread(forum.id, Some(&alice), "Chat", "y")
        .await
        .unwrap();

    assert!(matches!(
        service
            .update_thread(rules.id, Some(&alice), &ThreadUpdate::new().sticky(true))
            .await,
        Err(AgoraError::Permission(_))
    ));
    service
        .update_thread(
            rules.id,
            Some(&moderator),
            &ThreadUpdate::new().global_sticky(true).read_only(true),
        )
        .await
        .unwrap();

    let announcements = service.global_announcements(holder.id, None).await.unwrap();
    assert_eq!(announcements.len(), 1);
    assert_eq!(announcements[0].id, rules.id);

    let topics = service
        .list_topics(forum.id, None, Pagination::first(10))
        .await
        .unwrap();
    assert_eq!(topics.items.len(), 1);
    assert_eq!(topics.items[0].id, chat.id);

    assert!(matches!(
        service.reply(rules.id, Some(&alice), "can I?").await,
        Err(AgoraError::Permission(_))
    ));
}

//! Access decisions for forums, threads, posts and attachments.

use chrono::NaiveDate;

use crate::forum::{CanPostType, CanViewType, Forum, ForumHolder, ForumThread, Post};
use crate::member::{ForumStatus, Identity};

/// A forum together with its holder, if it has one.
#[derive(Debug, Clone, Copy)]
pub struct ForumScope<'a> {
    pub forum: &'a Forum,
    pub holder: Option<&'a ForumHolder>,
}

impl<'a> ForumScope<'a> {
    pub fn new(forum: &'a Forum, holder: Option<&'a ForumHolder>) -> Self {
        Self { forum, holder }
    }
}

/// A thread and the forum it lives in.
#[derive(Debug, Clone, Copy)]
pub struct ThreadScope<'a> {
    pub thread: &'a ForumThread,
    pub forum: ForumScope<'a>,
}

impl<'a> ThreadScope<'a> {
    pub fn new(thread: &'a ForumThread, forum: ForumScope<'a>) -> Self {
        Self { thread, forum }
    }
}

/// A post, its author's standing and its thread.
///
/// A post whose author no longer exists counts as written by a Normal member.
#[derive(Debug, Clone, Copy)]
pub struct PostScope<'a> {
    pub post: &'a Post,
    pub author_status: ForumStatus,
    pub thread: ThreadScope<'a>,
}

impl<'a> PostScope<'a> {
    pub fn new(post: &'a Post, author_status: ForumStatus, thread: ThreadScope<'a>) -> Self {
        Self {
            post,
            author_status,
            thread,
        }
    }
}

/// Pure access evaluator.
///
/// The only state is the date used for suspension checks, so one evaluator
/// can be shared freely between tasks. `None` as identity means anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessEvaluator {
    today: NaiveDate,
}

impl AccessEvaluator {
    /// Evaluate as of the given date.
    pub fn on(today: NaiveDate) -> Self {
        Self { today }
    }

    /// Evaluate as of today in the given timezone.
    pub fn today(timezone: &str) -> Self {
        Self::on(crate::datetime::today_in(timezone))
    }

    pub fn date(&self) -> NaiveDate {
        self.today
    }

    // ========== Forum ==========

    /// Global admins and the forum's moderators.
    pub fn can_moderate(&self, forum: &Forum, who: Option<&Identity>) -> bool {
        who.is_some_and(|id| id.is_admin || id.moderates(forum.id))
    }

    /// Page-level view policy, overridden by moderation rights.
    pub fn can_view(&self, scope: ForumScope<'_>, who: Option<&Identity>) -> bool {
        if self.can_moderate(scope.forum, who) {
            return true;
        }

        let (policy, groups) = match scope.forum.can_view_type {
            CanViewType::Inherit => match scope.holder {
                Some(holder) => (holder.can_view_type, holder.viewer_groups.as_slice()),
                None => (CanViewType::Anyone, &[][..]),
            },
            own => (own, scope.forum.viewer_groups.as_slice()),
        };

        match policy {
            CanViewType::Inherit | CanViewType::Anyone => true,
            CanViewType::LoggedInUsers => who.is_some(),
            CanViewType::OnlyTheseUsers => {
                who.is_some_and(|id| id.is_admin || id.in_any_group(groups))
            }
        }
    }

    /// Whether the identity may start threads or reply in the forum.
    ///
    /// `Inherit` is resolved first, so a holder closed to everyone closes
    /// its inheriting forums even for admins. Edit rights follow the page
    /// the policy came from: forum moderators on the forum, admins only on
    /// the holder.
    pub fn can_post(&self, scope: ForumScope<'_>, who: Option<&Identity>) -> bool {
        let (policy, groups, inherited) = match scope.forum.can_post_type {
            CanPostType::Inherit => match scope.holder {
                Some(holder) => (holder.can_post_type, holder.poster_groups.as_slice(), true),
                None => return false,
            },
            own => (own, scope.forum.poster_groups.as_slice(), false),
        };

        let can_edit = if inherited {
            who.is_some_and(|id| id.is_admin)
        } else {
            self.can_moderate(scope.forum, who)
        };

        match policy {
            // A holder cannot inherit from anything.
            CanPostType::Inherit | CanPostType::NoOne => return false,
            _ if can_edit => return true,
            _ => {}
        }

        if let Some(id) = who {
            if id.is_banned() || id.is_suspended_on(self.today) {
                return false;
            }
        }

        match policy {
            CanPostType::Anyone => true,
            CanPostType::LoggedInUsers => who.is_some(),
            CanPostType::OnlyTheseUsers => who.is_some_and(|id| id.in_any_group(groups)),
            CanPostType::Inherit | CanPostType::NoOne => false,
        }
    }

    pub fn can_attach(&self, forum: &Forum) -> bool {
        forum.can_attach_files
    }

    /// Moderators see posts still awaiting approval in listings.
    pub fn can_see_awaiting(&self, forum: &Forum, who: Option<&Identity>) -> bool {
        self.can_moderate(forum, who)
    }

    // ========== Thread ==========

    pub fn can_view_thread(&self, scope: ThreadScope<'_>, who: Option<&Identity>) -> bool {
        self.can_view(scope.forum, who)
    }

    /// Posting rights on the forum, closed by the read-only flag.
    pub fn can_post_thread(&self, scope: ThreadScope<'_>, who: Option<&Identity>) -> bool {
        self.can_post(scope.forum, who) && !scope.thread.is_read_only
    }

    /// Replying to a thread.
    pub fn can_create_post(&self, scope: ThreadScope<'_>, who: Option<&Identity>) -> bool {
        self.can_post_thread(scope, who)
    }

    pub fn can_edit_thread(&self, scope: ThreadScope<'_>, who: Option<&Identity>) -> bool {
        self.can_moderate(scope.forum.forum, who)
    }

    pub fn can_delete_thread(&self, scope: ThreadScope<'_>, who: Option<&Identity>) -> bool {
        self.can_moderate(scope.forum.forum, who)
    }

    // ========== Post ==========

    /// Posts by banned or ghosted authors are hidden from everyone but a
    /// ghosted author looking at their own post.
    pub fn can_view_post(&self, scope: PostScope<'_>, who: Option<&Identity>) -> bool {
        if scope.author_status != ForumStatus::Normal {
            let own_ghost_post =
                who.is_some_and(|id| scope.post.is_author(id.member_id) && id.is_ghost());
            if !own_ghost_post {
                return false;
            }
        }
        self.can_view_thread(scope.thread, who)
    }

    pub fn can_edit_post(&self, scope: PostScope<'_>, who: Option<&Identity>) -> bool {
        let Some(id) = who else {
            return false;
        };
        if id.is_admin {
            return true;
        }
        scope.post.is_author(id.member_id) && self.can_post_thread(scope.thread, who)
    }

    /// Edit rights, or moderation rights even on read-only threads.
    pub fn can_delete_post(&self, scope: PostScope<'_>, who: Option<&Identity>) -> bool {
        self.can_edit_post(scope, who) || self.can_moderate(scope.thread.forum.forum, who)
    }

    /// Moderators may flag other members' posts as spam.
    pub fn can_mark_as_spam(&self, scope: PostScope<'_>, who: Option<&Identity>) -> bool {
        self.can_moderate(scope.thread.forum.forum, who)
            && who.is_some_and(|id| !scope.post.is_author(id.member_id))
    }

    // ========== Attachment ==========

    pub fn can_edit_attachment(&self, scope: PostScope<'_>, who: Option<&Identity>) -> bool {
        self.can_edit_post(scope, who)
    }

    pub fn can_delete_attachment(&self, scope: PostScope<'_>, who: Option<&Identity>) -> bool {
        self.can_delete_post(scope, who)
    }
}

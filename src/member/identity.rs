//! Identity value object consumed by the access evaluator.

use std::collections::HashSet;

use chrono::NaiveDate;

use super::types::ForumStatus;

/// Everything the access evaluator needs to know about a viewer.
///
/// Built once per request from the member row, the forums they moderate and
/// their group memberships. Anonymous viewers have no identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub member_id: i64,
    pub status: ForumStatus,
    pub suspended_until: Option<NaiveDate>,
    pub is_admin: bool,
    pub moderated_forums: HashSet<i64>,
    pub groups: HashSet<i64>,
}

impl Identity {
    /// A normal member with no special rights.
    pub fn new(member_id: i64) -> Self {
        Self {
            member_id,
            status: ForumStatus::Normal,
            suspended_until: None,
            is_admin: false,
            moderated_forums: HashSet::new(),
            groups: HashSet::new(),
        }
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    pub fn with_status(mut self, status: ForumStatus) -> Self {
        self.status = status;
        self
    }

    pub fn suspended_until(mut self, date: NaiveDate) -> Self {
        self.suspended_until = Some(date);
        self
    }

    pub fn moderating(mut self, forum_id: i64) -> Self {
        self.moderated_forums.insert(forum_id);
        self
    }

    pub fn in_group(mut self, group_id: i64) -> Self {
        self.groups.insert(group_id);
        self
    }

    pub fn is_banned(&self) -> bool {
        self.status == ForumStatus::Banned
    }

    pub fn is_ghost(&self) -> bool {
        self.status == ForumStatus::Ghost
    }

    /// Date-only check: suspended while `today` is before the end date.
    pub fn is_suspended_on(&self, today: NaiveDate) -> bool {
        self.suspended_until.is_some_and(|until| today < until)
    }

    pub fn moderates(&self, forum_id: i64) -> bool {
        self.moderated_forums.contains(&forum_id)
    }

    pub fn moderates_any(&self) -> bool {
        !self.moderated_forums.is_empty()
    }

    /// Member of at least one of the given groups.
    pub fn in_any_group<'g>(&self, groups: impl IntoIterator<Item = &'g i64>) -> bool {
        groups.into_iter().any(|g| self.groups.contains(g))
    }
}

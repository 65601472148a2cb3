//! Database schema and migrations for Agora.
//!
//! Migrations are applied in order when the database is opened; the
//! `schema_version` table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Members and groups
    r#"
CREATE TABLE members (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    email               TEXT UNIQUE COLLATE NOCASE,
    nickname            TEXT UNIQUE COLLATE NOCASE,
    first_name          TEXT,
    first_name_public   INTEGER NOT NULL DEFAULT 0,
    forum_status        TEXT NOT NULL DEFAULT 'normal',   -- 'normal', 'banned', 'ghost'
    suspended_until     TEXT,                             -- YYYY-MM-DD, exclusive
    is_admin            INTEGER NOT NULL DEFAULT 0,
    forum_rank          TEXT,
    signature           TEXT,
    created_at          TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_members_forum_status ON members(forum_status);

CREATE TABLE forum_groups (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    code    TEXT NOT NULL UNIQUE,
    title   TEXT NOT NULL
);

CREATE TABLE member_groups (
    member_id   INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
    group_id    INTEGER NOT NULL REFERENCES forum_groups(id) ON DELETE CASCADE,
    PRIMARY KEY (member_id, group_id)
);
"#,
    // v2: Holders, categories and forums
    r#"
CREATE TABLE forum_holders (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    title               TEXT NOT NULL,
    can_post_type       TEXT NOT NULL DEFAULT 'logged_in_users',
    can_view_type       TEXT NOT NULL DEFAULT 'anyone',
    forbidden_words     TEXT NOT NULL DEFAULT '',         -- one word per line
    display_signatures  INTEGER NOT NULL DEFAULT 1,
    created_at          TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE holder_poster_groups (
    holder_id   INTEGER NOT NULL REFERENCES forum_holders(id) ON DELETE CASCADE,
    group_id    INTEGER NOT NULL REFERENCES forum_groups(id) ON DELETE CASCADE,
    PRIMARY KEY (holder_id, group_id)
);

CREATE TABLE holder_viewer_groups (
    holder_id   INTEGER NOT NULL REFERENCES forum_holders(id) ON DELETE CASCADE,
    group_id    INTEGER NOT NULL REFERENCES forum_groups(id) ON DELETE CASCADE,
    PRIMARY KEY (holder_id, group_id)
);

CREATE TABLE forum_categories (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    holder_id   INTEGER NOT NULL REFERENCES forum_holders(id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    stack_order INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE forums (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    holder_id           INTEGER REFERENCES forum_holders(id) ON DELETE SET NULL,
    category_id         INTEGER REFERENCES forum_categories(id) ON DELETE SET NULL,
    title               TEXT NOT NULL,
    description         TEXT,
    can_post_type       TEXT NOT NULL DEFAULT 'inherit',
    can_view_type       TEXT NOT NULL DEFAULT 'inherit',
    moderator_id        INTEGER REFERENCES members(id) ON DELETE SET NULL,
    can_attach_files    INTEGER NOT NULL DEFAULT 1,
    posts_per_page      INTEGER,
    sort_order          INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_forums_holder_id ON forums(holder_id);

CREATE TABLE forum_moderators (
    forum_id    INTEGER NOT NULL REFERENCES forums(id) ON DELETE CASCADE,
    member_id   INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
    PRIMARY KEY (forum_id, member_id)
);

CREATE TABLE forum_poster_groups (
    forum_id    INTEGER NOT NULL REFERENCES forums(id) ON DELETE CASCADE,
    group_id    INTEGER NOT NULL REFERENCES forum_groups(id) ON DELETE CASCADE,
    PRIMARY KEY (forum_id, group_id)
);

CREATE TABLE forum_viewer_groups (
    forum_id    INTEGER NOT NULL REFERENCES forums(id) ON DELETE CASCADE,
    group_id    INTEGER NOT NULL REFERENCES forum_groups(id) ON DELETE CASCADE,
    PRIMARY KEY (forum_id, group_id)
);
"#,
    // v3: Threads, posts and attachments
    r#"
CREATE TABLE threads (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    forum_id            INTEGER NOT NULL REFERENCES forums(id) ON DELETE CASCADE,
    title               TEXT NOT NULL,
    num_views           INTEGER NOT NULL DEFAULT 0,
    is_sticky           INTEGER NOT NULL DEFAULT 0,
    is_global_sticky    INTEGER NOT NULL DEFAULT 0,
    is_read_only        INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_threads_forum_id ON threads(forum_id);

CREATE TABLE posts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id       INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
    forum_id        INTEGER NOT NULL REFERENCES forums(id) ON DELETE CASCADE,
    author_id       INTEGER REFERENCES members(id) ON DELETE SET NULL,
    content         TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'moderated',  -- 'awaiting', 'moderated', 'rejected', 'archived'
    is_first_post   INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL DEFAULT (datetime('now')),
    last_edited     TEXT
);

CREATE INDEX idx_posts_thread_id ON posts(thread_id, id);
CREATE INDEX idx_posts_forum_id ON posts(forum_id);
CREATE INDEX idx_posts_author_id ON posts(author_id);
CREATE UNIQUE INDEX idx_posts_first_post ON posts(thread_id) WHERE is_first_post = 1;

CREATE TABLE post_attachments (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    stored_name TEXT NOT NULL UNIQUE,
    file_name   TEXT NOT NULL,
    size        INTEGER NOT NULL,
    mime_type   TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_post_attachments_post_id ON post_attachments(post_id);
"#,
    // v4: Thread subscriptions
    r#"
CREATE TABLE thread_subscriptions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id   INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
    member_id   INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
    last_sent   TEXT,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (thread_id, member_id)
);

CREATE INDEX idx_thread_subscriptions_member_id ON thread_subscriptions(member_id);
"#,
];

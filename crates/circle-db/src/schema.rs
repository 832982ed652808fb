//! Table registry.
//!
//! Only names listed here ever reach SQL text; every value is bound.

use crate::error::StoreError;

#[derive(Debug, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    /// Column order used for positional inserts and for select output.
    pub columns: &'static [&'static str],
}

impl Table {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }

    pub(crate) fn check_column(&self, column: &str) -> Result<(), StoreError> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(StoreError::Query(format!(
                "unknown column {:?} on table {}",
                column, self.name
            )))
        }
    }
}

pub const USERS: Table = Table {
    name: "users",
    columns: &[
        "id",
        "email",
        "password",
        "first_name",
        "last_name",
        "nickname",
        "date_of_birth",
        "about",
        "avatar",
        "privacy",
        "failed_logins",
        "created_at",
    ],
};

pub const POSTS: Table = Table {
    name: "posts",
    columns: &["id", "author_id", "group_id", "content", "image", "privacy", "created_at"],
};

pub const COMMENTS: Table = Table {
    name: "comments",
    columns: &["id", "post_id", "author_id", "content", "image", "created_at"],
};

pub const FOLLOWERS: Table = Table {
    name: "followers",
    columns: &["follower_id", "followed_id", "created_at"],
};

pub const FOLLOW_REQUESTS: Table = Table {
    name: "follow_requests",
    columns: &["requester_id", "target_id", "created_at"],
};

pub const GROUPS: Table = Table {
    name: "user_groups",
    columns: &["id", "creator_id", "title", "description", "created_at"],
};

pub const GROUP_MEMBERS: Table = Table {
    name: "group_members",
    columns: &["group_id", "user_id", "joined_at"],
};

pub const EVENTS: Table = Table {
    name: "events",
    columns: &["id", "group_id", "creator_id", "title", "description", "starts_at", "created_at"],
};

pub const NOTIFICATIONS: Table = Table {
    name: "notifications",
    columns: &["id", "recipient_id", "actor_id", "kind", "target_id", "description", "created_at"],
};

pub const MESSAGES: Table = Table {
    name: "messages",
    columns: &["id", "sender_id", "recipient_id", "group_id", "body", "created_at"],
};

pub const TABLES: &[&Table] = &[
    &USERS,
    &POSTS,
    &COMMENTS,
    &FOLLOWERS,
    &FOLLOW_REQUESTS,
    &GROUPS,
    &GROUP_MEMBERS,
    &EVENTS,
    &NOTIFICATIONS,
    &MESSAGES,
];

/// Look up a table by name.
pub fn table(name: &str) -> Result<&'static Table, StoreError> {
    TABLES
        .iter()
        .copied()
        .find(|t| t.name == name)
        .ok_or_else(|| StoreError::Query(format!("unknown table {:?}", name)))
}

//! Domain records as they are persisted.
//!
//! Every record is a flat projection of one table row. Ids and timestamps
//! are stored as text. `#[serde(default)]` lets a row with NULL or missing
//! columns still convert, with those fields left zero-valued.

use serde::{Deserialize, Serialize};

pub const PRIVACY_PUBLIC: &str = "public";
pub const PRIVACY_PRIVATE: &str = "private";

/// Current UTC time in the format every `created_at` column uses.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub date_of_birth: Option<String>,
    pub about: Option<String>,
    pub avatar: Option<String>,
    pub privacy: String,
    pub failed_logins: i64,
    pub created_at: String,
}

impl User {
    pub fn is_private(&self) -> bool {
        self.privacy == PRIVACY_PRIVATE
    }

    /// Name shown to other users in notification descriptions.
    pub fn display_name(&self) -> String {
        match &self.nickname {
            Some(nick) if !nick.is_empty() => nick.clone(),
            _ => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub group_id: Option<String>,
    pub content: String,
    pub image: Option<String>,
    pub privacy: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub image: Option<String>,
    pub created_at: String,
}

/// `follower_id` follows `followed_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Follower {
    pub follower_id: String,
    pub followed_id: String,
    pub created_at: String,
}

/// Pending follow of a private account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowRequest {
    pub requester_id: String,
    pub target_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub id: String,
    pub creator_id: String,
    pub title: String,
    pub description: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
    pub joined_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupEvent {
    pub id: String,
    pub group_id: String,
    pub creator_id: String,
    pub title: String,
    pub description: String,
    pub starts_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub actor_id: String,
    pub kind: String,
    pub target_id: Option<String>,
    pub description: String,
    pub created_at: String,
}

/// A chat message. Exactly one of `recipient_id` (private chat) or
/// `group_id` (group chat) is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub group_id: Option<String>,
    pub body: String,
    pub created_at: String,
}

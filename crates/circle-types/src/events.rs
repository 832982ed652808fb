use serde::{Deserialize, Serialize};

use crate::models::{Follower, FollowRequest, GroupMember, Message, Notification};

/// Events pushed over the live connection.
///
/// `Type` is the only field a client dispatches on; `Value` and
/// `Description` differ per event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all_fields = "PascalCase")]
pub enum LiveEvent {
    #[serde(rename = "Private Chat")]
    PrivateChat { value: Message, description: String },

    #[serde(rename = "Group Chat")]
    GroupChat { value: Message, description: String },

    Follow { value: Follower, description: String },

    FollowRequest { value: FollowRequest, description: String },

    Unfollow { value: Follower, description: String },

    JoinGroup { value: GroupMember, description: String },

    LeaveGroup { value: GroupMember, description: String },

    Notification { value: Notification, description: String },

    /// Value is the identity whose notifications were cleared.
    DeleteAllNotification { value: String, description: String },
}

impl LiveEvent {
    /// The wire discriminator, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PrivateChat { .. } => "Private Chat",
            Self::GroupChat { .. } => "Group Chat",
            Self::Follow { .. } => "Follow",
            Self::FollowRequest { .. } => "FollowRequest",
            Self::Unfollow { .. } => "Unfollow",
            Self::JoinGroup { .. } => "JoinGroup",
            Self::LeaveGroup { .. } => "LeaveGroup",
            Self::Notification { .. } => "Notification",
            Self::DeleteAllNotification { .. } => "DeleteAllNotification",
        }
    }
}

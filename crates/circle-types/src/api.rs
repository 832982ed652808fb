use serde::{Deserialize, Serialize};

use crate::models::Notification;

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub nickname: Option<String>,
    pub about: Option<String>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub display_name: String,
    pub token: String,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    pub body: String,
}

// -- Mutations --

/// Result of a mutation that may push a live event.
///
/// `delivered` is false when no recipient was online or the push failed;
/// the mutation itself has already been committed either way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationResponse {
    pub status: &'static str,
    pub delivered: bool,
}

#[derive(Debug, Serialize)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

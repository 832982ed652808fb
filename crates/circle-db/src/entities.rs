//! Per-record gateways over [`Store`].
//!
//! Each record type declares its table and required fields; the provided
//! methods do the rest.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};

use circle_types::models::{
    Comment, FollowRequest, Follower, Group, GroupEvent, GroupMember, Message, Notification, Post,
    User,
};

use crate::error::StoreError;
use crate::schema::{self, Table};
use crate::store::{Criteria, Store, Value, json_to_value, rows_to_typed, text};

pub trait Entity: Serialize + DeserializeOwned {
    const TABLE: &'static Table;

    /// Fields that must be present and non-empty before insertion.
    const REQUIRED: &'static [&'static str];

    /// Preconditions that need the store, such as referenced rows existing.
    fn check(&self, _store: &Store<'_>) -> Result<(), StoreError> {
        Ok(())
    }

    fn validate(&self) -> Result<(), StoreError> {
        let fields = to_fields(self)?;
        for field in Self::REQUIRED {
            let present = match fields.get(*field) {
                None | Some(Json::Null) => false,
                Some(Json::String(s)) => !s.trim().is_empty(),
                Some(_) => true,
            };
            if !present {
                return Err(StoreError::Validation(format!(
                    "{}.{} is required",
                    Self::TABLE.name,
                    field
                )));
            }
        }
        Ok(())
    }

    /// Validate, then insert as a full row.
    fn create(&self, store: &Store<'_>) -> Result<(), StoreError> {
        self.validate()?;
        self.check(store)?;

        let mut fields = to_fields(self)?;
        let values: Vec<Value> = Self::TABLE
            .columns
            .iter()
            .map(|column| fields.remove(*column).map_or(Value::Null, json_to_value))
            .collect();
        store.insert(Self::TABLE.name, &values)
    }

    fn find_by(store: &Store<'_>, criteria: &Criteria<'_>) -> Result<Vec<Self>, StoreError> {
        rows_to_typed(store.select(Self::TABLE.name, criteria)?)
    }

    fn find_one(store: &Store<'_>, criteria: &Criteria<'_>) -> Result<Option<Self>, StoreError> {
        Ok(Self::find_by(store, criteria)?.into_iter().next())
    }

    fn update(
        store: &Store<'_>,
        set: &Criteria<'_>,
        criteria: &Criteria<'_>,
    ) -> Result<usize, StoreError> {
        store.update(Self::TABLE.name, set, criteria)
    }

    fn delete(store: &Store<'_>, criteria: &Criteria<'_>) -> Result<usize, StoreError> {
        store.delete(Self::TABLE.name, criteria)
    }

    fn count(store: &Store<'_>, criteria: &Criteria<'_>) -> Result<usize, StoreError> {
        store.count(Self::TABLE.name, criteria)
    }
}

fn to_fields<T: Serialize + ?Sized>(record: &T) -> Result<Map<String, Json>, StoreError> {
    match serde_json::to_value(record) {
        Ok(Json::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Validation(format!(
            "record serialized to {} instead of an object",
            other
        ))),
        Err(e) => Err(StoreError::Validation(e.to_string())),
    }
}

fn require_user(store: &Store<'_>, id: &str) -> Result<(), StoreError> {
    if User::count(store, &[("id", text(id))])? == 0 {
        return Err(StoreError::Validation(format!("user {} does not exist", id)));
    }
    Ok(())
}

impl Entity for User {
    const TABLE: &'static Table = &schema::USERS;
    const REQUIRED: &'static [&'static str] =
        &["id", "email", "password", "first_name", "last_name", "privacy", "created_at"];
}

impl Entity for Post {
    const TABLE: &'static Table = &schema::POSTS;
    const REQUIRED: &'static [&'static str] = &["id", "author_id", "content", "privacy", "created_at"];
}

impl Entity for Comment {
    const TABLE: &'static Table = &schema::COMMENTS;
    const REQUIRED: &'static [&'static str] = &["id", "post_id", "author_id", "content", "created_at"];
}

impl Entity for Follower {
    const TABLE: &'static Table = &schema::FOLLOWERS;
    const REQUIRED: &'static [&'static str] = &["follower_id", "followed_id", "created_at"];

    fn check(&self, store: &Store<'_>) -> Result<(), StoreError> {
        if self.follower_id == self.followed_id {
            return Err(StoreError::Validation("a user cannot follow themselves".into()));
        }
        require_user(store, &self.follower_id)?;
        require_user(store, &self.followed_id)
    }
}

impl Entity for FollowRequest {
    const TABLE: &'static Table = &schema::FOLLOW_REQUESTS;
    const REQUIRED: &'static [&'static str] = &["requester_id", "target_id", "created_at"];

    fn check(&self, store: &Store<'_>) -> Result<(), StoreError> {
        if self.requester_id == self.target_id {
            return Err(StoreError::Validation("a user cannot follow themselves".into()));
        }
        require_user(store, &self.requester_id)?;
        require_user(store, &self.target_id)
    }
}

impl Entity for Group {
    const TABLE: &'static Table = &schema::GROUPS;
    const REQUIRED: &'static [&'static str] = &["id", "creator_id", "title", "description", "created_at"];
}

impl Entity for GroupMember {
    const TABLE: &'static Table = &schema::GROUP_MEMBERS;
    const REQUIRED: &'static [&'static str] = &["group_id", "user_id", "joined_at"];
}

impl Entity for GroupEvent {
    const TABLE: &'static Table = &schema::EVENTS;
    const REQUIRED: &'static [&'static str] =
        &["id", "group_id", "creator_id", "title", "description", "starts_at", "created_at"];
}

impl Entity for Notification {
    const TABLE: &'static Table = &schema::NOTIFICATIONS;
    const REQUIRED: &'static [&'static str] =
        &["id", "recipient_id", "actor_id", "kind", "description", "created_at"];
}

impl Entity for Message {
    const TABLE: &'static Table = &schema::MESSAGES;
    const REQUIRED: &'static [&'static str] = &["id", "sender_id", "body", "created_at"];

    fn check(&self, _store: &Store<'_>) -> Result<(), StoreError> {
        match (&self.recipient_id, &self.group_id) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(StoreError::Validation(
                "a message needs exactly one of recipient_id or group_id".into(),
            )),
        }
    }
}

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::debug;
use uuid::Uuid;

use circle_db::{Entity, Store, text};
use circle_types::api::{ChatRequest, MutationResponse};
use circle_types::events::LiveEvent;
use circle_types::models::{Follower, GroupMember, Message, User, timestamp};

use crate::error::ApiError;
use crate::follows::load_user;
use crate::groups::{load_group, member_ids};
use crate::middleware::Identity;
use crate::state::{AppState, blocking, fan_out, push};

pub async fn private_handler(
    State(state): State<AppState>,
    Extension(Identity(actor)): Extension<Identity>,
    Path(recipient): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(send_private(&state, &actor, &recipient, req.body).await?))
}

pub async fn group_handler(
    State(state): State<AppState>,
    Extension(Identity(actor)): Extension<Identity>,
    Path(group_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(send_group(&state, &actor, &group_id, req.body).await?))
}

/// Store a direct message and push it to the recipient.
///
/// Private accounts only accept messages from users they share a follow with.
pub async fn send_private(
    state: &AppState,
    actor: &str,
    recipient: &str,
    body: String,
) -> Result<MutationResponse, ApiError> {
    let (actor_id, recipient_id) = (actor.to_string(), recipient.to_string());
    let event = blocking(state, move |s| {
        s.db.transaction(|store| {
            let sender = load_user(store, &actor_id)?;
            let recipient = load_user(store, &recipient_id)?;
            if recipient.is_private() && !connected(store, &sender, &recipient)? {
                return Err(ApiError::Forbidden(
                    "this user only accepts messages from connections".into(),
                ));
            }

            let message = Message {
                id: Uuid::new_v4().to_string(),
                sender_id: sender.id.clone(),
                recipient_id: Some(recipient.id.clone()),
                group_id: None,
                body,
                created_at: timestamp(),
            };
            message.create(store)?;

            Ok(LiveEvent::PrivateChat {
                value: message,
                description: format!("New message from {}", sender.display_name()),
            })
        })
    })
    .await?;

    debug!("{} -> {}: private message", actor, recipient);
    let delivered = push(state, recipient, &event).await;
    Ok(MutationResponse {
        status: "sent",
        delivered,
    })
}

/// Store a group message and fan it out to every other member.
pub async fn send_group(
    state: &AppState,
    actor: &str,
    group_id: &str,
    body: String,
) -> Result<MutationResponse, ApiError> {
    let (actor_id, gid) = (actor.to_string(), group_id.to_string());
    let (others, event) = blocking(state, move |s| {
        s.db.transaction(|store| {
            let group = load_group(store, &gid)?;
            let is_member = GroupMember::count(
                store,
                &[("group_id", text(&group.id)), ("user_id", text(&actor_id))],
            )? > 0;
            if !is_member {
                return Err(ApiError::Forbidden("only members can post in this group".into()));
            }
            let sender = load_user(store, &actor_id)?;

            let message = Message {
                id: Uuid::new_v4().to_string(),
                sender_id: sender.id.clone(),
                recipient_id: None,
                group_id: Some(group.id.clone()),
                body,
                created_at: timestamp(),
            };
            message.create(store)?;

            let others = member_ids(store, &group.id, Some(sender.id.as_str()))?;
            Ok((
                others,
                LiveEvent::GroupChat {
                    value: message,
                    description: format!("{} in {}", sender.display_name(), group.title),
                },
            ))
        })
    })
    .await?;

    let delivered = fan_out(state, &others, &event).await;
    Ok(MutationResponse {
        status: "sent",
        delivered,
    })
}

/// True when either user follows the other.
fn connected(store: &Store<'_>, a: &User, b: &User) -> Result<bool, ApiError> {
    let forward = [("follower_id", text(&a.id)), ("followed_id", text(&b.id))];
    let backward = [("follower_id", text(&b.id)), ("followed_id", text(&a.id))];
    Ok(Follower::count(store, &forward)? + Follower::count(store, &backward)? > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::follows::follow;
    use crate::groups::tests::create_group;
    use crate::state::testing::{self, add_user, connect, next_event};

    #[tokio::test]
    async fn private_message_is_stored_and_pushed() {
        let state = testing::state();
        add_user(&state, "a", false);
        add_user(&state, "b", false);
        let mut b_rx = connect(&state, "b").await;

        let res = send_private(&state, "a", "b", "hello".into()).await.unwrap();
        assert!(res.delivered);

        match next_event(&mut b_rx) {
            LiveEvent::PrivateChat { value, .. } => {
                assert_eq!(value.sender_id, "a");
                assert_eq!(value.body, "hello");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn offline_recipient_still_gets_the_message_stored() {
        let state = testing::state();
        add_user(&state, "a", false);
        add_user(&state, "b", false);

        let res = send_private(&state, "a", "b", "later".into()).await.unwrap();
        assert!(!res.delivered);

        let stored = state
            .db
            .with_store(|s| Message::count(s, &[("recipient_id", text("b"))]))
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn private_accounts_need_a_connection() {
        let state = testing::state();
        add_user(&state, "a", false);
        add_user(&state, "p", true);

        let err = send_private(&state, "a", "p", "hi".into()).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        // p follows a, so a may now write to p.
        follow(&state, "p", "a").await.unwrap();
        send_private(&state, "a", "p", "hi".into()).await.unwrap();
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let state = testing::state();
        add_user(&state, "a", false);
        add_user(&state, "b", false);

        let err = send_private(&state, "a", "b", "   ".into()).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn group_message_reaches_other_members_only() {
        let state = testing::state();
        for id in ["a", "b", "c", "outsider"] {
            add_user(&state, id, false);
        }
        create_group(&state, "g1", "a", &["a", "b", "c"]);
        let mut a_rx = connect(&state, "a").await;
        let mut b_rx = connect(&state, "b").await;

        let res = send_group(&state, "a", "g1", "hi all".into()).await.unwrap();
        assert!(res.delivered);
        assert!(matches!(next_event(&mut b_rx), LiveEvent::GroupChat { .. }));
        assert!(a_rx.try_recv().is_err());

        let err = send_group(&state, "outsider", "g1", "let me in".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}

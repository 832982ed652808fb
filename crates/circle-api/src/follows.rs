use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;
use uuid::Uuid;

use circle_db::{Entity, Store, StoreError, text};
use circle_types::api::MutationResponse;
use circle_types::events::LiveEvent;
use circle_types::models::{FollowRequest, Follower, Notification, User, timestamp};

use crate::error::ApiError;
use crate::middleware::Identity;
use crate::state::{AppState, blocking, push};

pub async fn follow_handler(
    State(state): State<AppState>,
    Extension(Identity(actor)): Extension<Identity>,
    Path(target): Path<String>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(follow(&state, &actor, &target).await?))
}

pub async fn unfollow_handler(
    State(state): State<AppState>,
    Extension(Identity(actor)): Extension<Identity>,
    Path(target): Path<String>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(unfollow(&state, &actor, &target).await?))
}

pub async fn accept_handler(
    State(state): State<AppState>,
    Extension(Identity(actor)): Extension<Identity>,
    Path(requester): Path<String>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(accept_request(&state, &actor, &requester).await?))
}

/// Follow `target`: immediately for public accounts, as a pending request
/// for private ones. The target is notified either way.
pub async fn follow(state: &AppState, actor: &str, target: &str) -> Result<MutationResponse, ApiError> {
    if actor == target {
        return Err(ApiError::Validation("a user cannot follow themselves".into()));
    }

    let (actor_id, target_id) = (actor.to_string(), target.to_string());
    let (status, event) = blocking(state, move |s| {
        s.db.transaction(|store| {
            let target = load_user(store, &target_id)?;
            let actor = load_user(store, &actor_id)?;
            let now = timestamp();

            if target.is_private() {
                let request = FollowRequest {
                    requester_id: actor.id.clone(),
                    target_id: target.id.clone(),
                    created_at: now,
                };
                request.create(store).map_err(already("follow request"))?;
                let description = format!("{} wants to follow you", actor.display_name());
                notify(store, &target.id, &actor.id, "follow_request", None, &description)?;
                Ok(("requested", LiveEvent::FollowRequest { value: request, description }))
            } else {
                let follower = Follower {
                    follower_id: actor.id.clone(),
                    followed_id: target.id.clone(),
                    created_at: now,
                };
                follower.create(store).map_err(already("follow"))?;
                let description = format!("{} started following you", actor.display_name());
                notify(store, &target.id, &actor.id, "follow", None, &description)?;
                Ok(("following", LiveEvent::Follow { value: follower, description }))
            }
        })
    })
    .await?;

    info!("{} -> {}: {}", actor, target, status);
    let delivered = push(state, target, &event).await;
    Ok(MutationResponse { status, delivered })
}

/// Accept `requester`'s pending request to follow `actor`.
pub async fn accept_request(
    state: &AppState,
    actor: &str,
    requester: &str,
) -> Result<MutationResponse, ApiError> {
    let (actor_id, requester_id) = (actor.to_string(), requester.to_string());
    let event = blocking(state, move |s| {
        s.db.transaction(|store| {
            let removed = FollowRequest::delete(
                store,
                &[("requester_id", text(&requester_id)), ("target_id", text(&actor_id))],
            )?;
            if removed == 0 {
                return Err(ApiError::NotFound("follow request".into()));
            }

            let actor = load_user(store, &actor_id)?;
            let follower = Follower {
                follower_id: requester_id.clone(),
                followed_id: actor_id.clone(),
                created_at: timestamp(),
            };
            follower.create(store).map_err(already("follow"))?;

            let description = format!("{} accepted your follow request", actor.display_name());
            notify(store, &requester_id, &actor_id, "follow_accepted", None, &description)?;
            Ok(LiveEvent::Follow { value: follower, description })
        })
    })
    .await?;

    let delivered = push(state, requester, &event).await;
    Ok(MutationResponse {
        status: "accepted",
        delivered,
    })
}

pub async fn unfollow(state: &AppState, actor: &str, target: &str) -> Result<MutationResponse, ApiError> {
    let (actor_id, target_id) = (actor.to_string(), target.to_string());
    let event = blocking(state, move |s| {
        s.db.transaction(|store| {
            let criteria = [("follower_id", text(&actor_id)), ("followed_id", text(&target_id))];
            let Some(follower) = Follower::find_one(store, &criteria)? else {
                return Err(ApiError::NotFound("follow".into()));
            };
            Follower::delete(store, &criteria)?;

            let actor = load_user(store, &actor_id)?;
            Ok(LiveEvent::Unfollow {
                value: follower,
                description: format!("{} unfollowed you", actor.display_name()),
            })
        })
    })
    .await?;

    let delivered = push(state, target, &event).await;
    Ok(MutationResponse {
        status: "unfollowed",
        delivered,
    })
}

pub(crate) fn load_user(store: &Store<'_>, id: &str) -> Result<User, ApiError> {
    User::find_one(store, &[("id", text(id))])?.ok_or_else(|| ApiError::NotFound(format!("user {}", id)))
}

/// Persist a notification for `recipient` about something `actor` did.
pub(crate) fn notify(
    store: &Store<'_>,
    recipient: &str,
    actor: &str,
    kind: &str,
    target: Option<&str>,
    description: &str,
) -> Result<Notification, ApiError> {
    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        recipient_id: recipient.to_string(),
        actor_id: actor.to_string(),
        kind: kind.to_string(),
        target_id: target.map(str::to_string),
        description: description.to_string(),
        created_at: timestamp(),
    };
    notification.create(store)?;
    Ok(notification)
}

/// Map a uniqueness failure on `what` to a readable conflict.
pub(crate) fn already(what: &'static str) -> impl Fn(StoreError) -> ApiError {
    move |e| match e {
        StoreError::ConstraintViolation(_) => ApiError::Conflict(format!("{} already exists", what)),
        other => other.into(),
    }
}

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;

use circle_db::{Entity, Store, text};
use circle_types::api::MutationResponse;
use circle_types::events::LiveEvent;
use circle_types::models::{Group, GroupMember, timestamp};

use crate::error::ApiError;
use crate::follows::{already, load_user, notify};
use crate::middleware::Identity;
use crate::state::{AppState, blocking, fan_out, push};

pub async fn join_handler(
    State(state): State<AppState>,
    Extension(Identity(actor)): Extension<Identity>,
    Path(group_id): Path<String>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(join(&state, &actor, &group_id).await?))
}

pub async fn leave_handler(
    State(state): State<AppState>,
    Extension(Identity(actor)): Extension<Identity>,
    Path(group_id): Path<String>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(leave(&state, &actor, &group_id).await?))
}

/// Join a group. Existing members get `JoinGroup`; a creator outside the
/// group gets the stored notification pushed instead.
pub async fn join(state: &AppState, actor: &str, group_id: &str) -> Result<MutationResponse, ApiError> {
    let (actor_id, gid) = (actor.to_string(), group_id.to_string());
    let (others, creator_note, event) = blocking(state, move |s| {
        s.db.transaction(|store| {
            let group = load_group(store, &gid)?;
            let actor = load_user(store, &actor_id)?;

            let membership = GroupMember {
                group_id: group.id.clone(),
                user_id: actor.id.clone(),
                joined_at: timestamp(),
            };
            membership.create(store).map_err(already("membership"))?;

            let description = format!("{} joined {}", actor.display_name(), group.title);
            let note = if group.creator_id != actor.id {
                Some(notify(
                    store,
                    &group.creator_id,
                    &actor.id,
                    "group_join",
                    Some(group.id.as_str()),
                    &description,
                )?)
            } else {
                None
            };

            let others = member_ids(store, &group.id, Some(actor.id.as_str()))?;
            let creator_note = note.filter(|n| !others.contains(&n.recipient_id));
            Ok((
                others,
                creator_note,
                LiveEvent::JoinGroup { value: membership, description },
            ))
        })
    })
    .await?;

    info!("{} joined group {}", actor, group_id);
    let mut delivered = fan_out(state, &others, &event).await;
    if let Some(notification) = creator_note {
        let recipient = notification.recipient_id.clone();
        let description = notification.description.clone();
        let note_event = LiveEvent::Notification {
            value: notification,
            description,
        };
        delivered |= push(state, &recipient, &note_event).await;
    }
    Ok(MutationResponse {
        status: "joined",
        delivered,
    })
}

/// Leave a group. The group is deleted with its last member.
pub async fn leave(state: &AppState, actor: &str, group_id: &str) -> Result<MutationResponse, ApiError> {
    let (actor_id, gid) = (actor.to_string(), group_id.to_string());
    let (remaining, event) = blocking(state, move |s| {
        s.db.transaction(|store| {
            let criteria = [("group_id", text(&gid)), ("user_id", text(&actor_id))];
            let Some(membership) = GroupMember::find_one(store, &criteria)? else {
                return Err(ApiError::NotFound("membership".into()));
            };
            GroupMember::delete(store, &criteria)?;

            let remaining = member_ids(store, &gid, None)?;
            if remaining.is_empty() {
                Group::delete(store, &[("id", text(&gid))])?;
                info!("Group {} deleted with its last member", gid);
            }

            let actor = load_user(store, &actor_id)?;
            let description = format!("{} left the group", actor.display_name());
            Ok((remaining, LiveEvent::LeaveGroup { value: membership, description }))
        })
    })
    .await?;

    let status = if remaining.is_empty() { "group_deleted" } else { "left" };
    let delivered = fan_out(state, &remaining, &event).await;
    Ok(MutationResponse { status, delivered })
}

pub(crate) fn load_group(store: &Store<'_>, id: &str) -> Result<Group, ApiError> {
    Group::find_one(store, &[("id", text(id))])?.ok_or_else(|| ApiError::NotFound(format!("group {}", id)))
}

/// Member identities of `group_id`, optionally leaving one out.
pub(crate) fn member_ids(
    store: &Store<'_>,
    group_id: &str,
    except: Option<&str>,
) -> Result<Vec<String>, ApiError> {
    Ok(GroupMember::find_by(store, &[("group_id", text(group_id))])?
        .into_iter()
        .map(|m| m.user_id)
        .filter(|id| Some(id.as_str()) != except)
        .collect())
}

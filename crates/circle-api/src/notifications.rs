use axum::{
    Extension, Json,
    extract::State,
};

use circle_db::{Entity, text};
use circle_types::api::{MutationResponse, NotificationList};
use circle_types::events::LiveEvent;
use circle_types::models::Notification;

use crate::error::ApiError;
use crate::middleware::Identity;
use crate::state::{AppState, blocking, push};

pub async fn list_handler(
    State(state): State<AppState>,
    Extension(Identity(actor)): Extension<Identity>,
) -> Result<Json<NotificationList>, ApiError> {
    Ok(Json(list(&state, &actor).await?))
}

pub async fn clear_handler(
    State(state): State<AppState>,
    Extension(Identity(actor)): Extension<Identity>,
) -> Result<Json<MutationResponse>, ApiError> {
    Ok(Json(clear(&state, &actor).await?))
}

/// The caller's notifications, newest first.
pub async fn list(state: &AppState, actor: &str) -> Result<NotificationList, ApiError> {
    let actor_id = actor.to_string();
    let mut notifications = blocking(state, move |s| {
        Ok(s.db.with_store(|store| {
            Notification::find_by(store, &[("recipient_id", text(actor_id))])
        })?)
    })
    .await?;

    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(NotificationList { notifications })
}

/// Delete every notification of the caller and tell their live session.
pub async fn clear(state: &AppState, actor: &str) -> Result<MutationResponse, ApiError> {
    let actor_id = actor.to_string();
    let removed = blocking(state, move |s| {
        Ok(s.db.with_store(|store| {
            Notification::delete(store, &[("recipient_id", text(actor_id))])
        })?)
    })
    .await?;

    let event = LiveEvent::DeleteAllNotification {
        value: actor.to_string(),
        description: format!("{} notifications cleared", removed),
    };
    let delivered = push(state, actor, &event).await;
    Ok(MutationResponse {
        status: "cleared",
        delivered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::follows::follow;
    use crate::state::testing::{self, add_user, connect, next_event};

    #[tokio::test]
    async fn list_then_clear() {
        let state = testing::state();
        for id in ["a", "b", "c"] {
            add_user(&state, id, false);
        }
        follow(&state, "a", "c").await.unwrap();
        follow(&state, "b", "c").await.unwrap();

        let listed = list(&state, "c").await.unwrap().notifications;
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at >= listed[1].created_at);
        assert!(list(&state, "a").await.unwrap().notifications.is_empty());

        let mut c_rx = connect(&state, "c").await;
        let res = clear(&state, "c").await.unwrap();
        assert!(res.delivered);
        assert_eq!(
            next_event(&mut c_rx),
            LiveEvent::DeleteAllNotification {
                value: "c".into(),
                description: "2 notifications cleared".into(),
            }
        );
        assert!(list(&state, "c").await.unwrap().notifications.is_empty());
    }
}

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, warn};

use circle_gateway::handle_connection;

use crate::error::ApiError;
use crate::middleware::authenticate;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// GET /ws?token=...: authenticate, then upgrade to a live connection.
///
/// A failed authentication ends the attempt before any upgrade, so no hub
/// entry is ever created for it.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let identity = match query.token {
        Some(token) => authenticate(&state, token).await,
        None => Err(ApiError::Unauthenticated),
    }
    .inspect_err(|_| debug!("Rejected live connection attempt"))?;

    let hub = state.hub.clone();
    let write_timeout = state.ws_write_timeout;
    Ok(ws
        .on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| handle_connection(socket, hub, identity, write_timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::{Router, routing::get};
    use futures_util::StreamExt;
    use tokio_tungstenite::{connect_async, tungstenite};

    use circle_types::events::LiveEvent;

    use crate::state::testing::{self, add_user};

    async fn serve(state: AppState) -> SocketAddr {
        let app = Router::new()
            .route("/ws", get(ws_upgrade))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    async fn refused_with(url: String) -> u16 {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(response)) => response.status().as_u16(),
            Err(e) => panic!("unexpected client error: {e}"),
            Ok(_) => panic!("upgrade was accepted"),
        }
    }

    /// Wait until the hub agrees on whether `id` is connected.
    async fn settle(state: &AppState, id: &str, online: bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.hub.is_online(id).await != online {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("hub never settled");
    }

    #[tokio::test]
    async fn rejected_attempts_never_reach_the_hub() {
        let state = testing::state();
        add_user(&state, "u1", false);
        let orphan = state.codec.issue("deleted-user").unwrap();
        let addr = serve(state.clone()).await;

        for url in [
            format!("ws://{addr}/ws"),
            format!("ws://{addr}/ws?token=garbage"),
            format!("ws://{addr}/ws?token=a.b.c"),
            format!("ws://{addr}/ws?token={orphan}"),
        ] {
            assert_eq!(refused_with(url.clone()).await, 401, "{url}");
        }
        assert!(state.hub.is_empty().await);
    }

    #[tokio::test]
    async fn connection_lives_in_the_hub_until_the_client_goes_away() {
        let state = testing::state();
        add_user(&state, "u1", false);
        let token = state.codec.issue("u1").unwrap();
        let addr = serve(state.clone()).await;

        let (mut socket, response) = connect_async(format!("ws://{addr}/ws?token={token}"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 101);
        settle(&state, "u1", true).await;

        let event = LiveEvent::DeleteAllNotification {
            value: "u1".into(),
            description: "0 notifications cleared".into(),
        };
        assert!(state.hub.send_to("u1", &event).await.unwrap());

        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = frame.into_text().unwrap();
        assert_eq!(serde_json::from_str::<LiveEvent>(text.as_str()).unwrap(), event);

        drop(socket);
        settle(&state, "u1", false).await;
        assert!(state.hub.is_empty().await);
    }
}

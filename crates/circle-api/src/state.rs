use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use circle_db::Database;
use circle_gateway::ConnectionHub;
use circle_token::TokenCodec;
use circle_types::events::LiveEvent;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub codec: TokenCodec,
    pub hub: ConnectionHub,
    pub ws_write_timeout: Duration,
}

impl AppStateInner {
    pub fn new(db: Database, codec: TokenCodec, ws_write_timeout: Duration) -> AppState {
        Arc::new(Self {
            db,
            codec,
            hub: ConnectionHub::new(),
            ws_write_timeout,
        })
    }
}

/// Run blocking work (SQLite, password hashing) off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })?
}

/// Push `event` to `identity` if it is online. Hub failures are already
/// logged by the hub and only reported as "not delivered".
pub async fn push(state: &AppState, identity: &str, event: &LiveEvent) -> bool {
    state.hub.send_to(identity, event).await.unwrap_or(false)
}

/// Push `event` to every identity in `identities`; true if anyone got it.
pub async fn fan_out(state: &AppState, identities: &[String], event: &LiveEvent) -> bool {
    match state.hub.broadcast(identities, event).await {
        Ok(delivery) => delivery.delivered > 0,
        Err(e) => {
            error!("{} fan-out failed: {}", event.kind(), e);
            false
        }
    }
}

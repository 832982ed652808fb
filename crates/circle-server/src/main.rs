mod config;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use circle_api::middleware::require_auth;
use circle_api::{AppState, AppStateInner, auth, chat, follows, groups, notifications, ws};
use circle_db::Database;
use circle_token::TokenCodec;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circle=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::open(&config.db_path)?;
    let codec = TokenCodec::new(config.token_secret.as_bytes())?;
    let state = AppStateInner::new(db, codec, config.ws_write_timeout);

    let app = router(state);

    info!("Circle server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/ws", get(ws::ws_upgrade));

    let protected_routes = Router::new()
        .route(
            "/follow/{user_id}",
            post(follows::follow_handler).delete(follows::unfollow_handler),
        )
        .route(
            "/follow-requests/{requester_id}/accept",
            post(follows::accept_handler),
        )
        .route("/groups/{group_id}/join", post(groups::join_handler))
        .route("/groups/{group_id}/leave", post(groups::leave_handler))
        .route("/chat/private/{user_id}", post(chat::private_handler))
        .route("/chat/group/{group_id}", post(chat::group_handler))
        .route(
            "/notifications",
            get(notifications::list_handler).delete(notifications::clear_handler),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

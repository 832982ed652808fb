pub mod auth;
pub mod chat;
pub mod error;
pub mod follows;
pub mod groups;
pub mod middleware;
pub mod notifications;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use middleware::Identity;
pub use state::{AppState, AppStateInner};

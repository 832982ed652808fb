pub mod connection;
pub mod hub;

pub use connection::{DEFAULT_WRITE_TIMEOUT, handle_connection};
pub use hub::{ConnectionHandle, ConnectionHub, Delivery, HubError, QUEUE_CAPACITY};

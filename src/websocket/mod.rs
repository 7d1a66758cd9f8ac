//! WebSocket link to the browser extension.

pub mod connection;
pub mod message;
pub mod server;

pub use connection::LinkTimings;
pub use message::{Message, MessageType};
pub use server::{is_origin_allowed, run_server, serve, LinkState};

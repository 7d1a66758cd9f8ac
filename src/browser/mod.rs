pub mod client;
pub mod html;
pub mod types;

pub use client::{BrowserClient, PeerLink, NO_ACTIVE_TAB};
pub use types::{Actionable, Cookie, KeyModifiers, Tab};

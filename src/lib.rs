pub mod browser;
pub mod config;
pub mod dsl;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod mcpclient;
pub mod websocket;

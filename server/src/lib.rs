//! Whiteboard sync server.
//!
//! Holds the authoritative multi-page document and relays every accepted
//! mutation to the other connected participants over WebSocket.

pub mod app;
pub mod config;
pub mod sync;

pub use app::{router, serve};
pub use config::{AllowedOrigin, ConfigError, ServerConfig};
pub use sync::{ServerStats, SyncError, SyncServer, SyncServerConfig};

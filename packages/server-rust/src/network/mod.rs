//! Listener, protocol multiplexing, HTTP middleware, connection tracking and
//! shutdown control.

pub mod config;
pub mod connection;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod multiplexer;
pub mod shutdown;

pub use config::NetworkConfig;
pub use connection::{ConnectionGuard, ConnectionId, ConnectionInfo, ConnectionRegistry};
pub use handlers::AppState;
pub use module::{OrderServer, ServerError, ServerHandle};
pub use multiplexer::{classify, MakeMultiplexer, Multiplexer, Protocol};
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};

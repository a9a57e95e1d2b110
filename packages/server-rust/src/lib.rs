//! Order front-end server: gRPC and HTTP/JSON on one port, an ordered
//! interceptor chain, an item-service client and an in-memory order store.

pub mod config;
pub mod gateway;
pub mod item;
pub mod network;
pub mod observability;
pub mod service;
pub mod store;
pub mod traits;

pub use config::AppConfig;
pub use network::{OrderServer, ServerError, ServerHandle};
pub use traits::ItemCatalog;

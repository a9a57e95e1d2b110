//! Client for the remote item service.
//!
//! Calls travel through an outbound tower chain (identity propagation, then
//! client metrics) before reaching the tonic channel.

pub mod call;
pub mod client;
pub mod middleware;

pub use call::{ItemCall, ItemError, ItemFuture, ItemReply, ItemRequest};
pub use client::{DialError, ItemClient, ItemClientConfig, ItemStack, ItemTransport};
pub use middleware::{ClientIdentityLayer, ClientMetricsLayer};

//! RPC call handling.
//!
//! 1. **Frontend** (`frontend`): tonic request -> [`Operation`] with a [`CallContext`]
//! 2. **Middleware** (`middleware`): Tower layers (metrics, logging, deadline,
//!    identity, sleeper, validation, recovery)
//! 3. **Domain service** (`domain`): [`Operation`] -> order store call

pub mod config;
pub mod context;
pub mod domain;
pub mod frontend;
pub mod middleware;
pub mod operation;

pub use config::ServiceConfig;
pub use context::{CallContext, Identity, RpcMethod};
pub use domain::OrderDomainService;
pub use frontend::RpcFrontend;
pub use middleware::build_rpc_pipeline;
pub use operation::{Operation, OperationResponse, RpcError, RpcFuture};

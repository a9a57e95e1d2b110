//! Order book and the item checks that guard it.

pub mod order_store;
pub mod retry;
pub mod sample;

pub use order_store::{OrderStore, StoreError};
pub use retry::RetryPolicy;

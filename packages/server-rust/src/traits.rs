use async_trait::async_trait;
use order_core::{Item, ListItemsRequest};

use crate::item::ItemError;
use crate::service::context::CallContext;

/// Read-only view of the item catalog owned by the item service.
/// Implementations: [`ItemClient`](crate::item::ItemClient), in-memory fakes (tests).
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    /// Look up a single item. The call inherits `ctx`'s propagated headers
    /// and remaining deadline.
    async fn get_item(&self, ctx: &CallContext, id: &str) -> Result<Item, ItemError>;

    /// List items matching `filter`.
    async fn list_items(
        &self,
        ctx: &CallContext,
        filter: ListItemsRequest,
    ) -> Result<Vec<Item>, ItemError>;
}

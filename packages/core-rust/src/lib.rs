//! Order front-end core: wire contract for the order and item services and
//! schema-level request validation.

pub mod api;
pub mod validate;

pub use api::item::{GetItemRequest, Item, ListItemsRequest, ListItemsResponse};
pub use api::order::{
    CreateOrderRequest, DeleteOrderRequest, DeleteOrderResponse, GetOrderRequest, LineItem,
    ListOrdersRequest, ListOrdersResponse, Order, OrderStatus,
};
pub use validate::{Validate, ValidationError};

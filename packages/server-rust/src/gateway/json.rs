//! JSON shapes of the gateway routes.
//!
//! Field names are rendered in camelCase, matching the proto3 JSON mapping of
//! the order messages. Parsing also accepts the original proto field names
//! (`item_id`), as that mapping requires.

use order_core::{CreateOrderRequest, LineItem, ListOrdersResponse, Order};
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/orders`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateOrderBody {
    /// Client-chosen order id; empty asks the server to assign one.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub items: Vec<LineItemJson>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LineItemJson {
    #[serde(alias = "item_id")]
    pub item_id: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderJson {
    pub id: String,
    pub items: Vec<LineItemJson>,
    /// Enum value name, e.g. `ORDER_STATUS_CREATED`.
    pub status: String,
    /// RFC 3339 timestamp.
    #[serde(default, alias = "create_time", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderListJson {
    pub orders: Vec<OrderJson>,
}

impl From<CreateOrderBody> for CreateOrderRequest {
    fn from(body: CreateOrderBody) -> Self {
        Self {
            id: body.id,
            items: body.items.into_iter().map(LineItem::from).collect(),
        }
    }
}

impl From<LineItemJson> for LineItem {
    fn from(item: LineItemJson) -> Self {
        Self {
            item_id: item.item_id,
            quantity: item.quantity,
        }
    }
}

impl From<LineItem> for LineItemJson {
    fn from(item: LineItem) -> Self {
        Self {
            item_id: item.item_id,
            quantity: item.quantity,
        }
    }
}

impl From<Order> for OrderJson {
    fn from(order: Order) -> Self {
        let status = order.status().as_str_name().to_string();
        Self {
            id: order.id,
            items: order.items.into_iter().map(LineItemJson::from).collect(),
            status,
            create_time: order.create_time.map(|ts| ts.to_string()),
        }
    }
}

impl From<ListOrdersResponse> for OrderListJson {
    fn from(list: ListOrdersResponse) -> Self {
        Self {
            orders: list.orders.into_iter().map(OrderJson::from).collect(),
        }
    }
}

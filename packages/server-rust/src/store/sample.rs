//! Fixture orders loaded at bootstrap when `load_sample_data` is set.

use order_core::{LineItem, Order, OrderStatus};

/// `(order id, [(item id, quantity)])` for every fixture order.
const FIXTURES: &[(&str, &[(&str, i32)])] = &[
    ("sample-order-1", &[("item-1", 1), ("item-2", 2)]),
    ("sample-order-2", &[("item-3", 1)]),
    ("sample-order-3", &[("item-1", 4), ("item-3", 1), ("item-4", 10)]),
];

/// Builds the fixture orders, stamped with the current time.
#[must_use]
pub fn sample_orders() -> Vec<Order> {
    let now = std::time::SystemTime::now();
    FIXTURES
        .iter()
        .map(|(id, lines)| Order {
            id: (*id).to_string(),
            items: lines
                .iter()
                .map(|(item_id, quantity)| LineItem {
                    item_id: (*item_id).to_string(),
                    quantity: *quantity,
                })
                .collect(),
            status: OrderStatus::Created as i32,
            create_time: Some(prost_types::Timestamp::from(now)),
        })
        .collect()
}

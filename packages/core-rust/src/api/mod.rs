//! Wire contract: messages and gRPC services generated from `proto/*.proto`
//! by `build.rs`.

#[allow(clippy::pedantic)]
pub mod order {
    tonic::include_proto!("order");

    /// Fully-qualified gRPC service name.
    pub const SERVICE_NAME: &str = "order.OrderService";

    /// Request paths of every `OrderService` method.
    pub mod paths {
        pub const CREATE_ORDER: &str = "/order.OrderService/CreateOrder";
        pub const GET_ORDER: &str = "/order.OrderService/GetOrder";
        pub const LIST_ORDERS: &str = "/order.OrderService/ListOrders";
        pub const DELETE_ORDER: &str = "/order.OrderService/DeleteOrder";
    }
}

#[allow(clippy::pedantic)]
pub mod item {
    tonic::include_proto!("item");

    pub const SERVICE_NAME: &str = "item.ItemService";
}

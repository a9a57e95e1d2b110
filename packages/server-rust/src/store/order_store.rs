//! In-memory order book backed by the item catalog.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use futures_util::future::join_all;
use order_core::{CreateOrderRequest, Order, OrderStatus};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::sample::sample_orders;
use crate::item::ItemError;
use crate::service::context::CallContext;
use crate::traits::ItemCatalog;

/// Errors returned by [`OrderStore`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unknown item ids: {}", .0.join(", "))]
    UnknownItems(Vec<String>),
    #[error("order {0} not found")]
    NotFound(String),
    #[error("order {0} already exists")]
    AlreadyExists(String),
    #[error("item service unavailable: {0}")]
    ItemServiceUnavailable(String),
    #[error("item lookup failed: {0}")]
    ItemLookup(String),
}

#[derive(Debug, Default)]
struct OrderBook {
    orders: HashMap<String, Order>,
    /// Order ids in insertion order.
    sequence: Vec<String>,
}

impl OrderBook {
    fn insert(&mut self, order: Order) {
        self.sequence.push(order.id.clone());
        self.orders.insert(order.id.clone(), order);
    }
}

/// Holds every order created through this process.
///
/// Reads run in parallel; writes are exclusive. The lock is never held
/// across an item-service call.
pub struct OrderStore {
    catalog: Arc<dyn ItemCatalog>,
    retry: RetryPolicy,
    book: RwLock<OrderBook>,
    sample_loaded: AtomicBool,
}

impl OrderStore {
    #[must_use]
    pub fn new(catalog: Arc<dyn ItemCatalog>, retry: RetryPolicy) -> Self {
        Self {
            catalog,
            retry,
            book: RwLock::new(OrderBook::default()),
            sample_loaded: AtomicBool::new(false),
        }
    }

    /// Checks every referenced item against the catalog, then stores the
    /// order.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownItems`] if any item id is not in the catalog.
    /// - [`StoreError::ItemServiceUnavailable`] if the catalog could not be
    ///   reached within the retry policy.
    /// - [`StoreError::AlreadyExists`] if the caller-supplied id is taken.
    pub async fn create_order(
        &self,
        ctx: &CallContext,
        request: CreateOrderRequest,
    ) -> Result<Order, StoreError> {
        self.check_items(ctx, &request).await?;

        let mut order = Order {
            id: request.id,
            items: request.items,
            status: OrderStatus::Created as i32,
            create_time: Some(prost_types::Timestamp::from(SystemTime::now())),
        };

        let mut book = self.book.write();
        if order.id.is_empty() {
            order.id = loop {
                let candidate = uuid::Uuid::new_v4().to_string();
                if !book.orders.contains_key(&candidate) {
                    break candidate;
                }
            };
        } else if book.orders.contains_key(&order.id) {
            return Err(StoreError::AlreadyExists(order.id));
        }
        book.insert(order.clone());
        drop(book);

        debug!(order_id = %order.id, lines = order.items.len(), "order created");
        Ok(order)
    }

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no order has `id`.
    pub fn get_order(&self, id: &str) -> Result<Order, StoreError> {
        self.book
            .read()
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// All orders, oldest first.
    #[must_use]
    pub fn list_orders(&self) -> Vec<Order> {
        let book = self.book.read();
        book.sequence
            .iter()
            .filter_map(|id| book.orders.get(id).cloned())
            .collect()
    }

    /// Removes the order and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no order has `id`.
    pub fn delete_order(&self, id: &str) -> Result<Order, StoreError> {
        let mut book = self.book.write();
        let order = book
            .orders
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        book.sequence.retain(|existing| existing != id);
        Ok(order)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.book.read().orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts the fixture orders. Only the first call has an effect; returns
    /// how many orders were inserted.
    pub fn load_sample_data(&self) -> usize {
        if self.sample_loaded.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let mut book = self.book.write();
        let mut inserted = 0;
        for order in sample_orders() {
            if !book.orders.contains_key(&order.id) {
                book.insert(order);
                inserted += 1;
            }
        }
        drop(book);
        info!(inserted, "sample orders loaded");
        inserted
    }

    async fn check_items(
        &self,
        ctx: &CallContext,
        request: &CreateOrderRequest,
    ) -> Result<(), StoreError> {
        let distinct: BTreeSet<&str> = request.items.iter().map(|l| l.item_id.as_str()).collect();
        let lookups = distinct
            .iter()
            .map(|id| async move { (*id, self.lookup(ctx, id).await) });
        let results = join_all(lookups).await;

        let mut unknown = Vec::new();
        let mut unavailable = None;
        let mut failed = None;
        for (id, result) in results {
            match result {
                Ok(()) => {}
                Err(ItemError::NotFound(_)) => unknown.push(id.to_string()),
                Err(err @ (ItemError::Unavailable(_) | ItemError::DeadlineExceeded)) => {
                    unavailable.get_or_insert(err);
                }
                Err(err @ ItemError::Rejected { .. }) => {
                    failed.get_or_insert(err);
                }
            }
        }

        if !unknown.is_empty() {
            return Err(StoreError::UnknownItems(unknown));
        }
        if let Some(err) = unavailable {
            return Err(StoreError::ItemServiceUnavailable(err.to_string()));
        }
        if let Some(err) = failed {
            return Err(StoreError::ItemLookup(err.to_string()));
        }
        Ok(())
    }

    /// Looks up one item, retrying retryable failures while the call's
    /// deadline allows.
    async fn lookup(&self, ctx: &CallContext, id: &str) -> Result<(), ItemError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.catalog.get_item(ctx, id).await {
                Ok(_) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.retry.backoff(attempt);
                    if delay >= ctx.remaining() {
                        return Err(err);
                    }
                    warn!(
                        item_id = id,
                        attempt,
                        ?delay,
                        error = %err,
                        "item lookup failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Schema-level request validation.
//!
//! Every request message implements [`Validate`]. Checks here are purely
//! structural (required fields, bounds, identifier syntax); anything that
//! needs the item service or the order book belongs to the store.

use crate::api::item::{GetItemRequest, ListItemsRequest};
use crate::api::order::{
    CreateOrderRequest, DeleteOrderRequest, GetOrderRequest, LineItem, ListOrdersRequest,
};

/// Largest quantity accepted on a single line item.
pub const MAX_QUANTITY: i32 = 1000;

/// Largest number of line items accepted on one order.
pub const MAX_LINE_ITEMS: usize = 100;

/// Longest accepted order or item identifier, in bytes.
pub const MAX_ID_LEN: usize = 128;

/// A request field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    /// Path of the offending field, e.g. `items[2].quantity`.
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Structural validation of a request message.
pub trait Validate {
    /// # Errors
    ///
    /// Returns the first field that violates the message's constraints.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Checks the syntax shared by order and item identifiers.
///
/// # Errors
///
/// Returns a [`ValidationError`] naming `field` when `id` is empty, too long,
/// or contains whitespace or control characters.
pub fn validate_id(field: &str, id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::new(
            field,
            format!("must be at most {MAX_ID_LEN} bytes"),
        ));
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::new(
            field,
            "must not contain whitespace or control characters",
        ));
    }
    Ok(())
}

fn validate_line_item(index: usize, line: &LineItem) -> Result<(), ValidationError> {
    validate_id(&format!("items[{index}].item_id"), &line.item_id)?;
    if !(1..=MAX_QUANTITY).contains(&line.quantity) {
        return Err(ValidationError::new(
            format!("items[{index}].quantity"),
            format!("must be between 1 and {MAX_QUANTITY}"),
        ));
    }
    Ok(())
}

impl Validate for CreateOrderRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.id.is_empty() {
            validate_id("id", &self.id)?;
        }
        if self.items.is_empty() {
            return Err(ValidationError::new("items", "an order needs at least one line item"));
        }
        if self.items.len() > MAX_LINE_ITEMS {
            return Err(ValidationError::new(
                "items",
                format!("at most {MAX_LINE_ITEMS} line items are allowed"),
            ));
        }
        self.items
            .iter()
            .enumerate()
            .try_for_each(|(i, line)| validate_line_item(i, line))
    }
}

impl Validate for GetOrderRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_id("id", &self.id)
    }
}

impl Validate for ListOrdersRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl Validate for DeleteOrderRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_id("id", &self.id)
    }
}

impl Validate for GetItemRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_id("id", &self.id)
    }
}

impl Validate for ListItemsRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        self.ids
            .iter()
            .enumerate()
            .try_for_each(|(i, id)| validate_id(&format!("ids[{i}]"), id))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn line(item_id: &str, quantity: i32) -> LineItem {
        LineItem {
            item_id: item_id.to_string(),
            quantity,
        }
    }

    #[test]
    fn accepts_well_formed_create() {
        let req = CreateOrderRequest {
            id: String::new(),
            items: vec![line("item-1", 2), line("item-2", 1)],
        };
        assert_eq!(req.validate(), Ok(()));
    }

    #[test]
    fn rejects_order_without_items() {
        let req = CreateOrderRequest::default();
        let err = req.validate().unwrap_err();
        assert_eq!(err.field, "items");
    }

    #[test]
    fn rejects_too_many_items() {
        let req = CreateOrderRequest {
            id: String::new(),
            items: vec![line("item-1", 1); MAX_LINE_ITEMS + 1],
        };
        assert_eq!(req.validate().unwrap_err().field, "items");
    }

    #[test]
    fn reports_offending_line_index() {
        let req = CreateOrderRequest {
            id: String::new(),
            items: vec![line("item-1", 1), line("item-2", 0)],
        };
        let err = req.validate().unwrap_err();
        assert_eq!(err.field, "items[1].quantity");
        assert!(err.to_string().starts_with("invalid items[1].quantity"));
    }

    #[test]
    fn rejects_blank_item_id() {
        let req = CreateOrderRequest {
            id: String::new(),
            items: vec![line("", 1)],
        };
        assert_eq!(req.validate().unwrap_err().field, "items[0].item_id");
    }

    #[test]
    fn caller_supplied_id_must_be_well_formed() {
        let req = CreateOrderRequest {
            id: "has space".to_string(),
            items: vec![line("item-1", 1)],
        };
        assert_eq!(req.validate().unwrap_err().field, "id");
    }

    #[test]
    fn get_and_delete_require_id() {
        assert!(GetOrderRequest::default().validate().is_err());
        assert!(DeleteOrderRequest::default().validate().is_err());
        assert!(GetOrderRequest { id: "abc".into() }.validate().is_ok());
    }

    #[test]
    fn id_length_is_bounded() {
        let long = "x".repeat(MAX_ID_LEN + 1);
        assert!(validate_id("id", &long).is_err());
        assert!(validate_id("id", &long[..MAX_ID_LEN]).is_ok());
    }

    #[test]
    fn list_items_checks_every_id() {
        let req = ListItemsRequest {
            ids: vec!["a".into(), String::new()],
            available_only: false,
        };
        assert_eq!(req.validate().unwrap_err().field, "ids[1]");
        assert!(ListOrdersRequest {}.validate().is_ok());
    }

    proptest! {
        #[test]
        fn quantity_accepted_iff_in_range(quantity in any::<i32>()) {
            let req = CreateOrderRequest {
                id: String::new(),
                items: vec![line("item-1", quantity)],
            };
            prop_assert_eq!(req.validate().is_ok(), (1..=MAX_QUANTITY).contains(&quantity));
        }
    }
}

//! Fail-fast validation of a decoded [`Order`].
//!
//! Rules are checked in a fixed order and the first violation is returned:
//!
//! 1. top-level required fields, identifier and shard formats
//! 2. delivery required fields, then phone / zip / email formats
//! 3. payment required fields, `transaction == order_uid`, numeric bounds
//! 4. at least one item
//! 5. each item in sequence order
//!
//! Callers rely on this order: for a record with several problems the
//! reported error is always the earliest rule in the list above.

use thiserror::Error;

use crate::order::{Delivery, Item, Order, Payment};
use crate::types::{Email, OrderUid, Phone};

/// The first rule a decoded order violates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required string field is empty.
    #[error("{0} is empty")]
    Empty(&'static str),

    /// A field is present but malformed.
    #[error("{field} is invalid: {reason}")]
    Format {
        /// Dotted path of the field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The payment does not belong to this order.
    #[error("payment.transaction != order_uid")]
    TransactionMismatch,

    /// A numeric field that must be non-negative is negative.
    #[error("{0} must be >= 0")]
    Negative(&'static str),

    /// A numeric field that must be positive is zero or negative.
    #[error("{0} must be > 0")]
    NotPositive(&'static str),

    /// The order has no line items.
    #[error("items list is empty")]
    NoItems,

    /// A line item has an empty required field.
    #[error("items[{index}].{field} is empty")]
    ItemEmpty {
        /// Position of the item.
        index: usize,
        /// Field name within the item.
        field: &'static str,
    },

    /// A line item has a zero catalog id.
    #[error("items[{index}].chrt_id is zero")]
    ItemZeroCatalogId {
        /// Position of the item.
        index: usize,
    },

    /// A line item has a negative numeric field.
    #[error("items[{index}].{field} must be >= 0")]
    ItemNegative {
        /// Position of the item.
        index: usize,
        /// Field name within the item.
        field: &'static str,
    },

    /// A line item's track number differs from the order's.
    #[error("items[{index}].track_number != order.track_number")]
    ItemTrackMismatch {
        /// Position of the item.
        index: usize,
    },
}

impl Order {
    /// Check this order against every ingestion rule.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_header()?;
        self.delivery.validate()?;
        self.payment.validate(&self.order_uid)?;

        if self.items.is_empty() {
            return Err(ValidationError::NoItems);
        }
        for (index, item) in self.items.iter().enumerate() {
            item.validate(index, &self.track_number)?;
        }

        Ok(())
    }

    fn validate_header(&self) -> Result<(), ValidationError> {
        require("order_uid", &self.order_uid)?;
        OrderUid::parse(&self.order_uid).map_err(|e| ValidationError::Format {
            field: "order_uid",
            reason: e.to_string(),
        })?;
        require("track_number", &self.track_number)?;

        numeric_if_present("shardkey", self.shard_key.as_deref())?;
        numeric_if_present("oof_shard", self.oof_shard.as_deref())?;
        if self.sm_id.is_some_and(|id| id < 0) {
            return Err(ValidationError::Negative("sm_id"));
        }

        Ok(())
    }
}

impl Delivery {
    fn validate(&self) -> Result<(), ValidationError> {
        require("delivery.name", &self.name)?;
        require("delivery.phone", &self.phone)?;
        require("delivery.zip", &self.zip)?;
        require("delivery.city", &self.city)?;
        require("delivery.address", &self.address)?;

        Phone::parse(&self.phone).map_err(|e| ValidationError::Format {
            field: "delivery.phone",
            reason: e.to_string(),
        })?;
        numeric_if_present("delivery.zip", Some(&self.zip))?;
        if let Some(email) = present(self.email.as_deref()) {
            Email::parse(email).map_err(|e| ValidationError::Format {
                field: "delivery.email",
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }
}

impl Payment {
    fn validate(&self, order_uid: &str) -> Result<(), ValidationError> {
        require("payment.transaction", &self.transaction)?;
        if self.transaction != order_uid {
            return Err(ValidationError::TransactionMismatch);
        }
        require("payment.currency", &self.currency)?;
        require("payment.provider", &self.provider)?;

        if self.amount < 0 {
            return Err(ValidationError::Negative("payment.amount"));
        }
        if self.payment_dt <= 0 {
            return Err(ValidationError::NotPositive("payment.payment_dt"));
        }
        if self.delivery_cost < 0 {
            return Err(ValidationError::Negative("payment.delivery_cost"));
        }
        if self.goods_total < 0 {
            return Err(ValidationError::Negative("payment.goods_total"));
        }
        if self.custom_fee.is_some_and(|fee| fee < 0) {
            return Err(ValidationError::Negative("payment.custom_fee"));
        }

        Ok(())
    }
}

impl Item {
    fn validate(&self, index: usize, order_track: &str) -> Result<(), ValidationError> {
        match self.chrt_id {
            0 => return Err(ValidationError::ItemZeroCatalogId { index }),
            id if id < 0 => {
                return Err(ValidationError::ItemNegative {
                    index,
                    field: "chrt_id",
                });
            }
            _ => {}
        }
        if self.name.is_empty() {
            return Err(ValidationError::ItemEmpty {
                index,
                field: "name",
            });
        }
        if self.price < 0 {
            return Err(ValidationError::ItemNegative {
                index,
                field: "price",
            });
        }
        if self.total_price.is_some_and(|total| total < 0) {
            return Err(ValidationError::ItemNegative {
                index,
                field: "total_price",
            });
        }
        if present(self.track_number.as_deref()).is_some_and(|track| track != order_track) {
            return Err(ValidationError::ItemTrackMismatch { index });
        }

        Ok(())
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        Err(ValidationError::Empty(field))
    } else {
        Ok(())
    }
}

/// Optional string fields treat `""` the same as absent.
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn numeric_if_present(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    match present(value) {
        Some(v) if !v.bytes().all(|b| b.is_ascii_digit()) => Err(ValidationError::Format {
            field,
            reason: "must contain only digits".to_owned(),
        }),
        _ => Ok(()),
    }
}

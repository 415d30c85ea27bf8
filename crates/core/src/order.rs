//! The order aggregate.
//!
//! An [`Order`] owns exactly one [`Delivery`], one [`Payment`] and an ordered
//! list of [`Item`]s. The JSON shape matches the inbound stream payload and
//! the lookup response body.
//!
//! Every field deserializes with a default so that any syntactically valid
//! JSON object decodes; required-field checks happen in
//! [`Order::validate`](crate::validate).
//!
//! Monetary amounts are integer minor units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{OrderUid, OrderUidError};

/// Root order record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_service: Option<String>,
    /// Numeric-formatted shard key.
    #[serde(rename = "shardkey", skip_serializing_if = "Option::is_none")]
    pub shard_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sm_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,
    /// Numeric-formatted region shard marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oof_shard: Option<String>,
}

impl Order {
    /// Parse the order's identifier.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderUidError`] if `order_uid` is not a valid identifier.
    pub fn uid(&self) -> Result<OrderUid, OrderUidError> {
        OrderUid::parse(&self.order_uid)
    }

    /// Decode an order from a raw stream payload.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the payload is not a JSON object of
    /// the order shape.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Recipient information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Payment transaction record.
///
/// By convention `transaction` equals the parent order's `order_uid`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    pub transaction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Unix timestamp in seconds.
    pub payment_dt: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank: Option<String>,
    pub delivery_cost: i64,
    pub goods_total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fee: Option<i64>,
}

/// One line item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    /// Catalog id.
    pub chrt_id: i64,
    /// Must equal the parent order's track number when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<String>,
    pub price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nm_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "order_uid": "b563feb7b2b84b6test",
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7b2b84b6test",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [
            {
                "chrt_id": 9934930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }
        ],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    }"#;

    #[test]
    fn test_decode_full_payload() {
        let order = Order::from_slice(SAMPLE.as_bytes()).unwrap();
        assert_eq!(order.order_uid, "b563feb7b2b84b6test");
        assert_eq!(order.shard_key.as_deref(), Some("9"));
        assert_eq!(order.sm_id, Some(99));
        assert_eq!(order.payment.custom_fee, Some(0));
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].brand.as_deref(), Some("Vivienne Sabo"));
        assert_eq!(
            order.date_created.unwrap().to_rfc3339(),
            "2021-11-26T06:22:19+00:00"
        );
        assert_eq!(order.uid().unwrap().as_str(), "b563feb7b2b84b6test");
    }

    #[test]
    fn test_decode_empty_object_uses_defaults() {
        let order = Order::from_slice(b"{}").unwrap();
        assert!(order.order_uid.is_empty());
        assert!(order.items.is_empty());
        assert_eq!(order.payment.amount, 0);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(Order::from_slice(b"{\"order_uid\": ").is_err());
        assert!(Order::from_slice(b"[1, 2, 3]").is_err());
        assert!(Order::from_slice(b"{\"items\": \"none\"}").is_err());
    }

    #[test]
    fn test_serialize_uses_wire_names() {
        let order = Order::from_slice(SAMPLE.as_bytes()).unwrap();
        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["shardkey"], "9");
        assert!(value.get("shard_key").is_none());

        let sparse = serde_json::to_value(Order::default()).unwrap();
        assert!(sparse.get("entry").is_none());
        assert!(sparse.get("date_created").is_none());
    }
}

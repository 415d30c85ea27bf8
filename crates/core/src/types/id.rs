//! Order identifier newtype.
//!
//! Orders are keyed by an externally assigned string identifier. Wrapping it
//! keeps unchecked path segments and payload strings from being used as
//! cache or storage keys.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`OrderUid`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderUidError {
    /// The input string is empty.
    #[error("order_uid cannot be empty")]
    Empty,
    /// The input contains a character that is not ASCII alphanumeric.
    #[error("order_uid must be alphanumeric")]
    NotAlphanumeric,
}

/// Unique identifier of an order aggregate.
///
/// ## Constraints
///
/// - Non-empty, no upper length bound (stored as `TEXT`)
/// - ASCII letters and digits only
///
/// ## Examples
///
/// ```
/// use orderbox_core::OrderUid;
///
/// assert!(OrderUid::parse("b563feb7b2b84b6test").is_ok());
/// assert!(OrderUid::parse("").is_err());
/// assert!(OrderUid::parse("../etc").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct OrderUid(String);

impl OrderUid {
    /// Parse an `OrderUid` from a string.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderUidError`] if the input is empty or not ASCII
    /// alphanumeric.
    pub fn parse(s: &str) -> Result<Self, OrderUidError> {
        if s.is_empty() {
            return Err(OrderUidError::Empty);
        }

        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(OrderUidError::NotAlphanumeric);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OrderUid {
    type Err = OrderUidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderUid {
    type Error = OrderUidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderUid> for String {
    fn from(uid: OrderUid) -> Self {
        uid.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for OrderUid {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrderUid {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for OrderUid {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let uid = OrderUid::parse("b563feb7b2b84b6test").unwrap();
        assert_eq!(uid.as_str(), "b563feb7b2b84b6test");
        assert_eq!(uid.to_string(), "b563feb7b2b84b6test");
    }

    #[test]
    fn test_parse_rejects() {
        assert_eq!(OrderUid::parse(""), Err(OrderUidError::Empty));
        assert_eq!(
            OrderUid::parse("abc-123"),
            Err(OrderUidError::NotAlphanumeric)
        );
        assert_eq!(
            OrderUid::parse("заказ1"),
            Err(OrderUidError::NotAlphanumeric)
        );
    }

    #[test]
    fn test_parse_accepts_long_ids() {
        let long = "a1".repeat(200);
        assert_eq!(OrderUid::parse(&long).unwrap().as_str(), long);
    }

    #[test]
    fn test_serde_validates() {
        let uid: OrderUid = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(uid.as_str(), "abc123");
        assert!(serde_json::from_str::<OrderUid>("\"a b\"").is_err());
        assert_eq!(serde_json::to_string(&uid).unwrap(), "\"abc123\"");
    }
}

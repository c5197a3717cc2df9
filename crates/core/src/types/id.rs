//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. The shop API keys
//! every entity by an integer, except carts which are keyed by a UUID.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `i32` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
/// - Conversion methods: `new()`, `as_i32()`
/// - `From<i32>` and `Into<i32>` implementations
/// - `FromStr`, so IDs can be read back from session values and query strings
///
/// # Example
///
/// ```rust
/// # use myshop_core::define_id;
/// define_id!(AddressId);
/// define_id!(OrderId);
///
/// let address_id = AddressId::new(1);
/// let order_id: OrderId = "42".parse().unwrap();
///
/// // These are different types, so this won't compile:
/// // let _: AddressId = order_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// Create a new ID from an i32 value.
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            /// Get the underlying i32 value.
            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::core::num::ParseIntError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                s.trim().parse::<i32>().map(Self)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

// Define standard entity IDs
define_id!(UserId);
define_id!(CustomerId);
define_id!(ProductId);
define_id!(ProductImageId);
define_id!(CollectionId);
define_id!(CartItemId);
define_id!(OrderId);
define_id!(OrderItemId);
define_id!(AddressId);

/// Errors that can occur when parsing a [`CartId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartIdError {
    /// The input string is empty.
    #[error("cart id cannot be empty")]
    Empty,
    /// The input is not a UUID.
    #[error("cart id is not a valid UUID: {0}")]
    Invalid(String),
}

/// Server-generated cart identifier.
///
/// Carts are created lazily by the shop API, which assigns a UUID. The
/// storefront only ever stores and echoes it back, so it is treated as
/// opaque apart from the format check on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartId(Uuid);

impl CartId {
    /// Wrap an existing UUID.
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse a cart id from untrusted input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or not a UUID.
    pub fn parse(s: &str) -> Result<Self, CartIdError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CartIdError::Empty);
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| CartIdError::Invalid(s.to_owned()))
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

impl FromStr for CartId {
    type Err = CartIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_str_trims_whitespace() {
        let id: OrderId = " 17 ".parse().unwrap();
        assert_eq!(id.as_i32(), 17);
    }

    #[test]
    fn test_id_from_str_rejects_garbage() {
        assert!("abc".parse::<AddressId>().is_err());
        assert!("".parse::<AddressId>().is_err());
    }

    #[test]
    fn test_id_serializes_as_plain_integer() {
        let json = serde_json::to_string(&ProductId::new(5)).unwrap();
        assert_eq!(json, "5");
    }

    #[test]
    fn test_cart_id_parse() {
        let id = CartId::parse("6f1c1a4e-3b0b-4c55-9a53-2f1d0b6f8a11").unwrap();
        assert_eq!(id.to_string(), "6f1c1a4e-3b0b-4c55-9a53-2f1d0b6f8a11");
    }

    #[test]
    fn test_cart_id_parse_rejects_empty_and_invalid() {
        assert_eq!(CartId::parse("  "), Err(CartIdError::Empty));
        assert!(matches!(
            CartId::parse("not-a-cart"),
            Err(CartIdError::Invalid(_))
        ));
    }

    #[test]
    fn test_cart_id_deserializes_from_api_string() {
        let id: CartId = serde_json::from_str("\"6f1c1a4e-3b0b-4c55-9a53-2f1d0b6f8a11\"").unwrap();
        assert_eq!(
            id,
            CartId::parse("6f1c1a4e-3b0b-4c55-9a53-2f1d0b6f8a11").unwrap()
        );
    }
}

//! MyShop Core - Shared types library.
//!
//! This crate provides common types used by the MyShop storefront:
//! - `storefront` - Server-rendered shop front in front of the shop REST API
//! - `integration-tests` - End-to-end checkout scenarios against a fake API
//!
//! # Architecture
//!
//! The core crate contains only types and pure policy - no I/O, no session
//! access, no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and statuses
//! - [`pricing`] - Delivery fee policy and order totals shared by cart and checkout

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod pricing;
pub mod types;

pub use pricing::{DELIVERY_FEE, FREE_SHIPPING_THRESHOLD, OrderTotals, delivery_fee};
pub use types::*;

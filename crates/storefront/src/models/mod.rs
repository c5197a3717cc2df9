//! Session-held models for the storefront.
//!
//! Catalog, cart and order data are never stored locally; they are fetched
//! from the shop API on every request (see [`crate::api`]).

pub mod flash;
pub mod session;

pub use flash::{Flash, FlashLevel, push_flash, take_flashes};
pub use session::{CurrentUser, SessionStorage, StoreError, keys as session_keys};

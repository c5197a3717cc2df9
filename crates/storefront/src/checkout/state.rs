//! Checkout pointers held in the visitor session.

use std::str::FromStr;

use tracing::debug;
use uuid::Uuid;

use myshop_core::{AddressId, CartId, OrderId};

use crate::models::{SessionStorage, StoreError, session_keys as keys};

/// Per-visitor checkout state.
///
/// Rehydrated from the session at the start of every request and written
/// back after each transition. All fields are weak references to state
/// owned by the shop API; a value that no longer parses is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutSession {
    pub cart_id: Option<CartId>,
    pub selected_address_id: Option<AddressId>,
    pub current_order_id: Option<OrderId>,
    /// Cart the current order was created from.
    pub order_cart_id: Option<CartId>,
    /// Token for the cart contents as they are now. Drawn when an order is
    /// first placed and discarded on every cart change or dropped order.
    pub cart_revision: Option<Uuid>,
    /// Cart revision the current order was created from.
    pub order_revision: Option<Uuid>,
}

impl CheckoutSession {
    /// Read the checkout pointers from the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn load<S: SessionStorage>(store: &S) -> Result<Self, StoreError> {
        Ok(Self {
            cart_id: read_pointer(store, keys::CART_ID).await?,
            selected_address_id: read_pointer(store, keys::SELECTED_ADDRESS_ID).await?,
            current_order_id: read_pointer(store, keys::CURRENT_ORDER_ID).await?,
            order_cart_id: read_pointer(store, keys::CURRENT_ORDER_CART_ID).await?,
            cart_revision: read_pointer(store, keys::CART_REVISION).await?,
            order_revision: read_pointer(store, keys::CURRENT_ORDER_REVISION).await?,
        })
    }

    /// Write the checkout pointers back, removing the ones that are unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn save<S: SessionStorage>(&self, store: &S) -> Result<(), StoreError> {
        write_pointer(store, keys::CART_ID, self.cart_id.as_ref()).await?;
        write_pointer(
            store,
            keys::SELECTED_ADDRESS_ID,
            self.selected_address_id.as_ref(),
        )
        .await?;
        write_pointer(store, keys::CURRENT_ORDER_ID, self.current_order_id.as_ref()).await?;
        write_pointer(store, keys::CURRENT_ORDER_CART_ID, self.order_cart_id.as_ref()).await?;
        write_pointer(store, keys::CART_REVISION, self.cart_revision.as_ref()).await?;
        write_pointer(store, keys::CURRENT_ORDER_REVISION, self.order_revision.as_ref()).await?;
        Ok(())
    }

    /// The current order, if it was created from the cart as it is now.
    ///
    /// An order from another cart, or from an earlier revision of this one,
    /// does not count.
    #[must_use]
    pub fn order_for_cart(&self) -> Option<OrderId> {
        let order_id = self.current_order_id?;
        let cart_id = self.cart_id?;
        (self.order_cart_id == Some(cart_id)
            && self.order_revision.is_some()
            && self.order_revision == self.cart_revision)
            .then_some(order_id)
    }

    /// Remember an order created from `cart_id` at the current revision.
    pub fn record_order(&mut self, order_id: OrderId, cart_id: CartId) {
        self.current_order_id = Some(order_id);
        self.order_cart_id = Some(cart_id);
        self.order_revision = Some(*self.cart_revision.get_or_insert_with(Uuid::new_v4));
    }

    /// Idempotency scope for creating an order from `cart_id` now.
    ///
    /// Stable until the cart changes or an order is dropped; a fresh
    /// revision is drawn after that, so a new order is never collapsed into
    /// an older one.
    pub fn order_scope(&mut self, cart_id: CartId) -> String {
        let revision = *self.cart_revision.get_or_insert_with(Uuid::new_v4);
        format!("{cart_id}:{revision}")
    }

    /// Record a change to the cart contents.
    ///
    /// Returns the order that no longer matches the cart, if there was one.
    /// The address choice is kept.
    pub fn cart_changed(&mut self) -> Option<OrderId> {
        let order_id = self.current_order_id;
        self.forget_order();
        order_id
    }

    /// Drop the order pointers; the address choice and the cart stay.
    pub fn forget_order(&mut self) {
        self.current_order_id = None;
        self.order_cart_id = None;
        self.order_revision = None;
        self.cart_revision = None;
    }

    /// Forget the order and the address choice; the cart stays.
    pub fn clear_order(&mut self) {
        self.forget_order();
        self.selected_address_id = None;
    }

    /// Retire the cart after a verified payment.
    pub fn complete(&mut self) {
        self.clear_order();
        self.cart_id = None;
    }
}

async fn read_pointer<S, T>(store: &S, key: &'static str) -> Result<Option<T>, StoreError>
where
    S: SessionStorage,
    T: FromStr,
{
    let Some(raw) = store.get_value(key).await? else {
        return Ok(None);
    };
    match raw.parse::<T>() {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            debug!(key, value = %raw, "Ignoring unparseable session pointer");
            Ok(None)
        }
    }
}

async fn write_pointer<S, T>(
    store: &S,
    key: &'static str,
    value: Option<&T>,
) -> Result<(), StoreError>
where
    S: SessionStorage,
    T: ToString,
{
    match value {
        Some(value) => store.set_value(key, value.to_string()).await,
        None => store.remove_value(key).await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::session::memory::MemorySession;

    const CART: &str = "9f1c2d3e-4b5a-6789-abcd-ef0123456789";
    const OTHER_CART: &str = "00000000-0000-0000-0000-000000000001";
    const REVISION: &str = "5d0c7b1e-2f3a-4b6c-8d9e-0a1b2c3d4e5f";

    #[tokio::test]
    async fn test_load_reads_all_pointers() {
        let store = MemorySession::with(&[
            (keys::CART_ID, CART),
            (keys::SELECTED_ADDRESS_ID, "7"),
            (keys::CURRENT_ORDER_ID, "42"),
            (keys::CURRENT_ORDER_CART_ID, CART),
            (keys::CART_REVISION, REVISION),
            (keys::CURRENT_ORDER_REVISION, REVISION),
        ]);

        let session = CheckoutSession::load(&store).await.unwrap();
        assert_eq!(session.cart_id, Some(CartId::parse(CART).unwrap()));
        assert_eq!(session.cart_revision, Uuid::parse_str(REVISION).ok());
        assert_eq!(session.selected_address_id, Some(AddressId::new(7)));
        assert_eq!(session.order_for_cart(), Some(OrderId::new(42)));
    }

    #[tokio::test]
    async fn test_garbage_pointers_are_absent() {
        let store = MemorySession::with(&[
            (keys::CART_ID, "not-a-uuid"),
            (keys::CURRENT_ORDER_ID, "abc"),
        ]);

        let session = CheckoutSession::load(&store).await.unwrap();
        assert_eq!(session, CheckoutSession::default());
    }

    #[test]
    fn test_order_from_other_cart_is_not_reused() {
        let mut session = CheckoutSession {
            cart_id: Some(CartId::parse(CART).unwrap()),
            ..CheckoutSession::default()
        };
        session.record_order(OrderId::new(42), CartId::parse(OTHER_CART).unwrap());
        assert_eq!(session.order_for_cart(), None);
    }

    #[test]
    fn test_cart_change_releases_order() {
        let mut session = CheckoutSession {
            cart_id: Some(CartId::parse(CART).unwrap()),
            selected_address_id: Some(AddressId::new(7)),
            ..CheckoutSession::default()
        };
        session.record_order(OrderId::new(42), CartId::parse(CART).unwrap());
        assert_eq!(session.order_for_cart(), Some(OrderId::new(42)));

        assert_eq!(session.cart_changed(), Some(OrderId::new(42)));
        assert_eq!(session.order_for_cart(), None);
        assert_eq!(session.current_order_id, None);
        assert_eq!(session.selected_address_id, Some(AddressId::new(7)));

        // Nothing left to release
        assert_eq!(session.cart_changed(), None);
    }

    #[test]
    fn test_order_from_earlier_revision_is_not_reused() {
        let mut session = CheckoutSession {
            cart_id: Some(CartId::parse(CART).unwrap()),
            ..CheckoutSession::default()
        };
        session.record_order(OrderId::new(42), CartId::parse(CART).unwrap());
        session.cart_revision = Some(Uuid::new_v4());
        assert_eq!(session.order_for_cart(), None);

        // an order recorded without any revision never matches
        session.cart_revision = None;
        session.order_revision = None;
        assert_eq!(session.order_for_cart(), None);
    }

    #[test]
    fn test_revision_key_follows_cart_changes() {
        let cart_id = CartId::parse(CART).unwrap();
        let mut session = CheckoutSession {
            cart_id: Some(cart_id),
            ..CheckoutSession::default()
        };
        let first = session.order_scope(cart_id);
        assert!(first.starts_with(&format!("{CART}:")));
        assert_eq!(session.order_scope(cart_id), first);

        session.record_order(OrderId::new(42), cart_id);
        assert_eq!(session.order_for_cart(), Some(OrderId::new(42)));
        assert_eq!(session.order_scope(cart_id), first);

        session.cart_changed();
        let second = session.order_scope(cart_id);
        assert_ne!(first, second);

        session.record_order(OrderId::new(43), cart_id);
        session.clear_order();
        assert_ne!(session.order_scope(cart_id), second);
    }

    #[tokio::test]
    async fn test_fresh_session_writes_no_revision() {
        let store = MemorySession::with(&[]);

        CheckoutSession::default().save(&store).await.unwrap();

        assert_eq!(store.peek(keys::CART_REVISION), None);
        assert_eq!(store.peek(keys::CURRENT_ORDER_REVISION), None);
    }

    #[tokio::test]
    async fn test_clear_order_keeps_cart() {
        let store = MemorySession::with(&[
            (keys::CART_ID, CART),
            (keys::SELECTED_ADDRESS_ID, "7"),
            (keys::CURRENT_ORDER_ID, "42"),
            (keys::CURRENT_ORDER_CART_ID, CART),
            (keys::CART_REVISION, REVISION),
            (keys::CURRENT_ORDER_REVISION, REVISION),
        ]);

        let mut session = CheckoutSession::load(&store).await.unwrap();
        session.clear_order();
        session.save(&store).await.unwrap();

        assert_eq!(store.peek(keys::CART_ID).as_deref(), Some(CART));
        assert_eq!(store.peek(keys::SELECTED_ADDRESS_ID), None);
        assert_eq!(store.peek(keys::CURRENT_ORDER_ID), None);
        assert_eq!(store.peek(keys::CURRENT_ORDER_CART_ID), None);
        assert_eq!(store.peek(keys::CURRENT_ORDER_REVISION), None);
        assert_eq!(store.peek(keys::CART_REVISION), None);
    }

    #[tokio::test]
    async fn test_complete_clears_everything() {
        let store = MemorySession::with(&[
            (keys::CART_ID, CART),
            (keys::SELECTED_ADDRESS_ID, "7"),
            (keys::CURRENT_ORDER_ID, "42"),
        ]);

        let mut session = CheckoutSession::load(&store).await.unwrap();
        session.complete();
        session.save(&store).await.unwrap();

        assert_eq!(store.peek(keys::CART_ID), None);
        assert_eq!(store.peek(keys::SELECTED_ADDRESS_ID), None);
        assert_eq!(store.peek(keys::CURRENT_ORDER_ID), None);
    }
}

//! Cart and checkout state machine.
//!
//! ```text
//! Cart ──► CheckoutAddress ──► CheckoutPayment ──► provider ──► CheckoutSuccess
//!   │                              │
//!   │                              └── cancel ──► Cart (cart kept)
//!   └──► GuestCheckout ─────────────────────────► provider ──► CheckoutSuccess
//! ```
//!
//! A [`CheckoutFlow`] is built per request from the visitor session, runs one
//! transition against the shop API, and writes the resulting
//! [`CheckoutSession`] back. Orders are only ever created through
//! [`CheckoutFlow::ensure_order`], which reuses the order already created
//! for the current cart revision. Every cart change starts a new revision
//! and releases the order made from the previous one.

mod decision;
mod error;
mod state;

pub use decision::{
    AddressForm, GuestForm, OrderSource, PaymentReturn, PaymentReturnQuery, QuantityChange, Verification,
};
pub use error::{CheckoutError, messages};
pub use state::CheckoutSession;

use tracing::{debug, info, instrument, warn};
use url::Url;

use myshop_core::{AddressId, CartId, CartItemId, OrderId, OrderTotals, ProductId};

use crate::api::{Address, ApiClient, ApiError, Cart, Order, PaymentConfirmation, PaymentSession};
use crate::error::add_breadcrumb;
use crate::models::SessionStorage;

/// Hosted payment page the customer is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRedirect {
    pub url: Url,
}

impl PaymentRedirect {
    fn from_session(session: PaymentSession) -> Result<Self, CheckoutError> {
        let url = Url::parse(&session.url).map_err(|e| {
            warn!(error = %e, "Payment session returned an invalid URL");
            CheckoutError::missing(messages::PAYMENT_FAILED)
        })?;
        Ok(Self { url })
    }
}

/// Result of cancelling the checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The pending order is gone and the cart is kept.
    Cancelled,
    /// The order had already been paid or closed by the shop.
    AlreadyClosed,
}

/// Everything the payment step renders.
#[derive(Debug, Clone)]
pub struct PaymentSummary {
    pub order: Order,
    /// `None` when no address was chosen or it could not be loaded; paying is disabled.
    pub address: Option<Address>,
    pub totals: OrderTotals,
}

impl PaymentSummary {
    #[must_use]
    pub fn can_pay(&self) -> bool {
        self.address.is_some() && !self.order.items.is_empty()
    }
}

/// Per-request checkout controller.
pub struct CheckoutFlow<'a, S: SessionStorage> {
    api: &'a ApiClient,
    store: &'a S,
    session: CheckoutSession,
}

impl<'a, S: SessionStorage> CheckoutFlow<'a, S> {
    /// Rehydrate the checkout state from the visitor session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn load(api: &'a ApiClient, store: &'a S) -> Result<Self, CheckoutError> {
        let session = CheckoutSession::load(store).await?;
        Ok(Self {
            api,
            store,
            session,
        })
    }

    #[must_use]
    pub const fn session(&self) -> &CheckoutSession {
        &self.session
    }

    async fn save(&self) -> Result<(), CheckoutError> {
        Ok(self.session.save(self.store).await?)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Make sure a logged-in customer's permanent cart id is in the session.
    ///
    /// Waits for `customers/me` at most the configured sync timeout. A timeout
    /// leaves the session untouched and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the customer lookup fails.
    #[instrument(skip(self))]
    pub async fn sync_cart_id(&mut self) -> Result<Option<CartId>, CheckoutError> {
        if let Some(cart_id) = self.session.cart_id {
            return Ok(Some(cart_id));
        }
        self.fetch_customer_cart().await
    }

    /// Replace the session cart with the customer's permanent cart.
    ///
    /// Called right after login.
    ///
    /// # Errors
    ///
    /// Returns an error if the customer lookup fails.
    #[instrument(skip(self))]
    pub async fn adopt_customer_cart(&mut self) -> Result<Option<CartId>, CheckoutError> {
        self.fetch_customer_cart().await
    }

    async fn fetch_customer_cart(&mut self) -> Result<Option<CartId>, CheckoutError> {
        let lookup = self.api.customer(self.store);
        match tokio::time::timeout(self.api.cart_sync_timeout(), lookup).await {
            Ok(Ok(customer)) => {
                if customer.cart_id != self.session.cart_id {
                    debug!(cart_id = ?customer.cart_id, "Synchronized customer cart");
                    self.session.cart_id = customer.cart_id;
                    self.save().await?;
                }
                Ok(customer.cart_id)
            }
            Ok(Err(e)) => Err(CheckoutError::api(messages::CART_LOAD_FAILED, e)),
            Err(_) => {
                warn!(timeout = ?self.api.cart_sync_timeout(), "Cart sync timed out");
                Ok(None)
            }
        }
    }

    /// Load the cart, if the visitor has one.
    ///
    /// A cart the API no longer knows is dropped from the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be fetched.
    #[instrument(skip(self))]
    pub async fn load_cart(&mut self) -> Result<Option<Cart>, CheckoutError> {
        let Some(cart_id) = self.session.cart_id else {
            return Ok(None);
        };

        match self.api.cart(&cart_id).await {
            Ok(cart) => Ok(Some(cart)),
            Err(ApiError::NotFound(_)) => {
                info!(cart_id = %cart_id, "Stored cart no longer exists");
                self.session.cart_id = None;
                self.save().await?;
                Ok(None)
            }
            Err(e) => Err(CheckoutError::api(messages::CART_LOAD_FAILED, e)),
        }
    }

    /// Add a product, creating the cart on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart cannot be created or the item added.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_to_cart(
        &mut self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartId, CheckoutError> {
        let cart_id = match self.session.cart_id {
            Some(cart_id) => cart_id,
            None => self.create_cart().await?,
        };

        let cart_id = match self.api.add_cart_item(&cart_id, product_id, quantity).await {
            Ok(()) => cart_id,
            Err(ApiError::NotFound(_)) => {
                // Stale cart id; start over with a fresh cart.
                let cart_id = self.create_cart().await?;
                self.api
                    .add_cart_item(&cart_id, product_id, quantity)
                    .await
                    .map_err(|e| CheckoutError::api(messages::CART_ADD_FAILED, e))?;
                cart_id
            }
            Err(e) => return Err(CheckoutError::api(messages::CART_ADD_FAILED, e)),
        };

        self.cart_changed().await?;
        Ok(cart_id)
    }

    async fn create_cart(&mut self) -> Result<CartId, CheckoutError> {
        let cart = self
            .api
            .create_cart()
            .await
            .map_err(|e| CheckoutError::api(messages::CART_ADD_FAILED, e))?;
        info!(cart_id = %cart.id, "Created cart");
        self.session.cart_id = Some(cart.id);
        self.save().await?;
        Ok(cart.id)
    }

    /// Apply a requested quantity to a cart line.
    ///
    /// Quantities above the product's stock are rejected without a write;
    /// zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` for a rejected quantity, or an API error.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn update_quantity(
        &mut self,
        item_id: CartItemId,
        requested: i64,
    ) -> Result<(), CheckoutError> {
        let cart = self
            .load_cart()
            .await?
            .ok_or_else(|| CheckoutError::missing(messages::EMPTY_CART))?;
        let item = cart
            .find_item(item_id)
            .ok_or_else(|| CheckoutError::validation(messages::CART_ITEM_MISSING))?;

        let change = QuantityChange::decide(item, requested);
        match change {
            QuantityChange::Reject { .. } => {
                let message = change.rejection_message().unwrap_or_default();
                debug!(requested, "Rejected quantity above stock");
                Err(CheckoutError::Validation(message))
            }
            QuantityChange::Remove => self.remove_item(item_id).await,
            QuantityChange::Update(quantity) => {
                self.api
                    .update_cart_item(&cart.id, item_id, quantity)
                    .await
                    .map_err(|e| CheckoutError::api(messages::CART_UPDATE_FAILED, e))?;
                self.cart_changed().await
            }
        }
    }

    /// Remove a cart line.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no cart or the API call fails.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn remove_item(&mut self, item_id: CartItemId) -> Result<(), CheckoutError> {
        let cart_id = self
            .session
            .cart_id
            .ok_or_else(|| CheckoutError::missing(messages::EMPTY_CART))?;
        self.api
            .remove_cart_item(&cart_id, item_id)
            .await
            .map_err(|e| CheckoutError::api(messages::CART_REMOVE_FAILED, e))?;
        self.cart_changed().await
    }

    /// Start a new cart revision and release the order made from the old one.
    async fn cart_changed(&mut self) -> Result<(), CheckoutError> {
        if let Some(order_id) = self.session.cart_changed() {
            self.release_order(order_id).await;
        }
        self.save().await
    }

    /// Cancel an order nobody will pay for any more. Failures are only logged.
    async fn release_order(&self, order_id: OrderId) {
        match self.api.cancel_order(self.store, order_id).await {
            Ok(()) => info!(order_id = %order_id, "Cancelled order for outdated cart"),
            Err(e) => debug!(order_id = %order_id, error = %e, "Could not release outdated order"),
        }
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// The order for the current cart revision, created if it doesn't exist yet.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::MissingContext` without a cart, or an API error.
    #[instrument(skip(self))]
    pub async fn ensure_order(&mut self) -> Result<Order, CheckoutError> {
        if let Some(order) = self.pending_order().await? {
            debug!(order_id = %order.id, "Reusing order for cart");
            return Ok(order);
        }

        let cart_id = self
            .session
            .cart_id
            .ok_or_else(|| CheckoutError::missing(messages::EMPTY_CART))?;

        let scope = self.session.order_scope(cart_id);
        self.save().await?;
        let order = self
            .api
            .create_order(self.store, cart_id, &scope)
            .await
            .map_err(|e| CheckoutError::api(messages::ORDER_CREATE_FAILED, e))?;

        info!(order_id = %order.id, cart_id = %cart_id, "Created order from cart");
        add_breadcrumb(
            "checkout",
            "Order created",
            Some(&[("order_id", &order.id.to_string())]),
        );

        self.session.record_order(order.id, cart_id);
        self.save().await?;
        Ok(order)
    }

    /// The recorded order, if the shop still holds it pending with the
    /// current cart's lines.
    ///
    /// An order that is gone, no longer pending, or out of step with the
    /// cart is dropped from the session.
    async fn pending_order(&mut self) -> Result<Option<Order>, CheckoutError> {
        let Some(order_id) = self.session.order_for_cart() else {
            return Ok(None);
        };

        let order = match self.api.order(self.store, order_id).await {
            Ok(order) => order,
            Err(ApiError::NotFound(_)) => {
                info!(order_id = %order_id, "Recorded order no longer exists");
                self.forget_order().await?;
                return Ok(None);
            }
            Err(e) => return Err(CheckoutError::api(messages::ORDER_FETCH_FAILED, e)),
        };

        if !order.is_pending() {
            info!(order_id = %order_id, status = ?order.payment_status, "Recorded order is no longer pending");
            self.forget_order().await?;
            return Ok(None);
        }

        if let Some(cart) = self.load_cart().await?
            && !order.matches_cart(&cart)
        {
            info!(order_id = %order_id, "Recorded order no longer matches the cart");
            self.release_order(order_id).await;
            self.forget_order().await?;
            return Ok(None);
        }

        Ok(Some(order))
    }

    async fn forget_order(&mut self) -> Result<(), CheckoutError> {
        self.session.forget_order();
        self.save().await
    }

    /// Leave the address step with `address_id` selected.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` without a selection or cart, or an
    /// API error if the order cannot be created.
    #[instrument(skip(self))]
    pub async fn continue_to_payment(
        &mut self,
        address_id: Option<AddressId>,
    ) -> Result<OrderId, CheckoutError> {
        let address_id =
            address_id.ok_or_else(|| CheckoutError::validation(messages::NO_ADDRESS_SELECTED))?;
        if self.session.cart_id.is_none() {
            return Err(CheckoutError::validation(messages::EMPTY_CART));
        }

        let order_id = self.ensure_order().await?.id;
        self.session.selected_address_id = Some(address_id);
        self.save().await?;

        add_breadcrumb(
            "checkout",
            "Address selected",
            Some(&[("address_id", &address_id.to_string())]),
        );
        Ok(order_id)
    }

    // =========================================================================
    // Payment
    // =========================================================================

    /// Resolve the order and address for the payment step.
    ///
    /// # Errors
    ///
    /// A missing order, or an order that cannot be fetched, is terminal for
    /// the step. A missing address is not an error; see [`PaymentSummary::address`].
    #[instrument(skip(self))]
    pub async fn prepare_payment(&mut self) -> Result<PaymentSummary, CheckoutError> {
        let order = match OrderSource::resolve(&self.session) {
            OrderSource::Missing => return Err(CheckoutError::missing(messages::EMPTY_CART)),
            OrderSource::Existing(order_id) if self.session.cart_id.is_none() => self
                .api
                .order(self.store, order_id)
                .await
                .map_err(|e| CheckoutError::api(messages::ORDER_FETCH_FAILED, e))?,
            OrderSource::Existing(_) | OrderSource::Create(_) => self.ensure_order().await?,
        };

        let address = match self.session.selected_address_id {
            Some(address_id) => match self.api.address(self.store, address_id).await {
                Ok(address) => Some(address),
                Err(e) if e.is_session_expired() => {
                    return Err(CheckoutError::api(messages::NO_DELIVERY_ADDRESS, e));
                }
                Err(e) => {
                    warn!(address_id = %address_id, error = %e, "Selected address unavailable");
                    None
                }
            },
            None => None,
        };

        let totals = OrderTotals::from_lines(order.lines());
        Ok(PaymentSummary {
            order,
            address,
            totals,
        })
    }

    /// Request the hosted payment page for the current order and address.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::MissingContext` without both an order and an
    /// address, or when the order was closed or changed since the summary was
    /// shown. Otherwise an API error.
    #[instrument(skip(self))]
    pub async fn pay(&mut self) -> Result<PaymentRedirect, CheckoutError> {
        let (Some(recorded), Some(address_id)) = (
            self.session.current_order_id,
            self.session.selected_address_id,
        ) else {
            return Err(CheckoutError::missing(messages::PAYMENT_DATA_MISSING));
        };

        let order_id = if self.session.cart_id.is_some() {
            match self.pending_order().await? {
                Some(order) => order.id,
                None => return Err(CheckoutError::missing(messages::ORDER_OUTDATED)),
            }
        } else {
            recorded
        };

        let payment = self
            .api
            .create_payment_session(self.store, order_id, address_id)
            .await
            .map_err(|e| CheckoutError::api(messages::PAYMENT_FAILED, e))?;

        add_breadcrumb(
            "checkout",
            "Redirecting to payment provider",
            Some(&[("order_id", &order_id.to_string())]),
        );
        PaymentRedirect::from_session(payment)
    }

    /// Cancel the pending order and return to the cart, which is kept.
    ///
    /// An order the shop no longer has counts as cancelled; one it has
    /// already closed is reported as such. Either way the pointers are cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the API refuses to cancel an order that is still
    /// pending; the pointers are left as they were.
    #[instrument(skip(self))]
    pub async fn cancel(&mut self) -> Result<CancelOutcome, CheckoutError> {
        let outcome = match self.session.current_order_id {
            Some(order_id) => self.cancel_order(order_id).await?,
            None => CancelOutcome::Cancelled,
        };

        self.session.clear_order();
        self.save().await?;
        Ok(outcome)
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<CancelOutcome, CheckoutError> {
        let refused = match self.api.cancel_order(self.store, order_id).await {
            Ok(()) => {
                info!(order_id = %order_id, "Cancelled order");
                return Ok(CancelOutcome::Cancelled);
            }
            Err(ApiError::NotFound(_)) => {
                info!(order_id = %order_id, "Order to cancel no longer exists");
                return Ok(CancelOutcome::Cancelled);
            }
            Err(e @ ApiError::Status { status: 400, .. }) => e,
            Err(e) => return Err(CheckoutError::api(messages::CANCEL_FAILED, e)),
        };

        match self.api.order(self.store, order_id).await {
            Ok(order) if !order.is_pending() => {
                info!(order_id = %order_id, status = ?order.payment_status, "Order to cancel is already closed");
                Ok(CancelOutcome::AlreadyClosed)
            }
            Err(ApiError::NotFound(_)) => Ok(CancelOutcome::Cancelled),
            _ => Err(CheckoutError::api(messages::CANCEL_FAILED, refused)),
        }
    }

    /// Verify a payment return with exactly one API call.
    ///
    /// On success the cart and checkout pointers are retired. On failure
    /// nothing is cleared.
    ///
    /// # Errors
    ///
    /// Returns an API error if verification fails.
    #[instrument(skip(self, payment), fields(order_id = %payment.order_id, guest = payment.is_guest()))]
    pub async fn verify_return(
        &mut self,
        payment: &PaymentReturn,
    ) -> Result<PaymentConfirmation, CheckoutError> {
        let result = match payment.verification {
            Verification::Guest => {
                self.api
                    .verify_guest_payment(&payment.session_id, payment.order_id)
                    .await
            }
            Verification::Customer => {
                self.api
                    .verify_payment(self.store, &payment.session_id, payment.order_id)
                    .await
            }
        };
        let confirmation = result.map_err(|e| CheckoutError::api(messages::VERIFY_FAILED, e))?;

        info!("Payment verified");
        add_breadcrumb(
            "checkout",
            "Payment verified",
            Some(&[("order_id", &payment.order_id.to_string())]),
        );

        let retired_cart = self.session.cart_id;
        self.session.complete();
        self.save().await?;

        // Customer carts are emptied by the API; guest carts are left behind.
        if payment.is_guest()
            && let Some(cart_id) = retired_cart
            && let Err(e) = self.api.delete_cart(&cart_id).await
        {
            debug!(cart_id = %cart_id, error = %e, "Could not delete guest cart");
        }

        Ok(confirmation)
    }

    // =========================================================================
    // Guest checkout
    // =========================================================================

    /// Place a guest order and request its payment page.
    ///
    /// The form is validated before any call. An order already placed for
    /// this cart revision is reused.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` for bad input, or an API error.
    #[instrument(skip(self, form))]
    pub async fn guest_submit(&mut self, form: &GuestForm) -> Result<PaymentRedirect, CheckoutError> {
        let request = form.validate(self.session.cart_id)?;

        let order_id = match self.session.order_for_cart() {
            Some(order_id) => order_id,
            None => {
                let scope = self.session.order_scope(request.cart_id);
                self.save().await?;
                let order = self
                    .api
                    .create_guest_order(&request, &scope)
                    .await
                    .map_err(|e| CheckoutError::api(messages::GUEST_ORDER_FAILED, e))?;
                info!(order_id = %order.id, "Created guest order");
                self.session.record_order(order.id, request.cart_id);
                self.save().await?;
                order.id
            }
        };

        let payment = self
            .api
            .create_guest_payment_session(order_id)
            .await
            .map_err(|e| CheckoutError::api(messages::GUEST_ORDER_FAILED, e))?;

        add_breadcrumb(
            "checkout",
            "Redirecting guest to payment provider",
            Some(&[("order_id", &order_id.to_string())]),
        );
        PaymentRedirect::from_session(payment)
    }
}

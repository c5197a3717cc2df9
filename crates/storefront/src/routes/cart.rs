//! Cart route handlers.
//!
//! The cart id lives in the session. Guests get a cart on their first
//! add-to-cart; customers always use the permanent cart attached to their
//! account. Every change redirects back to `/cart`, which reloads the cart
//! so totals always come from the API.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use myshop_core::{CartItemId, OrderTotals, Price, ProductId};

use crate::api::Cart;
use crate::checkout::{CheckoutError, CheckoutFlow, CheckoutSession, messages};
use crate::error::{AppError, add_breadcrumb};
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::routes::{PageContext, redirect_with_error, redirect_with_success};
use crate::state::AppState;

/// Cart item display data for templates.
#[derive(Clone)]
pub struct CartItemView {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub title: String,
    pub quantity: u32,
    pub inventory: i32,
    pub unit_price: String,
    pub line_price: String,
    pub decrement: u32,
    pub increment: u32,
    pub at_stock_limit: bool,
}

/// Cart display data for templates.
#[derive(Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub item_count: u32,
    pub subtotal: String,
    pub delivery: String,
    pub free_delivery: bool,
    pub free_shipping_remaining: Option<String>,
    pub grand_total: String,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        let totals = OrderTotals::from_lines(cart.lines());
        let items = cart
            .items
            .iter()
            .map(|item| CartItemView {
                id: item.id,
                product_id: item.product.id,
                title: item.product.title.clone(),
                quantity: item.quantity,
                inventory: item.product.inventory,
                unit_price: Price::pln(item.product.unit_price).to_string(),
                line_price: Price::pln(item.product.unit_price)
                    .times(item.quantity)
                    .to_string(),
                decrement: item.quantity.saturating_sub(1),
                increment: item.quantity.saturating_add(1),
                at_stock_limit: i64::from(item.quantity) >= i64::from(item.product.inventory),
            })
            .collect();

        Self {
            items,
            item_count: cart.items.iter().map(|item| item.quantity).sum(),
            subtotal: totals.subtotal.to_string(),
            delivery: totals.delivery.to_string(),
            free_delivery: totals.has_free_delivery(),
            free_shipping_remaining: totals.free_shipping_remaining().map(|p| p.to_string()),
            grand_total: totals.grand_total.to_string(),
        }
    }
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub page: PageContext,
    /// `None` renders the empty state.
    pub cart: Option<CartView>,
}

/// Form data for adding to cart.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

/// Form data for updating a line quantity.
///
/// The quantity arrives as typed; anything that is not an integer counts as zero.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub item_id: CartItemId,
    #[serde(default)]
    pub quantity: String,
}

impl UpdateCartForm {
    fn requested(&self) -> i64 {
        self.quantity.trim().parse().unwrap_or(0)
    }
}

/// Form data for removing a line.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub item_id: CartItemId,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// Display the cart page.
///
/// A guest without a cart sees the empty state; no cart is created.
#[instrument(skip(state, session, page))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    mut page: PageContext,
) -> Result<Response, AppError> {
    let mut flow = CheckoutFlow::load(state.api(), &session).await?;

    if page.is_authenticated()
        && let Err(e) = flow.sync_cart_id().await
    {
        page.report(e)?;
    }

    let cart = match flow.load_cart().await {
        Ok(cart) => cart,
        Err(e) => {
            page.report(e)?;
            None
        }
    };

    let cart = cart
        .as_ref()
        .filter(|cart| !cart.items.is_empty())
        .map(CartView::from);

    Ok(CartShowTemplate { page, cart }.into_response())
}

/// Add a product to the cart and return to its page.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<AddToCartForm>,
) -> Result<Response, AppError> {
    let back = format!("/products/{}", form.product_id);
    let quantity = form.quantity.max(1);

    let mut flow = CheckoutFlow::load(state.api(), &session).await?;
    if user.is_some()
        && let Err(e) = flow.sync_cart_id().await
    {
        if e.is_session_expired() {
            return Err(e.into());
        }
        tracing::warn!(error = %e, "Cart sync failed before add");
    }

    match flow.add_to_cart(form.product_id, quantity).await {
        Ok(cart_id) => {
            add_breadcrumb(
                "cart",
                "Added to cart",
                Some(&[
                    ("cart_id", &cart_id.to_string()),
                    ("product_id", &form.product_id.to_string()),
                ]),
            );
            Ok(redirect_with_success(&session, "Product added to cart!", &back).await)
        }
        Err(e) => redirect_with_error(&session, e, &back).await,
    }
}

/// Apply a new quantity to a cart line.
#[instrument(skip(state, session))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<UpdateCartForm>,
) -> Result<Response, AppError> {
    let mut flow = CheckoutFlow::load(state.api(), &session).await?;

    match flow.update_quantity(form.item_id, form.requested()).await {
        Ok(()) => Ok(Redirect::to("/cart").into_response()),
        Err(e) => redirect_with_error(&session, e, "/cart").await,
    }
}

/// Remove a line from the cart.
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RemoveFromCartForm>,
) -> Result<Response, AppError> {
    let mut flow = CheckoutFlow::load(state.api(), &session).await?;

    match flow.remove_item(form.item_id).await {
        Ok(()) => Ok(Redirect::to("/cart").into_response()),
        Err(e) => redirect_with_error(&session, e, "/cart").await,
    }
}

/// Start checkout: customers choose an address, guests fill in the guest form.
///
/// The cart itself is not touched.
#[instrument(skip(session))]
pub async fn checkout(
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Response, AppError> {
    if user.is_some() {
        return Ok(Redirect::to("/checkout/address").into_response());
    }

    let checkout = CheckoutSession::load(&session).await?;
    if checkout.cart_id.is_none() {
        return redirect_with_error(&session, CheckoutError::validation(messages::EMPTY_CART), "/cart")
            .await;
    }

    Ok(Redirect::to("/checkout/guest").into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn cart(quantity: u32, unit_price: &str) -> Cart {
        serde_json::from_value(json!({
            "id": "6f1c1a4e-3b0b-4c55-9a53-2f1d0b6f8a11",
            "items": [{
                "id": 1,
                "product": {"id": 5, "title": "Kubek", "unit_price": unit_price, "inventory": 3},
                "quantity": quantity,
                "total_price": "0"
            }],
            "total_price": "0"
        }))
        .unwrap()
    }

    #[test]
    fn test_cart_view_free_delivery() {
        let view = CartView::from(&cart(3, "100"));
        assert_eq!(view.subtotal, "300.00 PLN");
        assert_eq!(view.delivery, "0.00 PLN");
        assert!(view.free_delivery);
        assert_eq!(view.grand_total, "300.00 PLN");
        assert!(view.items[0].at_stock_limit);
    }

    #[test]
    fn test_cart_view_charges_delivery() {
        let view = CartView::from(&cart(1, "50"));
        assert_eq!(view.subtotal, "50.00 PLN");
        assert_eq!(view.delivery, "15.00 PLN");
        assert_eq!(view.grand_total, "65.00 PLN");
        assert_eq!(view.free_shipping_remaining.as_deref(), Some("200.00 PLN"));
        assert_eq!(view.items[0].decrement, 0);
        assert_eq!(view.items[0].increment, 2);
    }

    #[test]
    fn test_update_form_parses_typed_quantity() {
        let form = |quantity: &str| UpdateCartForm {
            item_id: CartItemId::new(1),
            quantity: quantity.to_string(),
        };
        assert_eq!(form(" 4 ").requested(), 4);
        assert_eq!(form("-2").requested(), -2);
        assert_eq!(form("abc").requested(), 0);
        assert_eq!(form("").requested(), 0);
    }
}

//! Checkout route handlers.
//!
//! Each handler rehydrates a [`CheckoutFlow`] from the session, performs one
//! transition and either renders the step or redirects to the next one.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use myshop_core::{AddressId, OrderTotals, Price};

use crate::api::{Address, Cart};
use crate::checkout::{
    CancelOutcome, CheckoutError, CheckoutFlow, GuestForm, PaymentReturn, PaymentReturnQuery, PaymentSummary,
    messages,
};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{Flash, push_flash};
use crate::routes::{PageContext, redirect_with_error};
use crate::state::AppState;

// =============================================================================
// View Types
// =============================================================================

/// Address option on the address step.
#[derive(Clone)]
pub struct AddressView {
    pub id: AddressId,
    pub street_line: String,
    pub city_line: String,
    pub selected: bool,
}

impl AddressView {
    pub(crate) fn new(address: &Address, selected: Option<AddressId>) -> Self {
        Self {
            id: address.id,
            street_line: address.street_line(),
            city_line: address.city_line(),
            selected: selected == Some(address.id),
        }
    }
}

/// Values to prefill the address form with.
#[derive(Clone, Default)]
pub struct AddressFormView {
    /// Form target; `/addresses` for a new address.
    pub action: String,
    pub title: &'static str,
    pub street: String,
    pub house_number: String,
    pub apartment_number: String,
    pub city: String,
    pub post_code: String,
    /// Page the form returns to.
    pub next: &'static str,
    pub cancel_href: &'static str,
}

impl AddressFormView {
    /// Empty form for a new address.
    #[must_use]
    pub fn create(next: &'static str) -> Self {
        Self {
            action: "/addresses".to_string(),
            title: "Dodaj nowy adres",
            next,
            cancel_href: next,
            ..Self::default()
        }
    }

    /// Form prefilled with an existing address.
    #[must_use]
    pub fn edit(address: &Address, next: &'static str) -> Self {
        Self {
            action: format!("/addresses/{}", address.id),
            title: "Edytuj adres",
            street: address.street.clone(),
            house_number: address.house_number.to_string(),
            apartment_number: address
                .apartment_number
                .map(|n| n.to_string())
                .unwrap_or_default(),
            city: address.city.clone(),
            post_code: address.post_code.clone(),
            next,
            cancel_href: next,
        }
    }
}

/// Line on the payment summary.
#[derive(Clone)]
pub struct OrderLineView {
    pub title: String,
    pub quantity: u32,
    pub line_price: String,
}

/// Subtotal, delivery and total as shown on every summary.
#[derive(Clone)]
pub struct TotalsView {
    pub subtotal: String,
    pub delivery: String,
    pub free_delivery: bool,
    pub grand_total: String,
}

impl From<&OrderTotals> for TotalsView {
    fn from(totals: &OrderTotals) -> Self {
        Self {
            subtotal: totals.subtotal.to_string(),
            delivery: totals.delivery.to_string(),
            free_delivery: totals.has_free_delivery(),
            grand_total: totals.grand_total.to_string(),
        }
    }
}

/// Payment step data.
#[derive(Clone)]
pub struct PaymentView {
    pub order_id: String,
    pub lines: Vec<OrderLineView>,
    pub address: Option<AddressView>,
    pub totals: TotalsView,
    pub can_pay: bool,
}

impl From<&PaymentSummary> for PaymentView {
    fn from(summary: &PaymentSummary) -> Self {
        Self {
            order_id: summary.order.id.to_string(),
            lines: summary
                .order
                .items
                .iter()
                .map(|item| OrderLineView {
                    title: item.product.title.clone(),
                    quantity: item.quantity,
                    line_price: Price::pln(item.unit_price).times(item.quantity).to_string(),
                })
                .collect(),
            address: summary
                .address
                .as_ref()
                .map(|address| AddressView::new(address, Some(address.id))),
            totals: TotalsView::from(&summary.totals),
            can_pay: summary.can_pay(),
        }
    }
}

/// Confirmation shown after a verified payment.
#[derive(Clone)]
pub struct ConfirmationView {
    pub order_id: String,
    pub session_id: String,
    pub guest_email: Option<String>,
    pub is_guest: bool,
}

// =============================================================================
// Templates
// =============================================================================

/// Address selection step.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/address.html")]
pub struct AddressStepTemplate {
    pub page: PageContext,
    pub addresses: Vec<AddressView>,
    pub form: AddressFormView,
    pub can_continue: bool,
}

/// Payment step.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/payment.html")]
pub struct PaymentStepTemplate {
    pub page: PageContext,
    /// `None` when there is nothing to pay for; the page shows the error only.
    pub payment: Option<PaymentView>,
    pub missing_address_message: &'static str,
}

/// Payment return page.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/success.html")]
pub struct SuccessTemplate {
    pub page: PageContext,
    /// `None` when verification failed; the error is among the flashes.
    pub confirmation: Option<ConfirmationView>,
}

/// Guest checkout form.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/guest.html")]
pub struct GuestCheckoutTemplate {
    pub page: PageContext,
    pub form: GuestForm,
    /// `None` when there is no cart to check out.
    pub totals: Option<TotalsView>,
    pub empty_cart_message: &'static str,
}

// =============================================================================
// Address Step
// =============================================================================

/// Address step query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct AddressStepQuery {
    /// Address to load into the form for editing.
    pub edit: Option<String>,
}

/// Display the address step.
#[instrument(skip(state, session, page, _user))]
pub async fn address_page(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
    mut page: PageContext,
    Query(query): Query<AddressStepQuery>,
) -> Result<Response, AppError> {
    let mut flow = CheckoutFlow::load(state.api(), &session).await?;
    if let Err(e) = flow.sync_cart_id().await {
        page.report(e)?;
    }

    let addresses = match state.api().addresses(&session).await {
        Ok(addresses) => addresses,
        Err(e) => {
            page.report(CheckoutError::api(messages::ADDRESSES_LOAD_FAILED, e))?;
            Vec::new()
        }
    };

    let editing = query
        .edit
        .as_deref()
        .and_then(|raw| raw.parse::<AddressId>().ok())
        .and_then(|id| addresses.iter().find(|address| address.id == id));
    let form = editing.map_or_else(
        || AddressFormView::create("/checkout/address"),
        |address| AddressFormView::edit(address, "/checkout/address"),
    );

    let selected = flow.session().selected_address_id;
    Ok(AddressStepTemplate {
        page,
        can_continue: !addresses.is_empty(),
        addresses: addresses
            .iter()
            .map(|address| AddressView::new(address, selected))
            .collect(),
        form,
    }
    .into_response())
}

/// Address step form.
#[derive(Debug, Deserialize)]
pub struct ContinueForm {
    #[serde(default)]
    pub address_id: Option<String>,
}

/// Create the order for the cart and move to payment.
#[instrument(skip(state, session, _user))]
pub async fn continue_to_payment(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ContinueForm>,
) -> Result<Response, AppError> {
    let address_id = form
        .address_id
        .as_deref()
        .and_then(|raw| raw.parse::<AddressId>().ok());

    let mut flow = CheckoutFlow::load(state.api(), &session).await?;
    match flow.continue_to_payment(address_id).await {
        Ok(_) => Ok(Redirect::to("/checkout/payment").into_response()),
        Err(e) => redirect_with_error(&session, e, "/checkout/address").await,
    }
}

// =============================================================================
// Payment Step
// =============================================================================

/// Display the order summary with the pay and cancel actions.
#[instrument(skip(state, session, page, _user))]
pub async fn payment_page(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
    mut page: PageContext,
) -> Result<Response, AppError> {
    let mut flow = CheckoutFlow::load(state.api(), &session).await?;

    let payment = match flow.prepare_payment().await {
        Ok(summary) if summary.order.items.is_empty() => {
            page.error("Brak zamówienia lub produktów w zamówieniu.");
            None
        }
        Ok(summary) => Some(PaymentView::from(&summary)),
        Err(e) => {
            page.report(e)?;
            None
        }
    };

    Ok(PaymentStepTemplate {
        page,
        payment,
        missing_address_message: messages::NO_DELIVERY_ADDRESS,
    }
    .into_response())
}

/// Send the customer to the hosted payment page.
#[instrument(skip(state, session, _user))]
pub async fn pay(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let mut flow = CheckoutFlow::load(state.api(), &session).await?;
    match flow.pay().await {
        Ok(redirect) => Ok(Redirect::to(redirect.url.as_str()).into_response()),
        Err(e) => redirect_with_error(&session, e, "/checkout/payment").await,
    }
}

/// Cancel the order and go back to the cart.
#[instrument(skip(state, session, _user))]
pub async fn cancel(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let mut flow = CheckoutFlow::load(state.api(), &session).await?;
    match flow.cancel().await {
        Ok(outcome) => {
            let message = match outcome {
                CancelOutcome::Cancelled => "Zamówienie zostało anulowane.",
                CancelOutcome::AlreadyClosed => messages::ORDER_ALREADY_CLOSED,
            };
            push_flash(&session, Flash::info(message)).await;
            Ok(Redirect::to("/cart").into_response())
        }
        Err(e) => redirect_with_error(&session, e, "/checkout/payment").await,
    }
}

// =============================================================================
// Payment Return
// =============================================================================

/// Verify the payment the provider sent the customer back from.
///
/// Missing or malformed parameters are reported without any API call.
#[instrument(skip(state, session, page, query))]
pub async fn success(
    State(state): State<AppState>,
    session: Session,
    mut page: PageContext,
    Query(query): Query<PaymentReturnQuery>,
) -> Result<Response, AppError> {
    let payment = match PaymentReturn::parse(&query) {
        Ok(payment) => payment,
        Err(e) => {
            page.report(e)?;
            return Ok(SuccessTemplate {
                page,
                confirmation: None,
            }
            .into_response());
        }
    };

    let mut flow = CheckoutFlow::load(state.api(), &session).await?;
    let confirmation = match flow.verify_return(&payment).await {
        Ok(confirmation) => Some(ConfirmationView {
            order_id: payment.order_id.to_string(),
            session_id: payment.session_id.clone(),
            guest_email: confirmation.guest_email,
            is_guest: payment.is_guest(),
        }),
        Err(e) => {
            page.report(e)?;
            None
        }
    };

    Ok(SuccessTemplate { page, confirmation }.into_response())
}

// =============================================================================
// Guest Checkout
// =============================================================================

/// Cart totals for the guest summary, or `None` without a usable cart.
async fn guest_totals(
    flow: &mut CheckoutFlow<'_, Session>,
    page: &mut PageContext,
) -> Result<Option<TotalsView>, AppError> {
    let cart: Option<Cart> = match flow.load_cart().await {
        Ok(cart) => cart,
        Err(e) => {
            page.report(e)?;
            None
        }
    };

    Ok(cart
        .filter(|cart| !cart.items.is_empty())
        .map(|cart| TotalsView::from(&OrderTotals::from_lines(cart.lines()))))
}

/// Display the guest checkout form.
#[instrument(skip(state, session, page))]
pub async fn guest_page(
    State(state): State<AppState>,
    session: Session,
    mut page: PageContext,
) -> Result<Response, AppError> {
    if page.is_authenticated() {
        return Ok(Redirect::to("/checkout/address").into_response());
    }

    let mut flow = CheckoutFlow::load(state.api(), &session).await?;
    let totals = guest_totals(&mut flow, &mut page).await?;

    Ok(GuestCheckoutTemplate {
        page,
        form: GuestForm::default(),
        totals,
        empty_cart_message: messages::GUEST_EMPTY_CART,
    }
    .into_response())
}

/// Place the guest order and send the guest to the hosted payment page.
///
/// A rejected form is shown again with the values entered.
#[instrument(skip(state, session, page, form))]
pub async fn guest_submit(
    State(state): State<AppState>,
    session: Session,
    mut page: PageContext,
    Form(form): Form<GuestForm>,
) -> Result<Response, AppError> {
    let mut flow = CheckoutFlow::load(state.api(), &session).await?;

    let err = match flow.guest_submit(&form).await {
        Ok(redirect) => return Ok(Redirect::to(redirect.url.as_str()).into_response()),
        Err(e) => e,
    };

    if let CheckoutError::Validation(message) = &err {
        page.flashes.push(Flash::transient_error(message.clone()));
    } else {
        page.report(err)?;
    }

    let totals = guest_totals(&mut flow, &mut page).await?;
    Ok(GuestCheckoutTemplate {
        page,
        form,
        totals,
        empty_cart_message: messages::GUEST_EMPTY_CART,
    }
    .into_response())
}

//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                              - Home page
//! GET  /health                        - Liveness check
//! GET  /health/ready                  - Readiness check (shop API reachable)
//!
//! # Catalog
//! GET  /products                      - Product listing (?page&search&collection_id&ordering)
//! GET  /products/{id}                 - Product detail
//! GET  /collections                   - Collection listing
//! GET  /collections/{id}              - Redirect to products filtered by collection
//!
//! # Cart
//! GET  /cart                          - Cart page
//! POST /cart/add                      - Add product (creates the cart lazily)
//! POST /cart/update                   - Set line quantity (0 removes)
//! POST /cart/remove                   - Remove line
//! POST /cart/checkout                 - Start checkout (customer or guest path)
//!
//! # Checkout
//! GET  /checkout/address              - Address selection (requires auth)
//! POST /checkout/address/continue     - Create order, go to payment
//! GET  /checkout/payment              - Order summary
//! POST /checkout/payment/pay          - Redirect to the payment provider
//! POST /checkout/payment/cancel       - Cancel order, back to cart
//! GET  /checkout/success              - Payment return (?session_id&order_id&guest)
//! GET  /checkout/guest                - Guest checkout form
//! POST /checkout/guest                - Place guest order, redirect to provider
//!
//! # Addresses (requires auth)
//! POST /addresses                     - Create address
//! POST /addresses/{id}                - Update address
//! POST /addresses/{id}/delete         - Delete address
//!
//! # Account (requires auth)
//! GET  /orders                        - Order history
//! GET  /dashboard                     - Greeting and order stats
//! GET  /profile                       - Profile, password and addresses
//! POST /profile                       - Update phone and birth date
//! POST /profile/password              - Change password
//!
//! # Auth (rate limited)
//! GET  /auth/login                    - Login page
//! POST /auth/login                    - Login action
//! GET  /auth/register                 - Register page
//! POST /auth/register                 - Register action
//! POST /auth/logout                   - Logout action
//!
//! # Admin
//! GET  /admin                         - Redirect staff to the backend admin panel
//! ```

pub mod account;
pub mod addresses;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod collections;
pub mod health;
pub mod home;
pub mod products;

use axum::{
    Router,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use tower_sessions::Session;

use crate::checkout::CheckoutError;
use crate::error::AppError;
use crate::middleware::{CspNonce, auth_rate_limiter, cart_rate_limiter, current_user};
use crate::models::{CurrentUser, Flash, push_flash, take_flashes};
use crate::state::AppState;

// =============================================================================
// Page Context
// =============================================================================

/// Data every full page needs: the header's user, pending flashes and the CSP nonce.
///
/// Extracting it takes the pending flashes, so only use it in handlers that
/// render a page.
pub struct PageContext {
    pub user: Option<CurrentUser>,
    pub flashes: Vec<Flash>,
    pub nonce: String,
}

impl PageContext {
    /// Show an error on this page.
    pub fn error(&mut self, message: impl Into<String>) {
        self.flashes.push(Flash::error(message));
    }

    /// Show a checkout error on this page, or bail out if the customer must log in again.
    ///
    /// # Errors
    ///
    /// Returns the error unchanged when the session has expired.
    pub fn report(&mut self, err: CheckoutError) -> Result<(), AppError> {
        if err.is_session_expired() {
            return Err(err.into());
        }
        tracing::warn!(error = %err, "Checkout step failed");
        self.error(err.user_message());
        Ok(())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

impl<S> FromRequestParts<S> for PageContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let nonce = parts
            .extensions
            .get::<CspNonce>()
            .map(|nonce| nonce.value().to_string())
            .unwrap_or_default();

        let (user, flashes) = match parts.extensions.get::<Session>() {
            Some(session) => (current_user(session).await, take_flashes(session).await),
            None => (None, Vec::new()),
        };

        Ok(Self {
            user,
            flashes,
            nonce,
        })
    }
}

/// Redirect after a failed action, carrying the error as a flash message.
///
/// Validation errors fade out on their own; everything else stays until dismissed.
///
/// # Errors
///
/// Returns the error unchanged when the session has expired.
pub async fn redirect_with_error(
    session: &Session,
    err: CheckoutError,
    to: &str,
) -> Result<Response, AppError> {
    if err.is_session_expired() {
        return Err(err.into());
    }

    let flash = match &err {
        CheckoutError::Validation(message) => {
            tracing::debug!(error = %message, "Rejected input");
            Flash::transient_error(message.clone())
        }
        _ => {
            tracing::warn!(error = %err, "Action failed");
            Flash::error(err.user_message())
        }
    };
    push_flash(session, flash).await;
    Ok(Redirect::to(to).into_response())
}

/// Redirect with a success message.
pub async fn redirect_with_success(session: &Session, message: &str, to: &str) -> Response {
    push_flash(session, Flash::success(message)).await;
    Redirect::to(to).into_response()
}

// =============================================================================
// Routers
// =============================================================================

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
        .layer(auth_rate_limiter())
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the collection routes router.
pub fn collection_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(collections::index))
        .route("/{id}", get(collections::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    let writes = Router::new()
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/checkout", post(cart::checkout))
        .layer(cart_rate_limiter());

    Router::new().route("/", get(cart::show)).merge(writes)
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    let writes = Router::new()
        .route("/address/continue", post(checkout::continue_to_payment))
        .route("/payment/pay", post(checkout::pay))
        .route("/payment/cancel", post(checkout::cancel))
        .route("/guest", post(checkout::guest_submit))
        .layer(cart_rate_limiter());

    Router::new()
        .route("/address", get(checkout::address_page))
        .route("/payment", get(checkout::payment_page))
        .route("/success", get(checkout::success))
        .route("/guest", get(checkout::guest_page))
        .merge(writes)
}

/// Create the address routes router.
pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(addresses::create))
        .route("/{id}", post(addresses::update))
        .route("/{id}/delete", post(addresses::delete))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Home page
        .route("/", get(home::home))
        // Health checks
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        // Catalog
        .nest("/products", product_routes())
        .nest("/collections", collection_routes())
        // Cart and checkout
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .nest("/addresses", address_routes())
        // Account
        .route("/orders", get(account::orders))
        .route("/dashboard", get(account::dashboard))
        .route("/profile", get(account::profile).post(account::update_profile))
        .route("/profile/password", post(account::change_password))
        // Auth
        .nest("/auth", auth_routes())
        // Admin
        .route("/admin", get(admin::admin))
}

//! Client for the shop REST API.
//!
//! # Architecture
//!
//! - The shop API is the source of truth - NO local persistence, direct API calls
//! - Catalog reads (products, collections) are cached via `moka` (5 minute TTL)
//! - Cart, order, address and payment calls are never cached
//!
//! # Authentication
//!
//! Customer calls carry `Authorization: <scheme> <access token>` with the
//! tokens read from the visitor session. A `401` triggers exactly one refresh
//! through `/auth/jwt/refresh/` and one retry. When the refresh token is
//! missing or rejected, both tokens are cleared and the call fails with
//! [`ApiError::SessionExpired`]; handlers turn that into a redirect to login.
//!
//! # Example
//!
//! ```rust,ignore
//! use myshop_storefront::api::ApiClient;
//!
//! let client = ApiClient::new(&config.api)?;
//!
//! let cart = client.create_cart().await?;
//! client.add_cart_item(&cart.id, product_id, 2).await?;
//! let order = client.create_order(&session, cart.id, &checkout.order_scope(cart.id)).await?;
//! ```

mod cache;
pub mod types;

pub use types::*;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use myshop_core::{AddressId, CartId, CartItemId, CollectionId, OrderId, ProductId};

use crate::config::ShopApiConfig;
use crate::models::{SessionStorage, StoreError, session_keys as keys};

use cache::{CacheKey, CacheValue};

/// Header carrying the client-chosen idempotency key on order creation.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Errors that can occur when talking to the shop API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The API answered with a non-success status.
    #[error("API returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// First human-readable message from the error body (may be empty).
        message: String,
    },

    /// The customer's tokens are gone or were rejected after a refresh.
    #[error("Session expired")]
    SessionExpired,

    /// The visitor session could not be read or written.
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Message from the API's error body, if it sent one.
    #[must_use]
    pub fn api_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } | Self::NotFound(message) if !message.is_empty() => {
                Some(message.as_str())
            }
            _ => None,
        }
    }

    /// Whether the customer has to log in again.
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the shop REST API.
///
/// Cheap to clone; all clones share the connection pool and the catalog cache.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    auth_scheme: String,
    cart_sync_timeout: Duration,
    cache: Cache<CacheKey, CacheValue>,
}

/// Status and body of a completed API call.
struct ApiResponse {
    status: StatusCode,
    body: String,
}

impl ApiResponse {
    fn ensure_success(self) -> Result<Self, ApiError> {
        if self.status.is_success() {
            return Ok(self);
        }

        let message = extract_error_message(&self.body).unwrap_or_default();
        if self.status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(message));
        }
        Err(ApiError::Status {
            status: self.status.as_u16(),
            message,
        })
    }

    fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let response = self.ensure_success()?;
        serde_json::from_str(&response.body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %truncate(&response.body, 500),
                "Failed to parse shop API response"
            );
            ApiError::Parse(e)
        })
    }

    fn empty(self) -> Result<(), ApiError> {
        self.ensure_success().map(|_| ())
    }
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (TLS backend failure).
    pub fn new(config: &ShopApiConfig) -> Result<Self, ApiError> {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("myshop-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.base_url.clone(),
                auth_scheme: config.auth_scheme.clone(),
                cart_sync_timeout: config.cart_sync_timeout,
                cache,
            }),
        })
    }

    /// Upper bound on waiting for the customer's cart id.
    #[must_use]
    pub fn cart_sync_timeout(&self) -> Duration {
        self.inner.cart_sync_timeout
    }

    /// Resolve an API-relative path (e.g. a media URL) against the API base.
    #[must_use]
    pub fn absolute_url(&self, path: &str) -> String {
        self.inner
            .base_url
            .join(path)
            .map_or_else(|_| path.to_string(), String::from)
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.inner.base_url.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder, token: &SecretString) -> RequestBuilder {
        request.header(
            reqwest::header::AUTHORIZATION,
            format!("{} {}", self.inner.auth_scheme, token.expose_secret()),
        )
    }

    /// Send a request and read the full body.
    async fn dispatch(&self, request: RequestBuilder) -> Result<ApiResponse, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        let body = response.text().await?;

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                body = %truncate(&body, 500),
                "Shop API returned server error"
            );
        } else if !status.is_success() {
            debug!(status = %status, body = %truncate(&body, 200), "Shop API rejected request");
        }

        Ok(ApiResponse { status, body })
    }

    /// Send a customer request, refreshing the access token once on `401`.
    async fn send_authed<S, F>(&self, session: &S, build: F) -> Result<ApiResponse, ApiError>
    where
        S: SessionStorage,
        F: Fn() -> Result<RequestBuilder, ApiError> + Send + Sync,
    {
        let access = session
            .get_value(keys::ACCESS_TOKEN)
            .await?
            .map(SecretString::from)
            .ok_or(ApiError::SessionExpired)?;

        let response = self.dispatch(self.authorize(build()?, &access)).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("Access token rejected, refreshing");
        let access = self.refresh_access_token(session).await?;

        let response = self.dispatch(self.authorize(build()?, &access)).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            warn!("Refreshed access token rejected, ending session");
            self.clear_tokens(session).await?;
            return Err(ApiError::SessionExpired);
        }
        Ok(response)
    }

    /// Exchange the refresh token for a new access token and store it.
    async fn refresh_access_token<S: SessionStorage>(
        &self,
        session: &S,
    ) -> Result<SecretString, ApiError> {
        let Some(refresh) = session.get_value(keys::REFRESH_TOKEN).await? else {
            self.clear_tokens(session).await?;
            return Err(ApiError::SessionExpired);
        };

        let request = self
            .inner
            .client
            .post(self.url("auth/jwt/refresh/")?)
            .json(&RefreshRequest { refresh });
        let response = self.dispatch(request).await?;

        if !response.status.is_success() {
            warn!(status = %response.status, "Token refresh rejected, ending session");
            self.clear_tokens(session).await?;
            return Err(ApiError::SessionExpired);
        }

        let token: AccessToken = response.json()?;
        session
            .set_value(keys::ACCESS_TOKEN, token.access.clone())
            .await?;
        Ok(SecretString::from(token.access))
    }

    /// Forget the customer's tokens and identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be modified.
    pub async fn clear_tokens<S: SessionStorage>(&self, session: &S) -> Result<(), ApiError> {
        session.remove_value(keys::ACCESS_TOKEN).await?;
        session.remove_value(keys::REFRESH_TOKEN).await?;
        session.remove_value(keys::CURRENT_USER).await?;
        Ok(())
    }

    /// Liveness probe for the readiness check.
    ///
    /// # Errors
    ///
    /// Returns an error if the API is unreachable or answers with an error status.
    pub async fn ping(&self) -> Result<(), ApiError> {
        let request = self.inner.client.get(self.url("store/collections/")?);
        self.dispatch(request).await?.empty()
    }

    // =========================================================================
    // Catalog Methods
    // =========================================================================

    /// Get a page of products.
    ///
    /// Searches bypass the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn products(&self, query: &ProductQuery) -> Result<Page<Product>, ApiError> {
        let cacheable = query.search.is_none();
        let cache_key = CacheKey::Products(query.clone());

        if cacheable
            && let Some(CacheValue::Products(page)) = self.inner.cache.get(&cache_key).await
        {
            debug!("Cache hit for products");
            return Ok(page);
        }

        let request = self
            .inner
            .client
            .get(self.url("store/products/")?)
            .query(query);
        let page: Page<Product> = self.dispatch(request).await?.json()?;

        if cacheable {
            self.inner
                .cache
                .insert(cache_key, CacheValue::Products(page.clone()))
                .await;
        }

        Ok(page)
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the product doesn't exist, or another
    /// error if the request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: ProductId) -> Result<Product, ApiError> {
        let cache_key = CacheKey::Product(id);

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let request = self
            .inner
            .client
            .get(self.url(&format!("store/products/{id}/"))?);
        let product: Product = self.dispatch(request).await?.json()?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    /// Get all collections.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn collections(&self) -> Result<Vec<Collection>, ApiError> {
        if let Some(CacheValue::Collections(collections)) =
            self.inner.cache.get(&CacheKey::Collections).await
        {
            debug!("Cache hit for collections");
            return Ok(collections);
        }

        let request = self.inner.client.get(self.url("store/collections/")?);
        let collections: Vec<Collection> = self.dispatch(request).await?.json()?;

        self.inner
            .cache
            .insert(
                CacheKey::Collections,
                CacheValue::Collections(collections.clone()),
            )
            .await;

        Ok(collections)
    }

    /// Get a collection by ID.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the collection doesn't exist.
    #[instrument(skip(self), fields(collection_id = %id))]
    pub async fn collection(&self, id: CollectionId) -> Result<Collection, ApiError> {
        let cache_key = CacheKey::Collection(id);

        if let Some(CacheValue::Collection(collection)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for collection");
            return Ok(collection);
        }

        let request = self
            .inner
            .client
            .get(self.url(&format!("store/collections/{id}/"))?);
        let collection: Collection = self.dispatch(request).await?.json()?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Collection(collection.clone()))
            .await;

        Ok(collection)
    }

    // =========================================================================
    // Cart Methods (not cached - always fresh)
    // =========================================================================

    /// Create an empty cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn create_cart(&self) -> Result<NewCart, ApiError> {
        let request = self
            .inner
            .client
            .post(self.url("store/carts/")?)
            .json(&serde_json::json!({}));
        self.dispatch(request).await?.json()
    }

    /// Get a cart with its items.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the cart no longer exists.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn cart(&self, cart_id: &CartId) -> Result<Cart, ApiError> {
        let request = self
            .inner
            .client
            .get(self.url(&format!("store/carts/{cart_id}/"))?);
        self.dispatch(request).await?.json()
    }

    /// Add a product to a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(cart_id = %cart_id, product_id = %product_id))]
    pub async fn add_cart_item(
        &self,
        cart_id: &CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        let request = self
            .inner
            .client
            .post(self.url(&format!("store/carts/{cart_id}/items/"))?)
            .json(&AddCartItem {
                product_id,
                quantity,
            });
        self.dispatch(request).await?.empty()
    }

    /// Set the quantity of a cart line.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(cart_id = %cart_id, item_id = %item_id))]
    pub async fn update_cart_item(
        &self,
        cart_id: &CartId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        let request = self
            .inner
            .client
            .patch(self.url(&format!("store/carts/{cart_id}/items/{item_id}/"))?)
            .json(&UpdateCartItem { quantity });
        self.dispatch(request).await?.empty()
    }

    /// Remove a line from a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(cart_id = %cart_id, item_id = %item_id))]
    pub async fn remove_cart_item(
        &self,
        cart_id: &CartId,
        item_id: CartItemId,
    ) -> Result<(), ApiError> {
        let request = self
            .inner
            .client
            .delete(self.url(&format!("store/carts/{cart_id}/items/{item_id}/"))?);
        self.dispatch(request).await?.empty()
    }

    /// Delete a whole cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn delete_cart(&self, cart_id: &CartId) -> Result<(), ApiError> {
        let request = self
            .inner
            .client
            .delete(self.url(&format!("store/carts/{cart_id}/"))?);
        self.dispatch(request).await?.empty()
    }

    // =========================================================================
    // Auth Methods
    // =========================================================================

    /// Obtain an access/refresh token pair.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` with status 401 for wrong credentials.
    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair, ApiError> {
        let request = self
            .inner
            .client
            .post(self.url("auth/jwt/create/")?)
            .json(credentials);
        self.dispatch(request).await?.json()
    }

    /// Create a user account.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` with the first validation message on rejection.
    #[instrument(skip(self, registration), fields(username = %registration.username))]
    pub async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        let request = self
            .inner
            .client
            .post(self.url("auth/users/")?)
            .json(registration);
        self.dispatch(request).await?.empty()
    }

    /// Get the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::SessionExpired` if the customer must log in again.
    #[instrument(skip(self, session))]
    pub async fn current_user<S: SessionStorage>(&self, session: &S) -> Result<User, ApiError> {
        let url = self.url("auth/users/me/")?;
        self.send_authed(session, || Ok(self.inner.client.get(url.clone())))
            .await?
            .json()
    }

    // =========================================================================
    // Customer Methods
    // =========================================================================

    /// Get the logged-in customer, including their permanent cart id.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::SessionExpired` if the customer must log in again.
    #[instrument(skip(self, session))]
    pub async fn customer<S: SessionStorage>(&self, session: &S) -> Result<Customer, ApiError> {
        let url = self.url("store/customers/me/")?;
        self.send_authed(session, || Ok(self.inner.client.get(url.clone())))
            .await?
            .json()
    }

    /// Update the logged-in customer's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the update.
    #[instrument(skip(self, session, update))]
    pub async fn update_customer<S: SessionStorage>(
        &self,
        session: &S,
        update: &CustomerUpdate,
    ) -> Result<Customer, ApiError> {
        let url = self.url("store/customers/me/")?;
        self.send_authed(session, || Ok(self.inner.client.put(url.clone()).json(update)))
            .await?
            .json()
    }

    /// Change the logged-in customer's password.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the password.
    #[instrument(skip(self, session, password))]
    pub async fn change_password<S: SessionStorage>(
        &self,
        session: &S,
        password: &ChangePassword,
    ) -> Result<(), ApiError> {
        let url = self.url("store/customers/change_password/")?;
        self.send_authed(session, || {
            Ok(self.inner.client.put(url.clone()).json(password))
        })
        .await?
        .empty()
    }

    // =========================================================================
    // Address Methods
    // =========================================================================

    /// List the customer's addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, session))]
    pub async fn addresses<S: SessionStorage>(&self, session: &S) -> Result<Vec<Address>, ApiError> {
        let url = self.url("store/addresses/")?;
        self.send_authed(session, || Ok(self.inner.client.get(url.clone())))
            .await?
            .json()
    }

    /// Get one address.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the address doesn't belong to the customer.
    #[instrument(skip(self, session), fields(address_id = %id))]
    pub async fn address<S: SessionStorage>(
        &self,
        session: &S,
        id: AddressId,
    ) -> Result<Address, ApiError> {
        let url = self.url(&format!("store/addresses/{id}/"))?;
        self.send_authed(session, || Ok(self.inner.client.get(url.clone())))
            .await?
            .json()
    }

    /// Create an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the address.
    #[instrument(skip(self, session, input))]
    pub async fn create_address<S: SessionStorage>(
        &self,
        session: &S,
        input: &AddressInput,
    ) -> Result<Address, ApiError> {
        let url = self.url("store/addresses/")?;
        self.send_authed(session, || Ok(self.inner.client.post(url.clone()).json(input)))
            .await?
            .json()
    }

    /// Replace an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the API rejects the address.
    #[instrument(skip(self, session, input), fields(address_id = %id))]
    pub async fn update_address<S: SessionStorage>(
        &self,
        session: &S,
        id: AddressId,
        input: &AddressInput,
    ) -> Result<Address, ApiError> {
        let url = self.url(&format!("store/addresses/{id}/"))?;
        self.send_authed(session, || Ok(self.inner.client.put(url.clone()).json(input)))
            .await?
            .json()
    }

    /// Delete an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, session), fields(address_id = %id))]
    pub async fn delete_address<S: SessionStorage>(
        &self,
        session: &S,
        id: AddressId,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!("store/addresses/{id}/"))?;
        self.send_authed(session, || Ok(self.inner.client.delete(url.clone())))
            .await?
            .empty()
    }

    // =========================================================================
    // Order Methods
    // =========================================================================

    /// Create an order from a cart.
    ///
    /// Sends `Idempotency-Key: <scope>:order`, where `scope` names the cart
    /// revision, so a repeated submission of the same cart contents can be
    /// collapsed server-side.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, session), fields(cart_id = %cart_id))]
    pub async fn create_order<S: SessionStorage>(
        &self,
        session: &S,
        cart_id: CartId,
        scope: &str,
    ) -> Result<Order, ApiError> {
        let url = self.url("store/orders/")?;
        let body = CreateOrder { cart_id };
        let key = format!("{scope}:order");
        self.send_authed(session, || {
            Ok(self
                .inner
                .client
                .post(url.clone())
                .header(IDEMPOTENCY_KEY_HEADER, &key)
                .json(&body))
        })
        .await?
        .json()
    }

    /// List the customer's orders.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, session))]
    pub async fn orders<S: SessionStorage>(&self, session: &S) -> Result<Vec<Order>, ApiError> {
        let url = self.url("store/orders/")?;
        self.send_authed(session, || Ok(self.inner.client.get(url.clone())))
            .await?
            .json()
    }

    /// Get one of the customer's orders.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the order doesn't exist or isn't the customer's.
    #[instrument(skip(self, session), fields(order_id = %id))]
    pub async fn order<S: SessionStorage>(&self, session: &S, id: OrderId) -> Result<Order, ApiError> {
        let url = self.url(&format!("store/orders/{id}/"))?;
        self.send_authed(session, || Ok(self.inner.client.get(url.clone())))
            .await?
            .json()
    }

    /// Cancel (delete) a pending order.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` if the order is no longer pending.
    #[instrument(skip(self, session), fields(order_id = %id))]
    pub async fn cancel_order<S: SessionStorage>(
        &self,
        session: &S,
        id: OrderId,
    ) -> Result<(), ApiError> {
        let url = self.url("store/cancel-order/")?;
        let body = CancelOrder { order_id: id };
        self.send_authed(session, || Ok(self.inner.client.post(url.clone()).json(&body)))
            .await?
            .empty()
    }

    // =========================================================================
    // Payment Methods
    // =========================================================================

    /// Request a hosted payment page for an order and delivery address.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, session), fields(order_id = %order_id, address_id = %address_id))]
    pub async fn create_payment_session<S: SessionStorage>(
        &self,
        session: &S,
        order_id: OrderId,
        address_id: AddressId,
    ) -> Result<PaymentSession, ApiError> {
        let url = self.url("store/create-checkout-session/")?;
        let body = CreatePaymentSession {
            order_id,
            address_id,
        };
        self.send_authed(session, || Ok(self.inner.client.post(url.clone()).json(&body)))
            .await?
            .json()
    }

    /// Verify a customer payment after the provider redirected back.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` if the payment is not complete.
    #[instrument(skip(self, session, payment_session_id), fields(order_id = %order_id))]
    pub async fn verify_payment<S: SessionStorage>(
        &self,
        session: &S,
        payment_session_id: &str,
        order_id: OrderId,
    ) -> Result<PaymentConfirmation, ApiError> {
        let url = self.url("store/payment-success/")?;
        let order = order_id.to_string();
        self.send_authed(session, || {
            Ok(self
                .inner
                .client
                .get(url.clone())
                .query(&[("session_id", payment_session_id), ("order_id", &order)]))
        })
        .await?
        .json()
    }

    // =========================================================================
    // Guest Checkout Methods
    // =========================================================================

    /// Create a guest order from a cart.
    ///
    /// Sends `Idempotency-Key: <scope>:guest-order`; see [`Self::create_order`].
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` with the first validation message on rejection.
    #[instrument(skip(self, order), fields(cart_id = %order.cart_id))]
    pub async fn create_guest_order(
        &self,
        order: &CreateGuestOrder,
        scope: &str,
    ) -> Result<GuestOrder, ApiError> {
        let request = self
            .inner
            .client
            .post(self.url("store/guest-order/")?)
            .header(IDEMPOTENCY_KEY_HEADER, format!("{scope}:guest-order"))
            .json(order);
        self.dispatch(request).await?.json()
    }

    /// Request a hosted payment page for a guest order.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn create_guest_payment_session(
        &self,
        order_id: OrderId,
    ) -> Result<PaymentSession, ApiError> {
        let request = self
            .inner
            .client
            .post(self.url("store/guest-checkout-session/")?)
            .json(&CreateGuestPaymentSession { order_id });
        self.dispatch(request).await?.json()
    }

    /// Verify a guest payment after the provider redirected back.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` if the payment is not complete.
    #[instrument(skip(self, payment_session_id), fields(order_id = %order_id))]
    pub async fn verify_guest_payment(
        &self,
        payment_session_id: &str,
        order_id: OrderId,
    ) -> Result<PaymentConfirmation, ApiError> {
        let request = self
            .inner
            .client
            .get(self.url("store/guest-payment-success/")?)
            .query(&[
                ("session_id", payment_session_id),
                ("order_id", &order_id.to_string()),
            ]);
        self.dispatch(request).await?.json()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Pull the first human-readable message out of an error body.
///
/// Understands `{"error": "..."}`, `{"detail": "..."}` and field maps like
/// `{"username": ["A user with that username already exists."]}`.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    match &value {
        serde_json::Value::String(message) => return Some(message.clone()),
        serde_json::Value::Array(items) => return first_string(items),
        _ => {}
    }

    let object = value.as_object()?;
    for key in ["error", "detail", "message", "non_field_errors"] {
        if let Some(found) = object.get(key).and_then(message_from) {
            return Some(found);
        }
    }
    object.values().find_map(message_from)
}

fn message_from(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(message) => Some(message.clone()),
        serde_json::Value::Array(items) => first_string(items),
        _ => None,
    }
}

fn first_string(items: &[serde_json::Value]) -> Option<String> {
    items
        .iter()
        .find_map(|item| item.as_str().map(str::to_string))
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::NotFound("Nie znaleziono.".to_string());
        assert_eq!(err.to_string(), "Not found: Nie znaleziono.");

        let err = ApiError::Status {
            status: 400,
            message: "Cannot cancel completed order".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API returned 400: Cannot cancel completed order"
        );
    }

    #[test]
    fn test_api_message_skips_empty_and_transport_errors() {
        let err = ApiError::Status {
            status: 500,
            message: String::new(),
        };
        assert_eq!(err.api_message(), None);
        assert_eq!(ApiError::SessionExpired.api_message(), None);
        assert_eq!(
            ApiError::NotFound("Order not found".to_string()).api_message(),
            Some("Order not found")
        );
    }

    #[test]
    fn test_extract_error_message_shapes() {
        assert_eq!(
            extract_error_message(r#"{"error": "Order ID is required"}"#).as_deref(),
            Some("Order ID is required")
        );
        assert_eq!(
            extract_error_message(r#"{"detail": "Given token not valid"}"#).as_deref(),
            Some("Given token not valid")
        );
        assert_eq!(
            extract_error_message(r#"{"post_code": ["Ensure this field has no more than 8 characters."]}"#)
                .as_deref(),
            Some("Ensure this field has no more than 8 characters.")
        );
        assert_eq!(
            extract_error_message(r#"["Cart is empty"]"#).as_deref(),
            Some("Cart is empty")
        );
    }

    #[test]
    fn test_extract_error_message_prefers_error_over_fields() {
        assert_eq!(
            extract_error_message(r#"{"cart_id": ["bad"], "error": "No items"}"#).as_deref(),
            Some("No items")
        );
    }

    #[test]
    fn test_extract_error_message_non_json() {
        assert_eq!(extract_error_message("<html>502 Bad Gateway</html>"), None);
        assert_eq!(extract_error_message(""), None);
    }

    #[test]
    fn test_absolute_url() {
        let config = ShopApiConfig::new("http://localhost:8000").unwrap_or_else(|_| unreachable!());
        let client = ApiClient::new(&config).unwrap_or_else(|_| unreachable!());
        assert_eq!(
            client.absolute_url("/media/store/images/kubek.jpg"),
            "http://localhost:8000/media/store/images/kubek.jpg"
        );
        assert_eq!(
            client.absolute_url("https://cdn.example.com/a.jpg"),
            "https://cdn.example.com/a.jpg"
        );
    }
}

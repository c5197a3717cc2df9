//! End-to-end test harness for the MyShop storefront.
//!
//! [`FakeShop`] serves the part of the shop REST API the storefront talks to,
//! keeps its data in memory and records every request it receives.
//! [`TestApp`] runs the real storefront router against it over HTTP, with a
//! cookie-keeping client that does not follow redirects.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p myshop-integration-tests
//! ```
//!
//! # Fixtures
//!
//! | Product | Price  | Stock |
//! |---------|--------|-------|
//! | 1 Kubek | 50.00  | 3     |
//! | 2 Czajnik | 300.00 | 5   |
//! | 3 Talerz | 20.00 | 0     |
//!
//! | Account | Role     | Saved addresses | Permanent cart |
//! |---------|----------|-----------------|----------------|
//! | anna    | customer | 1               | empty          |
//! | ewa     | customer | none            | empty          |
//! | admin   | staff    | none            | none           |
//!
//! All accounts use [`PASSWORD`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_sessions::MemoryStore;
use uuid::Uuid;

use myshop_storefront::config::StorefrontConfig;
use myshop_storefront::state::AppState;

/// Password every fake account accepts.
pub const PASSWORD: &str = "sekret123";

/// Product ids in the fake catalog.
pub const MUG: i32 = 1;
pub const KETTLE: i32 = 2;
pub const PLATE: i32 = 3;

/// Id of `anna`'s saved address.
pub const ANNA_ADDRESS: i32 = 1;

const ANNA: i32 = 1;

// =============================================================================
// Recorded calls
// =============================================================================

/// A request the storefront made to the shop API.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    pub path: String,
    pub query: String,
    pub idempotency_key: Option<String>,
}

// =============================================================================
// Fake shop data
// =============================================================================

struct ProductRow {
    id: i32,
    title: &'static str,
    unit_price: &'static str,
    price_with_tax: &'static str,
    inventory: i32,
}

const PRODUCTS: &[ProductRow] = &[
    ProductRow {
        id: MUG,
        title: "Kubek",
        unit_price: "50.00",
        price_with_tax: "55.00",
        inventory: 3,
    },
    ProductRow {
        id: KETTLE,
        title: "Czajnik",
        unit_price: "300.00",
        price_with_tax: "330.00",
        inventory: 5,
    },
    ProductRow {
        id: PLATE,
        title: "Talerz",
        unit_price: "20.00",
        price_with_tax: "22.00",
        inventory: 0,
    },
];

fn product_row(id: i32) -> Option<&'static ProductRow> {
    PRODUCTS.iter().find(|p| p.id == id)
}

struct UserRow {
    id: i32,
    username: &'static str,
    is_staff: bool,
}

const USERS: &[UserRow] = &[
    UserRow {
        id: 1,
        username: "anna",
        is_staff: false,
    },
    UserRow {
        id: 2,
        username: "admin",
        is_staff: true,
    },
    UserRow {
        id: 3,
        username: "ewa",
        is_staff: false,
    },
];

#[derive(Clone)]
struct CartLine {
    id: i32,
    product_id: i32,
    quantity: u32,
}

#[derive(Clone)]
struct AddressRow {
    id: i32,
    owner: i32,
    street: String,
    house_number: u32,
    apartment_number: Option<u32>,
    city: String,
    post_code: String,
}

impl AddressRow {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "street": self.street,
            "house_number": self.house_number,
            "apartment_number": self.apartment_number,
            "city": self.city,
            "post_code": self.post_code,
            "customer": self.owner,
        })
    }
}

#[derive(Clone)]
struct OrderRow {
    id: i32,
    customer: Option<i32>,
    lines: Vec<CartLine>,
    guest_email: Option<String>,
    /// `P`ending, `C`omplete or `F`ailed.
    status: &'static str,
}

impl OrderRow {
    fn to_json(&self) -> Value {
        let items: Vec<Value> = self
            .lines
            .iter()
            .filter_map(|line| {
                let product = product_row(line.product_id)?;
                Some(json!({
                    "id": line.id,
                    "product": {"id": product.id, "title": product.title, "unit_price": product.unit_price},
                    "unit_price": product.unit_price,
                    "quantity": line.quantity,
                }))
            })
            .collect();

        json!({
            "id": self.id,
            "customer": self.customer,
            "placed_at": "2025-03-01T10:00:00Z",
            "payment_status": self.status,
            "total_price": null,
            "items": items,
        })
    }
}

struct ShopData {
    calls: Vec<Call>,
    carts: HashMap<Uuid, Vec<CartLine>>,
    /// Permanent cart of each customer, by user id.
    customer_carts: HashMap<i32, Uuid>,
    addresses: Vec<AddressRow>,
    orders: HashMap<i32, OrderRow>,
    cancelled: Vec<i32>,
    /// Response first given for each idempotency key, replayed as is.
    idempotency: HashMap<String, OrderRow>,
    access_tokens: HashMap<String, &'static str>,
    refresh_tokens: HashMap<String, &'static str>,
    payment_complete: bool,
    refresh_rejected: bool,
    customer_delay: Option<Duration>,
    next_id: i32,
}

impl ShopData {
    fn new() -> Self {
        let mut carts = HashMap::new();
        let mut customer_carts = HashMap::new();
        for user in USERS.iter().filter(|user| !user.is_staff) {
            let cart = Uuid::new_v4();
            carts.insert(cart, Vec::new());
            customer_carts.insert(user.id, cart);
        }

        Self {
            calls: Vec::new(),
            carts,
            customer_carts,
            addresses: vec![AddressRow {
                id: ANNA_ADDRESS,
                owner: ANNA,
                street: "Długa".to_string(),
                house_number: 5,
                apartment_number: Some(12),
                city: "Kraków".to_string(),
                post_code: "30-001".to_string(),
            }],
            orders: HashMap::new(),
            cancelled: Vec::new(),
            idempotency: HashMap::new(),
            access_tokens: HashMap::new(),
            refresh_tokens: HashMap::new(),
            payment_complete: true,
            refresh_rejected: false,
            customer_delay: None,
            next_id: 100,
        }
    }

    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn cart_json(&self, id: Uuid) -> Option<Value> {
        let lines = self.carts.get(&id)?;
        let items: Vec<Value> = lines
            .iter()
            .filter_map(|line| {
                let product = product_row(line.product_id)?;
                Some(json!({
                    "id": line.id,
                    "product": {
                        "id": product.id,
                        "title": product.title,
                        "unit_price": product.unit_price,
                        "inventory": product.inventory,
                    },
                    "quantity": line.quantity,
                    "total_price": "0.00",
                }))
            })
            .collect();
        Some(json!({"id": id, "items": items, "total_price": "0.00"}))
    }

    fn user_for(&self, headers: &HeaderMap) -> Option<&'static UserRow> {
        let token = headers
            .get("authorization")?
            .to_str()
            .ok()?
            .strip_prefix("JWT ")?;
        let username = self.access_tokens.get(token)?;
        USERS.iter().find(|user| user.username == *username)
    }

    fn issue_access(&mut self, username: &'static str) -> String {
        let token = format!("access-{}", self.next_id());
        self.access_tokens.insert(token.clone(), username);
        token
    }
}

// =============================================================================
// FakeShop
// =============================================================================

/// In-memory stand-in for the shop REST API.
#[derive(Clone)]
pub struct FakeShop {
    data: Arc<Mutex<ShopData>>,
    url: String,
}

impl FakeShop {
    /// Start the fake API on a random local port.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake shop");
        let addr = listener.local_addr().expect("Fake shop has no address");

        let shop = Self {
            data: Arc::new(Mutex::new(ShopData::new())),
            url: format!("http://{addr}/"),
        };

        let router = shop_routes()
            .layer(axum::middleware::from_fn_with_state(shop.clone(), record))
            .with_state(shop.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Fake shop stopped");
        });

        shop
    }

    fn data(&self) -> MutexGuard<'_, ShopData> {
        self.data.lock().expect("Fake shop state poisoned")
    }

    /// Base URL to configure as `SHOP_API_URL`.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.data().calls.clone()
    }

    /// Forget the calls received so far.
    pub fn clear_calls(&self) {
        self.data().calls.clear();
    }

    /// Calls with `method` to exactly `path`.
    #[must_use]
    pub fn calls_to(&self, method: &str, path: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method && call.path == path)
            .collect()
    }

    /// Number of calls with `method` whose path starts with `prefix`.
    #[must_use]
    pub fn count(&self, method: &str, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.method == method && call.path.starts_with(prefix))
            .count()
    }

    /// `anna`'s permanent cart.
    #[must_use]
    pub fn customer_cart_id(&self) -> Uuid {
        self.data().customer_carts[&ANNA]
    }

    /// Product and quantity of every line in a cart.
    #[must_use]
    pub fn cart_lines(&self, cart_id: Uuid) -> Vec<(i32, u32)> {
        self.data()
            .carts
            .get(&cart_id)
            .map(|lines| lines.iter().map(|l| (l.product_id, l.quantity)).collect())
            .unwrap_or_default()
    }

    /// Whether the cart still exists.
    #[must_use]
    pub fn cart_exists(&self, cart_id: Uuid) -> bool {
        self.data().carts.contains_key(&cart_id)
    }

    /// Put a product into a cart directly, as another device of the same
    /// customer would.
    pub fn add_cart_line(&self, cart_id: Uuid, product_id: i32, quantity: u32) {
        let mut data = self.data();
        let id = data.next_id();
        data.carts
            .get_mut(&cart_id)
            .expect("No such cart")
            .push(CartLine {
                id,
                product_id,
                quantity,
            });
    }

    /// Ids of orders that were cancelled, in order.
    #[must_use]
    pub fn cancelled_orders(&self) -> Vec<i32> {
        self.data().cancelled.clone()
    }

    /// Payment status of an order, if it still exists.
    #[must_use]
    pub fn order_status(&self, order_id: i32) -> Option<&'static str> {
        self.data().orders.get(&order_id).map(|order| order.status)
    }

    /// Drop an order without the storefront knowing.
    pub fn delete_order(&self, order_id: i32) {
        self.data().orders.remove(&order_id);
    }

    /// Mark an order paid without the storefront knowing.
    pub fn mark_order_paid(&self, order_id: i32) {
        if let Some(order) = self.data().orders.get_mut(&order_id) {
            order.status = "C";
        }
    }

    /// Delay every `customers/me` answer by `delay`; `None` answers at once.
    pub fn set_customer_delay(&self, delay: Option<Duration>) {
        self.data().customer_delay = delay;
    }

    /// Whether payment verification succeeds.
    pub fn set_payment_complete(&self, complete: bool) {
        self.data().payment_complete = complete;
    }

    /// Invalidate every issued access token; refresh tokens keep working.
    pub fn expire_access_tokens(&self) {
        self.data().access_tokens.clear();
    }

    /// Refuse all token refreshes from now on.
    pub fn reject_refresh(&self) {
        self.data().refresh_rejected = true;
    }
}

async fn record(State(shop): State<FakeShop>, request: Request, next: Next) -> Response {
    let call = Call {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().unwrap_or_default().to_string(),
        idempotency_key: request
            .headers()
            .get("idempotency-key")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    };
    shop.data().calls.push(call);
    next.run(request).await
}

// =============================================================================
// Fake shop routes
// =============================================================================

fn shop_routes() -> Router<FakeShop> {
    Router::new()
        // Catalog
        .route("/store/products/", get(list_products))
        .route("/store/products/{id}/", get(get_product))
        .route("/store/collections/", get(list_collections))
        .route("/store/collections/{id}/", get(get_collection))
        // Carts
        .route("/store/carts/", post(create_cart))
        .route("/store/carts/{cart}/", get(get_cart).delete(delete_cart))
        .route("/store/carts/{cart}/items/", post(add_item))
        .route(
            "/store/carts/{cart}/items/{item}/",
            patch(update_item).delete(remove_item),
        )
        // Auth
        .route("/auth/jwt/create/", post(create_tokens))
        .route("/auth/jwt/refresh/", post(refresh_token))
        .route("/auth/users/", post(register))
        .route("/auth/users/me/", get(me))
        // Customer
        .route("/store/customers/me/", get(customer).put(customer))
        .route("/store/customers/change_password/", put(change_password))
        // Addresses
        .route("/store/addresses/", get(list_addresses).post(create_address))
        .route(
            "/store/addresses/{id}/",
            get(get_address).put(update_address).delete(delete_address),
        )
        // Orders and payment
        .route("/store/orders/", get(list_orders).post(create_order))
        .route("/store/orders/{id}/", get(get_order))
        .route("/store/cancel-order/", post(cancel_order))
        .route("/store/create-checkout-session/", post(payment_session))
        .route("/store/payment-success/", get(verify_payment))
        .route("/store/guest-order/", post(create_guest_order))
        .route("/store/guest-checkout-session/", post(guest_payment_session))
        .route("/store/guest-payment-success/", get(verify_guest_payment))
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Nie znaleziono."}))).into_response()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Given token not valid for any token type"})),
    )
        .into_response()
}

fn product_json(product: &ProductRow) -> Value {
    json!({
        "id": product.id,
        "title": product.title,
        "description": "Ręcznie robiony.",
        "unit_price": product.unit_price,
        "price_with_tax": product.price_with_tax,
        "inventory": product.inventory,
        "collection": "Kuchnia",
        "images": [],
    })
}

async fn list_products() -> Json<Value> {
    let results: Vec<Value> = PRODUCTS.iter().map(product_json).collect();
    Json(json!({"count": results.len(), "next": null, "previous": null, "results": results}))
}

async fn get_product(Path(id): Path<i32>) -> Response {
    product_row(id).map_or_else(not_found, |p| Json(product_json(p)).into_response())
}

async fn list_collections() -> Json<Value> {
    Json(json!([{"id": 1, "title": "Kuchnia", "products_count": PRODUCTS.len()}]))
}

async fn get_collection(Path(id): Path<i32>) -> Response {
    if id == 1 {
        Json(json!({"id": 1, "title": "Kuchnia", "products_count": PRODUCTS.len()})).into_response()
    } else {
        not_found()
    }
}

async fn create_cart(State(shop): State<FakeShop>) -> Response {
    let id = Uuid::new_v4();
    shop.data().carts.insert(id, Vec::new());
    (StatusCode::CREATED, Json(json!({"id": id}))).into_response()
}

async fn get_cart(State(shop): State<FakeShop>, Path(cart): Path<Uuid>) -> Response {
    shop.data()
        .cart_json(cart)
        .map_or_else(not_found, |body| Json(body).into_response())
}

async fn delete_cart(State(shop): State<FakeShop>, Path(cart): Path<Uuid>) -> Response {
    match shop.data().carts.remove(&cart) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(),
    }
}

#[derive(Deserialize)]
struct AddItemBody {
    product_id: i32,
    quantity: u32,
}

async fn add_item(
    State(shop): State<FakeShop>,
    Path(cart): Path<Uuid>,
    Json(body): Json<AddItemBody>,
) -> Response {
    let mut data = shop.data();
    let id = data.next_id();
    let Some(lines) = data.carts.get_mut(&cart) else {
        return not_found();
    };

    if let Some(line) = lines.iter_mut().find(|l| l.product_id == body.product_id) {
        line.quantity += body.quantity;
    } else {
        lines.push(CartLine {
            id,
            product_id: body.product_id,
            quantity: body.quantity,
        });
    }
    (StatusCode::CREATED, Json(json!({}))).into_response()
}

#[derive(Deserialize)]
struct UpdateItemBody {
    quantity: u32,
}

async fn update_item(
    State(shop): State<FakeShop>,
    Path((cart, item)): Path<(Uuid, i32)>,
    Json(body): Json<UpdateItemBody>,
) -> Response {
    let mut data = shop.data();
    let line = data
        .carts
        .get_mut(&cart)
        .and_then(|lines| lines.iter_mut().find(|l| l.id == item));
    match line {
        Some(line) => {
            line.quantity = body.quantity;
            Json(json!({"quantity": body.quantity})).into_response()
        }
        None => not_found(),
    }
}

async fn remove_item(
    State(shop): State<FakeShop>,
    Path((cart, item)): Path<(Uuid, i32)>,
) -> Response {
    let mut data = shop.data();
    match data.carts.get_mut(&cart) {
        Some(lines) => {
            lines.retain(|l| l.id != item);
            StatusCode::NO_CONTENT.into_response()
        }
        None => not_found(),
    }
}

#[derive(Deserialize)]
struct CredentialsBody {
    username: String,
    password: String,
}

async fn create_tokens(State(shop): State<FakeShop>, Json(body): Json<CredentialsBody>) -> Response {
    let Some(user) = USERS.iter().find(|u| u.username == body.username) else {
        return unauthorized();
    };
    if body.password != PASSWORD {
        return unauthorized();
    }

    let mut data = shop.data();
    let access = data.issue_access(user.username);
    let refresh = format!("refresh-{}", data.next_id());
    data.refresh_tokens.insert(refresh.clone(), user.username);
    Json(json!({"access": access, "refresh": refresh})).into_response()
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh: String,
}

async fn refresh_token(State(shop): State<FakeShop>, Json(body): Json<RefreshBody>) -> Response {
    let mut data = shop.data();
    if data.refresh_rejected {
        return unauthorized();
    }
    let Some(username) = data.refresh_tokens.get(&body.refresh).copied() else {
        return unauthorized();
    };
    let access = data.issue_access(username);
    Json(json!({"access": access})).into_response()
}

async fn register() -> Response {
    (StatusCode::CREATED, Json(json!({"id": 10}))).into_response()
}

async fn me(State(shop): State<FakeShop>, headers: HeaderMap) -> Response {
    let Some(user) = shop.data().user_for(&headers) else {
        return unauthorized();
    };
    let first_name = if user.username == "anna" { "Anna" } else { "" };
    Json(json!({
        "id": user.id,
        "username": user.username,
        "email": format!("{}@example.com", user.username),
        "first_name": first_name,
        "last_name": "",
        "is_staff": user.is_staff,
    }))
    .into_response()
}

async fn customer(State(shop): State<FakeShop>, headers: HeaderMap) -> Response {
    let delay = shop.data().customer_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let data = shop.data();
    let Some(user) = data.user_for(&headers) else {
        return unauthorized();
    };
    Json(json!({
        "id": user.id,
        "user_id": user.id,
        "phone": "",
        "birth_date": null,
        "membership": "B",
        "cart_id": data.customer_carts.get(&user.id),
    }))
    .into_response()
}

async fn change_password(State(shop): State<FakeShop>, headers: HeaderMap) -> Response {
    if shop.data().user_for(&headers).is_none() {
        return unauthorized();
    }
    Json(json!({"message": "Hasło zostało zmienione."})).into_response()
}

#[derive(Deserialize)]
struct AddressBody {
    street: String,
    house_number: u32,
    apartment_number: Option<u32>,
    city: String,
    post_code: String,
}

async fn list_addresses(State(shop): State<FakeShop>, headers: HeaderMap) -> Response {
    let data = shop.data();
    let Some(user) = data.user_for(&headers) else {
        return unauthorized();
    };
    let addresses: Vec<Value> = data
        .addresses
        .iter()
        .filter(|a| a.owner == user.id)
        .map(AddressRow::to_json)
        .collect();
    Json(Value::Array(addresses)).into_response()
}

async fn create_address(
    State(shop): State<FakeShop>,
    headers: HeaderMap,
    Json(body): Json<AddressBody>,
) -> Response {
    let mut data = shop.data();
    let Some(user) = data.user_for(&headers) else {
        return unauthorized();
    };
    let address = AddressRow {
        id: data.next_id(),
        owner: user.id,
        street: body.street,
        house_number: body.house_number,
        apartment_number: body.apartment_number,
        city: body.city,
        post_code: body.post_code,
    };
    let response = address.to_json();
    data.addresses.push(address);
    (StatusCode::CREATED, Json(response)).into_response()
}

async fn get_address(
    State(shop): State<FakeShop>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let data = shop.data();
    let Some(user) = data.user_for(&headers) else {
        return unauthorized();
    };
    data.addresses
        .iter()
        .find(|a| a.id == id && a.owner == user.id)
        .map_or_else(not_found, |a| Json(a.to_json()).into_response())
}

async fn update_address(
    State(shop): State<FakeShop>,
    headers: HeaderMap,
    Path(id): Path<i32>,
    Json(body): Json<AddressBody>,
) -> Response {
    let mut data = shop.data();
    let Some(user) = data.user_for(&headers) else {
        return unauthorized();
    };
    let Some(address) = data
        .addresses
        .iter_mut()
        .find(|a| a.id == id && a.owner == user.id)
    else {
        return not_found();
    };
    address.street = body.street;
    address.house_number = body.house_number;
    address.apartment_number = body.apartment_number;
    address.city = body.city;
    address.post_code = body.post_code;
    Json(address.to_json()).into_response()
}

async fn delete_address(
    State(shop): State<FakeShop>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let mut data = shop.data();
    let Some(user) = data.user_for(&headers) else {
        return unauthorized();
    };
    data.addresses.retain(|a| a.id != id || a.owner != user.id);
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Deserialize)]
struct CreateOrderBody {
    cart_id: Uuid,
}

/// Create an order from a cart.
///
/// A repeated idempotency key gets the first response again, whatever has
/// happened to that order since.
fn place_order(
    data: &mut ShopData,
    headers: &HeaderMap,
    cart_id: Uuid,
    customer: Option<i32>,
    guest_email: Option<String>,
) -> Result<OrderRow, Response> {
    let key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    if let Some(first) = key.as_ref().and_then(|key| data.idempotency.get(key)) {
        return Ok(first.clone());
    }

    let lines = data.carts.get(&cart_id).cloned().ok_or_else(not_found)?;
    if lines.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Koszyk jest pusty."})),
        )
            .into_response());
    }

    let order = OrderRow {
        id: data.next_id(),
        customer,
        lines,
        guest_email,
        status: "P",
    };
    data.orders.insert(order.id, order.clone());
    if let Some(key) = key {
        data.idempotency.insert(key, order.clone());
    }
    Ok(order)
}

async fn create_order(
    State(shop): State<FakeShop>,
    headers: HeaderMap,
    Json(body): Json<CreateOrderBody>,
) -> Response {
    let mut data = shop.data();
    let Some(user) = data.user_for(&headers) else {
        return unauthorized();
    };
    match place_order(&mut data, &headers, body.cart_id, Some(user.id), None) {
        Ok(order) => (StatusCode::CREATED, Json(order.to_json())).into_response(),
        Err(response) => response,
    }
}

async fn list_orders(State(shop): State<FakeShop>, headers: HeaderMap) -> Response {
    let data = shop.data();
    let Some(user) = data.user_for(&headers) else {
        return unauthorized();
    };
    let orders: Vec<Value> = data
        .orders
        .values()
        .filter(|o| o.customer == Some(user.id))
        .map(OrderRow::to_json)
        .collect();
    Json(Value::Array(orders)).into_response()
}

async fn get_order(
    State(shop): State<FakeShop>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> Response {
    let data = shop.data();
    if data.user_for(&headers).is_none() {
        return unauthorized();
    }
    data.orders
        .get(&id)
        .map_or_else(not_found, |o| Json(o.to_json()).into_response())
}

#[derive(Deserialize)]
struct OrderRef {
    #[serde(rename = "orderId")]
    order_id: i32,
}

async fn cancel_order(
    State(shop): State<FakeShop>,
    headers: HeaderMap,
    Json(body): Json<OrderRef>,
) -> Response {
    let mut data = shop.data();
    if data.user_for(&headers).is_none() {
        return unauthorized();
    }
    match data.orders.get(&body.order_id).map(|order| order.status) {
        Some("P") => {
            data.orders.remove(&body.order_id);
            data.cancelled.push(body.order_id);
            Json(json!({"message": "Zamówienie anulowane."})).into_response()
        }
        Some(_) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Cannot cancel completed order"})),
        )
            .into_response(),
        None => not_found(),
    }
}

fn payment_page(order_id: i32) -> Value {
    json!({
        "url": format!("https://checkout.stripe.com/c/pay/cs_test_{order_id}"),
        "sessionId": format!("cs_test_{order_id}"),
    })
}

async fn payment_session(
    State(shop): State<FakeShop>,
    headers: HeaderMap,
    Json(body): Json<OrderRef>,
) -> Response {
    if shop.data().user_for(&headers).is_none() {
        return unauthorized();
    }
    Json(payment_page(body.order_id)).into_response()
}

#[derive(Deserialize)]
struct VerifyQuery {
    order_id: i32,
}

async fn verify_payment(
    State(shop): State<FakeShop>,
    headers: HeaderMap,
    axum::extract::Query(query): axum::extract::Query<VerifyQuery>,
) -> Response {
    let mut data = shop.data();
    let Some(user) = data.user_for(&headers) else {
        return unauthorized();
    };
    let paid = data.payment_complete;
    let Some(order) = data.orders.get_mut(&query.order_id).filter(|_| paid) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Płatność nie została zakończona."})),
        )
            .into_response();
    };
    order.status = "C";
    if let Some(cart) = data.customer_carts.get(&user.id).copied()
        && let Some(lines) = data.carts.get_mut(&cart)
    {
        lines.clear();
    }
    Json(json!({"message": "Płatność zakończona."})).into_response()
}

async fn create_guest_order(
    State(shop): State<FakeShop>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(cart_id) = body
        .get("cart_id")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Uuid>().ok())
    else {
        return (StatusCode::BAD_REQUEST, Json(json!({"cart_id": ["To pole jest wymagane."]})))
            .into_response();
    };
    let email = body
        .get("guest_email")
        .and_then(Value::as_str)
        .map(String::from);

    let mut data = shop.data();
    match place_order(&mut data, &headers, cart_id, None, email.clone()) {
        Ok(order) => (
            StatusCode::CREATED,
            Json(json!({"id": order.id, "total_price": null, "guest_email": email})),
        )
            .into_response(),
        Err(response) => response,
    }
}

async fn guest_payment_session(Json(body): Json<OrderRef>) -> Json<Value> {
    Json(payment_page(body.order_id))
}

async fn verify_guest_payment(
    State(shop): State<FakeShop>,
    axum::extract::Query(query): axum::extract::Query<VerifyQuery>,
) -> Response {
    let mut data = shop.data();
    let paid = data.payment_complete;
    match data.orders.get_mut(&query.order_id) {
        Some(order) if paid => {
            order.status = "C";
            Json(json!({
                "message": "Płatność zakończona.",
                "guest_email": order.guest_email,
            }))
            .into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Płatność nie została zakończona."})),
        )
            .into_response(),
    }
}

// =============================================================================
// TestApp
// =============================================================================

/// The storefront running against a [`FakeShop`].
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub shop: FakeShop,
}

impl TestApp {
    /// Start a fake shop and a storefront with in-memory sessions.
    ///
    /// # Panics
    ///
    /// Panics if a server cannot be started.
    pub async fn spawn() -> Self {
        Self::spawn_with(&[]).await
    }

    /// Like [`TestApp::spawn`], with extra configuration variables.
    ///
    /// # Panics
    ///
    /// Panics if a server cannot be started or the configuration is invalid.
    pub async fn spawn_with(vars: &[(&str, &str)]) -> Self {
        let shop = FakeShop::spawn().await;

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind storefront");
        let addr = listener.local_addr().expect("Storefront has no address");
        let address = format!("http://{addr}");

        let config = StorefrontConfig::from_lookup(|key| match key {
            "STOREFRONT_BASE_URL" => Some(address.clone()),
            "SHOP_API_URL" => Some(shop.url().to_string()),
            _ => vars
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value).to_string()),
        })
        .expect("Test configuration is valid");
        let state = AppState::new(config).expect("Failed to build application state");
        let app = myshop_storefront::app(state, MemoryStore::default());

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Storefront stopped");
        });

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build HTTP client");

        Self {
            address,
            client,
            shop,
        }
    }

    /// GET a storefront path.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.address))
            .send()
            .await
            .expect("GET request failed")
    }

    /// POST a form to a storefront path.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn post(&self, path: &str, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.address))
            .form(form)
            .send()
            .await
            .expect("POST request failed")
    }

    /// Log in with the fixture password.
    pub async fn login(&self, username: &str) -> reqwest::Response {
        self.post(
            "/auth/login",
            &[("username", username), ("password", PASSWORD)],
        )
        .await
    }

    /// Add `quantity` of a product to the visitor's cart.
    pub async fn add_to_cart(&self, product_id: i32, quantity: u32) -> reqwest::Response {
        let product_id = product_id.to_string();
        let quantity = quantity.to_string();
        self.post(
            "/cart/add",
            &[("product_id", &product_id), ("quantity", &quantity)],
        )
        .await
    }

    /// GET a page and return its body.
    ///
    /// # Panics
    ///
    /// Panics if the page does not answer `200 OK`.
    pub async fn page(&self, path: &str) -> String {
        let response = self.get(path).await;
        assert_eq!(response.status(), 200, "GET {path}");
        response.text().await.expect("Failed to read page body")
    }
}

/// Target of a redirect response.
///
/// # Panics
///
/// Panics if the response is not a redirect.
#[must_use]
pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("Response is not a redirect")
        .to_string()
}

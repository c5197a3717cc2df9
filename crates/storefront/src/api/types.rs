//! Request and response bodies of the shop REST API.
//!
//! Field names follow the API's JSON exactly. Money fields arrive either as
//! decimal strings or as JSON numbers and always deserialize into `Decimal`.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use myshop_core::{
    AddressId, CartId, CartItemId, CollectionId, CustomerId, Membership, OrderId, OrderItemId,
    PaymentStatus, Price, ProductId, ProductImageId, UserId,
};

// =============================================================================
// Catalog
// =============================================================================

/// A page of results from a paginated list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    /// Total number of results across all pages.
    pub count: u32,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductImage {
    pub id: ProductImageId,
    /// Absolute or API-relative image URL.
    pub image: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub unit_price: Decimal,
    pub inventory: i32,
    pub price_with_tax: Decimal,
    /// Collection title.
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub images: Vec<ProductImage>,
}

impl Product {
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inventory > 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub title: String,
    #[serde(default)]
    pub products_count: u32,
}

/// Query parameters for the product list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ProductQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<CollectionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering: Option<String>,
}

// =============================================================================
// Cart
// =============================================================================

/// Product snapshot embedded in a cart line.
#[derive(Debug, Clone, Deserialize)]
pub struct CartProduct {
    pub id: ProductId,
    pub title: String,
    pub unit_price: Decimal,
    /// Stock available; the upper bound for the line quantity.
    pub inventory: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product: CartProduct,
    pub quantity: u32,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cart {
    pub id: CartId,
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub total_price: Decimal,
}

impl Cart {
    /// `(unit price, quantity)` for each line, for totals computation.
    pub fn lines(&self) -> impl Iterator<Item = (Price, u32)> + '_ {
        self.items
            .iter()
            .map(|item| (Price::pln(item.product.unit_price), item.quantity))
    }

    #[must_use]
    pub fn find_item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == item_id)
    }
}

/// Response to cart creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCart {
    pub id: CartId,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddCartItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateCartItem {
    pub quantity: u32,
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct OrderProduct {
    pub id: ProductId,
    pub title: String,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product: OrderProduct,
    /// Price at the moment the order was placed.
    pub unit_price: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub customer: Option<CustomerId>,
    /// Placement timestamp as sent by the API.
    pub placed_at: String,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// `(unit price, quantity)` for each line, for totals computation.
    pub fn lines(&self) -> impl Iterator<Item = (Price, u32)> + '_ {
        self.items
            .iter()
            .map(|item| (Price::pln(item.unit_price), item.quantity))
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.payment_status, PaymentStatus::Pending)
    }

    /// Whether the order holds the same products in the same quantities as `cart`.
    #[must_use]
    pub fn matches_cart(&self, cart: &Cart) -> bool {
        let mut remaining: HashMap<ProductId, i64> = HashMap::new();
        for item in &cart.items {
            *remaining.entry(item.product.id).or_default() += i64::from(item.quantity);
        }
        for item in &self.items {
            *remaining.entry(item.product.id).or_default() -= i64::from(item.quantity);
        }
        remaining.values().all(|left| *left == 0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrder {
    pub cart_id: CartId,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOrder {
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
}

/// Guest order: contact details and shipping address travel inline.
#[derive(Debug, Clone, Serialize)]
pub struct CreateGuestOrder {
    pub cart_id: CartId,
    pub guest_email: String,
    pub guest_first_name: String,
    pub guest_last_name: String,
    pub guest_phone: String,
    pub street: String,
    pub house_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apartment_number: Option<u32>,
    pub city: String,
    pub post_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuestOrder {
    pub id: OrderId,
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub guest_email: Option<String>,
}

// =============================================================================
// Addresses
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub street: String,
    pub house_number: u32,
    #[serde(default)]
    pub apartment_number: Option<u32>,
    pub city: String,
    pub post_code: String,
    #[serde(default)]
    pub customer: Option<CustomerId>,
}

impl Address {
    /// `"Długa 5/12"`
    #[must_use]
    pub fn street_line(&self) -> String {
        match self.apartment_number {
            Some(apartment) => format!("{} {}/{apartment}", self.street, self.house_number),
            None => format!("{} {}", self.street, self.house_number),
        }
    }

    /// `"00-001 Warszawa"`
    #[must_use]
    pub fn city_line(&self) -> String {
        format!("{} {}", self.post_code, self.city)
    }
}

/// Body for creating or replacing an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressInput {
    pub street: String,
    pub house_number: u32,
    pub apartment_number: Option<u32>,
    pub city: String,
    pub post_code: String,
}

// =============================================================================
// Payment
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentSession {
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    #[serde(rename = "addressId")]
    pub address_id: AddressId,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateGuestPaymentSession {
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
}

/// Hosted payment page to redirect the browser to.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSession {
    pub url: String,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// Result of server-side payment verification.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfirmation {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub guest_email: Option<String>,
}

// =============================================================================
// Accounts
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_staff: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub user_id: UserId,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub membership: Membership,
    /// The customer's permanent cart.
    #[serde(default)]
    pub cart_id: Option<CartId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerUpdate {
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangePassword {
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_cart_accepts_string_and_number_money() {
        let cart: Cart = serde_json::from_value(json!({
            "id": "6f1c1a4e-3b0b-4c55-9a53-2f1d0b6f8a11",
            "items": [{
                "id": 3,
                "product": {"id": 9, "title": "Kubek", "unit_price": "24.50", "inventory": 4},
                "quantity": 2,
                "total_price": 49.0
            }],
            "total_price": 49.0
        }))
        .unwrap();

        let item = cart.find_item(CartItemId::new(3)).unwrap();
        assert_eq!(item.product.unit_price, Decimal::new(2450, 2));
        assert_eq!(item.total_price, Decimal::new(49, 0));
        assert!(cart.find_item(CartItemId::new(4)).is_none());
    }

    #[test]
    fn test_order_with_guest_fields_and_no_customer() {
        let order: Order = serde_json::from_value(json!({
            "id": 12,
            "customer": null,
            "placed_at": "2025-03-01T10:00:00Z",
            "payment_status": "P",
            "total_price": "120.00",
            "items": []
        }))
        .unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.customer.is_none());
    }

    #[test]
    fn test_order_matches_cart_by_product_quantities() {
        let cart: Cart = serde_json::from_value(json!({
            "id": "6f1c1a4e-3b0b-4c55-9a53-2f1d0b6f8a11",
            "items": [
                {"id": 1, "product": {"id": 9, "title": "Kubek", "unit_price": "24.50", "inventory": 4},
                 "quantity": 2, "total_price": "49.00"},
                {"id": 2, "product": {"id": 4, "title": "Czajnik", "unit_price": "99.00", "inventory": 1},
                 "quantity": 1, "total_price": "99.00"}
            ],
            "total_price": "148.00"
        }))
        .unwrap();
        let order = |items: serde_json::Value| -> Order {
            serde_json::from_value(json!({
                "id": 12, "customer": 1, "placed_at": "2025-03-01T10:00:00Z",
                "payment_status": "P", "items": items
            }))
            .unwrap()
        };
        let line = |id: i32, product: i32, quantity: u32| {
            json!({"id": id, "product": {"id": product, "title": "x", "unit_price": "1.00"},
                   "unit_price": "1.00", "quantity": quantity})
        };

        assert!(order(json!([line(5, 4, 1), line(6, 9, 2)])).matches_cart(&cart));
        // only the mug: the kettle was added after ordering
        assert!(!order(json!([line(5, 9, 2)])).matches_cart(&cart));
        assert!(!order(json!([line(5, 4, 1), line(6, 9, 3)])).matches_cart(&cart));
        assert!(!order(json!([line(5, 4, 1), line(6, 9, 2), line(7, 8, 1)])).matches_cart(&cart));
    }

    #[test]
    fn test_address_lines() {
        let address: Address = serde_json::from_value(json!({
            "id": 1, "street": "Długa", "house_number": 5, "apartment_number": 12,
            "city": "Warszawa", "post_code": "00-001", "customer": 2
        }))
        .unwrap();
        assert_eq!(address.street_line(), "Długa 5/12");
        assert_eq!(address.city_line(), "00-001 Warszawa");
    }

    #[test]
    fn test_payment_session_field_names() {
        let body = serde_json::to_value(CreatePaymentSession {
            order_id: OrderId::new(7),
            address_id: AddressId::new(3),
        })
        .unwrap();
        assert_eq!(body, json!({"orderId": 7, "addressId": 3}));

        let session: PaymentSession =
            serde_json::from_value(json!({"url": "https://pay.example/s", "sessionId": "cs_1"}))
                .unwrap();
        assert_eq!(session.session_id.as_deref(), Some("cs_1"));
    }

    #[test]
    fn test_product_query_skips_unset_filters() {
        let query = ProductQuery {
            page: Some(2),
            ..ProductQuery::default()
        };
        assert_eq!(serde_json::to_value(&query).unwrap(), json!({"page": 2}));
    }
}

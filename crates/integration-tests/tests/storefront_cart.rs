//! Integration tests for the cart pages.
//!
//! Carts live in the fake shop; the storefront only keeps the cart id in the
//! visitor's session.

use std::time::Duration;

use myshop_integration_tests::{KETTLE, MUG, TestApp, location};

// =============================================================================
// Guest cart
// =============================================================================

#[tokio::test]
async fn test_empty_cart_without_a_cart_makes_no_calls() {
    let app = TestApp::spawn().await;

    let body = app.page("/cart").await;

    assert!(body.contains("Your cart is empty"));
    assert!(body.contains("Continue Shopping"));
    assert_eq!(app.shop.count("GET", "/store/carts/"), 0);
    assert_eq!(app.shop.count("POST", "/store/carts/"), 0);
}

#[tokio::test]
async fn test_first_add_creates_the_cart() {
    let app = TestApp::spawn().await;

    let response = app.add_to_cart(MUG, 1).await;
    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), format!("/products/{MUG}"));
    assert_eq!(app.shop.calls_to("POST", "/store/carts/").len(), 1);

    // The next add reuses the cart from the session
    app.add_to_cart(MUG, 1).await;
    assert_eq!(app.shop.calls_to("POST", "/store/carts/").len(), 1);

    let body = app.page(&format!("/products/{MUG}")).await;
    assert!(body.contains("Product added to cart!"));
}

#[tokio::test]
async fn test_delivery_fee_below_threshold() {
    let app = TestApp::spawn().await;
    app.add_to_cart(MUG, 1).await;

    let body = app.page("/cart").await;

    assert!(body.contains("Kubek"));
    assert!(body.contains("50.00 PLN"));
    assert!(body.contains("15.00 PLN"));
    assert!(body.contains("65.00 PLN"));
    assert!(body.contains("Checkout as Guest"));
}

#[tokio::test]
async fn test_free_delivery_from_threshold() {
    let app = TestApp::spawn().await;
    app.add_to_cart(KETTLE, 1).await;

    let body = app.page("/cart").await;

    assert!(body.contains("DARMOWA"));
    assert!(body.contains("300.00 PLN"));
    assert!(!body.contains("15.00 PLN"));
}

// =============================================================================
// Quantity changes
// =============================================================================

/// Id of the only line in the visitor's cart, read from the cart page form.
async fn only_item_id(app: &TestApp) -> String {
    let body = app.page("/cart").await;
    let marker = "name=\"item_id\" value=\"";
    let start = body.find(marker).expect("cart page has an item form") + marker.len();
    let end = body[start..].find('"').expect("item id is quoted") + start;
    body[start..end].to_string()
}

#[tokio::test]
async fn test_quantity_above_stock_is_rejected_without_patch() {
    let app = TestApp::spawn().await;
    app.add_to_cart(MUG, 1).await;
    let item_id = only_item_id(&app).await;

    let response = app
        .post("/cart/update", &[("item_id", &item_id), ("quantity", "10")])
        .await;
    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), "/cart");

    assert_eq!(app.shop.count("PATCH", "/store/carts/"), 0);
    let body = app.page("/cart").await;
    assert!(body.contains("Only 3 items available in stock for"));
    assert!(body.contains("data-dismiss-after=\"2000\""));
}

#[tokio::test]
async fn test_quantity_within_stock_is_patched() {
    let app = TestApp::spawn().await;
    app.add_to_cart(MUG, 1).await;
    let item_id = only_item_id(&app).await;

    app.post("/cart/update", &[("item_id", &item_id), ("quantity", "3")])
        .await;

    assert_eq!(app.shop.count("PATCH", "/store/carts/"), 1);
    let body = app.page("/cart").await;
    assert!(body.contains("150.00 PLN"));
}

#[tokio::test]
async fn test_quantity_zero_removes_the_line() {
    let app = TestApp::spawn().await;
    app.add_to_cart(MUG, 1).await;
    let item_id = only_item_id(&app).await;

    app.post("/cart/update", &[("item_id", &item_id), ("quantity", "0")])
        .await;

    assert_eq!(app.shop.count("PATCH", "/store/carts/"), 0);
    assert_eq!(app.shop.count("DELETE", "/store/carts/"), 1);
    assert!(app.page("/cart").await.contains("Your cart is empty"));
}

// =============================================================================
// Customer cart
// =============================================================================

#[tokio::test]
async fn test_slow_cart_sync_shows_empty_cart() {
    let app = TestApp::spawn_with(&[("CART_SYNC_TIMEOUT_MS", "100")]).await;
    app.shop.add_cart_line(app.shop.customer_cart_id(), MUG, 1);
    app.shop.set_customer_delay(Some(Duration::from_secs(2)));

    let response = app.login("anna").await;
    assert_eq!(location(&response), "/");

    let body = app.page("/cart").await;
    assert!(body.contains("Your cart is empty"));
    assert!(!body.contains("Kubek"));
    assert_eq!(app.shop.count("GET", "/store/customers/me/"), 2);
    assert_eq!(app.shop.count("GET", "/store/carts/"), 0);

    // No cart id was kept, so the next visit asks again
    app.shop.set_customer_delay(None);
    let body = app.page("/cart").await;
    assert!(body.contains("Kubek"));
    assert_eq!(app.shop.count("GET", "/store/customers/me/"), 3);
    assert_eq!(app.shop.count("GET", "/store/carts/"), 1);
}

// =============================================================================
// Checkout entry
// =============================================================================

#[tokio::test]
async fn test_guest_without_cart_stays_on_cart() {
    let app = TestApp::spawn().await;

    let response = app.post("/cart/checkout", &[]).await;

    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), "/cart");
}

#[tokio::test]
async fn test_guest_with_cart_goes_to_guest_checkout() {
    let app = TestApp::spawn().await;
    app.add_to_cart(MUG, 1).await;

    let response = app.post("/cart/checkout", &[]).await;

    assert_eq!(location(&response), "/checkout/guest");
}

#[tokio::test]
async fn test_customer_goes_to_address_step() {
    let app = TestApp::spawn().await;
    app.login("anna").await;

    let response = app.post("/cart/checkout", &[]).await;

    assert_eq!(location(&response), "/checkout/address");
}

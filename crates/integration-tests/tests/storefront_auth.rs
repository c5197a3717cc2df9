//! Integration tests for login, token refresh and account pages.

use myshop_integration_tests::{MUG, TestApp, location};

// =============================================================================
// Health and headers
// =============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::spawn().await;

    let response = app.get("/health").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");

    let response = app.get("/health/ready").await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let app = TestApp::spawn().await;

    let response = app.get("/").await;
    let headers = response.headers();

    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(headers.contains_key("content-security-policy"));
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_incoming_request_id_is_kept() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/health", app.address))
        .header("x-request-id", "lb-1234")
        .send()
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "lb-1234");
}

// =============================================================================
// Login and logout
// =============================================================================

#[tokio::test]
async fn test_bad_credentials() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/auth/login", &[("username", "anna"), ("password", "zle")])
        .await;
    assert_eq!(location(&response), "/auth/login?error=credentials");

    let body = app.page("/auth/login?error=credentials").await;
    assert!(body.contains("Nieprawidłowa nazwa użytkownika lub hasło."));
}

#[tokio::test]
async fn test_customer_login_and_logout() {
    let app = TestApp::spawn().await;

    let response = app.login("anna").await;
    assert_eq!(location(&response), "/");
    assert!(app.page("/").await.contains("Anna"));

    let response = app.post("/auth/logout", &[]).await;
    assert_eq!(location(&response), "/");

    let response = app.get("/orders").await;
    assert_eq!(location(&response), "/auth/login");
}

#[tokio::test]
async fn test_login_adopts_customer_cart() {
    let app = TestApp::spawn().await;
    app.add_to_cart(MUG, 1).await;
    assert!(app.page("/cart").await.contains("Kubek"));

    app.login("anna").await;
    app.shop.clear_calls();

    let body = app.page("/cart").await;
    assert!(body.contains("Your cart is empty"));
    let cart_path = format!("/store/carts/{}/", app.shop.customer_cart_id());
    assert_eq!(app.shop.calls_to("GET", &cart_path).len(), 1);
}

#[tokio::test]
async fn test_staff_are_sent_to_admin_panel() {
    let app = TestApp::spawn().await;

    let response = app.login("admin").await;
    assert_eq!(location(&response), "/admin");

    for path in ["/", "/cart", "/products"] {
        let response = app.get(path).await;
        assert_eq!(location(&response), "/admin", "{path}");
    }

    let response = app.get("/admin").await;
    assert_eq!(location(&response), format!("{}admin/", app.shop.url()));

    // Health checks are never redirected
    assert_eq!(app.get("/health").await.status(), 200);
}

#[tokio::test]
async fn test_admin_requires_login() {
    let app = TestApp::spawn().await;

    let response = app.get("/admin").await;

    assert_eq!(location(&response), "/auth/login");
}

#[tokio::test]
async fn test_register_validates_before_calling_api() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/auth/register",
            &[
                ("username", "ola"),
                ("email", "ola@example.com"),
                ("password", "dlugiehaslo"),
                ("password_confirm", "innehaslo"),
            ],
        )
        .await;
    assert_eq!(location(&response), "/auth/register?error=password_mismatch");
    assert_eq!(app.shop.count("POST", "/auth/users/"), 0);

    let response = app
        .post(
            "/auth/register",
            &[
                ("username", "ola"),
                ("email", "ola@example.com"),
                ("password", "dlugiehaslo"),
                ("password_confirm", "dlugiehaslo"),
            ],
        )
        .await;
    assert_eq!(location(&response), "/auth/login?success=registered");
    assert_eq!(app.shop.count("POST", "/auth/users/"), 1);
}

// =============================================================================
// Token refresh
// =============================================================================

#[tokio::test]
async fn test_expired_access_token_is_refreshed_once() {
    let app = TestApp::spawn().await;
    app.login("anna").await;
    app.shop.clear_calls();
    app.shop.expire_access_tokens();

    let body = app.page("/orders").await;

    assert!(body.contains("My Orders"));
    assert_eq!(app.shop.calls_to("POST", "/auth/jwt/refresh/").len(), 1);
    assert_eq!(app.shop.calls_to("GET", "/store/orders/").len(), 2);

    // The refreshed token is kept for later requests
    app.page("/orders").await;
    assert_eq!(app.shop.calls_to("POST", "/auth/jwt/refresh/").len(), 1);
}

#[tokio::test]
async fn test_rejected_refresh_logs_out() {
    let app = TestApp::spawn().await;
    app.login("anna").await;
    app.shop.reject_refresh();
    app.shop.expire_access_tokens();

    let response = app.get("/orders").await;
    assert_eq!(location(&response), "/auth/login");

    let response = app.get("/dashboard").await;
    assert_eq!(location(&response), "/auth/login");
}

// =============================================================================
// Account pages
// =============================================================================

#[tokio::test]
async fn test_account_pages_require_login() {
    let app = TestApp::spawn().await;

    for path in ["/orders", "/dashboard", "/profile", "/checkout/address"] {
        let response = app.get(path).await;
        assert_eq!(location(&response), "/auth/login", "{path}");
    }
    assert!(app.shop.calls().is_empty());
}

#[tokio::test]
async fn test_dashboard_greets_customer() {
    let app = TestApp::spawn().await;
    app.login("anna").await;

    let body = app.page("/dashboard").await;

    assert!(body.contains("Witaj, Anna!"));
    assert!(body.contains("Łączne zamówienia"));
}

#[tokio::test]
async fn test_orders_page_without_orders() {
    let app = TestApp::spawn().await;
    app.login("anna").await;

    let body = app.page("/orders").await;

    assert!(body.contains("You haven't placed any orders yet."));
}

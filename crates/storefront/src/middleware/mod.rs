//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CSP nonce (generate per-request nonce)
//! 5. Security headers (CSP, frame and referrer policies)
//! 6. Session layer (tower-sessions, `PostgreSQL` or memory store)
//! 7. Staff redirect (staff users go to the admin panel)
//! 8. Rate limiting on `/auth` and cart/checkout writes (governor)

pub mod auth;
pub mod csp;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{
    LOGIN_PATH, OptionalAuth, RequireAuth, clear_current_user, current_user, set_current_user, set_tokens,
    staff_redirect_middleware,
};
pub use csp::{CspNonce, csp_nonce_middleware};
pub use rate_limit::{auth_rate_limiter, cart_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;

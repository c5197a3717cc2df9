//! Security headers middleware for XSS, clickjacking, and isolation protection.
//!
//! Adds restrictive security headers to all responses. Start locked down and
//! loosen only when specific functionality requires it.

use axum::{
    extract::{Request, State},
    http::{
        HeaderName, HeaderValue,
        header::{
            CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
        },
    },
    middleware::Next,
    response::Response,
};

use super::csp::CspNonce;
use crate::config::StorefrontConfig;
use crate::state::AppState;

/// Build the CSP for one response.
///
/// ```text
/// default-src 'none';
/// script-src 'self' 'nonce-<nonce>';
/// style-src 'self';
/// font-src 'self';
/// img-src 'self' <shop API origin>;
/// connect-src 'self';
/// frame-src 'none';
/// object-src 'none';
/// base-uri 'self';
/// form-action 'self' <payment provider origin>;
/// frame-ancestors 'none'
/// ```
///
/// The payment provider is allowed as a form target because the pay buttons
/// post to the storefront, which answers with a redirect to the provider.
#[must_use]
pub fn content_security_policy(nonce: Option<&CspNonce>, config: &StorefrontConfig) -> String {
    let script_src = match nonce {
        Some(nonce) if !nonce.value().is_empty() => format!("'self' 'nonce-{}'", nonce.value()),
        _ => "'self'".to_string(),
    };
    let api_origin = config.api.base_url.origin().ascii_serialization();

    let mut policy = format!(
        "default-src 'none'; \
         script-src {script_src}; \
         style-src 'self'; \
         font-src 'self'; \
         img-src 'self' {api_origin}; \
         connect-src 'self'; \
         frame-src 'none'; \
         object-src 'none'; \
         base-uri 'self'; \
         form-action 'self' {}; \
         frame-ancestors 'none'",
        config.payment_provider_origin
    );
    if config.is_secure() {
        policy.push_str("; upgrade-insecure-requests");
    }
    policy
}

/// Add security headers to all responses.
///
/// Headers applied:
/// - `X-Frame-Options: DENY` - Prevent clickjacking
/// - `X-Content-Type-Options: nosniff` - Prevent MIME sniffing
/// - `Referrer-Policy: no-referrer` - Zero referrer leakage
/// - `Content-Security-Policy` - see [`content_security_policy`]
/// - `Permissions-Policy` - Deny sensitive features
/// - `Cache-Control: no-store, max-age=0` - Cart and checkout pages are per-visitor
/// - `Cross-Origin-Opener-Policy: same-origin` - Process isolation
/// - `Cross-Origin-Embedder-Policy: credentialless` - Isolation that still loads API media
/// - `X-DNS-Prefetch-Control: off` - Prevent DNS prefetch leakage
pub async fn security_headers_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let nonce = request.extensions().get::<CspNonce>().cloned();
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    // Prevent clickjacking
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

    // Prevent MIME sniffing
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    // Zero referrer leakage (stricter than same-origin)
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));

    let policy = content_security_policy(nonce.as_ref(), state.config());
    match HeaderValue::from_str(&policy) {
        Ok(value) => {
            headers.insert(CONTENT_SECURITY_POLICY, value);
        }
        Err(e) => tracing::error!(error = %e, "Invalid Content-Security-Policy header"),
    }

    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static(
            "accelerometer=(), \
             autoplay=(), \
             camera=(), \
             display-capture=(), \
             geolocation=(), \
             gyroscope=(), \
             magnetometer=(), \
             microphone=(), \
             payment=(), \
             usb=(), \
             xr-spatial-tracking=()",
        ),
    );

    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store, max-age=0"),
    );

    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );

    headers.insert(
        HeaderName::from_static("cross-origin-embedder-policy"),
        HeaderValue::from_static("credentialless"),
    );

    headers.insert(
        HeaderName::from_static("x-dns-prefetch-control"),
        HeaderValue::from_static("off"),
    );

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(base_url: &str) -> StorefrontConfig {
        let env: HashMap<&str, &str> = HashMap::from([
            ("STOREFRONT_BASE_URL", base_url),
            ("SHOP_API_URL", "http://localhost:8000"),
        ]);
        StorefrontConfig::from_lookup(|key| env.get(key).map(|v| (*v).to_string())).unwrap()
    }

    #[test]
    fn test_policy_allows_payment_provider_form_target() {
        let policy = content_security_policy(None, &config("http://localhost:3000"));
        assert!(policy.contains("form-action 'self' https://checkout.stripe.com"));
        assert!(policy.contains("img-src 'self' http://localhost:8000"));
        assert!(!policy.contains("upgrade-insecure-requests"));
    }

    #[test]
    fn test_policy_includes_nonce() {
        let nonce = CspNonce("abc123".to_string());
        let policy = content_security_policy(Some(&nonce), &config("https://sklep.example.com"));
        assert!(policy.contains("script-src 'self' 'nonce-abc123'"));
        assert!(policy.ends_with("upgrade-insecure-requests"));
    }
}

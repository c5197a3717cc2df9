//! Authentication middleware and extractors.
//!
//! The logged-in user is a [`CurrentUser`] stored in the session next to the
//! API tokens. Extractors only look at the session; the tokens themselves are
//! validated by the shop API on every call.

use axum::{
    extract::{FromRequestParts, Request},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::api::TokenPair;
use crate::models::{CurrentUser, session_keys};

/// Path of the login page.
pub const LOGIN_PATH: &str = "/auth/login";

/// Extractor that requires a logged-in user.
///
/// If the user is not logged in, returns a redirect to the login page.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Witaj, {}!", user.display_name())
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Error returned when authentication is required but the user is not logged in.
pub enum AuthRejection {
    /// Redirect to login page.
    RedirectToLogin,
    /// No session layer on this route.
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to(LOGIN_PATH).into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Get the session from extensions (set by SessionManagerLayer)
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AuthRejection::Unauthorized)?;

        let user: CurrentUser = session
            .get(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten()
            .ok_or(AuthRejection::RedirectToLogin)?;

        Ok(Self(user))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is logged in.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>() {
            Some(session) => current_user(session).await,
            None => None,
        };

        Ok(Self(user))
    }
}

/// Read the current user from the session.
pub async fn current_user(session: &Session) -> Option<CurrentUser> {
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

/// Store a freshly issued token pair.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_tokens(
    session: &Session,
    tokens: TokenPair,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(session_keys::ACCESS_TOKEN, tokens.access)
        .await?;
    session
        .insert(session_keys::REFRESH_TOKEN, tokens.refresh)
        .await
}

/// Helper to set the current user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to forget the user, their tokens and their checkout (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    for key in [
        session_keys::CURRENT_USER,
        session_keys::ACCESS_TOKEN,
        session_keys::REFRESH_TOKEN,
        session_keys::CART_ID,
        session_keys::SELECTED_ADDRESS_ID,
        session_keys::CURRENT_ORDER_ID,
        session_keys::CURRENT_ORDER_CART_ID,
        session_keys::CART_REVISION,
        session_keys::CURRENT_ORDER_REVISION,
    ] {
        session.remove::<serde_json::Value>(key).await?;
    }
    Ok(())
}

// =============================================================================
// Staff redirect
// =============================================================================

/// Paths staff may visit without being sent to the admin panel.
const STAFF_ALLOWED_PREFIXES: &[&str] = &[
    "/admin",
    "/auth/login",
    "/auth/register",
    "/auth/logout",
    "/checkout/success",
    "/static",
    "/health",
];

/// Whether a staff user requesting `path` is sent to `/admin`.
#[must_use]
pub fn staff_redirect_applies(path: &str) -> bool {
    !STAFF_ALLOWED_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Middleware sending staff users from storefront pages to `/admin`.
pub async fn staff_redirect_middleware(request: Request, next: Next) -> Response {
    if staff_redirect_applies(request.uri().path())
        && let Some(session) = request.extensions().get::<Session>()
        && current_user(session).await.is_some_and(|user| user.is_staff)
    {
        return Redirect::to("/admin").into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_redirect_paths() {
        assert!(staff_redirect_applies("/"));
        assert!(staff_redirect_applies("/cart"));
        assert!(staff_redirect_applies("/checkout/payment"));

        assert!(!staff_redirect_applies("/admin"));
        assert!(!staff_redirect_applies("/auth/login"));
        assert!(!staff_redirect_applies("/checkout/success"));
        assert!(!staff_redirect_applies("/static/css/main.css"));
    }
}

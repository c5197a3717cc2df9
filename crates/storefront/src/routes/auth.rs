//! Authentication route handlers.
//!
//! Handles login, registration and logout against the shop API's JWT
//! endpoints. Tokens are kept in the server-side session and never reach the
//! browser.

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

use myshop_core::Email;

use crate::api::{ApiError, Credentials, Registration};
use crate::checkout::CheckoutFlow;
use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{clear_current_user, set_current_user, set_tokens};
use crate::models::CurrentUser;
use crate::routes::PageContext;
use crate::state::AppState;

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LENGTH: usize = 8;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Registration form data.
#[derive(Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
    pub password_confirm: String,
}

impl RegisterForm {
    /// Check the form, returning the error code to show on failure.
    fn validate(&self) -> Result<Registration, &'static str> {
        if self.username.trim().is_empty() {
            return Err("missing_fields");
        }
        let email = Email::parse(&self.email).map_err(|_| "invalid_email")?;
        if self.password != self.password_confirm {
            return Err("password_mismatch");
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err("password_too_short");
        }

        Ok(Registration {
            username: self.username.trim().to_string(),
            email: email.into(),
            password: self.password.clone(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
        })
    }
}

// =============================================================================
// Query Types
// =============================================================================

/// Query parameters for error/success display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Text for an `?error=` code.
fn error_message(code: &str) -> &'static str {
    match code {
        "credentials" => "Nieprawidłowa nazwa użytkownika lub hasło.",
        "profile" => "Nie udało się pobrać danych konta. Spróbuj ponownie.",
        "session" => "Nie udało się zapisać sesji. Spróbuj ponownie.",
        "rate_limited" => "Zbyt wiele prób. Spróbuj ponownie za chwilę.",
        "missing_fields" => "Wszystkie wymagane pola muszą być wypełnione.",
        "invalid_email" => "Podaj prawidłowy adres email.",
        "password_mismatch" => "Hasła nie są takie same.",
        "password_too_short" => "Hasło musi mieć co najmniej 8 znaków.",
        "rejected" => "Nie udało się założyć konta. Sprawdź dane i spróbuj ponownie.",
        _ => "Wystąpił błąd. Spróbuj ponownie.",
    }
}

/// Text for a `?success=` code.
fn success_message(code: &str) -> Option<&'static str> {
    match code {
        "registered" => Some("Konto zostało utworzone. Możesz się zalogować."),
        "password_changed" => Some("Hasło zostało zmienione. Zaloguj się ponownie."),
        _ => None,
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub page: PageContext,
    pub error: Option<&'static str>,
    pub success: Option<&'static str>,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub page: PageContext,
    pub error: Option<&'static str>,
    pub min_password_length: usize,
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(page: PageContext, Query(query): Query<MessageQuery>) -> Response {
    if page.is_authenticated() {
        return Redirect::to("/").into_response();
    }

    LoginTemplate {
        page,
        error: query.error.as_deref().map(error_message),
        success: query.success.as_deref().and_then(success_message),
    }
    .into_response()
}

/// Handle login form submission.
///
/// Exchanges the credentials for a token pair, loads the user, and switches
/// the session to the customer's permanent cart.
#[instrument(skip(state, session, form), fields(username = %form.username))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let credentials = Credentials {
        username: form.username.trim().to_string(),
        password: form.password,
    };

    let tokens = match state.api().login(&credentials).await {
        Ok(tokens) => tokens,
        Err(ApiError::RateLimited(_)) => {
            return Redirect::to("/auth/login?error=rate_limited").into_response();
        }
        Err(e) => {
            tracing::warn!("Login failed: {e}");
            return Redirect::to("/auth/login?error=credentials").into_response();
        }
    };

    if let Err(e) = set_tokens(&session, tokens).await {
        tracing::error!("Failed to set session: {e}");
        return Redirect::to("/auth/login?error=session").into_response();
    }

    let user = match state.api().current_user(&session).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Failed to fetch user after login: {e}");
            if let Err(e) = state.api().clear_tokens(&session).await {
                tracing::error!("Failed to clear tokens: {e}");
            }
            return Redirect::to("/auth/login?error=profile").into_response();
        }
    };

    let current_user = CurrentUser::from(&user);
    if let Err(e) = set_current_user(&session, &current_user).await {
        tracing::error!("Failed to set session: {e}");
        return Redirect::to("/auth/login?error=session").into_response();
    }

    set_sentry_user(&user.id, Some(&user.email));
    add_breadcrumb("auth", "Logged in", None);

    if current_user.is_staff {
        return Redirect::to("/admin").into_response();
    }

    match CheckoutFlow::load(state.api(), &session).await {
        Ok(mut flow) => {
            if let Err(e) = flow.adopt_customer_cart().await {
                tracing::warn!(error = %e, "Could not adopt customer cart");
            }
        }
        Err(e) => tracing::error!("Failed to read checkout state: {e}"),
    }

    Redirect::to("/").into_response()
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(page: PageContext, Query(query): Query<MessageQuery>) -> Response {
    if page.is_authenticated() {
        return Redirect::to("/").into_response();
    }

    RegisterTemplate {
        page,
        error: query.error.as_deref().map(error_message),
        min_password_length: MIN_PASSWORD_LENGTH,
    }
    .into_response()
}

/// Handle registration form submission.
#[instrument(skip(state, form), fields(username = %form.username))]
pub async fn register(State(state): State<AppState>, Form(form): Form<RegisterForm>) -> Response {
    let registration = match form.validate() {
        Ok(registration) => registration,
        Err(code) => return Redirect::to(&format!("/auth/register?error={code}")).into_response(),
    };

    match state.api().register(&registration).await {
        Ok(()) => {
            tracing::info!("Account registered");
            Redirect::to("/auth/login?success=registered").into_response()
        }
        Err(ApiError::RateLimited(_)) => {
            Redirect::to("/auth/register?error=rate_limited").into_response()
        }
        Err(e) => {
            tracing::warn!("Registration failed: {e}");
            Redirect::to("/auth/register?error=rejected").into_response()
        }
    }
}

// =============================================================================
// Logout
// =============================================================================

/// Handle logout.
///
/// Forgets the user, their tokens and checkout state, then destroys the session.
pub async fn logout(session: Session) -> Response {
    if let Err(e) = clear_current_user(&session).await {
        tracing::error!("Failed to clear session: {e}");
    }

    // Also destroy the entire session
    if let Err(e) = session.flush().await {
        tracing::error!("Failed to flush session: {e}");
    }

    clear_sentry_user();
    Redirect::to("/").into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form() -> RegisterForm {
        RegisterForm {
            username: "anna".to_string(),
            email: "Anna@Example.com".to_string(),
            first_name: "Anna".to_string(),
            last_name: String::new(),
            password: "sekret123".to_string(),
            password_confirm: "sekret123".to_string(),
        }
    }

    #[test]
    fn test_register_form_valid() {
        let registration = form().validate().unwrap();
        assert_eq!(registration.username, "anna");
        assert_eq!(registration.first_name, "Anna");
    }

    #[test]
    fn test_register_form_errors() {
        let mismatch = RegisterForm {
            password_confirm: "inne-haslo".to_string(),
            ..form()
        };
        assert_eq!(mismatch.validate().unwrap_err(), "password_mismatch");

        let short = RegisterForm {
            password: "abc".to_string(),
            password_confirm: "abc".to_string(),
            ..form()
        };
        assert_eq!(short.validate().unwrap_err(), "password_too_short");

        let bad_email = RegisterForm {
            email: "anna".to_string(),
            ..form()
        };
        assert_eq!(bad_email.validate().unwrap_err(), "invalid_email");
    }

    #[test]
    fn test_message_codes() {
        assert_eq!(error_message("credentials"), "Nieprawidłowa nazwa użytkownika lub hasło.");
        assert_eq!(error_message("<script>"), "Wystąpił błąd. Spróbuj ponownie.");
        assert!(success_message("registered").is_some());
        assert!(success_message("anything").is_none());
    }
}

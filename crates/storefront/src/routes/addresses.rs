//! Address book route handlers.
//!
//! Addresses are edited from two places, the checkout address step and the
//! profile page. Forms carry a `next` field naming the page to return to.

use axum::{
    Form,
    extract::{Path, State},
    response::Response,
};
use tower_sessions::Session;
use tracing::instrument;

use myshop_core::AddressId;

use crate::checkout::{AddressForm, CheckoutError, CheckoutSession, messages};
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::routes::{redirect_with_error, redirect_with_success};
use crate::state::AppState;

/// Where an address form returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReturnTo {
    Checkout,
    Profile,
}

impl ReturnTo {
    /// Only the two known pages are accepted; anything else goes to checkout.
    fn parse(next: &str) -> Self {
        if next == "/profile" {
            Self::Profile
        } else {
            Self::Checkout
        }
    }

    const fn path(self) -> &'static str {
        match self {
            Self::Checkout => "/checkout/address",
            Self::Profile => "/profile",
        }
    }

    const fn created(self) -> &'static str {
        match self {
            Self::Checkout => "Adres dodany pomyślnie!",
            Self::Profile => "Address saved successfully",
        }
    }

    const fn updated(self) -> &'static str {
        match self {
            Self::Checkout => "Adres zaktualizowany pomyślnie!",
            Self::Profile => "Address saved successfully",
        }
    }

    const fn deleted(self) -> &'static str {
        match self {
            Self::Checkout => "Adres usunięty pomyślnie.",
            Self::Profile => "Address deleted successfully",
        }
    }
}

fn parse_address_id(raw: &str) -> Result<AddressId, AppError> {
    raw.parse()
        .map_err(|_| AppError::NotFound("Address not found".to_string()))
}

/// Create an address.
#[instrument(skip(state, session, _user))]
pub async fn create(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AddressForm>,
) -> Result<Response, AppError> {
    let back = ReturnTo::parse(&form.next);
    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => return redirect_with_error(&session, e, back.path()).await,
    };

    match state.api().create_address(&session, &input).await {
        Ok(address) => {
            tracing::info!(address_id = %address.id, "Address created");
            Ok(redirect_with_success(&session, back.created(), back.path()).await)
        }
        Err(e) => {
            let err = CheckoutError::api(messages::ADDRESS_SAVE_FAILED, e);
            redirect_with_error(&session, err, back.path()).await
        }
    }
}

/// Replace an address.
#[instrument(skip(state, session, _user))]
pub async fn update(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<AddressForm>,
) -> Result<Response, AppError> {
    let id = parse_address_id(&id)?;
    let back = ReturnTo::parse(&form.next);
    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => {
            let retry = format!("{}?edit={id}", back.path());
            return redirect_with_error(&session, e, &retry).await;
        }
    };

    match state.api().update_address(&session, id, &input).await {
        Ok(_) => Ok(redirect_with_success(&session, back.updated(), back.path()).await),
        Err(e) => {
            let err = CheckoutError::api(messages::ADDRESS_SAVE_FAILED, e);
            redirect_with_error(&session, err, back.path()).await
        }
    }
}

/// Delete an address.
///
/// Deleting the address selected for checkout also clears the selection.
#[instrument(skip(state, session, _user))]
pub async fn delete(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<AddressForm>,
) -> Result<Response, AppError> {
    let id = parse_address_id(&id)?;
    let back = ReturnTo::parse(&form.next);

    match state.api().delete_address(&session, id).await {
        Ok(()) => {
            let mut checkout = CheckoutSession::load(&session).await?;
            if checkout.selected_address_id == Some(id) {
                checkout.selected_address_id = None;
                checkout.save(&session).await?;
            }
            Ok(redirect_with_success(&session, back.deleted(), back.path()).await)
        }
        Err(e) => {
            let err = CheckoutError::api(messages::ADDRESS_DELETE_FAILED, e);
            redirect_with_error(&session, err, back.path()).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_to_is_allowlisted() {
        assert_eq!(ReturnTo::parse("/profile"), ReturnTo::Profile);
        assert_eq!(ReturnTo::parse("/checkout/address"), ReturnTo::Checkout);
        assert_eq!(ReturnTo::parse("https://evil.example"), ReturnTo::Checkout);
        assert_eq!(ReturnTo::parse(""), ReturnTo::Checkout);
    }
}

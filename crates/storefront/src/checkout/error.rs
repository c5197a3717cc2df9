//! Checkout error taxonomy.

use thiserror::Error;

use crate::api::ApiError;
use crate::models::StoreError;

/// Messages shown to the customer during checkout.
pub mod messages {
    pub const CART_LOAD_FAILED: &str = "Failed to load cart";
    pub const CART_ADD_FAILED: &str = "Failed to add product to cart";
    pub const CART_UPDATE_FAILED: &str = "Failed to update cart item";
    pub const CART_REMOVE_FAILED: &str = "Failed to remove item from cart";
    pub const CART_ITEM_MISSING: &str = "Ten produkt nie znajduje się już w koszyku.";
    pub const ADDRESSES_LOAD_FAILED: &str = "Nie udało się pobrać adresów.";
    pub const ADDRESS_SAVE_FAILED: &str = "Nie udało się zapisać adresu.";
    pub const ADDRESS_DELETE_FAILED: &str = "Nie udało się usunąć adresu.";
    pub const EMPTY_CART: &str = "Brak produktów w koszyku.";
    pub const GUEST_EMPTY_CART: &str =
        "Brak produktów w koszyku. Dodaj produkty do koszyka przed składaniem zamówienia.";
    pub const NO_ADDRESS_SELECTED: &str = "Wybierz adres dostawy.";
    pub const NO_DELIVERY_ADDRESS: &str = "Nie wybrano adresu dostawy.";
    pub const ORDER_CREATE_FAILED: &str = "Nie udało się utworzyć zamówienia.";
    pub const ORDER_FETCH_FAILED: &str = "Nie udało się pobrać zamówienia";
    pub const PAYMENT_DATA_MISSING: &str = "Brakuje wymaganych danych do płatności.";
    pub const PAYMENT_FAILED: &str = "Wystąpił błąd podczas przetwarzania płatności.";
    pub const ORDER_OUTDATED: &str =
        "Koszyk zmienił się od utworzenia zamówienia. Sprawdź podsumowanie i zapłać ponownie.";
    pub const CANCEL_FAILED: &str = "Nie udało się anulować zamówienia";
    pub const ORDER_ALREADY_CLOSED: &str = "To zamówienie zostało już zamknięte.";
    pub const RETURN_PARAMS_MISSING: &str = "Brak wymaganych parametrów płatności";
    pub const VERIFY_FAILED: &str = "Nie udało się potwierdzić płatności";
    pub const GUEST_ORDER_FAILED: &str = "Wystąpił błąd podczas składania zamówienia.";
    pub const ALL_FIELDS_REQUIRED: &str = "Wszystkie pola są wymagane.";
    pub const INVALID_HOUSE_NUMBER: &str = "Numer domu musi być dodatnią liczbą całkowitą.";
    pub const INVALID_APARTMENT_NUMBER: &str =
        "Numer mieszkania musi być dodatnią liczbą całkowitą.";
    pub const POST_CODE_TOO_LONG: &str = "Kod pocztowy może mieć najwyżej 8 znaków.";
    pub const INVALID_EMAIL: &str = "Podaj prawidłowy adres email.";
    pub const UNEXPECTED: &str = "Wystąpił nieoczekiwany błąd. Spróbuj ponownie.";
}

/// Errors raised by the checkout flow.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Input rejected before any network call.
    #[error("{0}")]
    Validation(String),

    /// The flow cannot continue from the current state (missing order, cart or address).
    #[error("{0}")]
    MissingContext(String),

    /// The shop API call failed; the message is the step-specific copy.
    #[error("{message}: {source}")]
    Api {
        message: &'static str,
        #[source]
        source: ApiError,
    },

    /// The visitor session could not be read or written.
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn missing(message: impl Into<String>) -> Self {
        Self::MissingContext(message.into())
    }

    /// Wrap an API failure with the copy for the step that failed.
    pub(crate) const fn api(message: &'static str, source: ApiError) -> Self {
        Self::Api { message, source }
    }

    /// Whether the customer must log in again.
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(
            self,
            Self::Api {
                source: ApiError::SessionExpired,
                ..
            }
        )
    }

    /// Text to show the customer.
    ///
    /// API failures prefer the message from the API's error body over the
    /// generic step copy.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) | Self::MissingContext(message) => message.clone(),
            Self::Api { message, source } => source
                .api_message()
                .map_or_else(|| (*message).to_string(), str::to_string),
            Self::Store(_) => messages::UNEXPECTED.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefers_api_body() {
        let err = CheckoutError::api(
            messages::VERIFY_FAILED,
            ApiError::Status {
                status: 400,
                message: "Payment not completed".to_string(),
            },
        );
        assert_eq!(err.user_message(), "Payment not completed");

        let err = CheckoutError::api(messages::VERIFY_FAILED, ApiError::RateLimited(3));
        assert_eq!(err.user_message(), messages::VERIFY_FAILED);
    }

    #[test]
    fn test_session_expired_detection() {
        let err = CheckoutError::api(messages::ORDER_CREATE_FAILED, ApiError::SessionExpired);
        assert!(err.is_session_expired());
        assert!(!CheckoutError::validation(messages::ALL_FIELDS_REQUIRED).is_session_expired());
    }
}

//! Pure checkout decisions.
//!
//! Everything here is computed from inputs already in hand, without I/O, so
//! the rules that gate network calls can be tested directly.

use serde::Deserialize;

use myshop_core::{CartId, Email, OrderId};

use super::error::{CheckoutError, messages};
use super::state::CheckoutSession;
use crate::api::{AddressInput, CartItem, CreateGuestOrder};

// =============================================================================
// Cart quantity
// =============================================================================

/// What to do with a requested cart line quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantityChange {
    /// More than the stock allows; nothing is sent to the API.
    Reject { title: String, max: i32 },
    /// Zero or less removes the line.
    Remove,
    /// Set the line to this quantity.
    Update(u32),
}

impl QuantityChange {
    /// Decide how to apply `requested` to `item`.
    #[must_use]
    pub fn decide(item: &CartItem, requested: i64) -> Self {
        let max = item.product.inventory;
        if requested > i64::from(max) {
            return Self::Reject {
                title: item.product.title.clone(),
                max,
            };
        }
        match u32::try_from(requested) {
            Ok(0) | Err(_) => Self::Remove,
            Ok(quantity) => Self::Update(quantity),
        }
    }

    /// Message for a rejected change.
    #[must_use]
    pub fn rejection_message(&self) -> Option<String> {
        match self {
            Self::Reject { title, max } => Some(format!(
                "Only {max} items available in stock for \"{title}\"."
            )),
            _ => None,
        }
    }
}

// =============================================================================
// Payment step entry
// =============================================================================

/// Where the payment step gets its order from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSource {
    /// An order already exists for this checkout.
    Existing(OrderId),
    /// No order yet; create one from the cart.
    Create(CartId),
    /// Neither an order nor a cart; nothing to pay for.
    Missing,
}

impl OrderSource {
    /// Resolve the order for the payment step.
    ///
    /// An order bound to the current cart is reused. An order left over from
    /// a different cart is superseded by a new one. An order with no cart
    /// left in the session is still shown so it can be paid or cancelled.
    #[must_use]
    pub fn resolve(session: &CheckoutSession) -> Self {
        if let Some(order_id) = session.order_for_cart() {
            return Self::Existing(order_id);
        }
        match (session.cart_id, session.current_order_id) {
            (Some(cart_id), _) => Self::Create(cart_id),
            (None, Some(order_id)) => Self::Existing(order_id),
            (None, None) => Self::Missing,
        }
    }
}

// =============================================================================
// Payment return
// =============================================================================

/// Query parameters the payment provider sends the customer back with.
///
/// All fields are untrusted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentReturnQuery {
    pub session_id: Option<String>,
    pub order_id: Option<String>,
    pub guest: Option<String>,
}

/// Which verification endpoint a return must be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Guest,
    Customer,
}

/// A parsed payment return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReturn {
    pub session_id: String,
    pub order_id: OrderId,
    pub verification: Verification,
}

impl PaymentReturn {
    /// Parse the return parameters.
    ///
    /// `session_id` and `order_id` are both required and `order_id` must be
    /// an integer. Only the literal `guest=true` selects guest verification.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::MissingContext` when a parameter is missing or malformed.
    pub fn parse(query: &PaymentReturnQuery) -> Result<Self, CheckoutError> {
        let session_id = query
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CheckoutError::missing(messages::RETURN_PARAMS_MISSING))?;

        let order_id = query
            .order_id
            .as_deref()
            .and_then(|s| s.parse::<OrderId>().ok())
            .ok_or_else(|| CheckoutError::missing(messages::RETURN_PARAMS_MISSING))?;

        let verification = if query.guest.as_deref() == Some("true") {
            Verification::Guest
        } else {
            Verification::Customer
        };

        Ok(Self {
            session_id: session_id.to_string(),
            order_id,
            verification,
        })
    }

    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.verification == Verification::Guest
    }
}

// =============================================================================
// Guest form
// =============================================================================

/// Guest checkout form as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuestForm {
    #[serde(default)]
    pub guest_email: String,
    #[serde(default)]
    pub guest_first_name: String,
    #[serde(default)]
    pub guest_last_name: String,
    #[serde(default)]
    pub guest_phone: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub house_number: String,
    #[serde(default)]
    pub apartment_number: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub post_code: String,
}

impl GuestForm {
    /// Check the form and build the guest order request for `cart_id`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` naming the first problem found,
    /// including a missing cart.
    pub fn validate(&self, cart_id: Option<CartId>) -> Result<CreateGuestOrder, CheckoutError> {
        let required = [
            &self.guest_email,
            &self.guest_first_name,
            &self.guest_last_name,
            &self.guest_phone,
            &self.street,
            &self.house_number,
            &self.city,
            &self.post_code,
        ];
        if required.iter().any(|field| field.trim().is_empty()) {
            return Err(CheckoutError::validation(messages::ALL_FIELDS_REQUIRED));
        }

        let cart_id =
            cart_id.ok_or_else(|| CheckoutError::validation(messages::GUEST_EMPTY_CART))?;

        let house_number = parse_positive(&self.house_number)
            .ok_or_else(|| CheckoutError::validation(messages::INVALID_HOUSE_NUMBER))?;

        let apartment_number = match self.apartment_number.trim() {
            "" => None,
            raw => Some(
                parse_positive(raw)
                    .ok_or_else(|| CheckoutError::validation(messages::INVALID_APARTMENT_NUMBER))?,
            ),
        };

        let email = Email::parse(&self.guest_email)
            .map_err(|_| CheckoutError::validation(messages::INVALID_EMAIL))?;

        Ok(CreateGuestOrder {
            cart_id,
            guest_email: email.into(),
            guest_first_name: self.guest_first_name.trim().to_string(),
            guest_last_name: self.guest_last_name.trim().to_string(),
            guest_phone: self.guest_phone.trim().to_string(),
            street: self.street.trim().to_string(),
            house_number,
            apartment_number,
            city: self.city.trim().to_string(),
            post_code: self.post_code.trim().to_string(),
        })
    }
}

// =============================================================================
// Address form
// =============================================================================

/// Longest post code the API stores.
pub const POST_CODE_MAX_LEN: usize = 8;

/// Address form as submitted from the address step or the profile page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressForm {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub house_number: String,
    #[serde(default)]
    pub apartment_number: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub post_code: String,
    /// Page to return to afterwards.
    #[serde(default)]
    pub next: String,
}

impl AddressForm {
    /// Check the form and build the API body.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` naming the first problem found.
    pub fn validate(&self) -> Result<AddressInput, CheckoutError> {
        let required = [&self.street, &self.house_number, &self.city, &self.post_code];
        if required.iter().any(|field| field.trim().is_empty()) {
            return Err(CheckoutError::validation(messages::ALL_FIELDS_REQUIRED));
        }

        let house_number = parse_positive(&self.house_number)
            .ok_or_else(|| CheckoutError::validation(messages::INVALID_HOUSE_NUMBER))?;

        let apartment_number = match self.apartment_number.trim() {
            "" => None,
            raw => Some(
                parse_positive(raw)
                    .ok_or_else(|| CheckoutError::validation(messages::INVALID_APARTMENT_NUMBER))?,
            ),
        };

        let post_code = self.post_code.trim();
        if post_code.chars().count() > POST_CODE_MAX_LEN {
            return Err(CheckoutError::validation(messages::POST_CODE_TOO_LONG));
        }

        Ok(AddressInput {
            street: self.street.trim().to_string(),
            house_number,
            apartment_number,
            city: self.city.trim().to_string(),
            post_code: post_code.to_string(),
        })
    }
}

fn parse_positive(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use myshop_core::{CartItemId, ProductId};

    use super::*;
    use crate::api::CartProduct;

    const CART: &str = "9f1c2d3e-4b5a-6789-abcd-ef0123456789";

    fn item(inventory: i32) -> CartItem {
        CartItem {
            id: CartItemId::new(1),
            product: CartProduct {
                id: ProductId::new(3),
                title: "Kubek".to_string(),
                unit_price: Decimal::from(20),
                inventory,
            },
            quantity: 1,
            total_price: Decimal::from(20),
        }
    }

    fn cart() -> CartId {
        CartId::parse(CART).unwrap()
    }

    fn guest_form() -> GuestForm {
        GuestForm {
            guest_email: "anna@example.com".to_string(),
            guest_first_name: "Anna".to_string(),
            guest_last_name: "Nowak".to_string(),
            guest_phone: "600100200".to_string(),
            street: "Długa".to_string(),
            house_number: "5".to_string(),
            apartment_number: String::new(),
            city: "Kraków".to_string(),
            post_code: "30-001".to_string(),
        }
    }

    #[test]
    fn test_quantity_over_inventory_is_rejected() {
        let change = QuantityChange::decide(&item(3), 4);
        assert_eq!(
            change,
            QuantityChange::Reject {
                title: "Kubek".to_string(),
                max: 3
            }
        );
        assert_eq!(
            change.rejection_message().unwrap(),
            "Only 3 items available in stock for \"Kubek\"."
        );
    }

    #[test]
    fn test_quantity_at_inventory_updates() {
        assert_eq!(QuantityChange::decide(&item(3), 3), QuantityChange::Update(3));
    }

    #[test]
    fn test_quantity_zero_or_negative_removes() {
        assert_eq!(QuantityChange::decide(&item(3), 0), QuantityChange::Remove);
        assert_eq!(QuantityChange::decide(&item(3), -2), QuantityChange::Remove);
    }

    #[test]
    fn test_order_source_reuses_order_for_same_cart() {
        let mut session = CheckoutSession {
            cart_id: Some(cart()),
            ..CheckoutSession::default()
        };
        assert_eq!(OrderSource::resolve(&session), OrderSource::Create(cart()));

        session.record_order(OrderId::new(9), cart());
        assert_eq!(
            OrderSource::resolve(&session),
            OrderSource::Existing(OrderId::new(9))
        );
    }

    #[test]
    fn test_order_source_without_cart() {
        assert_eq!(
            OrderSource::resolve(&CheckoutSession::default()),
            OrderSource::Missing
        );

        let session = CheckoutSession {
            current_order_id: Some(OrderId::new(9)),
            ..CheckoutSession::default()
        };
        assert_eq!(
            OrderSource::resolve(&session),
            OrderSource::Existing(OrderId::new(9))
        );
    }

    #[test]
    fn test_payment_return_requires_both_ids() {
        let query = PaymentReturnQuery {
            session_id: Some("cs_test_1".to_string()),
            order_id: None,
            guest: None,
        };
        assert!(PaymentReturn::parse(&query).is_err());

        let query = PaymentReturnQuery {
            session_id: Some("  ".to_string()),
            order_id: Some("5".to_string()),
            guest: None,
        };
        assert!(PaymentReturn::parse(&query).is_err());
    }

    #[test]
    fn test_payment_return_rejects_non_integer_order() {
        let query = PaymentReturnQuery {
            session_id: Some("cs_test_1".to_string()),
            order_id: Some("5;DROP".to_string()),
            guest: None,
        };
        assert!(PaymentReturn::parse(&query).is_err());
    }

    #[test]
    fn test_payment_return_guest_only_for_literal_true() {
        let mut query = PaymentReturnQuery {
            session_id: Some("cs_test_1".to_string()),
            order_id: Some("5".to_string()),
            guest: Some("true".to_string()),
        };
        let parsed = PaymentReturn::parse(&query).unwrap();
        assert_eq!(parsed.verification, Verification::Guest);
        assert_eq!(parsed.order_id, OrderId::new(5));

        query.guest = Some("TRUE".to_string());
        assert_eq!(
            PaymentReturn::parse(&query).unwrap().verification,
            Verification::Customer
        );

        query.guest = None;
        assert!(!PaymentReturn::parse(&query).unwrap().is_guest());
    }

    #[test]
    fn test_guest_form_valid() {
        let order = guest_form().validate(Some(cart())).unwrap();
        assert_eq!(order.house_number, 5);
        assert_eq!(order.apartment_number, None);
        assert_eq!(order.guest_email, "anna@example.com");
    }

    #[test]
    fn test_guest_form_requires_all_fields() {
        let mut form = guest_form();
        form.city = "   ".to_string();
        let err = form.validate(Some(cart())).unwrap_err();
        assert_eq!(err.user_message(), messages::ALL_FIELDS_REQUIRED);
    }

    #[test]
    fn test_guest_form_requires_cart() {
        let err = guest_form().validate(None).unwrap_err();
        assert_eq!(err.user_message(), messages::GUEST_EMPTY_CART);
    }

    #[test]
    fn test_guest_form_house_number_must_be_positive() {
        let mut form = guest_form();
        form.house_number = "0".to_string();
        assert_eq!(
            form.validate(Some(cart())).unwrap_err().user_message(),
            messages::INVALID_HOUSE_NUMBER
        );

        form.house_number = "5a".to_string();
        assert!(form.validate(Some(cart())).is_err());
    }

    #[test]
    fn test_guest_form_optional_apartment() {
        let mut form = guest_form();
        form.apartment_number = "12".to_string();
        assert_eq!(form.validate(Some(cart())).unwrap().apartment_number, Some(12));

        form.apartment_number = "x".to_string();
        assert_eq!(
            form.validate(Some(cart())).unwrap_err().user_message(),
            messages::INVALID_APARTMENT_NUMBER
        );
    }

    #[test]
    fn test_guest_form_rejects_bad_email() {
        let mut form = guest_form();
        form.guest_email = "anna".to_string();
        assert_eq!(
            form.validate(Some(cart())).unwrap_err().user_message(),
            messages::INVALID_EMAIL
        );
    }

    #[test]
    fn test_address_form_validation() {
        let form = AddressForm {
            street: " Długa ".to_string(),
            house_number: "5".to_string(),
            apartment_number: String::new(),
            city: "Warszawa".to_string(),
            post_code: "00-001".to_string(),
            next: String::new(),
        };
        let input = form.validate().unwrap();
        assert_eq!(input.street, "Długa");
        assert_eq!(input.house_number, 5);
        assert_eq!(input.apartment_number, None);

        let missing_city = AddressForm {
            city: "  ".to_string(),
            ..form.clone()
        };
        assert_eq!(
            missing_city.validate().unwrap_err().user_message(),
            messages::ALL_FIELDS_REQUIRED
        );

        let zero_house = AddressForm {
            house_number: "0".to_string(),
            ..form.clone()
        };
        assert_eq!(
            zero_house.validate().unwrap_err().user_message(),
            messages::INVALID_HOUSE_NUMBER
        );

        let long_post_code = AddressForm {
            post_code: "00-001-999".to_string(),
            ..form
        };
        assert_eq!(
            long_post_code.validate().unwrap_err().user_message(),
            messages::POST_CODE_TOO_LONG
        );
    }
}

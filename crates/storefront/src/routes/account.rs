//! Customer account route handlers.
//!
//! Order history, the dashboard, and the profile page with its phone,
//! password and address book sections.

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

use myshop_core::{AddressId, OrderTotals, PaymentStatus, Price};

use crate::api::{ApiError, ChangePassword, CustomerUpdate, Order};
use crate::checkout::CheckoutError;
use crate::error::AppError;
use crate::filters;
use crate::middleware::{RequireAuth, clear_current_user};
use crate::routes::auth::MIN_PASSWORD_LENGTH;
use crate::routes::checkout::{AddressFormView, AddressView};
use crate::routes::{PageContext, redirect_with_error, redirect_with_success};
use crate::state::AppState;

// =============================================================================
// View Types
// =============================================================================

/// Order line display data for templates.
#[derive(Clone)]
pub struct OrderItemView {
    pub title: String,
    pub quantity: u32,
    pub unit_price: String,
    pub line_price: String,
}

/// Order display data for templates.
#[derive(Clone)]
pub struct OrderView {
    pub id: String,
    pub placed_at: String,
    pub status_label: &'static str,
    pub status_class: &'static str,
    pub items: Vec<OrderItemView>,
    pub total: String,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            placed_at: order.placed_at.clone(),
            status_label: order.payment_status.label(),
            status_class: match order.payment_status {
                PaymentStatus::Pending => "status-pending",
                PaymentStatus::Complete => "status-complete",
                PaymentStatus::Failed => "status-failed",
            },
            items: order
                .items
                .iter()
                .map(|item| OrderItemView {
                    title: item.product.title.clone(),
                    quantity: item.quantity,
                    unit_price: Price::pln(item.unit_price).to_string(),
                    line_price: Price::pln(item.unit_price).times(item.quantity).to_string(),
                })
                .collect(),
            total: order_total(order).to_string(),
        }
    }
}

/// The API's total when present, otherwise the sum of the lines.
fn order_total(order: &Order) -> Price {
    order.total_price.map_or_else(
        || OrderTotals::from_lines(order.lines()).subtotal,
        Price::pln,
    )
}

/// Sum over all placed orders.
fn total_spent(orders: &[Order]) -> Price {
    orders.iter().map(order_total).sum()
}

// =============================================================================
// Templates
// =============================================================================

/// Order history page template.
#[derive(Template, WebTemplate)]
#[template(path = "account/orders.html")]
pub struct OrdersTemplate {
    pub page: PageContext,
    pub orders: Vec<OrderView>,
}

/// Dashboard page template.
#[derive(Template, WebTemplate)]
#[template(path = "account/dashboard.html")]
pub struct DashboardTemplate {
    pub page: PageContext,
    pub greeting_name: String,
    pub order_count: usize,
    pub total_spent: String,
    pub membership: Option<String>,
}

/// Profile page template.
#[derive(Template, WebTemplate)]
#[template(path = "account/profile.html")]
pub struct ProfileTemplate {
    pub page: PageContext,
    pub username: String,
    pub email: String,
    pub phone: String,
    pub birth_date: String,
    pub membership: String,
    pub addresses: Vec<AddressView>,
    /// New or edited address; the partial expects it as `form`.
    pub form: AddressFormView,
    pub min_password_length: usize,
}

// =============================================================================
// Orders
// =============================================================================

/// Display the customer's orders, newest first.
#[instrument(skip(state, session, page, _user))]
pub async fn orders(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
    mut page: PageContext,
) -> Result<Response, AppError> {
    let orders = match state.api().orders(&session).await {
        Ok(mut orders) => {
            orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
            orders.iter().map(OrderView::from).collect()
        }
        Err(e) if e.is_session_expired() => return Err(e.into()),
        Err(e) => {
            tracing::error!("Failed to fetch orders: {e}");
            page.error("Failed to load orders");
            Vec::new()
        }
    };

    Ok(OrdersTemplate { page, orders }.into_response())
}

// =============================================================================
// Dashboard
// =============================================================================

/// Display the dashboard.
#[instrument(skip(state, session, page, user))]
pub async fn dashboard(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
    page: PageContext,
) -> Result<Response, AppError> {
    let (orders, customer) = tokio::join!(
        state.api().orders(&session),
        state.api().customer(&session)
    );

    let orders = match orders {
        Ok(orders) => orders,
        Err(e) if e.is_session_expired() => return Err(e.into()),
        Err(e) => {
            tracing::error!("Failed to fetch dashboard orders: {e}");
            Vec::new()
        }
    };
    let membership = customer
        .map_err(|e| tracing::warn!("Failed to fetch customer: {e}"))
        .ok()
        .map(|customer| customer.membership.to_string());

    Ok(DashboardTemplate {
        page,
        greeting_name: user.display_name().to_string(),
        order_count: orders.len(),
        total_spent: total_spent(&orders).to_string(),
        membership,
    }
    .into_response())
}

// =============================================================================
// Profile
// =============================================================================

/// Profile page query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileQuery {
    /// Address to load into the form for editing.
    pub edit: Option<String>,
}

/// Display the profile page.
#[instrument(skip(state, session, page, user))]
pub async fn profile(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
    mut page: PageContext,
    Query(query): Query<ProfileQuery>,
) -> Result<Response, AppError> {
    let (account, customer, addresses) = tokio::join!(
        state.api().current_user(&session),
        state.api().customer(&session),
        state.api().addresses(&session)
    );

    for err in [
        account.as_ref().err(),
        customer.as_ref().err(),
        addresses.as_ref().err(),
    ]
    .into_iter()
    .flatten()
    {
        if err.is_session_expired() {
            return Err(ApiError::SessionExpired.into());
        }
        tracing::warn!("Failed to fetch profile data: {err}");
    }
    if account.is_err() || customer.is_err() {
        page.error("Failed to fetch profile data");
    }

    let email = account.map(|account| account.email).unwrap_or_default();
    let (phone, birth_date, membership) = customer.map_or_else(
        |_| (String::new(), String::new(), String::new()),
        |customer| {
            (
                customer.phone,
                customer.birth_date.unwrap_or_default(),
                customer.membership.to_string(),
            )
        },
    );
    let addresses = addresses.unwrap_or_default();

    let form = query
        .edit
        .as_deref()
        .and_then(|raw| raw.parse::<AddressId>().ok())
        .and_then(|id| addresses.iter().find(|address| address.id == id))
        .map_or_else(
            || AddressFormView::create("/profile"),
            |address| AddressFormView::edit(address, "/profile"),
        );

    Ok(ProfileTemplate {
        page,
        username: user.username,
        email,
        phone,
        birth_date,
        membership,
        addresses: addresses
            .iter()
            .map(|address| AddressView::new(address, None))
            .collect(),
        form,
        min_password_length: MIN_PASSWORD_LENGTH,
    }
    .into_response())
}

/// Profile form data.
#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub birth_date: String,
}

impl ProfileForm {
    fn to_update(&self) -> Result<CustomerUpdate, CheckoutError> {
        let birth_date = match self.birth_date.trim() {
            "" => None,
            raw => Some(
                chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| CheckoutError::Validation("Podaj prawidłową datę urodzenia.".to_string()))?
                    .format("%Y-%m-%d")
                    .to_string(),
            ),
        };

        Ok(CustomerUpdate {
            phone: self.phone.trim().to_string(),
            birth_date,
        })
    }
}

/// Update the phone number and birth date.
#[instrument(skip(state, session, _user))]
pub async fn update_profile(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ProfileForm>,
) -> Result<Response, AppError> {
    let update = match form.to_update() {
        Ok(update) => update,
        Err(e) => return redirect_with_error(&session, e, "/profile").await,
    };

    match state.api().update_customer(&session, &update).await {
        Ok(_) => Ok(redirect_with_success(&session, "Profile updated successfully", "/profile").await),
        Err(e) if e.is_session_expired() => Err(e.into()),
        Err(e) => {
            tracing::warn!("Failed to update profile: {e}");
            let message = e
                .api_message()
                .map_or_else(|| "Failed to update profile".to_string(), str::to_string);
            redirect_with_error(&session, CheckoutError::Validation(message), "/profile").await
        }
    }
}

/// Password change form data.
#[derive(Deserialize)]
pub struct PasswordForm {
    pub password: String,
    pub password_confirm: String,
}

impl PasswordForm {
    fn validate(&self) -> Result<ChangePassword, CheckoutError> {
        if self.password != self.password_confirm {
            return Err(CheckoutError::Validation("Hasła nie są takie same.".to_string()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(CheckoutError::Validation(format!(
                "Hasło musi mieć co najmniej {MIN_PASSWORD_LENGTH} znaków."
            )));
        }
        Ok(ChangePassword {
            password: self.password.clone(),
        })
    }
}

/// Change the password, then log out so the customer signs in with it.
#[instrument(skip(state, session, form, _user))]
pub async fn change_password(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<PasswordForm>,
) -> Result<Response, AppError> {
    let body = match form.validate() {
        Ok(body) => body,
        Err(e) => return redirect_with_error(&session, e, "/profile").await,
    };

    match state.api().change_password(&session, &body).await {
        Ok(()) => {
            tracing::info!("Password changed");
            clear_current_user(&session).await?;
            session.flush().await?;
            Ok(Redirect::to("/auth/login?success=password_changed").into_response())
        }
        Err(e) if e.is_session_expired() => Err(e.into()),
        Err(e) => {
            tracing::warn!("Failed to change password: {e}");
            let message = e
                .api_message()
                .map_or_else(|| "Failed to update profile".to_string(), str::to_string);
            redirect_with_error(&session, CheckoutError::Validation(message), "/profile").await
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn order(status: &str, total: Option<&str>) -> Order {
        serde_json::from_value(json!({
            "id": 1,
            "placed_at": "2025-03-01T10:00:00Z",
            "payment_status": status,
            "total_price": total,
            "items": [{
                "id": 1,
                "product": {"id": 2, "title": "Kubek", "unit_price": "30.00"},
                "unit_price": "25.00",
                "quantity": 2
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_order_total_falls_back_to_lines() {
        assert_eq!(order_total(&order("C", None)).to_string(), "50.00 PLN");
        assert_eq!(order_total(&order("C", Some("65.00"))).to_string(), "65.00 PLN");
    }

    #[test]
    fn test_total_spent_sums_orders() {
        let orders = [order("C", Some("65.00")), order("P", Some("100.00")), order("C", None)];
        assert_eq!(total_spent(&orders).to_string(), "215.00 PLN");
    }

    #[test]
    fn test_order_view_uses_order_prices() {
        let view = OrderView::from(&order("P", None));
        assert_eq!(view.items[0].line_price, "50.00 PLN");
        assert_eq!(view.status_label, "Oczekuje na płatność");
    }

    #[test]
    fn test_profile_form_birth_date() {
        let form = ProfileForm {
            phone: " 500 600 700 ".to_string(),
            birth_date: "1990-05-17".to_string(),
        };
        let update = form.to_update().unwrap();
        assert_eq!(update.phone, "500 600 700");
        assert_eq!(update.birth_date.as_deref(), Some("1990-05-17"));

        let bad = ProfileForm {
            phone: String::new(),
            birth_date: "17.05.1990".to_string(),
        };
        assert!(bad.to_update().is_err());
    }

    #[test]
    fn test_password_form() {
        let ok = PasswordForm {
            password: "nowehaslo1".to_string(),
            password_confirm: "nowehaslo1".to_string(),
        };
        assert!(ok.validate().is_ok());

        let mismatch = PasswordForm {
            password: "nowehaslo1".to_string(),
            password_confirm: "nowehaslo2".to_string(),
        };
        assert!(mismatch.validate().is_err());
    }
}

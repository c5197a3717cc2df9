//! Admin entry point.
//!
//! The storefront has no admin UI of its own; staff are sent to the shop
//! backend's admin panel.

use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};

use crate::middleware::{LOGIN_PATH, OptionalAuth};
use crate::state::AppState;

/// Send staff to the backend admin panel, everyone else away.
pub async fn admin(State(state): State<AppState>, OptionalAuth(user): OptionalAuth) -> Response {
    match user {
        None => Redirect::to(LOGIN_PATH).into_response(),
        Some(user) if !user.is_staff => Redirect::to("/").into_response(),
        Some(user) => {
            tracing::info!(user_id = %user.id, "Redirecting staff to admin panel");
            Redirect::to(&state.config().api.admin_url()).into_response()
        }
    }
}

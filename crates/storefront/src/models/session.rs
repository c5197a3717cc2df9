//! Session-related types.
//!
//! Everything the storefront remembers about a visitor lives in their
//! server-side session: the API tokens, the cart, and the checkout pointers
//! (`selectedAddressId`, `currentOrderId`). Pointers are plain strings and
//! are only weak references to state the shop API owns.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_sessions::Session;

use myshop_core::UserId;

use crate::api::User;

/// Session-stored user identity.
///
/// Minimal data stored in the session to render the header and gate staff-only pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// API user ID.
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    /// Staff users are sent to the backend admin panel.
    pub is_staff: bool,
}

impl CurrentUser {
    /// Name to greet the user with.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.first_name.is_empty() {
            &self.username
        } else {
            &self.first_name
        }
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            is_staff: user.is_staff,
        }
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for pending flash messages.
    pub const FLASH: &str = "flash";

    /// Key for the API access token.
    pub const ACCESS_TOKEN: &str = "access_token";

    /// Key for the API refresh token.
    pub const REFRESH_TOKEN: &str = "refresh_token";

    /// Key for the cart ID.
    pub const CART_ID: &str = "cart_id";

    /// Key for the address chosen at the address step.
    pub const SELECTED_ADDRESS_ID: &str = "selectedAddressId";

    /// Key for the order created from the current cart.
    pub const CURRENT_ORDER_ID: &str = "currentOrderId";

    /// Key for the cart the current order was created from.
    pub const CURRENT_ORDER_CART_ID: &str = "currentOrderCartId";

    /// Key for the token identifying the current cart contents.
    pub const CART_REVISION: &str = "cartRevision";

    /// Key for the cart revision the current order was created from.
    pub const CURRENT_ORDER_REVISION: &str = "currentOrderRevision";
}

/// Error reading or writing the visitor session.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// String key/value access to the visitor session.
///
/// Checkout logic and the API client only see this trait, so they can be
/// exercised against an in-memory map in tests.
pub trait SessionStorage: Send + Sync {
    /// Read a value.
    fn get_value(
        &self,
        key: &'static str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Write a value, replacing any previous one.
    fn set_value(
        &self,
        key: &'static str,
        value: String,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a value. Removing a missing key is not an error.
    fn remove_value(&self, key: &'static str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl SessionStorage for Session {
    async fn get_value(&self, key: &'static str) -> Result<Option<String>, StoreError> {
        Ok(self.get::<String>(key).await?)
    }

    async fn set_value(&self, key: &'static str, value: String) -> Result<(), StoreError> {
        Ok(self.insert(key, value).await?)
    }

    async fn remove_value(&self, key: &'static str) -> Result<(), StoreError> {
        self.remove::<serde_json::Value>(key).await?;
        Ok(())
    }
}

#[cfg(test)]
pub mod memory {
    //! In-memory [`SessionStorage`] for unit tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{SessionStorage, StoreError};

    #[derive(Debug, Default)]
    pub struct MemorySession {
        values: Mutex<HashMap<&'static str, String>>,
    }

    impl MemorySession {
        pub fn with(pairs: &[(&'static str, &str)]) -> Self {
            let session = Self::default();
            {
                #[allow(clippy::unwrap_used)]
                let mut values = session.values.lock().unwrap();
                for (key, value) in pairs {
                    values.insert(key, (*value).to_string());
                }
            }
            session
        }

        #[allow(clippy::unwrap_used)]
        pub fn peek(&self, key: &str) -> Option<String> {
            self.values.lock().unwrap().get(key).cloned()
        }
    }

    #[allow(clippy::unwrap_used)]
    impl SessionStorage for MemorySession {
        async fn get_value(&self, key: &'static str) -> Result<Option<String>, StoreError> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn set_value(&self, key: &'static str, value: String) -> Result<(), StoreError> {
            self.values.lock().unwrap().insert(key, value);
            Ok(())
        }

        async fn remove_value(&self, key: &'static str) -> Result<(), StoreError> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_tower_session_round_trips_plain_strings() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        session
            .set_value(keys::CART_ID, "abc".to_string())
            .await
            .unwrap();
        assert_eq!(
            SessionStorage::get_value(&session, keys::CART_ID).await.unwrap().as_deref(),
            Some("abc")
        );

        SessionStorage::remove_value(&session, keys::CART_ID).await.unwrap();
        assert_eq!(SessionStorage::get_value(&session, keys::CART_ID).await.unwrap(), None);

        // removing twice is fine
        SessionStorage::remove_value(&session, keys::CART_ID).await.unwrap();
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let mut user = CurrentUser {
            id: UserId::new(1),
            username: "jkowalski".to_string(),
            first_name: String::new(),
            is_staff: false,
        };
        assert_eq!(user.display_name(), "jkowalski");
        user.first_name = "Jan".to_string();
        assert_eq!(user.display_name(), "Jan");
    }
}

//! One-shot messages carried across a redirect.
//!
//! Handlers push a message before redirecting; the next rendered page takes
//! (and thereby clears) all pending messages.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use super::session::keys;

/// Severity of a flash message, used as the alert style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl FlashLevel {
    /// CSS modifier for the alert box.
    #[must_use]
    pub const fn css_class(&self) -> &'static str {
        match self {
            Self::Success => "alert-success",
            Self::Info => "alert-info",
            Self::Warning => "alert-warning",
            Self::Error => "alert-error",
        }
    }
}

/// A message shown once on the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
    /// Milliseconds after which the alert removes itself; `None` keeps it until dismissed.
    pub dismiss_after_ms: Option<u32>,
}

/// Transient validation errors disappear on their own after this long.
pub const TRANSIENT_DISMISS_MS: u32 = 2000;

impl Flash {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.into(),
            dismiss_after_ms: None,
        }
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Info,
            message: message.into(),
            dismiss_after_ms: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            message: message.into(),
            dismiss_after_ms: None,
        }
    }

    /// An error that clears itself after [`TRANSIENT_DISMISS_MS`].
    #[must_use]
    pub fn transient_error(message: impl Into<String>) -> Self {
        Self {
            dismiss_after_ms: Some(TRANSIENT_DISMISS_MS),
            ..Self::error(message)
        }
    }

    #[must_use]
    pub const fn css_class(&self) -> &'static str {
        self.level.css_class()
    }
}

/// Queue a flash message for the next page.
///
/// Session failures are logged and swallowed; losing a notice must not fail the request.
pub async fn push_flash(session: &Session, flash: Flash) {
    let mut pending = session
        .get::<Vec<Flash>>(keys::FLASH)
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    pending.push(flash);

    if let Err(e) = session.insert(keys::FLASH, pending).await {
        tracing::error!("Failed to store flash message: {e}");
    }
}

/// Take all pending flash messages, clearing them from the session.
pub async fn take_flashes(session: &Session) -> Vec<Flash> {
    match session.remove::<Vec<Flash>>(keys::FLASH).await {
        Ok(pending) => pending.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Failed to read flash messages: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_flashes_are_taken_once() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        push_flash(&session, Flash::success("Adres dodany pomyślnie!")).await;
        push_flash(&session, Flash::transient_error("Brak produktów w koszyku.")).await;

        let flashes = take_flashes(&session).await;
        assert_eq!(flashes.len(), 2);
        assert_eq!(flashes[0].css_class(), "alert-success");
        assert_eq!(flashes[1].dismiss_after_ms, Some(TRANSIENT_DISMISS_MS));

        assert!(take_flashes(&session).await.is_empty());
    }
}

//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Returns the content hash of the bundled CSS and JS.
///
/// The hash is computed at build time and appended to asset URLs for cache busting.
///
/// Usage in templates: `{{ ""|asset_hash }}`
#[askama::filter_fn]
pub fn asset_hash(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<&'static str> {
    Ok(env!("ASSET_HASH"))
}

/// Formats an API timestamp as a Polish date, e.g. `05.03.2025 14:30`.
///
/// Usage in templates: `{{ order.placed_at|date_pl }}`
#[askama::filter_fn]
pub fn date_pl(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(format_date_pl(&value.to_string()))
}

fn format_date_pl(raw: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(raw.trim()).map_or_else(
        |_| raw.to_string(),
        |timestamp| timestamp.format("%d.%m.%Y %H:%M").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_date_pl() {
        assert_eq!(
            format_date_pl("2025-03-05T14:30:12.123456Z"),
            "05.03.2025 14:30"
        );
        assert_eq!(format_date_pl("yesterday"), "yesterday");
    }
}

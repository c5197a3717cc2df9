//! Email address type.
//!
//! Guest orders carry the buyer's email inline, and the payment provider
//! sends the receipt there, so the storefront checks the shape of the address
//! before any order is created.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    /// The input is empty after trimming.
    #[error("email cannot be empty")]
    Empty,
    /// The input is too long.
    #[error("email must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains whitespace inside the address.
    #[error("email cannot contain whitespace")]
    Whitespace,
    /// The input does not contain exactly one @ symbol.
    #[error("email must contain exactly one @ symbol")]
    AtSymbol,
    /// The local part (before @) is empty.
    #[error("email local part cannot be empty")]
    EmptyLocalPart,
    /// The domain part (after @) is empty or has no dot-separated labels.
    #[error("email domain is invalid")]
    InvalidDomain,
}

/// An email address.
///
/// ## Constraints
///
/// - Surrounding whitespace is trimmed; inner whitespace is rejected
/// - Length: 1-254 characters (RFC 5321 limit)
/// - Exactly one @ symbol with a non-empty local part
/// - Domain has at least two non-empty labels (`shop.pl`, not `shop`)
///
/// The domain is stored lowercased; the local part is kept as typed.
///
/// ```
/// use myshop_core::Email;
///
/// let email = Email::parse("  Jan.Kowalski@Example.PL ").unwrap();
/// assert_eq!(email.as_str(), "Jan.Kowalski@example.pl");
///
/// assert!(Email::parse("jan@localhost").is_err());
/// assert!(Email::parse("jan kowalski@example.pl").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse an `Email` from user input.
    ///
    /// # Errors
    ///
    /// Returns an [`EmailError`] describing the first constraint the input violates.
    pub fn parse(input: &str) -> Result<Self, EmailError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(EmailError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if s.chars().any(char::is_whitespace) {
            return Err(EmailError::Whitespace);
        }

        let (local, domain) = s.split_once('@').ok_or(EmailError::AtSymbol)?;
        if domain.contains('@') {
            return Err(EmailError::AtSymbol);
        }
        if local.is_empty() {
            return Err(EmailError::EmptyLocalPart);
        }

        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
            return Err(EmailError::InvalidDomain);
        }

        Ok(Self(format!("{local}@{}", domain.to_ascii_lowercase())))
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the domain part of the email (after the @).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, domain)| domain)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_emails() {
        assert!(Email::parse("klient@sklep.pl").is_ok());
        assert!(Email::parse("jan.kowalski+zamowienia@poczta.example.com").is_ok());
        assert!(Email::parse("a@b.co").is_ok());
    }

    #[test]
    fn test_parse_trims_and_lowercases_domain() {
        let email = Email::parse("  Anna@Sklep.PL\n").unwrap();
        assert_eq!(email.as_str(), "Anna@sklep.pl");
        assert_eq!(email.domain(), "sklep.pl");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(
            Email::parse(&long),
            Err(EmailError::TooLong { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_inner_whitespace() {
        assert_eq!(
            Email::parse("jan kowalski@sklep.pl"),
            Err(EmailError::Whitespace)
        );
    }

    #[test]
    fn test_parse_at_symbol_rules() {
        assert_eq!(Email::parse("brak-malpy"), Err(EmailError::AtSymbol));
        assert_eq!(Email::parse("a@b@sklep.pl"), Err(EmailError::AtSymbol));
        assert_eq!(Email::parse("@sklep.pl"), Err(EmailError::EmptyLocalPart));
    }

    #[test]
    fn test_parse_domain_rules() {
        assert_eq!(Email::parse("jan@"), Err(EmailError::InvalidDomain));
        assert_eq!(Email::parse("jan@localhost"), Err(EmailError::InvalidDomain));
        assert_eq!(Email::parse("jan@sklep..pl"), Err(EmailError::InvalidDomain));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Email = serde_json::from_str("\"jan@sklep.pl\"").unwrap();
        assert_eq!(ok.to_string(), "jan@sklep.pl");
        assert!(serde_json::from_str::<Email>("\"not-an-email\"").is_err());
    }
}

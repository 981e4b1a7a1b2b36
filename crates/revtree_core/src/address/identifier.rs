//! Entity identifiers.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length of an identifier, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// Identifier of a repository, model, object or field.
///
/// Identifiers match `[A-Za-z0-9][A-Za-z0-9_-]{1,99}` and are case-folded to
/// lowercase on construction, so `Phone` and `phone` name the same entity.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Parses and normalizes an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedIdentifier`] if `raw` does not match the
    /// identifier grammar.
    pub fn new(raw: impl AsRef<str>) -> CoreResult<Self> {
        let raw = raw.as_ref();
        validate(raw)?;
        Ok(Self(raw.to_ascii_lowercase()))
    }

    /// Creates a fresh identifier that is unique with overwhelming probability.
    #[must_use]
    pub fn unique() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Returns the normalized identifier text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(raw: &str) -> CoreResult<()> {
    let mut chars = raw.chars();
    let first = chars
        .next()
        .ok_or_else(|| CoreError::malformed_identifier(raw, "identifier is empty"))?;
    if !first.is_ascii_alphanumeric() {
        return Err(CoreError::malformed_identifier(
            raw,
            "must start with an ASCII letter or digit",
        ));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-')) {
        return Err(CoreError::malformed_identifier(
            raw,
            format!("invalid character {bad:?}"),
        ));
    }
    if raw.len() < 2 {
        return Err(CoreError::malformed_identifier(
            raw,
            "must be at least 2 characters long",
        ));
    }
    if raw.len() > MAX_IDENTIFIER_LEN {
        return Err(CoreError::malformed_identifier(
            raw,
            format!("must be at most {MAX_IDENTIFIER_LEN} characters long"),
        ));
    }
    Ok(())
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = CoreError;

    fn try_from(value: String) -> CoreResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = CoreError;

    fn try_from(value: &str) -> CoreResult<Self> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_identifiers() {
        for raw in ["john", "a1", "phone_number", "x-y-z", "0abc"] {
            assert!(Identifier::new(raw).is_ok(), "{raw} should be valid");
        }
    }

    #[test]
    fn case_folds_to_lowercase() {
        let id = Identifier::new("CookieMonster").unwrap();
        assert_eq!(id.as_str(), "cookiemonster");
        assert_eq!(id, Identifier::new("cookiemonster").unwrap());
    }

    #[test]
    fn rejects_malformed_identifiers() {
        let too_long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        for raw in ["", "a", "_ab", "-ab", "has space", "dot.ted", "ümlaut", too_long.as_str()] {
            let err = Identifier::new(raw).unwrap_err();
            assert!(
                matches!(err, CoreError::MalformedIdentifier { .. }),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn max_length_is_accepted() {
        let raw = "b".repeat(MAX_IDENTIFIER_LEN);
        assert!(Identifier::new(raw).is_ok());
    }

    #[test]
    fn unique_ids_are_valid_and_distinct() {
        let a = Identifier::unique();
        let b = Identifier::unique();
        assert_ne!(a, b);
        assert!(Identifier::new(a.as_str()).is_ok());
    }

    #[test]
    fn deserialize_validates() {
        let ok: Identifier = serde_json::from_str("\"Alias\"").unwrap();
        assert_eq!(ok.as_str(), "alias");
        assert!(serde_json::from_str::<Identifier>("\"-bad\"").is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn grammar_conforming_strings_normalize(raw in "[A-Za-z0-9][A-Za-z0-9_-]{1,99}") {
                let id = Identifier::new(&raw).unwrap();
                prop_assert_eq!(id.as_str(), raw.to_ascii_lowercase());
                prop_assert_eq!(Identifier::new(id.as_str()).unwrap(), id);
            }

            #[test]
            fn leading_punctuation_is_rejected(raw in "[_-][A-Za-z0-9]{1,20}") {
                prop_assert!(Identifier::new(&raw).is_err());
            }
        }
    }
}

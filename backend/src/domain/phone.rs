//! Buyer phone normalisation.
//!
//! Contacts are matched in the CRM by exact phone value, so every number must
//! converge on one canonical `+<country><subscriber>` form regardless of how
//! the buyer typed it.

use std::fmt;

use super::order::Buyer;

const MIN_E164_LEN: usize = 11;
const MAX_E164_LEN: usize = 15;

/// Errors raised when a phone cannot be normalised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhoneError {
    #[error("buyer phone not found")]
    Missing,
    #[error("buyer phone `{masked}` cannot be normalised")]
    Unparseable { masked: String },
}

/// A phone number in canonical E.164-like form.
///
/// ```
/// use kaspi_amo_sync::domain::PhoneNumber;
///
/// let phone = PhoneNumber::parse("8 (701) 234-56-78").expect("valid phone");
/// assert_eq!(phone.as_str(), "+77012345678");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalise a raw phone string.
    ///
    /// Kazakhstan conventions apply to bare numbers: a leading trunk `8` or a
    /// missing `+` on an 11-digit `7...` number become `+7`, and ten bare
    /// digits are assumed to be a local subscriber number.
    pub fn parse(raw: &str) -> Result<Self, PhoneError> {
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect();
        if cleaned.is_empty() {
            return Err(PhoneError::Missing);
        }

        let has_plus = cleaned.starts_with('+');
        let digits: String = cleaned.chars().filter(char::is_ascii_digit).collect();
        let candidate = match (has_plus, digits.len(), digits.chars().next()) {
            (false, 11, Some('8')) => format!("+7{}", &digits[1..]),
            (false, 11, Some('7')) => format!("+{digits}"),
            (false, 10, _) => format!("+7{digits}"),
            (true, _, _) => format!("+{digits}"),
            _ => String::new(),
        };

        if candidate.starts_with('+') && (MIN_E164_LEN..=MAX_E164_LEN).contains(&candidate.len())
        {
            Ok(Self(candidate))
        } else {
            Err(PhoneError::Unparseable {
                masked: mask_phone(raw),
            })
        }
    }

    /// First normalisable phone among the buyer's phone fields.
    ///
    /// Fields are inspected in priority order; a populated but malformed
    /// field stops the search so the failure names the value that was used.
    pub fn from_buyer(buyer: &Buyer) -> Result<Self, PhoneError> {
        let raw = buyer
            .phone_candidates()
            .into_iter()
            .flatten()
            .find(|value| !value.trim().is_empty())
            .ok_or(PhoneError::Missing)?;
        Self::parse(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Redacted form safe for logs and alerts.
    pub fn masked(&self) -> String {
        mask_phone(&self.0)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mask everything but the leading prefix and the last two digits.
///
/// ```
/// use kaspi_amo_sync::domain::mask_phone;
///
/// assert_eq!(mask_phone("+77012345678"), "+770******78");
/// ```
pub fn mask_phone(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.len() <= 6 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 6))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::trunk_prefix("87012345678", "+77012345678")]
    #[case::missing_plus("77012345678", "+77012345678")]
    #[case::ten_digits("7012345678", "+77012345678")]
    #[case::formatted("+7 (701) 234-56-78", "+77012345678")]
    #[case::foreign("+44 20 7946 0958", "+442079460958")]
    fn normalises_to_canonical_form(#[case] raw: &str, #[case] expected: &str) {
        let phone = PhoneNumber::parse(raw).expect("phone should normalise");
        assert_eq!(phone.as_str(), expected);
    }

    #[rstest]
    #[case::too_short("12345")]
    #[case::too_long("+7701234567890123")]
    #[case::twelve_bare_digits("770123456789")]
    fn rejects_unparseable_numbers(#[case] raw: &str) {
        assert!(matches!(
            PhoneNumber::parse(raw),
            Err(PhoneError::Unparseable { .. })
        ));
    }

    #[test]
    fn empty_input_is_missing() {
        assert_eq!(PhoneNumber::parse("n/a"), Err(PhoneError::Missing));
    }

    #[test]
    fn same_human_converges_on_one_value() {
        let variants = ["8 701 234 56 78", "+77012345678", "7012345678"];
        let normalised: Vec<_> = variants
            .iter()
            .map(|raw| PhoneNumber::parse(raw).expect("valid"))
            .collect();
        assert!(normalised.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn buyer_fields_are_checked_in_priority_order() {
        let buyer = Buyer {
            phone: None,
            mobile_phone: Some(" ".to_owned()),
            cell_phone: Some("87015550000".to_owned()),
            contact_phone: Some("87019999999".to_owned()),
            ..Buyer::default()
        };
        let phone = PhoneNumber::from_buyer(&buyer).expect("cell phone used");
        assert_eq!(phone.as_str(), "+77015550000");
    }

    #[test]
    fn buyer_without_phone_is_missing() {
        assert_eq!(
            PhoneNumber::from_buyer(&Buyer::default()),
            Err(PhoneError::Missing)
        );
    }

    #[test]
    fn masking_keeps_prefix_and_tail() {
        assert_eq!(mask_phone("+77012345678"), "+770******78");
        assert_eq!(mask_phone("123"), "***");
    }
}

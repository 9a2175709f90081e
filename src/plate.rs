//! Brazilian license plates and customer phone numbers.
//!
//! Two plate formats are accepted: Mercosul (`AAA0A00`) and the legacy
//! format (`AAA0000`). Plates are stored normalized.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static MERCOSUL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}[0-9][A-Z][0-9]{2}$").expect("valid regex"));
static LEGACY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}[0-9]{4}$").expect("valid regex"));

/// Minimum digits in a phone number (area code + subscriber).
const MIN_PHONE_DIGITS: usize = 10;

/// Uppercase, with spaces and hyphens removed.
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

pub fn is_valid_plate(raw: &str) -> bool {
    let plate = normalize_plate(raw);
    MERCOSUL.is_match(&plate) || LEGACY.is_match(&plate)
}

/// Normalize and validate a plate in one step.
pub fn parse_plate(raw: &str) -> Result<String> {
    let plate = normalize_plate(raw);
    if MERCOSUL.is_match(&plate) || LEGACY.is_match(&plate) {
        Ok(plate)
    } else {
        Err(Error::Validation(format!("invalid license plate: {raw}")))
    }
}

/// Strip everything but digits and require a full number.
pub fn parse_phone(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return Err(Error::Validation(format!(
            "phone number must have at least {MIN_PHONE_DIGITS} digits: {raw}"
        )));
    }
    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mercosul_and_legacy_formats() {
        assert!(is_valid_plate("ABC1D23"));
        assert!(is_valid_plate("ABC1234"));
        assert!(is_valid_plate("abc-1234"));
        assert!(is_valid_plate(" abc 1d23 "));
    }

    #[test]
    fn rejects_malformed_plates() {
        assert!(!is_valid_plate("AB1D23"));
        assert!(!is_valid_plate("ABCD123"));
        assert!(!is_valid_plate("ABC12D3"));
        assert!(!is_valid_plate(""));
    }

    #[test]
    fn normalizes_case_and_separators() {
        assert_eq!(normalize_plate("abc-1d23"), "ABC1D23");
        assert_eq!(parse_plate("abc 1234").unwrap(), "ABC1234");
        assert!(matches!(parse_plate("nope"), Err(Error::Validation(_))));
    }

    #[test]
    fn phone_keeps_digits_only() {
        assert_eq!(parse_phone("(11) 99999-8888").unwrap(), "11999998888");
        assert!(parse_phone("9999-8888").is_err());
    }
}

//! Pakistani mobile number handling.
//!
//! Numbers are stored in the canonical international form `+923XXXXXXXXX`.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CANONICAL_PHONE: Regex = Regex::new(r"^\+923[0-9]{9}$").expect("valid phone regex");
}

/// Normalize local and bare-international forms to `+92...`
///
/// Spaces and dashes are dropped; `03...` becomes `+923...` and `92...`
/// gains its `+`. Anything else is returned as-is for validation to reject.
pub fn normalize(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| *c != ' ' && *c != '-').collect();

    if digits.starts_with("03") {
        return format!("+92{}", &digits[1..]);
    }

    if digits.starts_with("92") {
        return format!("+{digits}");
    }

    digits
}

/// Check a number is in canonical form
pub fn is_valid(phone: &str) -> bool {
    CANONICAL_PHONE.is_match(phone)
}

/// Normalize, then validate; `None` when the result is not canonical
pub fn canonicalize(phone: &str) -> Option<String> {
    let normalized = normalize(phone);
    is_valid(&normalized).then_some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_and_international_forms_agree() {
        assert_eq!(normalize("03001234567"), "+923001234567");
        assert_eq!(normalize("+923001234567"), "+923001234567");
        assert_eq!(canonicalize("03001234567"), canonicalize("+923001234567"));
        assert!(canonicalize("03001234567").is_some());
    }

    #[test]
    fn test_separators_and_bare_country_code() {
        assert_eq!(normalize("0300-123 4567"), "+923001234567");
        assert_eq!(normalize("923001234567"), "+923001234567");
    }

    #[test]
    fn test_rejects_wrong_length_and_prefix() {
        assert!(canonicalize("+92301234567").is_none());
        assert!(canonicalize("+9230012345678").is_none());
        assert!(canonicalize("+924001234567").is_none());
        assert!(canonicalize("invalid-phone").is_none());
        assert!(canonicalize("").is_none());
    }
}

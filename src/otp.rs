//! Verification code generation.

use rand::{rngs::OsRng, Rng};

/// Generate a numeric code of `length` digits from the OS RNG
///
/// Leading zeros are kept, so the code is always exactly `length` chars.
pub fn generate_otp(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_is_numeric_with_exact_length() {
        for length in [4, 6, 10] {
            let code = generate_otp(length);
            assert_eq!(code.len(), length);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_otp_varies() {
        let codes: std::collections::HashSet<String> = (0..20).map(|_| generate_otp(10)).collect();
        assert!(codes.len() > 1);
    }
}

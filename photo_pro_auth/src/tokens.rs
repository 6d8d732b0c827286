//! Verification codes, session tokens and input checks

use std::sync::OnceLock;

use rand::{Rng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Session token entropy in bytes (256 bits)
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Generate a 6-digit verification code
pub fn generate_verification_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(100_000..=999_999);
    code.to_string()
}

/// Generate a random session token (64 lowercase hex chars)
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Digest stored in place of the raw session token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex"))
        .is_match(email)
}

pub fn is_valid_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_code_shape() {
        for _ in 0..200 {
            let code = generate_verification_code();
            assert!(is_valid_code(&code), "bad code {code}");
            assert!(!code.starts_with('0'));
        }
    }

    #[test]
    fn test_session_token_shape() {
        let a = generate_session_token();
        let b = generate_session_token();

        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_token_is_stable() {
        let token = generate_session_token();
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
        assert_eq!(hash_token(&token).len(), 64);
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("dealer@farm.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("dealer@farm"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("two words@farm.com"));
        assert!(!is_valid_email(""));

        assert_eq!(normalize_email("  Dealer@Farm.COM "), "dealer@farm.com");
    }

    #[test]
    fn test_code_validation() {
        assert!(is_valid_code("123456"));
        assert!(!is_valid_code("12345"));
        assert!(!is_valid_code("1234567"));
        assert!(!is_valid_code("12a456"));
        assert!(!is_valid_code("１２３４５６"));
    }
}

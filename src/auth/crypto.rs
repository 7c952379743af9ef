//! Credential primitives: password hashing, OTP codes and token digests

use rand::Rng;
use sha2::{Digest, Sha256};

/// Number of digits in a one-time code
pub const OTP_LENGTH: usize = 6;

/// Generate a numeric one-time code from the thread-local CSPRNG
pub fn generate_otp_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:0width$}", value, width = OTP_LENGTH)
}

/// SHA-256 digest used to store OTP codes and refresh tokens at rest
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a password with bcrypt
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Check a password against a bcrypt hash; malformed hashes never match
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_code_shape() {
        for _ in 0..100 {
            let code = generate_otp_code();
            assert_eq!(code.len(), OTP_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let a = hash_token("123456");
        assert_eq!(a.len(), 64);
        assert_eq!(a, hash_token("123456"));
        assert_ne!(a, hash_token("123457"));
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("teff-harvest-2024", 4).unwrap();
        assert!(verify_password("teff-harvest-2024", &hash));
        assert!(!verify_password("wrong-password", &hash));
        assert!(!verify_password("teff-harvest-2024", "not-a-bcrypt-hash"));
    }
}

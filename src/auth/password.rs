//! One-way password hashing with bcrypt.
//!
//! Each hash carries its own random salt and cost, so hashing the same
//! plaintext twice gives different strings that both verify. bcrypt compares
//! the recomputed digest in constant time.

use crate::error::AuthError;

/// bcrypt only reads this many bytes of input; anything past it is ignored.
pub const MAX_PASSWORD_BYTES: usize = 72;

pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::Hashing(format!(
            "password exceeds {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    bcrypt::hash(password, cost).map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Returns `Ok(false)` for a wrong password and `InvalidHashFormat` when the
/// stored hash cannot be parsed, so callers can tell the two apart.
///
/// Over-long input never matches: no stored hash was made from one, and
/// bcrypt would otherwise compare only its first 72 bytes.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let verified = bcrypt::verify(password, hash).map_err(|e| match e {
        bcrypt::BcryptError::Io(e) => AuthError::Hashing(e.to_string()),
        _ => AuthError::InvalidHashFormat,
    })?;
    Ok(verified && password.len() <= MAX_PASSWORD_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse", TEST_COST).expect("hash should succeed");

        assert!(verify_password("correct horse", &hash).expect("verify should succeed"));
        assert!(!verify_password("battery staple", &hash).expect("verify should succeed"));
    }

    #[test]
    fn test_hash_is_salted() {
        let first = hash_password("same password", TEST_COST).unwrap();
        let second = hash_password("same password", TEST_COST).unwrap();

        assert_ne!(first, second);
        assert!(verify_password("same password", &first).unwrap());
        assert!(verify_password("same password", &second).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert_eq!(verify_password("anything", ""), Err(AuthError::InvalidHashFormat));
        assert_eq!(
            verify_password("anything", "not-a-bcrypt-hash"),
            Err(AuthError::InvalidHashFormat)
        );
        assert_eq!(
            verify_password("anything", "$argon2id$v=19$m=65536,t=3,p=4$c2FsdA$aGFzaA"),
            Err(AuthError::InvalidHashFormat)
        );
    }

    #[test]
    fn test_cost_out_of_range() {
        assert!(matches!(hash_password("pw", 2), Err(AuthError::Hashing(_))));
    }

    #[test]
    fn test_long_passwords_sharing_a_prefix_do_not_match() {
        let prefix = "a".repeat(MAX_PASSWORD_BYTES);
        let stored = hash_password(&prefix, TEST_COST).unwrap();

        let longer = format!("{}-totally-different", prefix);
        assert!(!verify_password(&longer, &stored).unwrap());
        assert!(matches!(
            hash_password(&format!("{}-first-secret", prefix), TEST_COST),
            Err(AuthError::Hashing(_))
        ));
    }

    #[test]
    fn test_verifies_2a_prefix() {
        let hash = hash_password("legacy", TEST_COST).unwrap();
        let legacy = format!("$2a${}", &hash[4..]);
        assert!(verify_password("legacy", &legacy).unwrap());
        assert!(!verify_password("other", &legacy).unwrap());
    }
}

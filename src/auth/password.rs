use crate::error::AppError;

/// One-way password hashing with a per-call random salt. The cost factor
/// is the tunable work factor; raising it slows brute force and logins
/// alike.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, plaintext: &str) -> Result<String, AppError> {
        Ok(bcrypt::hash(plaintext, self.cost)?)
    }

    /// A mismatch is a normal `Ok(false)`; only a malformed stored hash
    /// is an error.
    pub fn verify(&self, plaintext: &str, hashed: &str) -> Result<bool, AppError> {
        Ok(bcrypt::verify(plaintext, hashed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        // minimum bcrypt cost, tests only
        PasswordHasher::new(4)
    }

    #[test]
    fn test_hash_salts_per_call() {
        let h = hasher();
        let a = h.hash("Abc12345!").unwrap();
        let b = h.hash("Abc12345!").unwrap();
        assert_ne!(a, b, "two hashes of the same password must differ");
        assert!(h.verify("Abc12345!", &a).unwrap());
        assert!(h.verify("Abc12345!", &b).unwrap());
    }

    #[test]
    fn test_hash_is_not_plaintext() {
        let h = hasher();
        let stored = h.hash("Abc12345!").unwrap();
        assert_ne!(stored, "Abc12345!");
    }

    #[test]
    fn test_verify_mismatch_is_false_not_error() {
        let h = hasher();
        let stored = h.hash("Abc12345!").unwrap();
        assert!(!h.verify("wrong-password", &stored).unwrap());
    }

    #[test]
    fn test_verify_malformed_hash_is_error() {
        let h = hasher();
        assert!(h.verify("Abc12345!", "not-a-bcrypt-hash").is_err());
    }
}

//! Salted password records.
//!
//! The stored hash is `hex(sha256(salt || sha256(utf8(password))))` and the
//! salt is stored hex encoded. Records produced by other deployments of the
//! console use the same format, so both stages must stay exactly as they are.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

const RANDOM_SALT_LEN: usize = 32;

/// Errors found when checking a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordError {
    #[error("Field '{field}' is not valid hex: {reason}")]
    InvalidHex { field: &'static str, reason: String },

    #[error("Hash must be {expected} bytes, got {actual}")]
    InvalidHashLength { expected: usize, actual: usize },
}

/// Stored credentials of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordRecord {
    pub hash: String,
    pub salt: String,
}

impl PasswordRecord {
    /// Generates a record for `password`.
    ///
    /// A provided salt is used as its UTF-8 bytes. Without one, or with an
    /// empty one, 32 random bytes are drawn.
    pub fn generate(password: &str, salt: Option<&str>) -> Self {
        let salt = match salt.filter(|salt| !salt.is_empty()) {
            Some(salt) => salt.as_bytes().to_vec(),
            None => {
                let mut bytes = vec![0u8; RANDOM_SALT_LEN];
                rand::thread_rng().fill_bytes(&mut bytes);
                bytes
            }
        };

        Self {
            hash: hex::encode(compute_hash(&salt, password)),
            salt: hex::encode(salt),
        }
    }

    /// Checks `password` against the record in constant time.
    ///
    /// Malformed records never verify.
    pub fn verify(&self, password: &str) -> bool {
        let (Ok(salt), Ok(expected)) = (hex::decode(&self.salt), hex::decode(&self.hash)) else {
            return false;
        };
        let actual = compute_hash(&salt, password);
        actual.as_slice().ct_eq(&expected).into()
    }

    /// Checks that both fields decode and the hash has the digest length.
    pub fn validate(&self) -> Result<(), PasswordError> {
        hex::decode(&self.salt).map_err(|e| PasswordError::InvalidHex {
            field: "salt",
            reason: e.to_string(),
        })?;
        let hash = hex::decode(&self.hash).map_err(|e| PasswordError::InvalidHex {
            field: "hash",
            reason: e.to_string(),
        })?;
        if hash.len() != 32 {
            return Err(PasswordError::InvalidHashLength {
                expected: 32,
                actual: hash.len(),
            });
        }
        Ok(())
    }
}

fn compute_hash(salt: &[u8], password: &str) -> [u8; 32] {
    let inner = Sha256::digest(password.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(inner);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn generated_record_verifies() {
        let record = PasswordRecord::generate("secret", None);
        assert!(record.verify("secret"));
        assert!(!record.verify("Secret"));
    }

    #[test]
    fn random_salt_is_32_bytes() {
        let record = PasswordRecord::generate("secret", None);
        assert_eq!(hex::decode(&record.salt).unwrap().len(), 32);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn empty_salt_draws_random_bytes() {
        let record = PasswordRecord::generate("secret", Some(""));
        assert_eq!(hex::decode(&record.salt).unwrap().len(), 32);
        assert!(record.verify("secret"));
    }

    #[test]
    fn provided_salt_is_stored_as_hex_of_its_bytes() {
        let record = PasswordRecord::generate("pass", Some("abc"));
        assert_eq!(record.salt, "616263");
    }

    #[test]
    fn hash_matches_two_stage_sha256() {
        let record = PasswordRecord::generate("pass", Some("salt"));

        let inner = Sha256::digest(b"pass");
        let mut hasher = Sha256::new();
        hasher.update(b"salt");
        hasher.update(inner);
        assert_eq!(record.hash, hex::encode(hasher.finalize()));
    }

    #[test]
    fn same_inputs_give_same_record() {
        let a = PasswordRecord::generate("pass", Some("salt"));
        let b = PasswordRecord::generate("pass", Some("salt"));
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_record_never_verifies() {
        let record = PasswordRecord {
            hash: "zz".to_string(),
            salt: "00".to_string(),
        };
        assert!(!record.verify(""));
        assert!(matches!(
            record.validate(),
            Err(PasswordError::InvalidHex { field: "hash", .. })
        ));
    }

    #[test]
    fn short_hash_fails_validation() {
        let record = PasswordRecord {
            hash: "00".to_string(),
            salt: "00".to_string(),
        };
        assert_eq!(
            record.validate(),
            Err(PasswordError::InvalidHashLength {
                expected: 32,
                actual: 1
            })
        );
    }

    fn flip_bit(hex_value: &str, bit: usize) -> String {
        let mut bytes = hex::decode(hex_value).unwrap();
        let bit = bit % (bytes.len() * 8);
        bytes[bit / 8] ^= 1 << (bit % 8);
        hex::encode(bytes)
    }

    proptest! {
        #[test]
        fn single_bit_flip_in_hash_fails(password in ".{0,16}", bit in 0usize..256) {
            let mut record = PasswordRecord::generate(&password, Some("fixed"));
            record.hash = flip_bit(&record.hash, bit);
            prop_assert!(!record.verify(&password));
        }

        #[test]
        fn single_bit_flip_in_salt_fails(password in ".{0,16}", bit in 0usize..256) {
            let mut record = PasswordRecord::generate(&password, None);
            record.salt = flip_bit(&record.salt, bit);
            prop_assert!(!record.verify(&password));
        }
    }
}

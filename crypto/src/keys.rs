//! Ed25519 key generation.

use ed25519_dalek::SigningKey;
use orv_types::{Account, KeyPair, PrivateKey};
use rand::rngs::OsRng;

/// Generate a new representative key pair from a secure random source.
pub fn generate_keypair() -> KeyPair {
    pair(SigningKey::generate(&mut OsRng))
}

/// Derive the account (public key) owned by a private key.
pub fn account_from_private(private: &PrivateKey) -> Account {
    account_of(&SigningKey::from_bytes(&private.0))
}

/// Derive a key pair from a 32-byte seed (deterministic).
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    pair(SigningKey::from_bytes(seed))
}

fn account_of(key: &SigningKey) -> Account {
    Account::new(key.verifying_key().to_bytes())
}

fn pair(key: SigningKey) -> KeyPair {
    KeyPair {
        account: account_of(&key),
        private: PrivateKey(key.to_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_distinct_keys() {
        let a = generate_keypair();
        let b = generate_keypair();
        assert_ne!(a.account, b.account);
        assert!(!a.account.is_zero());
    }

    #[test]
    fn account_from_private_matches_pair() {
        let kp = generate_keypair();
        assert_eq!(account_from_private(&kp.private), kp.account);
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        let a = keypair_from_seed(&[7; 32]);
        let b = keypair_from_seed(&[7; 32]);
        assert_eq!(a.account, b.account);
        assert_eq!(a.private.0, b.private.0);
    }
}

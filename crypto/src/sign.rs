//! Ed25519 signing over vote and block digests.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use orv_types::{Account, PrivateKey, Signature};

/// The curve point behind `account`, or `None` if the bytes do not decode to
/// one. Such an account can never produce a valid signature.
pub(crate) fn verifying_key(account: &Account) -> Option<VerifyingKey> {
    VerifyingKey::from_bytes(account.as_bytes()).ok()
}

pub(crate) fn dalek_signature(signature: &Signature) -> ed25519_dalek::Signature {
    ed25519_dalek::Signature::from_bytes(&signature.0)
}

pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    Signature(SigningKey::from_bytes(&private_key.0).sign(message).to_bytes())
}

/// Check `signature` over `message` by `account`.
pub fn verify_signature(message: &[u8], signature: &Signature, account: &Account) -> bool {
    verifying_key(account)
        .is_some_and(|key| key.verify(message, &dalek_signature(signature)).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::blake2b_256;
    use crate::keys::{generate_keypair, keypair_from_seed};

    #[test]
    fn digest_signature_verifies() {
        let kp = generate_keypair();
        let digest = blake2b_256(b"vote payload");
        let sig = sign_message(&digest, &kp.private);
        assert!(verify_signature(&digest, &sig, &kp.account));
    }

    #[test]
    fn flipped_bit_is_rejected() {
        let kp = keypair_from_seed(&[3u8; 32]);
        let digest = blake2b_256(b"block");
        let mut sig = sign_message(&digest, &kp.private);
        sig.0[10] ^= 0x01;
        assert!(!verify_signature(&digest, &sig, &kp.account));
    }

    #[test]
    fn other_account_is_rejected() {
        let signer = keypair_from_seed(&[1u8; 32]);
        let other = keypair_from_seed(&[2u8; 32]);
        let sig = sign_message(b"x", &signer.private);
        assert!(!verify_signature(b"x", &sig, &other.account));
    }

    #[test]
    fn seeded_signatures_repeat() {
        let kp = keypair_from_seed(&[99u8; 32]);
        assert_eq!(sign_message(b"d", &kp.private), sign_message(b"d", &kp.private));
    }

    #[test]
    fn garbage_account_is_rejected() {
        let kp = generate_keypair();
        let sig = sign_message(b"test", &kp.private);
        let bad = Account::new([0xFF; 32]);
        assert!(!verify_signature(b"test", &sig, &bad));
    }
}

//! Nullable wallets: representative keys derived from fixed seeds.

use orv_consensus::Wallets;
use orv_crypto::keypair_from_seed;
use orv_types::{Account, KeyPair, PrivateKey};
use parking_lot::RwLock;

/// Holds representative key pairs in memory.
pub struct NullWallets {
    keys: RwLock<Vec<KeyPair>>,
}

impl NullWallets {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(Vec::new()),
        }
    }

    /// Create with one representative per seed byte.
    pub fn with_seeds(seeds: &[u8]) -> Self {
        let wallets = Self::new();
        for seed in seeds {
            wallets.insert_seed(*seed);
        }
        wallets
    }

    /// Derive a key pair from `[seed; 32]` and hold it. Returns its account.
    pub fn insert_seed(&self, seed: u8) -> Account {
        let pair = keypair_from_seed(&[seed; 32]);
        let account = pair.account;
        self.keys.write().push(pair);
        account
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.keys.read().iter().map(|k| k.account).collect()
    }

    pub fn clear(&self) {
        self.keys.write().clear();
    }
}

impl Default for NullWallets {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallets for NullWallets {
    fn foreach_representative(&self, action: &mut dyn FnMut(&Account, &PrivateKey)) {
        for pair in self.keys.read().iter() {
            action(&pair.account, &pair.private);
        }
    }

    fn voting_reps(&self) -> usize {
        self.keys.read().len()
    }
}

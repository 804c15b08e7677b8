//! Key custody collaborator.

use orv_types::{Account, PrivateKey};

pub trait Wallets: Send + Sync {
    /// Invoke `action` once for every locally held representative key with
    /// voting weight.
    fn foreach_representative(&self, action: &mut dyn FnMut(&Account, &PrivateKey));

    /// Number of local representatives eligible to vote.
    fn voting_reps(&self) -> usize;
}

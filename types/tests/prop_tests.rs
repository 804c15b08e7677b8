use proptest::prelude::*;

use orv_types::{Account, Block, BlockHash, Root, Signature, StateBlock};

fn state_block(account: [u8; 32], previous: [u8; 32], balance: u128) -> Block {
    Block::State(StateBlock {
        account: Account::new(account),
        previous: BlockHash::new(previous),
        representative: Account::new([0x11; 32]),
        balance,
        link: [0; 32],
        signature: Signature::ZERO,
        work: 0,
    })
}

proptest! {
    /// A state block competes for its previous hash, or its account when it opens the chain.
    #[test]
    fn state_block_root_follows_previous(
        account in prop::array::uniform32(0u8..),
        previous in prop::array::uniform32(0u8..),
        balance in any::<u128>(),
    ) {
        let block = state_block(account, previous, balance);
        let expected = if previous == [0u8; 32] {
            Root::new(account)
        } else {
            Root::new(previous)
        };
        prop_assert_eq!(block.root(), expected);
        prop_assert_eq!(block.qualified_root().previous, BlockHash::new(previous));
    }

    /// Changing the balance always forks the hash.
    #[test]
    fn balance_changes_hash(
        account in prop::array::uniform32(0u8..),
        previous in prop::array::uniform32(0u8..),
        a in any::<u128>(),
        b in any::<u128>(),
    ) {
        prop_assume!(a != b);
        let x = state_block(account, previous, a);
        let y = state_block(account, previous, b);
        prop_assert_ne!(x.hash(), y.hash());
        prop_assert_eq!(x.root(), y.root());
    }

    /// The textual account form decodes to the same key.
    #[test]
    fn account_text_round_trip(bytes in prop::array::uniform32(0u8..)) {
        let account = Account::new(bytes);
        prop_assert_eq!(Account::decode(&account.encode()).unwrap(), account);
    }
}

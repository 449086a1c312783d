use crate::{types::BlockAccessList, Nonce, StorageKey, StorageValue, TxIndex};
use alloy_primitives::{Address, Bytes, U256};
use std::collections::BTreeMap;

/// Changes applied to one account by a prefix of the block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountOverlay {
    /// Latest written value per slot.
    pub storage: BTreeMap<StorageKey, StorageValue>,
    /// Sum of all balance deltas.
    pub balance_delta: i128,
    /// Latest nonce, if it changed.
    pub nonce: Option<Nonce>,
    /// Latest code, if it changed.
    pub code: Option<Bytes>,
}

impl AccountOverlay {
    /// Whether the overlay changes nothing.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
            && self.balance_delta == 0
            && self.nonce.is_none()
            && self.code.is_none()
    }

    /// Balance after applying the cumulative delta to `pre`.
    ///
    /// Returns `None` if the result would leave the `U256` range.
    pub fn balance(&self, pre: U256) -> Option<U256> {
        let magnitude = U256::from(self.balance_delta.unsigned_abs());
        if self.balance_delta >= 0 {
            pre.checked_add(magnitude)
        } else {
            pre.checked_sub(magnitude)
        }
    }
}

/// State changes of a block prefix, keyed by address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateOverlay {
    /// Accounts that changed, ascending by address.
    pub accounts: BTreeMap<Address, AccountOverlay>,
}

impl StateOverlay {
    /// Overlay of `address`, if it changed.
    pub fn account(&self, address: &Address) -> Option<&AccountOverlay> {
        self.accounts.get(address)
    }

    /// Latest value of a slot, if it was written.
    pub fn storage(&self, address: &Address, slot: &StorageKey) -> Option<StorageValue> {
        self.accounts.get(address)?.storage.get(slot).copied()
    }
}

impl BlockAccessList {
    /// State changes made by every transaction strictly before `tx_index`.
    ///
    /// This is the state a transaction at `tx_index` executes against, on top of
    /// the pre-block state.
    pub fn state_at(&self, tx_index: TxIndex) -> StateOverlay {
        self.overlay(|tx| tx < tx_index)
    }

    /// State changes made by the whole block.
    pub fn post_state(&self) -> StateOverlay {
        self.overlay(|_| true)
    }

    fn overlay(&self, include: impl Fn(TxIndex) -> bool) -> StateOverlay {
        let mut accounts = BTreeMap::new();
        for account in &self.accounts {
            let mut overlay = AccountOverlay::default();
            for slot in &account.storage_changes {
                if let Some(last) = slot.changes.iter().rev().find(|c| include(c.tx_index)) {
                    overlay.storage.insert(slot.slot, last.new_value);
                }
            }
            overlay.balance_delta = account
                .balance_changes
                .iter()
                .filter(|c| include(c.tx_index))
                .map(|c| c.delta.get())
                .sum();
            overlay.nonce = account
                .nonce_changes
                .iter()
                .rev()
                .find(|c| include(c.tx_index))
                .map(|c| c.new_nonce);
            overlay.code = account
                .code_changes
                .iter()
                .rev()
                .find(|c| include(c.tx_index))
                .map(|c| c.new_code.clone());
            if !overlay.is_empty() {
                accounts.insert(account.address, overlay);
            }
        }
        StateOverlay { accounts }
    }
}

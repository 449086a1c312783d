//! Ingestion of per-transaction prestate diffs.
//!
//! A prestate diff lists, for every account a transaction touched, the fields
//! before (`pre`) and the fields that changed after (`post`) the transaction.

use crate::{error::LimitError, event::AccessEvent};
use bal_primitives::{
    Address, BalanceDelta, Bytes, Nonce, StorageKey, StorageValue, TxIndex, U256,
};
use std::collections::{BTreeMap, BTreeSet};

/// Account fields as reported by a prestate diff.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AccountState {
    /// Balance.
    pub balance: Option<U256>,
    /// Nonce.
    pub nonce: Option<Nonce>,
    /// Code.
    pub code: Option<Bytes>,
    /// Storage slots.
    pub storage: BTreeMap<StorageKey, StorageValue>,
}

impl AccountState {
    fn has_code(&self) -> bool {
        self.code.as_ref().is_some_and(|code| !code.is_empty())
    }
}

/// State diff of one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TxStateDiff {
    /// Touched accounts before the transaction.
    pub pre: BTreeMap<Address, AccountState>,
    /// Changed fields after the transaction.
    pub post: BTreeMap<Address, AccountState>,
    /// Contract-creating sender, if the transaction deployed a contract.
    pub creator: Option<Address>,
}

impl TxStateDiff {
    /// Events implied by this diff for the transaction at `tx_index`.
    ///
    /// * a slot present in `post` is a write whose original is the `pre` value
    ///   (zero if absent); a slot only in `pre` is a read
    /// * a changed balance is the signed difference, zero differences only touch
    /// * code is recorded when non-empty and different from before
    /// * a nonce increase is recorded for accounts with code and for the creator
    /// * every account is touched
    pub fn events(&self, tx_index: TxIndex) -> Result<Vec<AccessEvent>, LimitError> {
        let empty = AccountState::default();
        let addresses: BTreeSet<_> = self.pre.keys().chain(self.post.keys()).collect();
        let mut events = Vec::new();

        for &address in addresses {
            let pre = self.pre.get(&address).unwrap_or(&empty);
            let post = self.post.get(&address).unwrap_or(&empty);
            events.push(AccessEvent::Touch { address, tx_index });

            for (&slot, &value) in &post.storage {
                events.push(AccessEvent::Original {
                    address,
                    slot,
                    value: pre.storage.get(&slot).copied().unwrap_or_default(),
                    tx_index,
                });
                events.push(AccessEvent::Write {
                    address,
                    slot,
                    value,
                    tx_index,
                });
            }
            for (&slot, &value) in &pre.storage {
                if !post.storage.contains_key(&slot) {
                    events.push(AccessEvent::Read {
                        address,
                        slot,
                        value,
                        tx_index,
                    });
                }
            }

            if let Some(post_balance) = post.balance {
                let pre_balance = pre.balance.unwrap_or_default();
                let delta = BalanceDelta::from_balances(pre_balance, post_balance)
                    .ok_or(LimitError::BalanceDeltaOverflow { address, tx_index })?;
                if !delta.is_zero() {
                    events.push(AccessEvent::BalanceDelta {
                        address,
                        delta,
                        tx_index,
                    });
                }
            }

            if let Some(code) = post.code.as_ref().filter(|c| !c.is_empty()) {
                if pre.code.as_ref() != Some(code) {
                    events.push(AccessEvent::Code {
                        address,
                        code: code.clone(),
                        tx_index,
                    });
                }
            }

            if let Some(nonce) = post.nonce {
                let increased = nonce > pre.nonce.unwrap_or_default();
                let eligible =
                    pre.has_code() || post.has_code() || self.creator == Some(address);
                if increased && eligible {
                    events.push(AccessEvent::Nonce {
                        address,
                        nonce,
                        tx_index,
                    });
                }
            }
        }
        Ok(events)
    }
}

//! Turning accumulated events into the canonical access list.

use crate::{
    aggregator::{limit_exceeded, AccountAccumulator, Aggregator},
    config::BalConfig,
    error::{BalError, LimitError},
};
use auto_impl::auto_impl;
use bal_kv::{null::NullProvider, KeyValueStoreGet};
use bal_primitives::{
    AccountChanges, Address, BalanceChange, BalanceDelta, BlockAccessList, CodeChange,
    NonceChange, SlotChanges, SlotRead, StorageChange, StorageKey, StorageValue,
};
use rayon::prelude::*;
use std::{
    collections::BTreeMap,
    hash::{BuildHasher, Hash},
};

/// Pre-block storage values used to elide writes that change nothing.
///
/// Slots the provider does not know are treated as zero.
#[auto_impl(&, Box, Arc)]
pub trait PreState {
    /// Value of `slot` of `address` before the block.
    fn storage(&self, address: &Address, slot: &StorageKey) -> Option<StorageValue>;
}

impl PreState for () {
    fn storage(&self, _address: &Address, _slot: &StorageKey) -> Option<StorageValue> {
        None
    }
}

impl PreState for NullProvider {
    fn storage(&self, address: &Address, slot: &StorageKey) -> Option<StorageValue> {
        KeyValueStoreGet::<(Address, StorageKey), StorageValue>::get(self, &(*address, *slot))
            .copied()
    }
}

impl<S: BuildHasher> PreState for std::collections::HashMap<(Address, StorageKey), StorageValue, S> {
    fn storage(&self, address: &Address, slot: &StorageKey) -> Option<StorageValue> {
        KeyValueStoreGet::get(self, &(*address, *slot)).copied()
    }
}

impl<S: BuildHasher> PreState for bal_kv::hashbrown::HashMap<(Address, StorageKey), StorageValue, S> {
    fn storage(&self, address: &Address, slot: &StorageKey) -> Option<StorageValue> {
        KeyValueStoreGet::get(self, &(*address, *slot)).copied()
    }
}

impl PreState for BTreeMap<(Address, StorageKey), StorageValue> {
    fn storage(&self, address: &Address, slot: &StorageKey) -> Option<StorageValue> {
        KeyValueStoreGet::get(self, &(*address, *slot)).copied()
    }
}

fn sorted<K: Ord + Copy + Hash, V>(map: bal_kv::HashMap<K, V>) -> Vec<(K, V)> {
    let mut entries: Vec<_> = map.into_iter().collect();
    entries.sort_unstable_by_key(|(k, _)| *k);
    entries
}

fn canonical_account<P: PreState>(
    address: Address,
    account: AccountAccumulator,
    pre_state: &P,
    track_reads: bool,
) -> Result<Option<AccountChanges>, LimitError> {
    let mut out = AccountChanges::new(address);

    for (slot, acc) in sorted(account.slots) {
        let writes = acc.sorted_writes();
        let mut changes = Vec::with_capacity(writes.len());
        if !writes.is_empty() {
            let mut current = acc
                .pre_block_value()
                .or_else(|| pre_state.storage(&address, &slot))
                .unwrap_or_default();
            for (tx_index, new_value) in writes {
                if new_value != current {
                    changes.push(StorageChange {
                        tx_index,
                        new_value,
                    });
                    current = new_value;
                }
            }
        }
        if !changes.is_empty() {
            out.storage_changes.push(SlotChanges { slot, changes });
        } else if track_reads {
            out.storage_reads.push(SlotRead { slot });
        }
    }

    for (tx_index, sum) in sorted(account.balance) {
        let delta = BalanceDelta::new(sum)
            .ok_or(LimitError::BalanceDeltaOverflow { address, tx_index })?;
        if !delta.is_zero() {
            out.balance_changes.push(BalanceChange { tx_index, delta });
        }
    }
    out.nonce_changes = sorted(account.nonce)
        .into_iter()
        .map(|(tx_index, new_nonce)| NonceChange {
            tx_index,
            new_nonce,
        })
        .collect();
    out.code_changes = sorted(account.code)
        .into_iter()
        .map(|(tx_index, new_code)| CodeChange { tx_index, new_code })
        .collect();

    if out.is_empty() && !track_reads {
        return Ok(None);
    }
    Ok(Some(out))
}

/// Produce the canonical access list from everything `aggregator` recorded.
///
/// A write is kept only if it changes the value left by the previous
/// transaction; the value before the first write comes from an observation
/// recorded in the aggregator, else from `pre_state`, else zero. Accounts are
/// processed in parallel.
pub fn canonicalize<P: PreState + Sync>(
    aggregator: Aggregator,
    pre_state: &P,
    config: &BalConfig,
) -> Result<BlockAccessList, BalError> {
    measure_duration!("canonicalize", {
        let accounts: Vec<_> = aggregator.into_accounts().into_iter().collect();
        let mut accounts = accounts
            .into_par_iter()
            .map(|(address, account)| {
                canonical_account(address, account, pre_state, config.track_reads)
            })
            .filter_map(Result::transpose)
            .collect::<Result<Vec<_>, _>>()
            .map_err(limit_exceeded)?;
        accounts.par_sort_unstable_by_key(|a| a.address);
        dev_debug!("canonicalized {} accounts", accounts.len());
        Ok(BlockAccessList::new(accounts))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordAccess;
    use bal_primitives::{Bytes, B256};

    fn addr(n: u8) -> Address {
        Address::with_last_byte(n)
    }

    fn word(n: u8) -> B256 {
        B256::with_last_byte(n)
    }

    fn delta(n: i64) -> BalanceDelta {
        BalanceDelta::from(n)
    }

    #[test]
    fn value_transfer() {
        let (sender, recipient, coinbase) = (addr(0xa), addr(0xb), addr(0xc));
        let mut agg = Aggregator::default();
        agg.record_balance_delta(sender, delta(-1_021_000), 0).unwrap();
        agg.record_balance_delta(recipient, delta(1_000_000), 0).unwrap();
        agg.record_balance_delta(coinbase, delta(21_000), 0).unwrap();

        let bal = canonicalize(agg, &(), &BalConfig::default()).unwrap();
        assert_eq!(bal.len(), 3);
        for account in &bal {
            assert_eq!(account.balance_changes.len(), 1);
            assert_eq!(account.balance_changes[0].tx_index, 0);
            assert!(account.storage_changes.is_empty());
            assert!(account.storage_reads.is_empty());
            assert!(account.nonce_changes.is_empty());
            assert!(account.code_changes.is_empty());
        }
        assert_eq!(bal.accounts[0].address, sender);
        assert_eq!(bal.accounts[0].balance_changes[0].delta, delta(-1_021_000));
        bal.check_ordering().unwrap();
    }

    #[test]
    fn write_back_to_original_is_elided() {
        let pre_state = BTreeMap::from([((addr(1), word(1)), word(5))]);
        let mut agg = Aggregator::default();
        agg.record_storage(addr(1), word(1), true, word(9), 0).unwrap();
        agg.record_storage(addr(1), word(1), true, word(5), 0).unwrap();

        let bal = canonicalize(agg, &pre_state, &BalConfig::default()).unwrap();
        let account = &bal.accounts[0];
        assert!(account.storage_changes.is_empty());
        assert_eq!(account.storage_reads, vec![SlotRead { slot: word(1) }]);
    }

    #[test]
    fn write_of_the_value_just_read_is_elided() {
        let mut agg = Aggregator::default();
        agg.record_storage(addr(1), word(1), false, word(5), 0).unwrap();
        agg.record_storage(addr(1), word(1), true, word(5), 0).unwrap();
        // a read after the write says nothing about the value before it
        agg.record_storage(addr(1), word(2), true, word(5), 0).unwrap();
        agg.record_storage(addr(1), word(2), false, word(5), 0).unwrap();

        let bal = canonicalize(agg, &(), &BalConfig::default()).unwrap();
        let account = &bal.accounts[0];
        assert_eq!(account.storage_reads, vec![SlotRead { slot: word(1) }]);
        assert_eq!(account.storage_changes.len(), 1);
        assert_eq!(account.storage_changes[0].slot, word(2));
    }

    #[test]
    fn writes_in_separate_transactions_are_kept() {
        let mut agg = Aggregator::default();
        agg.record_storage(addr(1), word(1), true, word(7), 7).unwrap();
        agg.record_storage(addr(1), word(1), true, word(2), 2).unwrap();

        let bal = canonicalize(agg, &(), &BalConfig::default()).unwrap();
        assert_eq!(
            bal.accounts[0].storage_changes[0].changes,
            vec![
                StorageChange {
                    tx_index: 2,
                    new_value: word(2)
                },
                StorageChange {
                    tx_index: 7,
                    new_value: word(7)
                },
            ]
        );
    }

    #[test]
    fn write_equal_to_previous_transaction_is_elided() {
        let mut agg = Aggregator::default();
        agg.record_storage_original(addr(1), word(1), word(3), 1).unwrap();
        agg.record_storage(addr(1), word(1), true, word(4), 1).unwrap();
        agg.record_storage(addr(1), word(1), true, word(4), 2).unwrap();
        agg.record_storage(addr(1), word(1), true, word(3), 5).unwrap();

        // the recorded original takes precedence over the pre-state
        let pre_state = BTreeMap::from([((addr(1), word(1)), word(4))]);
        let bal = canonicalize(agg, &pre_state, &BalConfig::default()).unwrap();
        let txs: Vec<_> = bal.accounts[0].storage_changes[0]
            .changes
            .iter()
            .map(|c| c.tx_index)
            .collect();
        assert_eq!(txs, vec![1, 5]);
    }

    #[test]
    fn contract_creation() {
        let (creator, contract) = (addr(1), addr(2));
        let code = Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]);
        let mut agg = Aggregator::default();
        agg.record_nonce(creator, 8, 3).unwrap();
        agg.record_nonce(contract, 1, 3).unwrap();
        agg.record_code(contract, code.clone(), 3).unwrap();

        let bal = canonicalize(agg, &(), &BalConfig::default()).unwrap();
        let creator = bal.account(&creator).unwrap();
        assert_eq!(
            creator.nonce_changes,
            vec![NonceChange {
                tx_index: 3,
                new_nonce: 8
            }]
        );
        let contract = bal.account(&contract).unwrap();
        assert_eq!(
            contract.code_changes,
            vec![CodeChange {
                tx_index: 3,
                new_code: code
            }]
        );
    }

    #[test]
    fn read_only_slot_is_a_read() {
        let mut agg = Aggregator::default();
        agg.record_storage(addr(1), word(2), false, word(0), 0).unwrap();
        agg.record_storage(addr(1), word(1), false, word(0), 4).unwrap();

        let bal = canonicalize(agg, &(), &BalConfig::default()).unwrap();
        let account = &bal.accounts[0];
        assert!(account.storage_changes.is_empty());
        assert_eq!(
            account.storage_reads,
            vec![SlotRead { slot: word(1) }, SlotRead { slot: word(2) }]
        );
    }

    #[rstest::rstest]
    #[case(true, 3)]
    #[case(false, 1)]
    fn touched_accounts_follow_track_reads(#[case] track_reads: bool, #[case] accounts: usize) {
        let mut agg = Aggregator::default();
        agg.record_touch(addr(1), 0).unwrap();
        agg.record_storage(addr(2), word(1), false, word(0), 0).unwrap();
        agg.record_storage(addr(2), word(2), true, word(1), 0).unwrap();
        // zero net balance change only touches
        agg.record_balance_delta(addr(3), delta(0), 1).unwrap();

        let config = BalConfig::default().with_track_reads(track_reads);
        let bal = canonicalize(agg, &(), &config).unwrap();
        assert_eq!(bal.len(), accounts);
        let account = bal.account(&addr(2)).unwrap();
        assert_eq!(account.storage_reads.is_empty(), !track_reads);
        assert_eq!(account.storage_changes.len(), 1);
        bal.check_ordering().unwrap();
    }

    #[test]
    fn hash_map_pre_state() {
        let mut pre_state: bal_kv::HashMap<(Address, B256), B256> = Default::default();
        pre_state.insert((addr(1), word(1)), word(1));
        assert_eq!(pre_state.storage(&addr(1), &word(1)), Some(word(1)));
        assert_eq!(pre_state.storage(&addr(1), &word(2)), None);
        assert_eq!(NullProvider.storage(&addr(1), &word(1)), None);
    }
}

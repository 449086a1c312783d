use crate::{
    types::{AccountChanges, BlockAccessList, ChangeKind, SlotChanges, SlotRead},
    StorageKey, TxIndex,
};
use alloy_primitives::Address;

/// A list in a block access list is not in canonical order.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OrderingError {
    /// Accounts are not strictly ascending by address.
    #[error("account {address} at position {index} is not above its predecessor")]
    UnsortedAccounts {
        /// Position in the account list.
        index: usize,
        /// Offending address.
        address: Address,
    },
    /// `storage_changes` slots are not strictly ascending.
    #[error("changed slot {slot} of {address} is not above its predecessor")]
    UnsortedSlots {
        /// Account.
        address: Address,
        /// Offending slot.
        slot: StorageKey,
    },
    /// `storage_reads` are not strictly ascending.
    #[error("read slot {slot} of {address} is not above its predecessor")]
    UnsortedReads {
        /// Account.
        address: Address,
        /// Offending slot.
        slot: StorageKey,
    },
    /// A per-kind change list is not strictly ascending by `tx_index`.
    #[error("{kind} change at tx {tx_index} of {address} is not above its predecessor")]
    UnsortedChanges {
        /// Account.
        address: Address,
        /// Which list.
        kind: ChangeKind,
        /// Slot, for storage changes.
        slot: Option<StorageKey>,
        /// Offending transaction index.
        tx_index: TxIndex,
    },
    /// A slot is listed both as changed and as read.
    #[error("slot {slot} of {address} is both changed and read")]
    ReadWriteOverlap {
        /// Account.
        address: Address,
        /// Offending slot.
        slot: StorageKey,
    },
    /// A `SlotChanges` entry carries no change.
    #[error("changed slot {slot} of {address} has no changes")]
    EmptySlotChanges {
        /// Account.
        address: Address,
        /// Offending slot.
        slot: StorageKey,
    },
}

fn check_ascending<T, K: Ord>(
    items: &[T],
    key: impl Fn(&T) -> K,
    err: impl FnOnce(&T) -> OrderingError,
) -> Result<(), OrderingError> {
    match items.windows(2).find(|w| key(&w[0]) >= key(&w[1])) {
        Some(w) => Err(err(&w[1])),
        None => Ok(()),
    }
}

impl AccountChanges {
    /// Check every list of this account against canonical order.
    pub fn check_ordering(&self) -> Result<(), OrderingError> {
        let address = self.address;

        check_ascending(&self.storage_changes, |s| s.slot, |s| {
            OrderingError::UnsortedSlots {
                address,
                slot: s.slot,
            }
        })?;
        for slot in &self.storage_changes {
            if slot.changes.is_empty() {
                return Err(OrderingError::EmptySlotChanges {
                    address,
                    slot: slot.slot,
                });
            }
            check_ascending(&slot.changes, |c| c.tx_index, |c| {
                OrderingError::UnsortedChanges {
                    address,
                    kind: ChangeKind::Storage,
                    slot: Some(slot.slot),
                    tx_index: c.tx_index,
                }
            })?;
        }

        check_ascending(&self.storage_reads, |r| r.slot, |r| {
            OrderingError::UnsortedReads {
                address,
                slot: r.slot,
            }
        })?;
        // both lists are sorted, so a linear merge finds any overlap
        let mut changes = self.storage_changes.iter().peekable();
        let mut reads = self.storage_reads.iter().peekable();
        while let (Some(c), Some(r)) = (changes.peek(), reads.peek()) {
            match c.slot.cmp(&r.slot) {
                std::cmp::Ordering::Less => {
                    changes.next();
                }
                std::cmp::Ordering::Greater => {
                    reads.next();
                }
                std::cmp::Ordering::Equal => {
                    return Err(OrderingError::ReadWriteOverlap {
                        address,
                        slot: r.slot,
                    })
                }
            }
        }

        let unsorted = |kind, tx_index| OrderingError::UnsortedChanges {
            address,
            kind,
            slot: None,
            tx_index,
        };
        check_ascending(&self.balance_changes, |c| c.tx_index, |c| {
            unsorted(ChangeKind::Balance, c.tx_index)
        })?;
        check_ascending(&self.nonce_changes, |c| c.tx_index, |c| {
            unsorted(ChangeKind::Nonce, c.tx_index)
        })?;
        check_ascending(&self.code_changes, |c| c.tx_index, |c| {
            unsorted(ChangeKind::Code, c.tx_index)
        })?;
        Ok(())
    }

    /// Bring this account's lists into canonical order.
    ///
    /// Duplicated slots are merged, duplicated `tx_index` entries keep the one
    /// that came last, slots left without changes become reads and reads of
    /// changed slots are dropped.
    pub fn canonicalize(&mut self) {
        self.storage_changes.sort_by_key(|s| s.slot);
        // merge consecutive entries of the same slot
        let mut merged: Vec<SlotChanges> = Vec::with_capacity(self.storage_changes.len());
        for slot in self.storage_changes.drain(..) {
            match merged.last_mut() {
                Some(last) if last.slot == slot.slot => last.changes.extend(slot.changes),
                _ => merged.push(slot),
            }
        }
        for slot in merged.iter_mut() {
            sort_dedup_last(&mut slot.changes, |c| c.tx_index);
        }
        let (empty, changed): (Vec<_>, Vec<_>) =
            merged.into_iter().partition(|s| s.changes.is_empty());
        self.storage_changes = changed;
        self.storage_reads
            .extend(empty.into_iter().map(|s| SlotRead { slot: s.slot }));

        self.storage_reads.sort_unstable();
        self.storage_reads.dedup();
        let written = &self.storage_changes;
        self.storage_reads.retain(|r| {
            written
                .binary_search_by(|s| s.slot.cmp(&r.slot))
                .is_err()
        });

        sort_dedup_last(&mut self.balance_changes, |c| c.tx_index);
        sort_dedup_last(&mut self.nonce_changes, |c| c.tx_index);
        sort_dedup_last(&mut self.code_changes, |c| c.tx_index);
    }
}

impl BlockAccessList {
    /// Check the whole list against canonical order, reporting the first violation.
    pub fn check_ordering(&self) -> Result<(), OrderingError> {
        if let Some(index) = self
            .accounts
            .windows(2)
            .position(|w| w[0].address >= w[1].address)
        {
            return Err(OrderingError::UnsortedAccounts {
                index: index + 1,
                address: self.accounts[index + 1].address,
            });
        }
        self.accounts.iter().try_for_each(AccountChanges::check_ordering)
    }

    /// Sort and deduplicate an externally built list in place.
    ///
    /// Entries of the same account are merged before the per-account lists are
    /// canonicalized. On a list that already passes [`Self::check_ordering`]
    /// this is the identity.
    pub fn canonicalize(&mut self) {
        self.accounts.sort_by_key(|a| a.address);
        let mut merged: Vec<AccountChanges> = Vec::with_capacity(self.accounts.len());
        for account in self.accounts.drain(..) {
            match merged.last_mut() {
                Some(last) if last.address == account.address => {
                    last.storage_changes.extend(account.storage_changes);
                    last.storage_reads.extend(account.storage_reads);
                    last.balance_changes.extend(account.balance_changes);
                    last.nonce_changes.extend(account.nonce_changes);
                    last.code_changes.extend(account.code_changes);
                }
                _ => merged.push(account),
            }
        }
        merged.iter_mut().for_each(AccountChanges::canonicalize);
        self.accounts = merged;
    }
}

/// Stable sort by key, then keep the last of each run of equal keys.
fn sort_dedup_last<T, K: Ord>(items: &mut Vec<T>, key: impl Fn(&T) -> K) {
    items.sort_by_key(|item| key(item));
    items.reverse();
    items.dedup_by(|a, b| key(a) == key(b));
    items.reverse();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        types::{BalanceChange, NonceChange, StorageChange},
        BalanceDelta, B256,
    };

    fn addr(n: u8) -> Address {
        Address::with_last_byte(n)
    }

    fn slot(n: u8) -> B256 {
        B256::with_last_byte(n)
    }

    fn write(tx_index: TxIndex, value: u8) -> StorageChange {
        StorageChange {
            tx_index,
            new_value: B256::with_last_byte(value),
        }
    }

    fn canonical() -> BlockAccessList {
        let mut a = AccountChanges::new(addr(1));
        a.storage_changes = vec![
            SlotChanges {
                slot: slot(1),
                changes: vec![write(0, 5), write(4, 6)],
            },
            SlotChanges {
                slot: slot(3),
                changes: vec![write(2, 1)],
            },
        ];
        a.storage_reads = vec![SlotRead { slot: slot(2) }];
        a.nonce_changes = vec![NonceChange {
            tx_index: 1,
            new_nonce: 1,
        }];
        let mut b = AccountChanges::new(addr(2));
        b.balance_changes = vec![
            BalanceChange {
                tx_index: 0,
                delta: BalanceDelta::from(-5i64),
            },
            BalanceChange {
                tx_index: 3,
                delta: BalanceDelta::from(5i64),
            },
        ];
        BlockAccessList::new(vec![a, b, AccountChanges::new(addr(3))])
    }

    #[test]
    fn canonical_list_passes() {
        canonical().check_ordering().unwrap();
    }

    #[test]
    fn unsorted_accounts_are_reported() {
        let mut bal = canonical();
        bal.accounts.swap(0, 1);
        assert_eq!(
            bal.check_ordering(),
            Err(OrderingError::UnsortedAccounts {
                index: 1,
                address: addr(1)
            })
        );
    }

    #[test]
    fn duplicate_account_is_unsorted() {
        let mut bal = canonical();
        bal.accounts.push(AccountChanges::new(addr(3)));
        assert!(matches!(
            bal.check_ordering(),
            Err(OrderingError::UnsortedAccounts { index: 3, .. })
        ));
    }

    #[rstest::rstest]
    #[case::slots(|a: &mut AccountChanges| a.storage_changes.swap(0, 1))]
    #[case::reads(|a: &mut AccountChanges| a.storage_reads.push(SlotRead { slot: slot(0) }))]
    #[case::changes(|a: &mut AccountChanges| a.storage_changes[0].changes.swap(0, 1))]
    #[case::nonce(|a: &mut AccountChanges| a.nonce_changes.push(NonceChange { tx_index: 1, new_nonce: 2 }))]
    #[case::overlap(|a: &mut AccountChanges| a.storage_reads.push(SlotRead { slot: slot(3) }))]
    #[case::empty(|a: &mut AccountChanges| a.storage_changes[1].changes.clear())]
    fn violations_are_detected(#[case] mutate: fn(&mut AccountChanges)) {
        let mut bal = canonical();
        mutate(&mut bal.accounts[0]);
        assert!(bal.check_ordering().is_err());
    }

    #[test]
    fn overlap_names_the_slot() {
        let mut bal = canonical();
        bal.accounts[0].storage_reads = vec![SlotRead { slot: slot(3) }];
        assert_eq!(
            bal.check_ordering(),
            Err(OrderingError::ReadWriteOverlap {
                address: addr(1),
                slot: slot(3)
            })
        );
    }

    #[test]
    fn canonicalize_is_identity_on_canonical() {
        let mut bal = canonical();
        bal.canonicalize();
        assert_eq!(bal, canonical());
    }

    #[test]
    fn canonicalize_sorts_merges_and_dedups() {
        let mut scrambled = canonical();
        scrambled.accounts.reverse();
        let a = scrambled.accounts.iter_mut().find(|a| a.address == addr(1)).unwrap();
        a.storage_changes.reverse();
        a.storage_changes[1].changes.reverse();
        // a stale duplicate of tx 2 that the later entry must override
        a.storage_changes.insert(
            0,
            SlotChanges {
                slot: slot(3),
                changes: vec![write(2, 9)],
            },
        );
        // slot without changes turns into a read
        a.storage_changes.push(SlotChanges {
            slot: slot(2),
            changes: vec![],
        });
        // read of a written slot is dropped
        a.storage_reads.push(SlotRead { slot: slot(1) });
        // split second entry for the same account
        scrambled.accounts.push(AccountChanges {
            address: addr(2),
            balance_changes: vec![BalanceChange {
                tx_index: 0,
                delta: BalanceDelta::from(-5i64),
            }],
            ..Default::default()
        });

        scrambled.canonicalize();
        scrambled.check_ordering().unwrap();
        assert_eq!(scrambled, canonical());
    }
}

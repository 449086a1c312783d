//! Comparison of a declared access list against the computed one.

use crate::error::{BalError, Discrepancy, Presence};
use bal_primitives::{AccountChanges, BlockAccessList, ChangeKind, StorageKey, TxIndex};
use itertools::{EitherOrBoth, Itertools};
use std::ops::ControlFlow;

/// Receives discrepancies in canonical order; `Break` stops the comparison.
type Sink<'a> = dyn FnMut(Discrepancy) -> ControlFlow<Discrepancy> + 'a;

/// Check that `declared` is exactly `computed`.
///
/// Both lists must be in canonical order. Any account, slot or `tx_index`
/// present on one side only, or carrying a different value, is reported as a
/// [`BalError::CompletenessViolation`] naming the first such location.
pub fn validate(declared: &BlockAccessList, computed: &BlockAccessList) -> Result<(), BalError> {
    measure_duration!("validate", {
        declared.check_ordering()?;
        computed.check_ordering()?;

        match compare(declared, computed, &mut |d| ControlFlow::Break(d)) {
            ControlFlow::Break(discrepancy) => {
                dev_error!("declared access list rejected: {discrepancy}");
                Err(BalError::CompletenessViolation(discrepancy))
            }
            ControlFlow::Continue(()) => Ok(()),
        }
    })
}

/// Every location where `declared` and `computed` disagree, in canonical order.
///
/// Both lists are assumed to be in canonical order.
pub fn diff(declared: &BlockAccessList, computed: &BlockAccessList) -> Vec<Discrepancy> {
    let mut all = Vec::new();
    let _ = compare(declared, computed, &mut |d| {
        all.push(d);
        ControlFlow::Continue(())
    });
    all
}

fn compare(
    declared: &BlockAccessList,
    computed: &BlockAccessList,
    sink: &mut Sink<'_>,
) -> ControlFlow<Discrepancy> {
    declared
        .iter()
        .merge_join_by(computed.iter(), |d, c| d.address.cmp(&c.address))
        .try_for_each(|pair| match pair {
            EitherOrBoth::Left(d) => sink(Discrepancy::account(d.address, Presence::Extra)),
            EitherOrBoth::Right(c) => sink(Discrepancy::account(c.address, Presence::Missing)),
            EitherOrBoth::Both(d, c) => compare_account(d, c, sink),
        })
}

/// Compare two sorted lists entry by entry, `key` being the sort key.
fn compare_list<T: PartialEq, K: Ord + Copy>(
    declared: &[T],
    computed: &[T],
    key: impl Fn(&T) -> K,
    mut report: impl FnMut(K, Presence) -> ControlFlow<Discrepancy>,
) -> ControlFlow<Discrepancy> {
    declared
        .iter()
        .merge_join_by(computed.iter(), |d, c| key(d).cmp(&key(c)))
        .try_for_each(|pair| match pair {
            EitherOrBoth::Left(d) => report(key(d), Presence::Extra),
            EitherOrBoth::Right(c) => report(key(c), Presence::Missing),
            EitherOrBoth::Both(d, c) if d != c => report(key(d), Presence::Mismatch),
            EitherOrBoth::Both(..) => ControlFlow::Continue(()),
        })
}

fn compare_account(
    declared: &AccountChanges,
    computed: &AccountChanges,
    sink: &mut Sink<'_>,
) -> ControlFlow<Discrepancy> {
    let address = declared.address;
    let mut report = |slot: Option<StorageKey>, kind, tx_index: Option<TxIndex>, presence| {
        sink(Discrepancy {
            address,
            slot,
            kind: Some(kind),
            tx_index,
            presence,
        })
    };

    declared
        .storage_changes
        .iter()
        .merge_join_by(computed.storage_changes.iter(), |d, c| d.slot.cmp(&c.slot))
        .try_for_each(|pair| {
            let (slot, declared, computed) = match pair {
                EitherOrBoth::Left(d) => (d.slot, &d.changes[..], &[][..]),
                EitherOrBoth::Right(c) => (c.slot, &[][..], &c.changes[..]),
                EitherOrBoth::Both(d, c) => (d.slot, &d.changes[..], &c.changes[..]),
            };
            compare_list(declared, computed, |c| c.tx_index, |tx_index, presence| {
                report(Some(slot), ChangeKind::Storage, Some(tx_index), presence)
            })
        })?;
    compare_list(
        &declared.storage_reads,
        &computed.storage_reads,
        |r| r.slot,
        |slot, presence| report(Some(slot), ChangeKind::StorageRead, None, presence),
    )?;
    compare_list(
        &declared.balance_changes,
        &computed.balance_changes,
        |c| c.tx_index,
        |tx_index, presence| report(None, ChangeKind::Balance, Some(tx_index), presence),
    )?;
    compare_list(
        &declared.nonce_changes,
        &computed.nonce_changes,
        |c| c.tx_index,
        |tx_index, presence| report(None, ChangeKind::Nonce, Some(tx_index), presence),
    )?;
    compare_list(
        &declared.code_changes,
        &computed.code_changes,
        |c| c.tx_index,
        |tx_index, presence| report(None, ChangeKind::Code, Some(tx_index), presence),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bal_primitives::{
        Address, BalanceChange, BalanceDelta, NonceChange, SlotChanges, SlotRead,
        StorageChange, B256,
    };

    fn computed() -> BlockAccessList {
        let mut a = AccountChanges::new(Address::with_last_byte(1));
        a.storage_changes.push(SlotChanges {
            slot: B256::with_last_byte(1),
            changes: vec![
                StorageChange {
                    tx_index: 0,
                    new_value: B256::with_last_byte(1),
                },
                StorageChange {
                    tx_index: 2,
                    new_value: B256::with_last_byte(2),
                },
            ],
        });
        a.storage_reads.push(SlotRead {
            slot: B256::with_last_byte(5),
        });
        a.nonce_changes.push(NonceChange {
            tx_index: 0,
            new_nonce: 1,
        });
        let mut b = AccountChanges::new(Address::with_last_byte(2));
        b.balance_changes.push(BalanceChange {
            tx_index: 1,
            delta: BalanceDelta::from(100i64),
        });
        BlockAccessList::new(vec![a, b])
    }

    #[test]
    fn identical_lists_validate() {
        validate(&computed(), &computed()).unwrap();
        assert!(diff(&computed(), &computed()).is_empty());
    }

    #[test]
    fn omitted_write_is_missing() {
        let mut declared = computed();
        declared.accounts[0].storage_changes[0].changes.remove(1);
        let err = validate(&declared, &computed()).unwrap_err();
        assert_eq!(
            err.discrepancy(),
            Some(&Discrepancy {
                address: Address::with_last_byte(1),
                slot: Some(B256::with_last_byte(1)),
                kind: Some(ChangeKind::Storage),
                tx_index: Some(2),
                presence: Presence::Missing,
            })
        );
    }

    #[test]
    fn phantom_entry_is_extra() {
        let mut declared = computed();
        declared.accounts[1].balance_changes.push(BalanceChange {
            tx_index: 4,
            delta: BalanceDelta::from(1i64),
        });
        let err = validate(&declared, &computed()).unwrap_err();
        let discrepancy = err.discrepancy().unwrap();
        assert_eq!(discrepancy.presence, Presence::Extra);
        assert_eq!(discrepancy.kind, Some(ChangeKind::Balance));
        assert_eq!(discrepancy.tx_index, Some(4));
    }

    #[rstest::rstest]
    #[case::account_missing(|b: &mut BlockAccessList| { b.accounts.remove(1); }, Presence::Missing, None)]
    #[case::account_extra(|b: &mut BlockAccessList| b.accounts.push(AccountChanges::new(Address::with_last_byte(9))), Presence::Extra, None)]
    #[case::value_differs(|b: &mut BlockAccessList| b.accounts[0].nonce_changes[0].new_nonce = 2, Presence::Mismatch, Some(ChangeKind::Nonce))]
    #[case::read_missing(|b: &mut BlockAccessList| b.accounts[0].storage_reads.clear(), Presence::Missing, Some(ChangeKind::StorageRead))]
    fn single_mutation_is_reported(
        #[case] mutate: fn(&mut BlockAccessList),
        #[case] presence: Presence,
        #[case] kind: Option<ChangeKind>,
    ) {
        let mut declared = computed();
        mutate(&mut declared);
        let all = diff(&declared, &computed());
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].presence, presence);
        assert_eq!(all[0].kind, kind);
        assert!(matches!(
            validate(&declared, &computed()),
            Err(BalError::CompletenessViolation(_))
        ));
    }

    #[test]
    fn missing_slot_reports_every_change() {
        let mut declared = computed();
        declared.accounts[0].storage_changes.clear();
        let all = diff(&declared, &computed());
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|d| d.presence == Presence::Missing));
    }

    #[test]
    fn comparison_stops_at_the_first_discrepancy() {
        let mut declared = computed();
        declared.accounts[0].nonce_changes[0].new_nonce = 2;
        declared.accounts.remove(1);

        let mut seen = 0;
        let flow = compare(&declared, &computed(), &mut |d| {
            seen += 1;
            ControlFlow::Break(d)
        });
        assert_eq!(seen, 1);
        let ControlFlow::Break(first) = flow else {
            panic!("discrepancies were not reported");
        };
        assert_eq!(first.kind, Some(ChangeKind::Nonce));

        let all = diff(&declared, &computed());
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], first);
        let err = validate(&declared, &computed()).unwrap_err();
        assert_eq!(err.discrepancy(), Some(&first));
    }

    #[test]
    fn unordered_declared_list_is_an_ordering_violation() {
        let mut declared = computed();
        declared.accounts.swap(0, 1);
        assert!(matches!(
            validate(&declared, &computed()),
            Err(BalError::OrderingViolation(_))
        ));
    }
}

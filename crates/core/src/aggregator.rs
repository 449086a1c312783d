//! Keyed, order-independent accumulation of access events.
//!
//! Events are folded into per-account containers as they arrive. Nothing is
//! sorted here; the canonical order is produced once by
//! [`canonicalize`](crate::canonicalize) after all transactions have finished.

use crate::{
    config::BalLimits,
    error::{BalError, LimitError},
    event::AccessEvent,
    trace::TxStateDiff,
};
use auto_impl::auto_impl;
use bal_kv::{HashMap, Merge};
use bal_primitives::{
    Address, BalanceDelta, Bytes, Nonce, StorageKey, StorageValue, TxIndex,
};

/// Sink for the events of executing transactions.
///
/// Implemented by the plain [`Aggregator`], by a shared reference to the
/// [`ShardedAggregator`](crate::ShardedAggregator) and by the fail-fast
/// [`Guarded`](crate::Guarded) wrapper.
#[auto_impl(&mut, Box)]
pub trait RecordAccess {
    /// Record one event.
    fn record(&mut self, event: AccessEvent) -> Result<(), BalError>;

    /// Record a storage read or write. For a read `value` is the observed value.
    fn record_storage(
        &mut self,
        address: Address,
        slot: StorageKey,
        is_write: bool,
        value: StorageValue,
        tx_index: TxIndex,
    ) -> Result<(), BalError> {
        self.record(if is_write {
            AccessEvent::Write {
                address,
                slot,
                value,
                tx_index,
            }
        } else {
            AccessEvent::Read {
                address,
                slot,
                value,
                tx_index,
            }
        })
    }

    /// Record the value a slot held before `tx_index` started.
    fn record_storage_original(
        &mut self,
        address: Address,
        slot: StorageKey,
        value: StorageValue,
        tx_index: TxIndex,
    ) -> Result<(), BalError> {
        self.record(AccessEvent::Original {
            address,
            slot,
            value,
            tx_index,
        })
    }

    /// Record a balance change.
    fn record_balance_delta(
        &mut self,
        address: Address,
        delta: BalanceDelta,
        tx_index: TxIndex,
    ) -> Result<(), BalError> {
        self.record(AccessEvent::BalanceDelta {
            address,
            delta,
            tx_index,
        })
    }

    /// Record a nonce update.
    fn record_nonce(
        &mut self,
        address: Address,
        new_nonce: Nonce,
        tx_index: TxIndex,
    ) -> Result<(), BalError> {
        self.record(AccessEvent::Nonce {
            address,
            nonce: new_nonce,
            tx_index,
        })
    }

    /// Record a code deployment.
    fn record_code(
        &mut self,
        address: Address,
        code: Bytes,
        tx_index: TxIndex,
    ) -> Result<(), BalError> {
        self.record(AccessEvent::Code {
            address,
            code,
            tx_index,
        })
    }

    /// Record an account access without state change.
    fn record_touch(&mut self, address: Address, tx_index: TxIndex) -> Result<(), BalError> {
        self.record(AccessEvent::Touch { address, tx_index })
    }

    /// Record every event implied by a prestate diff of one transaction.
    fn record_state_diff(
        &mut self,
        tx_index: TxIndex,
        diff: &TxStateDiff,
    ) -> Result<(), BalError> {
        diff.events(tx_index)?
            .into_iter()
            .try_for_each(|event| self.record(event))
    }
}

/// Accesses of a single slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SlotAccumulator {
    /// Final written value per transaction.
    pub(crate) writes: HashMap<TxIndex, StorageValue>,
    /// Earliest observed value with its position, see [`position`].
    observed: Option<(u32, StorageValue)>,
}

/// Position of an observation within the block. The value before tx `t` sorts
/// before anything seen during tx `t`.
fn position(tx_index: TxIndex, during: bool) -> u32 {
    2 * tx_index as u32 + during as u32
}

impl SlotAccumulator {
    fn observe(&mut self, at: u32, value: StorageValue) {
        match self.observed {
            Some((seen, _)) if seen <= at => {}
            _ => self.observed = Some((at, value)),
        }
    }

    /// Pre-block value, if an observation was made before the first write.
    pub(crate) fn pre_block_value(&self) -> Option<StorageValue> {
        let (at, value) = self.observed?;
        match self.writes.keys().min() {
            Some(&first) if at > position(first, false) => None,
            _ => Some(value),
        }
    }

    /// Writes ordered by transaction.
    pub(crate) fn sorted_writes(&self) -> Vec<(TxIndex, StorageValue)> {
        let mut writes: Vec<_> = self.writes.iter().map(|(tx, v)| (*tx, *v)).collect();
        writes.sort_unstable_by_key(|(tx, _)| *tx);
        writes
    }
}

// Partials are expected to cover disjoint transactions. Overlaps still resolve
// the same way whatever the merge order.
impl Merge for SlotAccumulator {
    fn merge(&mut self, other: Self) {
        for (tx_index, value) in other.writes {
            self.writes
                .entry(tx_index)
                .and_modify(|v| *v = (*v).max(value))
                .or_insert(value);
        }
        self.observed = match (self.observed, other.observed) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Everything recorded for one account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct AccountAccumulator {
    /// Every accessed slot.
    pub(crate) slots: HashMap<StorageKey, SlotAccumulator>,
    /// Net balance change per transaction.
    pub(crate) balance: HashMap<TxIndex, i128>,
    /// Final nonce per transaction.
    pub(crate) nonce: HashMap<TxIndex, Nonce>,
    /// Final code per transaction.
    pub(crate) code: HashMap<TxIndex, Bytes>,
}

impl AccountAccumulator {
    /// Fold an event in, returning whether it introduced a new slot.
    pub(crate) fn apply(&mut self, event: AccessEvent) -> Result<bool, LimitError> {
        match event {
            AccessEvent::Read {
                slot,
                value,
                tx_index,
                ..
            } => {
                let new = !self.slots.contains_key(&slot);
                let acc = self.slots.entry(slot).or_default();
                // events of one transaction arrive in execution order, so a read
                // ahead of the transaction's first write sees the value before it
                let during = acc.writes.contains_key(&tx_index);
                acc.observe(position(tx_index, during), value);
                Ok(new)
            }
            AccessEvent::Original {
                slot,
                value,
                tx_index,
                ..
            } => {
                let new = !self.slots.contains_key(&slot);
                self.slots
                    .entry(slot)
                    .or_default()
                    .observe(position(tx_index, false), value);
                Ok(new)
            }
            AccessEvent::Write {
                slot,
                value,
                tx_index,
                ..
            } => {
                let new = !self.slots.contains_key(&slot);
                // within one transaction the last write wins
                self.slots
                    .entry(slot)
                    .or_default()
                    .writes
                    .insert(tx_index, value);
                Ok(new)
            }
            AccessEvent::BalanceDelta {
                address,
                delta,
                tx_index,
            } => {
                let sum = self.balance.entry(tx_index).or_default();
                match sum
                    .checked_add(delta.get())
                    .filter(|s| BalanceDelta::new(*s).is_some())
                {
                    Some(s) => *sum = s,
                    None => return Err(LimitError::BalanceDeltaOverflow { address, tx_index }),
                }
                Ok(false)
            }
            AccessEvent::Nonce {
                nonce, tx_index, ..
            } => {
                self.nonce
                    .entry(tx_index)
                    .and_modify(|n| *n = (*n).max(nonce))
                    .or_insert(nonce);
                Ok(false)
            }
            AccessEvent::Code { code, tx_index, .. } => {
                self.code.insert(tx_index, code);
                Ok(false)
            }
            AccessEvent::Touch { .. } => Ok(false),
        }
    }

    /// Check the balance sums, which may leave the delta range after a merge.
    fn check_balances(&self, address: Address) -> Result<(), LimitError> {
        match self
            .balance
            .iter()
            .find(|(_, sum)| BalanceDelta::new(**sum).is_none())
        {
            Some((tx_index, _)) => Err(LimitError::BalanceDeltaOverflow {
                address,
                tx_index: *tx_index,
            }),
            None => Ok(()),
        }
    }
}

impl Merge for AccountAccumulator {
    fn merge(&mut self, other: Self) {
        self.slots.merge(other.slots);
        for (tx_index, delta) in other.balance {
            let sum = self.balance.entry(tx_index).or_default();
            *sum = sum.saturating_add(delta);
        }
        for (tx_index, nonce) in other.nonce {
            self.nonce
                .entry(tx_index)
                .and_modify(|n| *n = (*n).max(nonce))
                .or_insert(nonce);
        }
        for (tx_index, code) in other.code {
            self.code
                .entry(tx_index)
                .and_modify(|c| {
                    if code.as_ref() > c.as_ref() {
                        *c = code.clone();
                    }
                })
                .or_insert(code);
        }
    }
}

pub(crate) fn limit_exceeded(err: LimitError) -> BalError {
    dev_error!("resource limit exceeded: {err}");
    BalError::ResourceLimitExceeded(err)
}

/// Per-block accumulator of access events.
///
/// One instance is owned by the caller for each block. Several instances fed
/// by workers over disjoint transactions can be combined with
/// [`Aggregator::merge`].
#[derive(Clone, Debug, Default)]
pub struct Aggregator {
    limits: BalLimits,
    accounts: HashMap<Address, AccountAccumulator>,
    num_slots: usize,
}

impl Aggregator {
    /// Empty aggregator enforcing `limits`.
    pub fn new(limits: BalLimits) -> Self {
        Self {
            limits,
            accounts: HashMap::default(),
            num_slots: 0,
        }
    }

    /// Limits this aggregator enforces.
    pub fn limits(&self) -> &BalLimits {
        &self.limits
    }

    /// Number of distinct accounts recorded so far.
    pub fn num_accounts(&self) -> usize {
        self.accounts.len()
    }

    /// Number of distinct `(address, slot)` pairs recorded so far.
    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Record a sequence of events, stopping at the first error.
    pub fn record_all<I: IntoIterator<Item = AccessEvent>>(
        &mut self,
        events: I,
    ) -> Result<(), BalError> {
        events.into_iter().try_for_each(|event| self.record(event))
    }

    /// Fold another partial aggregation into this one.
    ///
    /// Entries are combined by `tx_index`, so the result does not depend on
    /// which partial is merged into which. Limits are checked again on the
    /// combined result.
    pub fn merge(&mut self, other: Aggregator) -> Result<(), BalError> {
        measure_duration!("aggregator merge", {
            dev_debug!(
                "merging {} accounts into {} accounts",
                other.accounts.len(),
                self.accounts.len()
            );
            self.accounts.merge(other.accounts);
            self.num_slots = self.accounts.values().map(|a| a.slots.len()).sum();
            self.check_limits()
        })
    }

    fn check_limits(&self) -> Result<(), BalError> {
        self.limits
            .check_accounts(self.accounts.len())
            .map_err(limit_exceeded)?;
        self.limits
            .check_slots(self.num_slots)
            .map_err(limit_exceeded)?;
        for (address, account) in &self.accounts {
            account
                .check_balances(*address)
                .map_err(limit_exceeded)?;
        }
        Ok(())
    }

    pub(crate) fn from_parts(
        limits: BalLimits,
        accounts: HashMap<Address, AccountAccumulator>,
    ) -> Result<Self, BalError> {
        let num_slots = accounts.values().map(|a| a.slots.len()).sum();
        let aggregator = Self {
            limits,
            accounts,
            num_slots,
        };
        aggregator.check_limits()?;
        Ok(aggregator)
    }

    pub(crate) fn into_accounts(self) -> HashMap<Address, AccountAccumulator> {
        self.accounts
    }
}

impl RecordAccess for Aggregator {
    fn record(&mut self, event: AccessEvent) -> Result<(), BalError> {
        dev_trace!("record {event:?}");
        self.limits.check_event(&event).map_err(limit_exceeded)?;

        let address = event.address();
        if !self.accounts.contains_key(&address) {
            self.limits
                .check_accounts(self.accounts.len() + 1)
                .map_err(limit_exceeded)?;
        }
        let account = self.accounts.entry(address).or_default();
        if account.apply(event).map_err(limit_exceeded)? {
            self.num_slots += 1;
            self.limits
                .check_slots(self.num_slots)
                .map_err(limit_exceeded)?;
        }
        Ok(())
    }
}

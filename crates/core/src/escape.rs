//! Fail-fast checks of execution against the declared access list.

use crate::{
    aggregator::RecordAccess,
    error::{BalError, Escape},
    event::AccessEvent,
};
use bal_kv::{HashMap, HashSet};
use bal_primitives::{Address, BlockAccessList, StorageKey};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Lookup structure over a declared access list.
///
/// Serves both as the prefetch plan, since it lists every account and slot the
/// block claims to touch, and as the membership test for fail-fast execution.
#[derive(Clone, Debug, Default)]
pub struct DeclaredIndex {
    accounts: HashMap<Address, HashSet<StorageKey>>,
}

impl DeclaredIndex {
    /// Index every account and every changed or read slot of `bal`.
    pub fn new(bal: &BlockAccessList) -> Self {
        let accounts = bal
            .iter()
            .map(|account| (account.address, account.accessed_slots().copied().collect()))
            .collect();
        Self { accounts }
    }

    /// Whether `address` is declared.
    pub fn contains_account(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// Whether `slot` of `address` is declared, as a change or as a read.
    pub fn contains_slot(&self, address: &Address, slot: &StorageKey) -> bool {
        self.accounts
            .get(address)
            .is_some_and(|slots| slots.contains(slot))
    }

    /// Accounts and slots to load before execution starts.
    pub fn prefetch(&self) -> impl Iterator<Item = (&Address, impl Iterator<Item = &StorageKey>)> {
        self.accounts.iter().map(|(address, slots)| (address, slots.iter()))
    }

    /// Number of declared accounts.
    pub fn num_accounts(&self) -> usize {
        self.accounts.len()
    }

    /// Check one event, returning the escape it constitutes, if any.
    ///
    /// With `track_reads` every account and slot touched must be declared.
    /// Without it read-only accesses are invisible in the list, so only events
    /// that always produce an entry are checked: nonce and code changes.
    pub fn check(&self, event: &AccessEvent, track_reads: bool) -> Result<(), Escape> {
        let address = event.address();
        let declared = if track_reads {
            match event.slot() {
                Some(slot) => self.contains_slot(&address, &slot),
                None => self.contains_account(&address),
            }
        } else {
            match event {
                AccessEvent::Nonce { .. } | AccessEvent::Code { .. } => {
                    self.contains_account(&address)
                }
                _ => true,
            }
        };
        if declared {
            return Ok(());
        }
        Err(Escape {
            address,
            slot: event.slot(),
            kind: event.kind(),
            tx_index: event.tx_index(),
        })
    }
}

/// Shared flag telling workers that the block has already failed.
#[derive(Clone, Debug, Default)]
pub struct EscapeSignal {
    raised: Arc<AtomicBool>,
    first: Arc<Mutex<Option<Escape>>>,
}

impl EscapeSignal {
    /// Report an escape. The one with the lowest `tx_index` is kept.
    pub fn raise(&self, escape: Escape) {
        let mut first = self.first.lock();
        match first.as_ref() {
            Some(f) if f.tx_index <= escape.tx_index => {}
            _ => *first = Some(escape),
        }
        self.raised.store(true, Ordering::Release);
    }

    /// Whether any worker escaped.
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// The escape with the lowest `tx_index` reported so far.
    pub fn first(&self) -> Option<Escape> {
        self.first.lock().clone()
    }
}

/// Recorder that aborts on the first access outside the declared list.
#[derive(Debug)]
pub struct Guarded<'a, R> {
    inner: R,
    index: &'a DeclaredIndex,
    signal: EscapeSignal,
    track_reads: bool,
}

impl<'a, R: RecordAccess> Guarded<'a, R> {
    /// Wrap `inner`, reporting escapes through `signal`.
    pub fn new(inner: R, index: &'a DeclaredIndex, signal: EscapeSignal, track_reads: bool) -> Self {
        Self {
            inner,
            index,
            signal,
            track_reads,
        }
    }

    /// Unwrap the recorder.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: RecordAccess> RecordAccess for Guarded<'_, R> {
    fn record(&mut self, event: AccessEvent) -> Result<(), BalError> {
        if let Err(escape) = self.index.check(&event, self.track_reads) {
            dev_warn!("early escape: {escape}");
            self.signal.raise(escape.clone());
            return Err(BalError::EarlyEscape(escape));
        }
        // another worker already failed the block
        if self.signal.is_raised() {
            if let Some(escape) = self.signal.first() {
                return Err(BalError::EarlyEscape(escape));
            }
        }
        self.inner.record(event)
    }
}

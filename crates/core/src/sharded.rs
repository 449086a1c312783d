use crate::{
    aggregator::{limit_exceeded, AccountAccumulator, Aggregator, RecordAccess},
    config::BalLimits,
    error::BalError,
    event::AccessEvent,
};
use bal_kv::{HashMap, Merge};
use bal_primitives::Address;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

type Shard = HashMap<Address, AccountAccumulator>;

/// Address-sharded aggregator for concurrent workers.
///
/// Each account lives in exactly one shard, so workers touching different
/// accounts rarely contend. Record through a shared reference:
///
/// ```
/// use bal_core::{BalLimits, RecordAccess, ShardedAggregator};
/// use bal_primitives::Address;
///
/// let sharded = ShardedAggregator::new(BalLimits::default());
/// rayon::scope(|s| {
///     for tx_index in 0..4 {
///         let sharded = &sharded;
///         s.spawn(move |_| {
///             let mut handle = sharded;
///             handle.record_touch(Address::with_last_byte(1), tx_index).unwrap();
///         });
///     }
/// });
/// let aggregator = sharded.into_aggregator()?;
/// assert_eq!(aggregator.num_accounts(), 1);
/// # Ok::<(), bal_core::BalError>(())
/// ```
#[derive(Debug)]
pub struct ShardedAggregator {
    limits: BalLimits,
    shards: Box<[Mutex<Shard>]>,
    num_accounts: AtomicUsize,
    num_slots: AtomicUsize,
}

impl ShardedAggregator {
    /// Aggregator with four shards per rayon thread.
    pub fn new(limits: BalLimits) -> Self {
        Self::with_shards(limits, rayon::current_num_threads() * 4)
    }

    /// Aggregator with a fixed number of shards.
    pub fn with_shards(limits: BalLimits, shards: usize) -> Self {
        Self {
            limits,
            shards: (0..shards.max(1))
                .map(|_| Mutex::new(Shard::default()))
                .collect(),
            num_accounts: AtomicUsize::new(0),
            num_slots: AtomicUsize::new(0),
        }
    }

    fn shard(&self, address: &Address) -> &Mutex<Shard> {
        // addresses are hash-derived, the trailing bytes are uniform enough
        let key = u32::from_be_bytes([address[16], address[17], address[18], address[19]]);
        &self.shards[key as usize % self.shards.len()]
    }

    /// Number of distinct accounts recorded so far.
    pub fn num_accounts(&self) -> usize {
        self.num_accounts.load(Ordering::Relaxed)
    }

    /// Number of distinct `(address, slot)` pairs recorded so far.
    pub fn num_slots(&self) -> usize {
        self.num_slots.load(Ordering::Relaxed)
    }

    /// Collapse the shards into a single aggregator.
    ///
    /// This is the synchronization point after all workers have finished.
    pub fn into_aggregator(self) -> Result<Aggregator, BalError> {
        let mut accounts = Shard::default();
        for shard in self.shards.into_vec() {
            // shards hold disjoint addresses
            accounts.merge(shard.into_inner());
        }
        Aggregator::from_parts(self.limits, accounts)
    }
}

impl RecordAccess for &ShardedAggregator {
    fn record(&mut self, event: AccessEvent) -> Result<(), BalError> {
        self.limits.check_event(&event).map_err(limit_exceeded)?;

        let address = event.address();
        let mut shard = self.shard(&address).lock();
        if !shard.contains_key(&address) {
            let count = self.num_accounts.fetch_add(1, Ordering::Relaxed) + 1;
            self.limits.check_accounts(count).map_err(limit_exceeded)?;
        }
        let account = shard.entry(address).or_default();
        if account.apply(event).map_err(limit_exceeded)? {
            let count = self.num_slots.fetch_add(1, Ordering::Relaxed) + 1;
            self.limits.check_slots(count).map_err(limit_exceeded)?;
        }
        Ok(())
    }
}

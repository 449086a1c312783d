//! Block-level pipeline: decode, commit check, execute, canonicalize, validate.

use crate::{
    aggregator::{limit_exceeded, Aggregator, RecordAccess},
    canonical::{canonicalize, PreState},
    codec::{BalCodec, RlpCodec},
    config::BalConfig,
    error::{BalError, LimitError},
    escape::{DeclaredIndex, EscapeSignal, Guarded},
    sharded::ShardedAggregator,
    validator::validate,
};
use bal_primitives::{BlockAccessList, StateOverlay, TxIndex, B256};
use rayon::prelude::*;

/// Runs the transactions of a block one after another.
pub trait TxExecutor {
    /// Load declared state before execution starts.
    fn prefetch(&mut self, _plan: &DeclaredIndex) {}

    /// Execute transaction `tx_index`, reporting every access to `recorder`.
    fn execute(&mut self, tx_index: TxIndex, recorder: &mut dyn RecordAccess)
        -> Result<(), BalError>;
}

impl<F> TxExecutor for F
where
    F: FnMut(TxIndex, &mut dyn RecordAccess) -> Result<(), BalError>,
{
    fn execute(
        &mut self,
        tx_index: TxIndex,
        recorder: &mut dyn RecordAccess,
    ) -> Result<(), BalError> {
        self(tx_index, recorder)
    }
}

/// Runs independent transactions of a block from several threads.
pub trait ParallelTxExecutor: Sync {
    /// Load declared state before execution starts.
    fn prefetch(&self, _plan: &DeclaredIndex) {}

    /// Execute transaction `tx_index`, reporting every access to `recorder`.
    fn execute(&self, tx_index: TxIndex, recorder: &mut dyn RecordAccess) -> Result<(), BalError>;
}

impl<F> ParallelTxExecutor for F
where
    F: Fn(TxIndex, &mut dyn RecordAccess) -> Result<(), BalError> + Sync,
{
    fn execute(&self, tx_index: TxIndex, recorder: &mut dyn RecordAccess) -> Result<(), BalError> {
        self(tx_index, recorder)
    }
}

/// An access list that passed every check for its block.
///
/// Only a successful [`run`] or [`run_parallel`] produces one, so applying its
/// [`post_state`](Self::post_state) is the all-or-nothing commit of the block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedAccessList {
    bal: BlockAccessList,
    digest: B256,
}

impl VerifiedAccessList {
    /// The validated list.
    pub fn access_list(&self) -> &BlockAccessList {
        &self.bal
    }

    /// Its header commitment.
    pub fn digest(&self) -> B256 {
        self.digest
    }

    /// State changes of the whole block.
    pub fn post_state(&self) -> StateOverlay {
        self.bal.post_state()
    }

    /// Take the list out.
    pub fn into_inner(self) -> BlockAccessList {
        self.bal
    }
}

/// Decoded declared list and everything derived from it before execution.
#[derive(Debug)]
struct Declared {
    bal: BlockAccessList,
    index: DeclaredIndex,
    digest: B256,
}

fn ingest(
    declared: &[u8],
    header_digest: B256,
    num_txs: usize,
    config: &BalConfig,
) -> Result<Declared, BalError> {
    if num_txs > config.limits.max_txs || num_txs > TxIndex::MAX as usize + 1 {
        return Err(limit_exceeded(LimitError::TooManyTransactions {
            tx_index: num_txs,
            max: config.limits.max_txs,
        }));
    }

    let codec = RlpCodec::new(config.limits);
    let bal = codec.decode(declared)?;
    let digest = codec.digest(&bal);
    if digest != header_digest {
        dev_error!("digest mismatch: header={header_digest}, computed={digest}");
        return Err(BalError::DigestMismatch {
            header: header_digest,
            computed: digest,
        });
    }
    let index = DeclaredIndex::new(&bal);
    dev_debug!(
        "declared access list: {} accounts, {} slots",
        index.num_accounts(),
        bal.num_slots()
    );
    Ok(Declared { bal, index, digest })
}

fn finish<P: PreState + Sync>(
    declared: Declared,
    aggregator: Aggregator,
    pre_state: &P,
    config: &BalConfig,
) -> Result<VerifiedAccessList, BalError> {
    let computed = canonicalize(aggregator, pre_state, config)?;
    validate(&declared.bal, &computed)?;
    dev_info!("access list verified: {}", computed.stats());
    Ok(VerifiedAccessList {
        bal: computed,
        digest: declared.digest,
    })
}

/// Verify the declared access list of a block by executing it sequentially.
///
/// `declared` are the access list bytes of the block body and `header_digest`
/// the commitment from its header. Transactions `0..num_txs` are handed to
/// `executor` in order. With `fail_fast` execution stops at the first access
/// outside the declared list, which is reported as a completeness violation.
#[cfg_attr(feature = "dev", tracing::instrument(skip_all, fields(num_txs = num_txs), err))]
pub fn run<P, E>(
    declared: &[u8],
    header_digest: B256,
    num_txs: usize,
    config: &BalConfig,
    pre_state: &P,
    executor: &mut E,
) -> Result<VerifiedAccessList, BalError>
where
    P: PreState + Sync,
    E: TxExecutor + ?Sized,
{
    let declared = ingest(declared, header_digest, num_txs, config)?;
    executor.prefetch(&declared.index);

    let mut aggregator = Aggregator::new(config.limits);
    let signal = EscapeSignal::default();
    for tx_index in 0..num_txs as u32 {
        let tx_index = tx_index as TxIndex;
        let result = if config.fail_fast {
            let mut guarded = Guarded::new(
                &mut aggregator,
                &declared.index,
                signal.clone(),
                config.track_reads,
            );
            executor.execute(tx_index, &mut guarded)
        } else {
            executor.execute(tx_index, &mut aggregator)
        };
        result.map_err(BalError::into_completeness)?;
    }

    finish(declared, aggregator, pre_state, config)
}

/// Verify the declared access list of a block with parallel workers.
///
/// Transactions are spread over the rayon pool and record into an
/// address-sharded aggregator. Once a worker escapes the declared list the
/// remaining transactions are abandoned and the lowest escaping transaction
/// among those that ran is reported.
#[cfg_attr(feature = "dev", tracing::instrument(skip_all, fields(num_txs = num_txs), err))]
pub fn run_parallel<P, E>(
    declared: &[u8],
    header_digest: B256,
    num_txs: usize,
    config: &BalConfig,
    pre_state: &P,
    executor: &E,
) -> Result<VerifiedAccessList, BalError>
where
    P: PreState + Sync,
    E: ParallelTxExecutor + ?Sized,
{
    let declared = ingest(declared, header_digest, num_txs, config)?;
    executor.prefetch(&declared.index);

    let sharded = ShardedAggregator::new(config.limits);
    let signal = EscapeSignal::default();
    let executed = (0..num_txs as u32).into_par_iter().try_for_each(|tx_index| {
        let tx_index = tx_index as TxIndex;
        if signal.is_raised() {
            dev_trace!("abandoning tx {tx_index}");
            return Ok(());
        }
        let mut handle = &sharded;
        if config.fail_fast {
            let mut guarded = Guarded::new(
                &mut handle,
                &declared.index,
                signal.clone(),
                config.track_reads,
            );
            executor.execute(tx_index, &mut guarded)
        } else {
            executor.execute(tx_index, &mut handle)
        }
    });
    // report the lowest escape whatever worker noticed first
    if let Some(escape) = signal.first() {
        return Err(BalError::EarlyEscape(escape).into_completeness());
    }
    executed?;

    let aggregator = measure_duration!("shard merge", sharded.into_aggregator())?;
    finish(declared, aggregator, pre_state, config)
}

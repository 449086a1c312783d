//! Block Access List core library.
//!
//! Execution events flow through an [`Aggregator`] (or a [`ShardedAggregator`]
//! for parallel workers), are turned into the canonical list by
//! [`canonicalize`], and compared against a block's declared list by
//! [`validate`]. [`verifier::run`] ties the steps together for one block.

#[macro_use]
extern crate bal_helpers;

mod aggregator;
pub use aggregator::{Aggregator, RecordAccess};

mod canonical;
pub use canonical::{canonicalize, PreState};

mod codec;
pub use codec::{keccak256, BalCodec, RlpCodec};

mod config;
pub use config::{BalConfig, BalLimits};

mod error;
pub use error::{BalError, Discrepancy, Escape, LimitError, Presence};

mod escape;
pub use escape::{DeclaredIndex, EscapeSignal, Guarded};

mod event;
pub use event::AccessEvent;

mod sharded;
pub use sharded::ShardedAggregator;

pub mod trace;
pub use trace::{AccountState, TxStateDiff};

mod validator;
pub use validator::{diff, validate};

pub mod verifier;
pub use verifier::{ParallelTxExecutor, TxExecutor, VerifiedAccessList};

#[cfg(test)]
#[ctor::ctor]
fn init() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

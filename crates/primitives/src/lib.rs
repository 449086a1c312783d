//! Block Access List primitives library.
//!
//! The types in [`types`] are the canonical, strictly ordered form of a block
//! access list. Everything that builds one (the aggregator) or consumes one
//! (validator, codec, state reconstruction) lives on top of these.

pub mod constants;
mod delta;
pub use delta::{BalanceDelta, DeltaOutOfRange};
mod ordering;
pub use ordering::OrderingError;
mod state;
pub use state::{AccountOverlay, StateOverlay};
mod stats;
pub use stats::BalStats;
/// Types definition
pub mod types;
pub use types::{
    AccountChanges, BalanceChange, BlockAccessList, ChangeKind, CodeChange, NonceChange,
    SlotChanges, SlotRead, StorageChange,
};

pub use alloy_primitives;
pub use alloy_primitives::{Address, Bytes, B256, U256};
pub use alloy_rlp;

/// Zero-based position of a transaction within its block.
pub type TxIndex = u16;
/// Storage slot key.
pub type StorageKey = B256;
/// Storage slot value.
pub type StorageValue = B256;
/// Account nonce.
pub type Nonce = u64;

//! Umbrella crate for the Block Access List library.
//!
//! ```
//! use bal::core::{canonicalize, validate, Aggregator, BalCodec, BalConfig, RecordAccess, RlpCodec};
//! use bal::primitives::{Address, BalanceDelta};
//!
//! let mut agg = Aggregator::default();
//! agg.record_balance_delta(Address::with_last_byte(1), BalanceDelta::from(-5i64), 0)?;
//! agg.record_balance_delta(Address::with_last_byte(2), BalanceDelta::from(5i64), 0)?;
//!
//! let bal = canonicalize(agg, &(), &BalConfig::default())?;
//! let codec = RlpCodec::default();
//! let declared = codec.decode(&codec.encode(&bal))?;
//! validate(&declared, &bal)?;
//! # Ok::<(), bal::core::BalError>(())
//! ```

pub use bal_core as core;
pub use bal_kv as kv;
pub use bal_primitives as primitives;

pub use bal_helpers::{dev_debug, dev_error, dev_info, dev_trace, dev_warn, measure_duration};

use crate::{error::LimitError, event::AccessEvent};
use bal_primitives::{constants, BlockAccessList, TxIndex};

/// Protocol maxima for one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BalLimits {
    /// Transactions per block; every `tx_index` must be below this.
    pub max_txs: usize,
    /// Distinct `(address, slot)` pairs per block.
    pub max_slots: usize,
    /// Distinct accounts per block.
    pub max_accounts: usize,
    /// Deployed code size in bytes.
    pub max_code_size: usize,
}

impl Default for BalLimits {
    fn default() -> Self {
        Self {
            max_txs: constants::MAX_TXS,
            max_slots: constants::MAX_SLOTS,
            max_accounts: constants::MAX_ACCOUNTS,
            max_code_size: constants::MAX_CODE_SIZE,
        }
    }
}

impl BalLimits {
    /// Limits that never trigger.
    pub const UNLIMITED: Self = Self {
        max_txs: TxIndex::MAX as usize + 1,
        max_slots: usize::MAX,
        max_accounts: usize::MAX,
        max_code_size: usize::MAX,
    };

    /// Check the parts of an event that do not depend on accumulated state.
    pub(crate) fn check_event(&self, event: &AccessEvent) -> Result<(), LimitError> {
        self.check_tx_index(event.tx_index())?;
        if let AccessEvent::Code { address, code, .. } = event {
            if code.len() > self.max_code_size {
                return Err(LimitError::CodeTooLarge {
                    address: *address,
                    size: code.len(),
                    max: self.max_code_size,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn check_tx_index(&self, tx_index: TxIndex) -> Result<(), LimitError> {
        if tx_index as usize >= self.max_txs {
            return Err(LimitError::TooManyTransactions {
                tx_index: tx_index as usize,
                max: self.max_txs,
            });
        }
        Ok(())
    }

    pub(crate) fn check_accounts(&self, count: usize) -> Result<(), LimitError> {
        if count > self.max_accounts {
            return Err(LimitError::TooManyAccounts {
                count,
                max: self.max_accounts,
            });
        }
        Ok(())
    }

    pub(crate) fn check_slots(&self, count: usize) -> Result<(), LimitError> {
        if count > self.max_slots {
            return Err(LimitError::TooManySlots {
                count,
                max: self.max_slots,
            });
        }
        Ok(())
    }

    /// Check a complete access list, e.g. one decoded from a block body.
    pub fn check(&self, bal: &BlockAccessList) -> Result<(), LimitError> {
        self.check_accounts(bal.len())?;
        self.check_slots(bal.num_slots())?;
        for account in bal {
            if let Some(tx_index) = account.tx_indices().max() {
                self.check_tx_index(tx_index)?;
            }
            if let Some(code) = account
                .code_changes
                .iter()
                .find(|c| c.new_code.len() > self.max_code_size)
            {
                return Err(LimitError::CodeTooLarge {
                    address: account.address,
                    size: code.new_code.len(),
                    max: self.max_code_size,
                });
            }
        }
        Ok(())
    }
}

/// Per-block behavior of the aggregator, canonicalizer and verifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BalConfig {
    /// Emit `storage_reads` and accounts that were only touched.
    ///
    /// When off, read-only slots are never listed and accounts without any
    /// change are omitted.
    pub track_reads: bool,
    /// Abort execution on the first access outside the declared list.
    pub fail_fast: bool,
    /// Cardinality limits.
    pub limits: BalLimits,
}

impl Default for BalConfig {
    fn default() -> Self {
        Self {
            track_reads: true,
            fail_fast: true,
            limits: BalLimits::default(),
        }
    }
}

impl BalConfig {
    /// Set `track_reads`.
    pub fn with_track_reads(mut self, track_reads: bool) -> Self {
        self.track_reads = track_reads;
        self
    }

    /// Set `fail_fast`.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Replace the limits.
    pub fn with_limits(mut self, limits: BalLimits) -> Self {
        self.limits = limits;
        self
    }
}

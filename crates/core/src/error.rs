use bal_primitives::{Address, ChangeKind, OrderingError, StorageKey, TxIndex, B256};
use std::{error::Error, fmt};

/// A protocol maximum was exceeded.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    /// A `tx_index` at or above the transaction limit.
    #[error("tx index {tx_index} exceeds the limit of {max} transactions")]
    TooManyTransactions {
        /// Offending index or transaction count.
        tx_index: usize,
        /// Configured limit.
        max: usize,
    },
    /// Too many distinct `(address, slot)` pairs.
    #[error("{count} distinct slots exceed the limit of {max}")]
    TooManySlots {
        /// Count reached.
        count: usize,
        /// Configured limit.
        max: usize,
    },
    /// Too many distinct accounts.
    #[error("{count} distinct accounts exceed the limit of {max}")]
    TooManyAccounts {
        /// Count reached.
        count: usize,
        /// Configured limit.
        max: usize,
    },
    /// Deployed code above the contract size limit.
    #[error("code of {address} is {size} bytes, above the limit of {max}")]
    CodeTooLarge {
        /// Deploying account.
        address: Address,
        /// Code size.
        size: usize,
        /// Configured limit.
        max: usize,
    },
    /// A net balance change that does not fit in the 12-byte delta.
    #[error("balance delta of {address} at tx {tx_index} does not fit in 96 bits")]
    BalanceDeltaOverflow {
        /// Account.
        address: Address,
        /// Transaction.
        tx_index: TxIndex,
    },
}

/// How the declared list differs from the computed one at a location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Presence {
    /// Present in the computed list, absent from the declared one.
    Missing,
    /// Present in the declared list, absent from the computed one.
    Extra,
    /// Present in both with different values.
    Mismatch,
}

/// One location where a declared access list disagrees with execution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Discrepancy {
    /// Account.
    pub address: Address,
    /// Slot, for storage entries.
    pub slot: Option<StorageKey>,
    /// List the entry belongs to, `None` for the account entry itself.
    pub kind: Option<ChangeKind>,
    /// Transaction, for change entries.
    pub tx_index: Option<TxIndex>,
    /// Missing, extra or differing.
    pub presence: Presence,
}

impl Discrepancy {
    pub(crate) fn account(address: Address, presence: Presence) -> Self {
        Self {
            address,
            slot: None,
            kind: None,
            tx_index: None,
            presence,
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let presence = match self.presence {
            Presence::Missing => "missing from declared list",
            Presence::Extra => "extra in declared list",
            Presence::Mismatch => "differs from execution",
        };
        match self.kind {
            Some(kind) => write!(f, "{kind} entry of {}", self.address)?,
            None => write!(f, "account {}", self.address)?,
        }
        if let Some(slot) = self.slot {
            write!(f, " slot {slot}")?;
        }
        if let Some(tx_index) = self.tx_index {
            write!(f, " at tx {tx_index}")?;
        }
        write!(f, " {presence}")
    }
}

impl Error for Discrepancy {}

/// Execution touched state the declared list does not mention.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[error("tx {tx_index} accessed undeclared {address}{}", .slot.map(|s| format!(" slot {s}")).unwrap_or_default())]
pub struct Escape {
    /// Account.
    pub address: Address,
    /// Slot, for storage accesses.
    pub slot: Option<StorageKey>,
    /// Kind of change the access produced, `None` for a plain touch.
    pub kind: Option<ChangeKind>,
    /// Transaction that made the access.
    pub tx_index: TxIndex,
}

impl From<Escape> for Discrepancy {
    fn from(escape: Escape) -> Self {
        Self {
            address: escape.address,
            slot: escape.slot,
            kind: escape.kind,
            tx_index: Some(escape.tx_index),
            presence: Presence::Missing,
        }
    }
}

/// Errors that make a block's access list invalid.
///
/// Every variant is a deterministic function of the block contents.
#[derive(Debug, thiserror::Error)]
pub enum BalError {
    /// A protocol maximum was exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(#[from] LimitError),
    /// The declared list is not in canonical order.
    #[error("ordering violation: {0}")]
    OrderingViolation(#[from] OrderingError),
    /// The declared list does not match execution.
    #[error("completeness violation: {0}")]
    CompletenessViolation(#[from] Discrepancy),
    /// Header commitment does not match the declared list.
    #[error("digest mismatch: header={header}, computed={computed}")]
    DigestMismatch {
        /// Digest carried in the header.
        header: B256,
        /// Digest of the decoded declared list.
        computed: B256,
    },
    /// Execution left the declared list before finishing.
    #[error("early escape: {0}")]
    EarlyEscape(#[from] Escape),
    /// Declared bytes are not a well-formed access list.
    #[error("malformed access list: {0}")]
    Codec(#[from] alloy_rlp::Error),
    /// The execution engine failed.
    #[error("execution of tx {tx_index} failed: {source}")]
    Execution {
        /// Transaction.
        tx_index: TxIndex,
        /// Engine error.
        source: Box<dyn Error + Send + Sync>,
    },
}

impl BalError {
    /// Wrap an execution engine error.
    pub fn execution<E: Error + Send + Sync + 'static>(tx_index: TxIndex, err: E) -> Self {
        dev_error!("execution of tx {tx_index} failed: {err}");
        BalError::Execution {
            tx_index,
            source: Box::new(err),
        }
    }

    /// Turn an early escape into the completeness violation it implies.
    pub fn into_completeness(self) -> Self {
        match self {
            BalError::EarlyEscape(escape) => BalError::CompletenessViolation(escape.into()),
            other => other,
        }
    }

    /// The discrepancy behind a completeness violation.
    pub fn discrepancy(&self) -> Option<&Discrepancy> {
        match self {
            BalError::CompletenessViolation(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_becomes_missing_entry() {
        let escape = Escape {
            address: Address::with_last_byte(7),
            slot: Some(B256::with_last_byte(1)),
            kind: Some(ChangeKind::StorageRead),
            tx_index: 4,
        };
        let err = BalError::EarlyEscape(escape).into_completeness();
        let discrepancy = err.discrepancy().unwrap();
        assert_eq!(discrepancy.presence, Presence::Missing);
        assert_eq!(discrepancy.tx_index, Some(4));
        assert_eq!(discrepancy.slot, Some(B256::with_last_byte(1)));
    }

    #[test]
    fn messages_name_the_location() {
        let d = Discrepancy {
            address: Address::ZERO,
            slot: None,
            kind: Some(ChangeKind::Balance),
            tx_index: Some(3),
            presence: Presence::Extra,
        };
        let msg = BalError::from(d).to_string();
        assert!(msg.starts_with("completeness violation: balance entry of"));
        assert!(msg.ends_with("at tx 3 extra in declared list"));
    }
}

use bal_primitives::{Address, BalanceDelta, Bytes, ChangeKind, Nonce, StorageKey, StorageValue, TxIndex};

/// One state access reported by the execution engine.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum AccessEvent {
    /// A slot was read and held `value` at that point of the transaction.
    Read {
        /// Account.
        address: Address,
        /// Slot.
        slot: StorageKey,
        /// Observed value.
        value: StorageValue,
        /// Transaction.
        tx_index: TxIndex,
    },
    /// A slot was written.
    Write {
        /// Account.
        address: Address,
        /// Slot.
        slot: StorageKey,
        /// Value after the write.
        value: StorageValue,
        /// Transaction.
        tx_index: TxIndex,
    },
    /// The value a slot held before the transaction started.
    Original {
        /// Account.
        address: Address,
        /// Slot.
        slot: StorageKey,
        /// Value before the transaction.
        value: StorageValue,
        /// Transaction.
        tx_index: TxIndex,
    },
    /// A balance changed.
    BalanceDelta {
        /// Account.
        address: Address,
        /// Signed change.
        delta: BalanceDelta,
        /// Transaction.
        tx_index: TxIndex,
    },
    /// A nonce was set.
    Nonce {
        /// Account.
        address: Address,
        /// Nonce after the change.
        nonce: Nonce,
        /// Transaction.
        tx_index: TxIndex,
    },
    /// Code was deployed.
    Code {
        /// Account.
        address: Address,
        /// Deployed bytecode.
        code: Bytes,
        /// Transaction.
        tx_index: TxIndex,
    },
    /// An account was accessed without a state change.
    Touch {
        /// Account.
        address: Address,
        /// Transaction.
        tx_index: TxIndex,
    },
}

impl AccessEvent {
    /// Account the event belongs to.
    pub fn address(&self) -> Address {
        match self {
            AccessEvent::Read { address, .. }
            | AccessEvent::Write { address, .. }
            | AccessEvent::Original { address, .. }
            | AccessEvent::BalanceDelta { address, .. }
            | AccessEvent::Nonce { address, .. }
            | AccessEvent::Code { address, .. }
            | AccessEvent::Touch { address, .. } => *address,
        }
    }

    /// Transaction that produced the event.
    pub fn tx_index(&self) -> TxIndex {
        match self {
            AccessEvent::Read { tx_index, .. }
            | AccessEvent::Write { tx_index, .. }
            | AccessEvent::Original { tx_index, .. }
            | AccessEvent::BalanceDelta { tx_index, .. }
            | AccessEvent::Nonce { tx_index, .. }
            | AccessEvent::Code { tx_index, .. }
            | AccessEvent::Touch { tx_index, .. } => *tx_index,
        }
    }

    /// Slot, for storage events.
    pub fn slot(&self) -> Option<StorageKey> {
        match self {
            AccessEvent::Read { slot, .. }
            | AccessEvent::Write { slot, .. }
            | AccessEvent::Original { slot, .. } => Some(*slot),
            _ => None,
        }
    }

    /// List of the access list this event can end up in, `None` for a touch.
    pub fn kind(&self) -> Option<ChangeKind> {
        match self {
            AccessEvent::Read { .. } | AccessEvent::Original { .. } => Some(ChangeKind::StorageRead),
            AccessEvent::Write { .. } => Some(ChangeKind::Storage),
            AccessEvent::BalanceDelta { .. } => Some(ChangeKind::Balance),
            AccessEvent::Nonce { .. } => Some(ChangeKind::Nonce),
            AccessEvent::Code { .. } => Some(ChangeKind::Code),
            AccessEvent::Touch { .. } => None,
        }
    }
}

//! Canonical block access list structure.
//!
//! Field order in every struct is the wire order. All lists are expected to be
//! strictly ascending by their key (address, slot or `tx_index`), see
//! [`BlockAccessList::check_ordering`].

use crate::{BalanceDelta, Nonce, StorageKey, StorageValue, TxIndex};
use alloy_primitives::{Address, Bytes};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable, RlpEncodableWrapper};
use std::fmt;

/// A write that changed a slot's value at `tx_index`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageChange {
    /// Transaction that performed the write.
    pub tx_index: TxIndex,
    /// Slot value after the transaction.
    pub new_value: StorageValue,
}

/// All value-changing writes to one slot across the block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotChanges {
    /// Storage slot.
    pub slot: StorageKey,
    /// Writes ordered by `tx_index`.
    pub changes: Vec<StorageChange>,
}

/// A slot that was accessed but never changed. Encoded as the bare slot.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    RlpEncodableWrapper,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SlotRead {
    /// Storage slot.
    pub slot: StorageKey,
}

impl Decodable for SlotRead {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Ok(Self {
            slot: Decodable::decode(buf)?,
        })
    }
}

/// Net balance change of an account in one transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BalanceChange {
    /// Transaction that changed the balance.
    pub tx_index: TxIndex,
    /// Signed change.
    pub delta: BalanceDelta,
}

/// Nonce of an account after one transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NonceChange {
    /// Transaction that bumped the nonce.
    pub tx_index: TxIndex,
    /// Nonce after the transaction.
    pub new_nonce: Nonce,
}

/// Code of an account after one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodeChange {
    /// Transaction that deployed the code.
    pub tx_index: TxIndex,
    /// Deployed bytecode.
    pub new_code: Bytes,
}

/// Everything one account contributed to the block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccountChanges {
    /// Account address.
    pub address: Address,
    /// Changed slots, ascending by slot.
    pub storage_changes: Vec<SlotChanges>,
    /// Read-only slots, ascending, disjoint from `storage_changes`.
    pub storage_reads: Vec<SlotRead>,
    /// Balance changes, ascending by `tx_index`.
    pub balance_changes: Vec<BalanceChange>,
    /// Nonce changes, ascending by `tx_index`.
    pub nonce_changes: Vec<NonceChange>,
    /// Code changes, ascending by `tx_index`.
    pub code_changes: Vec<CodeChange>,
}

impl AccountChanges {
    /// An account entry with all lists empty.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    /// Whether all five lists are empty, i.e. the account was only touched.
    pub fn is_empty(&self) -> bool {
        self.storage_changes.is_empty()
            && self.storage_reads.is_empty()
            && self.balance_changes.is_empty()
            && self.nonce_changes.is_empty()
            && self.code_changes.is_empty()
    }

    /// Changes of `slot`, assuming canonical order.
    pub fn slot_changes(&self, slot: &StorageKey) -> Option<&SlotChanges> {
        self.storage_changes
            .binary_search_by(|s| s.slot.cmp(slot))
            .ok()
            .map(|idx| &self.storage_changes[idx])
    }

    /// Whether `slot` appears as a read, assuming canonical order.
    pub fn is_read(&self, slot: &StorageKey) -> bool {
        self.storage_reads
            .binary_search_by(|r| r.slot.cmp(slot))
            .is_ok()
    }

    /// All slots this account touched, written ones first.
    pub fn accessed_slots(&self) -> impl Iterator<Item = &StorageKey> + '_ {
        self.storage_changes
            .iter()
            .map(|s| &s.slot)
            .chain(self.storage_reads.iter().map(|r| &r.slot))
    }

    /// Number of distinct slots this account touched.
    pub fn num_slots(&self) -> usize {
        self.storage_changes.len() + self.storage_reads.len()
    }

    /// Every `tx_index` mentioned by any list of this account.
    pub fn tx_indices(&self) -> impl Iterator<Item = TxIndex> + '_ {
        self.storage_changes
            .iter()
            .flat_map(|s| s.changes.iter().map(|c| c.tx_index))
            .chain(self.balance_changes.iter().map(|c| c.tx_index))
            .chain(self.nonce_changes.iter().map(|c| c.tx_index))
            .chain(self.code_changes.iter().map(|c| c.tx_index))
    }
}

/// The canonical record of all accounts accessed or changed by a block.
///
/// Encoded as the bare list of accounts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, RlpEncodableWrapper)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct BlockAccessList {
    /// Accounts ascending by address.
    pub accounts: Vec<AccountChanges>,
}

impl Decodable for BlockAccessList {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Ok(Self {
            accounts: Decodable::decode(buf)?,
        })
    }
}

impl BlockAccessList {
    /// Wrap a list of accounts without checking or sorting it.
    pub fn new(accounts: Vec<AccountChanges>) -> Self {
        Self { accounts }
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the block touched no account at all.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Iterate accounts in order.
    pub fn iter(&self) -> std::slice::Iter<'_, AccountChanges> {
        self.accounts.iter()
    }

    /// Entry of `address`, assuming canonical order.
    pub fn account(&self, address: &Address) -> Option<&AccountChanges> {
        self.accounts
            .binary_search_by(|a| a.address.cmp(address))
            .ok()
            .map(|idx| &self.accounts[idx])
    }

    /// Number of distinct `(address, slot)` pairs across the block.
    pub fn num_slots(&self) -> usize {
        self.accounts.iter().map(AccountChanges::num_slots).sum()
    }
}

impl<'a> IntoIterator for &'a BlockAccessList {
    type Item = &'a AccountChanges;
    type IntoIter = std::slice::Iter<'a, AccountChanges>;

    fn into_iter(self) -> Self::IntoIter {
        self.accounts.iter()
    }
}

impl FromIterator<AccountChanges> for BlockAccessList {
    fn from_iter<T: IntoIterator<Item = AccountChanges>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// The per-kind lists of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ChangeKind {
    /// `storage_changes`
    Storage,
    /// `storage_reads`
    StorageRead,
    /// `balance_changes`
    Balance,
    /// `nonce_changes`
    Nonce,
    /// `code_changes`
    Code,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Storage => "storage",
            ChangeKind::StorageRead => "storage read",
            ChangeKind::Balance => "balance",
            ChangeKind::Nonce => "nonce",
            ChangeKind::Code => "code",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};
    use alloy_rlp::{Decodable, Encodable};

    fn sample() -> BlockAccessList {
        let mut account = AccountChanges::new(address!("00000000000000000000000000000000000000aa"));
        account.storage_changes.push(SlotChanges {
            slot: b256!("0000000000000000000000000000000000000000000000000000000000000001"),
            changes: vec![StorageChange {
                tx_index: 3,
                new_value: b256!("00000000000000000000000000000000000000000000000000000000000000ff"),
            }],
        });
        account.storage_reads.push(SlotRead {
            slot: b256!("0000000000000000000000000000000000000000000000000000000000000002"),
        });
        account.balance_changes.push(BalanceChange {
            tx_index: 3,
            delta: BalanceDelta::from(-21_000i64),
        });
        BlockAccessList::new(vec![account])
    }

    #[test]
    fn rlp_decodes_what_it_encodes() {
        let bal = sample();
        let mut buf = Vec::new();
        bal.encode(&mut buf);
        assert_eq!(buf.len(), bal.length());
        let decoded = BlockAccessList::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, bal);
    }

    #[test]
    fn wrappers_are_bare_on_the_wire() {
        let read = SlotRead {
            slot: b256!("0000000000000000000000000000000000000000000000000000000000000002"),
        };
        let mut buf = Vec::new();
        read.encode(&mut buf);
        assert_eq!(buf[0], 0x80 + 32);
        assert_eq!(SlotRead::decode(&mut buf.as_slice()).unwrap(), read);

        let mut buf = Vec::new();
        BlockAccessList::default().encode(&mut buf);
        assert_eq!(buf, [0xc0]);
        let mut rest = buf.as_slice();
        assert_eq!(BlockAccessList::decode(&mut rest).unwrap(), BlockAccessList::default());
        assert!(rest.is_empty());
    }

    #[test]
    fn lookups_use_canonical_order() {
        let bal = sample();
        let account = bal
            .account(&address!("00000000000000000000000000000000000000aa"))
            .unwrap();
        assert!(account.slot_changes(&b256!("0000000000000000000000000000000000000000000000000000000000000001")).is_some());
        assert!(account.is_read(&b256!("0000000000000000000000000000000000000000000000000000000000000002")));
        assert_eq!(account.num_slots(), 2);
        assert_eq!(account.tx_indices().collect::<Vec<_>>(), vec![3, 3]);
        assert!(bal.account(&Address::ZERO).is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_uses_hex_and_decimal_delta() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json[0]["balance_changes"][0]["delta"], "-21000");
        assert_eq!(
            json[0]["storage_reads"][0],
            "0x0000000000000000000000000000000000000000000000000000000000000002"
        );
        let back: BlockAccessList = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }
}

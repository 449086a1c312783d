//! Canonical serialization and the header commitment.

use crate::{aggregator::limit_exceeded, config::BalLimits, error::BalError};
use alloy_rlp::{Decodable, Encodable};
use auto_impl::auto_impl;
use bal_primitives::{BlockAccessList, B256};
use tiny_keccak::{Hasher, Keccak};

/// A deterministic, round-trip-exact encoding of access lists.
///
/// Decoding never reorders: bytes describing a non-canonical list are rejected.
#[auto_impl(&, Box, Arc)]
pub trait BalCodec {
    /// Canonical bytes of `bal`.
    fn encode(&self, bal: &BlockAccessList) -> Vec<u8>;

    /// Parse bytes produced by [`BalCodec::encode`], checking order and limits.
    fn decode(&self, bytes: &[u8]) -> Result<BlockAccessList, BalError>;

    /// Commitment to the canonical bytes, the value carried in the block header.
    fn digest(&self, bal: &BlockAccessList) -> B256 {
        keccak256(&self.encode(bal))
    }
}

/// Keccak-256 of `bytes`.
pub fn keccak256(bytes: &[u8]) -> B256 {
    let mut output = [0u8; 32];
    let mut hasher = Keccak::v256();
    hasher.update(bytes);
    hasher.finalize(&mut output);
    B256::from(output)
}

/// RLP encoding of the access list structure.
#[derive(Clone, Copy, Debug, Default)]
pub struct RlpCodec {
    limits: BalLimits,
}

impl RlpCodec {
    /// Codec enforcing `limits` when decoding.
    pub fn new(limits: BalLimits) -> Self {
        Self { limits }
    }
}

impl BalCodec for RlpCodec {
    fn encode(&self, bal: &BlockAccessList) -> Vec<u8> {
        let mut out = Vec::with_capacity(bal.length());
        bal.encode(&mut out);
        out
    }

    fn decode(&self, bytes: &[u8]) -> Result<BlockAccessList, BalError> {
        let mut buf = bytes;
        let bal = BlockAccessList::decode(&mut buf).inspect_err(|_e| {
            dev_error!("malformed access list: {_e}");
        })?;
        if !buf.is_empty() {
            dev_error!("{} trailing bytes after access list", buf.len());
            return Err(alloy_rlp::Error::Custom("trailing bytes after access list").into());
        }
        self.limits.check(&bal).map_err(limit_exceeded)?;
        bal.check_ordering().inspect_err(|_e| {
            dev_error!("declared access list out of order: {_e}");
        })?;
        Ok(bal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bal_primitives::{
        AccountChanges, Address, BalanceChange, BalanceDelta, Bytes, CodeChange, SlotChanges,
        SlotRead, StorageChange,
    };

    fn bal() -> BlockAccessList {
        let mut a = AccountChanges::new(Address::with_last_byte(1));
        a.storage_changes.push(SlotChanges {
            slot: B256::with_last_byte(1),
            changes: vec![StorageChange {
                tx_index: 1,
                new_value: B256::with_last_byte(1),
            }],
        });
        a.storage_reads.push(SlotRead {
            slot: B256::with_last_byte(2),
        });
        a.code_changes.push(CodeChange {
            tx_index: 1,
            new_code: Bytes::from_static(&[0xfe]),
        });
        let mut b = AccountChanges::new(Address::with_last_byte(2));
        b.balance_changes.push(BalanceChange {
            tx_index: 0,
            delta: BalanceDelta::from(-7i64),
        });
        BlockAccessList::new(vec![a, b, AccountChanges::new(Address::with_last_byte(3))])
    }

    #[test]
    fn encoding_is_exact() {
        let codec = RlpCodec::default();
        let bytes = codec.encode(&bal());
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, bal());
        assert_eq!(codec.encode(&decoded), bytes);
        assert_eq!(codec.digest(&decoded), keccak256(&bytes));
    }

    #[test]
    fn empty_list_digest() {
        // keccak256(rlp([]))
        assert_eq!(
            RlpCodec::default().digest(&BlockAccessList::default()),
            "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347"
                .parse::<B256>()
                .unwrap()
        );
    }

    #[test]
    fn digest_tracks_content() {
        let codec = RlpCodec::default();
        let mut changed = bal();
        changed.accounts[1].balance_changes[0].delta = BalanceDelta::from(-8i64);
        assert_ne!(codec.digest(&changed), codec.digest(&bal()));
    }

    #[test]
    fn unordered_bytes_are_rejected() {
        let codec = RlpCodec::default();
        let mut unordered = bal();
        unordered.accounts.swap(0, 2);
        let bytes = codec.encode(&unordered);
        assert!(matches!(
            codec.decode(&bytes),
            Err(BalError::OrderingViolation(_))
        ));
    }

    #[test]
    fn trailing_and_truncated_bytes_are_rejected() {
        let codec = RlpCodec::default();
        let mut bytes = codec.encode(&bal());
        bytes.push(0x80);
        assert!(matches!(codec.decode(&bytes), Err(BalError::Codec(_))));
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(codec.decode(&bytes), Err(BalError::Codec(_))));
    }

    #[test]
    fn limits_apply_when_decoding() {
        let bytes = RlpCodec::default().encode(&bal());
        let codec = RlpCodec::new(BalLimits {
            max_accounts: 2,
            ..Default::default()
        });
        assert!(matches!(
            codec.decode(&bytes),
            Err(BalError::ResourceLimitExceeded(_))
        ));
    }
}

use alloy_primitives::{FixedBytes, U256};
use alloy_rlp::{Decodable, Encodable};
use std::{fmt, str::FromStr};

/// Signed balance change of one account caused by one transaction.
///
/// The value range is that of a 96-bit two's-complement integer, which is
/// enough to express a transfer of the total supply in either direction. On the
/// wire it is always exactly [`BalanceDelta::BYTES`] big-endian bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BalanceDelta(i128);

impl BalanceDelta {
    /// Encoded width in bytes.
    pub const BYTES: usize = 12;
    /// Largest representable delta, `2^95 - 1`.
    pub const MAX: Self = Self((1i128 << 95) - 1);
    /// Smallest representable delta, `-2^95`.
    pub const MIN: Self = Self(-(1i128 << 95));
    /// No change.
    pub const ZERO: Self = Self(0);

    /// Create a delta, `None` if `value` does not fit in 96 bits.
    pub const fn new(value: i128) -> Option<Self> {
        if value < Self::MIN.0 || value > Self::MAX.0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// The delta as a plain integer.
    #[inline]
    pub const fn get(self) -> i128 {
        self.0
    }

    /// Whether the delta is zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Sum of two deltas, `None` on leaving the 96-bit range.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).and_then(Self::new)
    }

    /// The delta that turns `pre` into `post`.
    pub fn from_balances(pre: U256, post: U256) -> Option<Self> {
        if post >= pre {
            let magnitude = u128::try_from(post - pre).ok()?;
            Self::new(i128::try_from(magnitude).ok()?)
        } else {
            let magnitude = u128::try_from(pre - post).ok()?;
            Self::new(-i128::try_from(magnitude).ok()?)
        }
    }

    /// Apply the delta to a balance, `None` on under- or overflow.
    pub fn apply(self, balance: U256) -> Option<U256> {
        let magnitude = U256::from(self.0.unsigned_abs());
        if self.0 >= 0 {
            balance.checked_add(magnitude)
        } else {
            balance.checked_sub(magnitude)
        }
    }

    /// Big-endian two's-complement encoding.
    pub fn to_be_bytes(self) -> [u8; Self::BYTES] {
        let full = self.0.to_be_bytes();
        let mut out = [0u8; Self::BYTES];
        out.copy_from_slice(&full[16 - Self::BYTES..]);
        out
    }

    /// Decode a big-endian two's-complement value. Every 12-byte pattern is valid.
    pub fn from_be_bytes(bytes: [u8; Self::BYTES]) -> Self {
        let fill = if bytes[0] & 0x80 != 0 { 0xff } else { 0x00 };
        let mut full = [fill; 16];
        full[16 - Self::BYTES..].copy_from_slice(&bytes);
        Self(i128::from_be_bytes(full))
    }
}

/// Error returned when a delta is outside the 96-bit range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("balance delta {0} does not fit in 96 bits")]
pub struct DeltaOutOfRange(pub i128);

impl TryFrom<i128> for BalanceDelta {
    type Error = DeltaOutOfRange;

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(DeltaOutOfRange(value))
    }
}

impl From<i64> for BalanceDelta {
    fn from(value: i64) -> Self {
        Self(value as i128)
    }
}

impl fmt::Display for BalanceDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for BalanceDelta {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i128 = s.parse().map_err(|e| format!("invalid balance delta {s:?}: {e}"))?;
        Self::try_from(value).map_err(|e| e.to_string())
    }
}

impl Encodable for BalanceDelta {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        FixedBytes::<{ BalanceDelta::BYTES }>::from(self.to_be_bytes()).encode(out)
    }

    fn length(&self) -> usize {
        // 12-byte string: one prefix byte plus payload
        1 + BalanceDelta::BYTES
    }
}

impl Decodable for BalanceDelta {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let bytes = FixedBytes::<{ BalanceDelta::BYTES }>::decode(buf)?;
        Ok(Self::from_be_bytes(bytes.0))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for BalanceDelta {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for BalanceDelta {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

//! Protocol bounds, chosen to support a 630M block gas limit.

/// Maximum number of transactions in a block.
pub const MAX_TXS: usize = 30_000;
/// Maximum number of distinct storage slots referenced by a block.
pub const MAX_SLOTS: usize = 300_000;
/// Maximum number of distinct accounts referenced by a block.
pub const MAX_ACCOUNTS: usize = 300_000;
/// Maximum contract bytecode size in bytes.
pub const MAX_CODE_SIZE: usize = 24_576;

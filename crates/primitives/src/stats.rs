use crate::types::BlockAccessList;
use std::fmt;

/// Size summary of a block access list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BalStats {
    /// Number of accounts.
    pub accounts: usize,
    /// Accounts with at least one storage write.
    pub accounts_with_storage_changes: usize,
    /// Accounts with at least one read-only slot.
    pub accounts_with_storage_reads: usize,
    /// Accounts with at least one balance change.
    pub accounts_with_balance_changes: usize,
    /// Accounts with at least one nonce change.
    pub accounts_with_nonce_changes: usize,
    /// Accounts with at least one code change.
    pub accounts_with_code_changes: usize,
    /// Accounts with every list empty.
    pub touched_only_accounts: usize,
    /// Distinct written slots.
    pub changed_slots: usize,
    /// Individual storage changes across all slots.
    pub storage_changes: usize,
    /// Read-only slots.
    pub storage_reads: usize,
    /// Balance changes.
    pub balance_changes: usize,
    /// Nonce changes.
    pub nonce_changes: usize,
    /// Code changes.
    pub code_changes: usize,
    /// Total size of deployed code.
    pub code_bytes: usize,
}

impl BlockAccessList {
    /// Count accounts and entries per kind.
    pub fn stats(&self) -> BalStats {
        let mut stats = BalStats {
            accounts: self.accounts.len(),
            ..Default::default()
        };
        for account in &self.accounts {
            stats.accounts_with_storage_changes += !account.storage_changes.is_empty() as usize;
            stats.accounts_with_storage_reads += !account.storage_reads.is_empty() as usize;
            stats.accounts_with_balance_changes += !account.balance_changes.is_empty() as usize;
            stats.accounts_with_nonce_changes += !account.nonce_changes.is_empty() as usize;
            stats.accounts_with_code_changes += !account.code_changes.is_empty() as usize;
            stats.touched_only_accounts += account.is_empty() as usize;

            stats.changed_slots += account.storage_changes.len();
            stats.storage_changes += account
                .storage_changes
                .iter()
                .map(|s| s.changes.len())
                .sum::<usize>();
            stats.storage_reads += account.storage_reads.len();
            stats.balance_changes += account.balance_changes.len();
            stats.nonce_changes += account.nonce_changes.len();
            stats.code_changes += account.code_changes.len();
            stats.code_bytes += account
                .code_changes
                .iter()
                .map(|c| c.new_code.len())
                .sum::<usize>();
        }
        stats
    }
}

impl fmt::Display for BalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} accounts ({} touched only), {} changed slots with {} writes, {} reads, \
             {} balance, {} nonce, {} code changes ({} bytes)",
            self.accounts,
            self.touched_only_accounts,
            self.changed_slots,
            self.storage_changes,
            self.storage_reads,
            self.balance_changes,
            self.nonce_changes,
            self.code_changes,
            self.code_bytes,
        )
    }
}

use crate::domain::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountFlags {
    pub debits_must_not_exceed_credits: bool,
}

/// Ledger account as returned by `LookupAccounts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub id: Id,
    pub ledger: u32,
    pub code: u16,
    pub flags: AccountFlags,
    pub debits_pending: u64,  // reserved by open holds
    pub debits_posted: u64,   // settled outflows
    pub credits_pending: u64, // incoming, not yet settled
    pub credits_posted: u64,  // settled inflows
}

impl AccountSnapshot {
    pub fn new(id: Id, ledger: u32, code: u16, flags: AccountFlags) -> Self {
        Self {
            id,
            ledger,
            code,
            flags,
            debits_pending: 0,
            debits_posted: 0,
            credits_pending: 0,
            credits_posted: 0,
        }
    }

    /// What a guarded account may still reserve or spend.
    pub fn spendable(&self) -> u64 {
        self.credits_posted
            .saturating_sub(self.debits_posted)
            .saturating_sub(self.debits_pending)
    }
}

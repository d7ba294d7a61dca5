use crate::domain::{Amount, Id};

/// Phase of a ledger transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Posted immediately.
    Single,
    /// Reserves the amount on both accounts without settling it.
    Pending,
    /// Finalizes the transfer named by `pending_id`.
    PostPending,
    /// Releases the transfer named by `pending_id`.
    VoidPending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub id: Id,
    pub pending_id: Option<Id>,
    pub debit_account_id: Id,
    pub credit_account_id: Id,
    pub amount: Amount,
    pub ledger: u32,
    pub code: u16,
    pub kind: TransferKind,
    /// Assigned by the ledger on commit, in microseconds since the epoch.
    pub timestamp: u64,
}

impl Transfer {
    pub fn new(
        id: Id,
        debit_account_id: Id,
        credit_account_id: Id,
        amount: Amount,
        kind: TransferKind,
    ) -> Self {
        Self {
            id,
            pending_id: None,
            debit_account_id,
            credit_account_id,
            amount,
            ledger: 1,
            code: 1,
            kind,
            timestamp: 0,
        }
    }

    pub fn with_pending_id(mut self, pending_id: Id) -> Self {
        self.pending_id = Some(pending_id);
        self
    }

    pub fn with_ledger(mut self, ledger: u32, code: u16) -> Self {
        self.ledger = ledger;
        self.code = code;
        self
    }
}

impl core::fmt::Display for Transfer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.pending_id {
            Some(pending_id) => write!(
                f,
                "{:?},id={},pending={},debit={},credit={},amount={}",
                self.kind,
                self.id,
                pending_id,
                self.debit_account_id,
                self.credit_account_id,
                self.amount
            ),
            None => write!(
                f,
                "{:?},id={},debit={},credit={},amount={}",
                self.kind, self.id, self.debit_account_id, self.credit_account_id, self.amount
            ),
        }
    }
}

use crate::domain::Id;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error("Ingestion failed with: {0}")]
    Ingestion(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Hold creation failed: {0}")]
    HoldCreation(#[source] LedgerError),

    #[error(
        "Settlement ambiguity for hold {hold_id} (saga {saga_id}): {action} failed with: {source}"
    )]
    SettlementAmbiguity {
        hold_id: Id,
        saga_id: String,
        action: &'static str,
        #[source]
        source: LedgerError,
    },

    #[error("Account not found: {0}")]
    NotFound(Id),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Saga {0} was aborted before reporting a result")]
    SagaAborted(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// Failures reported by the ledger gateway.
///
/// Only `Unavailable` and `Timeout` are worth retrying; a rejection is the
/// ledger's final answer for that request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger rejected {id}: {reason}")]
    Rejected { id: Id, reason: RejectReason },

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger call {0} timed out")]
    Timeout(&'static str),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    pub fn rejected(id: Id, reason: RejectReason) -> Self {
        Self::Rejected { id, reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Exists,
    AccountsMustBeDifferent,
    DebitAccountNotFound,
    CreditAccountNotFound,
    AccountsMustHaveSameLedger,
    ExceedsCredits,
    OverflowsDebits,
    OverflowsCredits,
    PendingTransferNotFound,
    PendingTransferNotPending,
    PendingTransferHasDifferentDebitAccount,
    PendingTransferHasDifferentCreditAccount,
    PendingTransferHasDifferentAmount,
    PendingTransferAlreadyPosted,
    PendingTransferAlreadyVoided,
}

impl core::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Exists => "exists",
            Self::AccountsMustBeDifferent => "accounts_must_be_different",
            Self::DebitAccountNotFound => "debit_account_not_found",
            Self::CreditAccountNotFound => "credit_account_not_found",
            Self::AccountsMustHaveSameLedger => "accounts_must_have_the_same_ledger",
            Self::ExceedsCredits => "exceeds_credits",
            Self::OverflowsDebits => "overflows_debits",
            Self::OverflowsCredits => "overflows_credits",
            Self::PendingTransferNotFound => "pending_transfer_not_found",
            Self::PendingTransferNotPending => "pending_transfer_not_pending",
            Self::PendingTransferHasDifferentDebitAccount => {
                "pending_transfer_has_different_debit_account_id"
            }
            Self::PendingTransferHasDifferentCreditAccount => {
                "pending_transfer_has_different_credit_account_id"
            }
            Self::PendingTransferHasDifferentAmount => "pending_transfer_has_different_amount",
            Self::PendingTransferAlreadyPosted => "pending_transfer_already_posted",
            Self::PendingTransferAlreadyVoided => "pending_transfer_already_voided",
        };
        f.write_str(s)
    }
}

use async_trait::async_trait;
use futures::Stream;

use crate::domain::{
    AccountFlags, AccountSnapshot, Amount, Authorization, Command, Error, HoldState, Id,
    LedgerError, Outcome, Transfer,
};

pub trait CommandStream {
    type CmdStream: Stream<Item = Result<Command, Error>> + Send + Unpin + 'static;
    fn stream(&mut self) -> Self::CmdStream;
}

pub trait DeadLetterQueue {
    fn report(&self, error: &Error);
}

pub trait OutputRepository {
    fn record(&mut self, outcome: Outcome);
    fn flush(&mut self);
}

/// Double-entry ledger with two-phase transfers.
///
/// Post and void both reference the pending transfer by `pending_id` and
/// carry a fresh `id` of their own. For any pending transfer at most one of
/// them ever succeeds; the other is rejected.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn create_account(
        &self,
        id: Id,
        ledger: u32,
        code: u16,
        flags: AccountFlags,
    ) -> Result<(), LedgerError>;

    async fn lookup_accounts(&self, ids: &[Id]) -> Result<Vec<AccountSnapshot>, LedgerError>;

    /// Single-phase transfer, posted on commit.
    async fn create_transfer(
        &self,
        id: Id,
        debit_account_id: Id,
        credit_account_id: Id,
        amount: Amount,
    ) -> Result<Id, LedgerError>;

    async fn create_pending_transfer(
        &self,
        id: Id,
        debit_account_id: Id,
        credit_account_id: Id,
        amount: Amount,
    ) -> Result<Id, LedgerError>;

    async fn void_pending_transfer(
        &self,
        id: Id,
        pending_id: Id,
        debit_account_id: Id,
        credit_account_id: Id,
        amount: Amount,
    ) -> Result<(), LedgerError>;

    async fn post_pending_transfer(
        &self,
        id: Id,
        pending_id: Id,
        debit_account_id: Id,
        credit_account_id: Id,
        amount: Amount,
    ) -> Result<(), LedgerError>;

    async fn lookup_transfers(&self, ids: &[Id]) -> Result<Vec<Transfer>, LedgerError>;

    /// Pending transfers that have been neither posted nor voided.
    async fn lookup_pending_transfers(&self) -> Result<Vec<Transfer>, LedgerError>;
}

/// Index of in-flight holds shared by every saga and matcher call.
///
/// Implementations must be safe under concurrent use, and every entry a
/// query observes is either fully present or fully absent.
pub trait AuthorizationRegistry: Send + Sync {
    fn insert(&self, auth: Authorization);

    /// Removing an absent id is a no-op.
    fn delete(&self, id: Id);

    /// Moves a live entry to `state`. Returns false if the id is absent.
    fn set_state(&self, id: Id, state: HoldState) -> bool;

    /// Matching entries ordered ascending by `created_at`, ties by id.
    fn query(&self, account_id: Id, amount: Amount, state: HoldState) -> Vec<Authorization>;

    fn contains(&self, id: Id) -> bool;
}

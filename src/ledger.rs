use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{
    AccountFlags, AccountSnapshot, Amount, Id, LedgerError, LedgerGateway, RejectReason,
    Timestamp, Transfer, TransferKind,
};

#[derive(Default, Debug)]
struct LedgerState {
    accounts: HashMap<Id, AccountSnapshot>,
    transfers: HashMap<Id, Transfer>,
    // pending transfer id -> the kind of transfer that resolved it
    resolutions: HashMap<Id, TransferKind>,
}

/// In-process two-phase ledger. Every call runs under one lock, so each
/// request is atomic the way a ledger batch is.
#[derive(Clone, Default, Debug)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    ledger: u32,
    code: u16,
}

impl MemoryLedger {
    pub fn new(ledger: u32, code: u16) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            ledger,
            code,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transfer(
        &self,
        id: Id,
        debit_account_id: Id,
        credit_account_id: Id,
        amount: Amount,
        kind: TransferKind,
    ) -> Transfer {
        Transfer::new(id, debit_account_id, credit_account_id, amount, kind)
            .with_ledger(self.ledger, self.code)
    }
}

impl LedgerState {
    fn check_new_transfer(&self, transfer: &Transfer) -> Result<(), RejectReason> {
        if self.transfers.contains_key(&transfer.id) {
            return Err(RejectReason::Exists);
        }
        if transfer.debit_account_id == transfer.credit_account_id {
            return Err(RejectReason::AccountsMustBeDifferent);
        }
        let debit = self
            .accounts
            .get(&transfer.debit_account_id)
            .ok_or(RejectReason::DebitAccountNotFound)?;
        let credit = self
            .accounts
            .get(&transfer.credit_account_id)
            .ok_or(RejectReason::CreditAccountNotFound)?;
        if debit.ledger != credit.ledger || debit.ledger != transfer.ledger {
            return Err(RejectReason::AccountsMustHaveSameLedger);
        }
        Ok(())
    }

    fn check_reservation(&self, transfer: &Transfer) -> Result<(), RejectReason> {
        let amount = transfer.amount.as_minor();
        let debit = &self.accounts[&transfer.debit_account_id];
        let credit = &self.accounts[&transfer.credit_account_id];

        if debit.flags.debits_must_not_exceed_credits && debit.spendable() < amount {
            return Err(RejectReason::ExceedsCredits);
        }
        let debit_total = debit
            .debits_pending
            .checked_add(debit.debits_posted)
            .and_then(|t| t.checked_add(amount));
        if debit_total.is_none() {
            return Err(RejectReason::OverflowsDebits);
        }
        let credit_total = credit
            .credits_pending
            .checked_add(credit.credits_posted)
            .and_then(|t| t.checked_add(amount));
        if credit_total.is_none() {
            return Err(RejectReason::OverflowsCredits);
        }
        Ok(())
    }

    /// Validates a post or void against the pending transfer it names.
    fn check_resolution(&self, transfer: &Transfer) -> Result<(), RejectReason> {
        if self.transfers.contains_key(&transfer.id) {
            return Err(RejectReason::Exists);
        }
        let pending_id = transfer
            .pending_id
            .ok_or(RejectReason::PendingTransferNotFound)?;
        let pending = self
            .transfers
            .get(&pending_id)
            .ok_or(RejectReason::PendingTransferNotFound)?;
        if pending.kind != TransferKind::Pending {
            return Err(RejectReason::PendingTransferNotPending);
        }
        match self.resolutions.get(&pending_id) {
            Some(TransferKind::PostPending) => {
                return Err(RejectReason::PendingTransferAlreadyPosted);
            }
            Some(_) => return Err(RejectReason::PendingTransferAlreadyVoided),
            None => {}
        }
        if pending.debit_account_id != transfer.debit_account_id {
            return Err(RejectReason::PendingTransferHasDifferentDebitAccount);
        }
        if pending.credit_account_id != transfer.credit_account_id {
            return Err(RejectReason::PendingTransferHasDifferentCreditAccount);
        }
        if pending.amount != transfer.amount {
            return Err(RejectReason::PendingTransferHasDifferentAmount);
        }
        Ok(())
    }

    fn account_mut(&mut self, id: Id) -> &mut AccountSnapshot {
        self.accounts
            .get_mut(&id)
            .unwrap_or_else(|| unreachable!("account {id} validated before mutation"))
    }

    fn commit(&mut self, mut transfer: Transfer) -> Id {
        let amount = transfer.amount.as_minor();
        let (debit_id, credit_id) = (transfer.debit_account_id, transfer.credit_account_id);

        match transfer.kind {
            TransferKind::Single => {
                self.account_mut(debit_id).debits_posted += amount;
                self.account_mut(credit_id).credits_posted += amount;
            }
            TransferKind::Pending => {
                self.account_mut(debit_id).debits_pending += amount;
                self.account_mut(credit_id).credits_pending += amount;
            }
            TransferKind::PostPending => {
                let debit = self.account_mut(debit_id);
                debit.debits_pending = debit.debits_pending.saturating_sub(amount);
                debit.debits_posted += amount;
                let credit = self.account_mut(credit_id);
                credit.credits_pending = credit.credits_pending.saturating_sub(amount);
                credit.credits_posted += amount;
            }
            TransferKind::VoidPending => {
                let debit = self.account_mut(debit_id);
                debit.debits_pending = debit.debits_pending.saturating_sub(amount);
                let credit = self.account_mut(credit_id);
                credit.credits_pending = credit.credits_pending.saturating_sub(amount);
            }
        }

        if let Some(pending_id) = transfer.pending_id {
            self.resolutions.insert(pending_id, transfer.kind);
        }
        transfer.timestamp = Timestamp::now().0;
        let id = transfer.id;
        self.transfers.insert(id, transfer);
        id
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn create_account(
        &self,
        id: Id,
        ledger: u32,
        code: u16,
        flags: AccountFlags,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock();
        if state.accounts.contains_key(&id) {
            return Err(LedgerError::rejected(id, RejectReason::Exists));
        }
        state
            .accounts
            .insert(id, AccountSnapshot::new(id, ledger, code, flags));
        debug!(account = %id, ledger, code, "account created");
        Ok(())
    }

    async fn lookup_accounts(&self, ids: &[Id]) -> Result<Vec<AccountSnapshot>, LedgerError> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.accounts.get(id).cloned())
            .collect())
    }

    async fn create_transfer(
        &self,
        id: Id,
        debit_account_id: Id,
        credit_account_id: Id,
        amount: Amount,
    ) -> Result<Id, LedgerError> {
        let transfer = self.transfer(
            id,
            debit_account_id,
            credit_account_id,
            amount,
            TransferKind::Single,
        );
        let mut state = self.lock();
        state
            .check_new_transfer(&transfer)
            .and_then(|_| state.check_reservation(&transfer))
            .map_err(|reason| LedgerError::rejected(id, reason))?;
        debug!(%transfer, "transfer committed");
        Ok(state.commit(transfer))
    }

    async fn create_pending_transfer(
        &self,
        id: Id,
        debit_account_id: Id,
        credit_account_id: Id,
        amount: Amount,
    ) -> Result<Id, LedgerError> {
        let transfer = self.transfer(
            id,
            debit_account_id,
            credit_account_id,
            amount,
            TransferKind::Pending,
        );
        let mut state = self.lock();
        state
            .check_new_transfer(&transfer)
            .and_then(|_| state.check_reservation(&transfer))
            .map_err(|reason| LedgerError::rejected(id, reason))?;
        debug!(%transfer, "pending transfer committed");
        Ok(state.commit(transfer))
    }

    async fn void_pending_transfer(
        &self,
        id: Id,
        pending_id: Id,
        debit_account_id: Id,
        credit_account_id: Id,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let transfer = self
            .transfer(
                id,
                debit_account_id,
                credit_account_id,
                amount,
                TransferKind::VoidPending,
            )
            .with_pending_id(pending_id);
        let mut state = self.lock();
        state
            .check_resolution(&transfer)
            .map_err(|reason| LedgerError::rejected(id, reason))?;
        debug!(%transfer, "pending transfer voided");
        state.commit(transfer);
        Ok(())
    }

    async fn post_pending_transfer(
        &self,
        id: Id,
        pending_id: Id,
        debit_account_id: Id,
        credit_account_id: Id,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let transfer = self
            .transfer(
                id,
                debit_account_id,
                credit_account_id,
                amount,
                TransferKind::PostPending,
            )
            .with_pending_id(pending_id);
        let mut state = self.lock();
        state
            .check_resolution(&transfer)
            .map_err(|reason| LedgerError::rejected(id, reason))?;
        debug!(%transfer, "pending transfer posted");
        state.commit(transfer);
        Ok(())
    }

    async fn lookup_transfers(&self, ids: &[Id]) -> Result<Vec<Transfer>, LedgerError> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.transfers.get(id).cloned())
            .collect())
    }

    async fn lookup_pending_transfers(&self) -> Result<Vec<Transfer>, LedgerError> {
        let state = self.lock();
        let mut open: Vec<Transfer> = state
            .transfers
            .values()
            .filter(|t| t.kind == TransferKind::Pending && !state.resolutions.contains_key(&t.id))
            .cloned()
            .collect();
        open.sort_by_key(|t| (t.timestamp, t.id));
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ledger_with_accounts(guarded: bool) -> MemoryLedger {
        let ledger = MemoryLedger::new(1, 1);
        let flags = AccountFlags {
            debits_must_not_exceed_credits: guarded,
        };
        ledger.create_account(Id(1), 1, 1, flags).await.unwrap();
        ledger
            .create_account(Id(2), 1, 1, AccountFlags::default())
            .await
            .unwrap();
        ledger
    }

    async fn account(ledger: &MemoryLedger, id: Id) -> AccountSnapshot {
        ledger.lookup_accounts(&[id]).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn pending_then_post_moves_funds() {
        let ledger = ledger_with_accounts(false).await;
        let hold = ledger
            .create_pending_transfer(Id(10), Id(1), Id(2), Amount(50))
            .await
            .unwrap();

        let debit = account(&ledger, Id(1)).await;
        assert_eq!((debit.debits_pending, debit.debits_posted), (50, 0));

        ledger
            .post_pending_transfer(Id(11), hold, Id(1), Id(2), Amount(50))
            .await
            .unwrap();

        let debit = account(&ledger, Id(1)).await;
        let credit = account(&ledger, Id(2)).await;
        assert_eq!((debit.debits_pending, debit.debits_posted), (0, 50));
        assert_eq!((credit.credits_pending, credit.credits_posted), (0, 50));
        assert!(ledger.lookup_pending_transfers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn void_releases_and_blocks_post() {
        let ledger = ledger_with_accounts(false).await;
        let hold = ledger
            .create_pending_transfer(Id(10), Id(1), Id(2), Amount(50))
            .await
            .unwrap();
        ledger
            .void_pending_transfer(Id(11), hold, Id(1), Id(2), Amount(50))
            .await
            .unwrap();

        let debit = account(&ledger, Id(1)).await;
        assert_eq!((debit.debits_pending, debit.debits_posted), (0, 0));

        let err = ledger
            .post_pending_transfer(Id(12), hold, Id(1), Id(2), Amount(50))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::rejected(Id(12), RejectReason::PendingTransferAlreadyVoided)
        );

        let err = ledger
            .void_pending_transfer(Id(13), hold, Id(1), Id(2), Amount(50))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn post_after_post_is_rejected() {
        let ledger = ledger_with_accounts(false).await;
        let hold = ledger
            .create_pending_transfer(Id(10), Id(1), Id(2), Amount(5))
            .await
            .unwrap();
        ledger
            .post_pending_transfer(Id(11), hold, Id(1), Id(2), Amount(5))
            .await
            .unwrap();
        let err = ledger
            .void_pending_transfer(Id(12), hold, Id(1), Id(2), Amount(5))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::rejected(Id(12), RejectReason::PendingTransferAlreadyPosted)
        );
    }

    #[tokio::test]
    async fn resolution_must_match_pending_transfer() {
        let ledger = ledger_with_accounts(false).await;
        let hold = ledger
            .create_pending_transfer(Id(10), Id(1), Id(2), Amount(5))
            .await
            .unwrap();

        let err = ledger
            .post_pending_transfer(Id(11), hold, Id(1), Id(2), Amount(6))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::rejected(Id(11), RejectReason::PendingTransferHasDifferentAmount)
        );

        let err = ledger
            .post_pending_transfer(Id(12), Id(99), Id(1), Id(2), Amount(5))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::rejected(Id(12), RejectReason::PendingTransferNotFound)
        );
    }

    #[tokio::test]
    async fn guarded_account_cannot_overdraw() {
        let ledger = ledger_with_accounts(true).await;
        let err = ledger
            .create_pending_transfer(Id(10), Id(1), Id(2), Amount(1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::rejected(Id(10), RejectReason::ExceedsCredits)
        );

        ledger
            .create_transfer(Id(11), Id(2), Id(1), Amount(100))
            .await
            .unwrap();
        ledger
            .create_pending_transfer(Id(12), Id(1), Id(2), Amount(60))
            .await
            .unwrap();
        // 60 of 100 is already reserved
        let err = ledger
            .create_pending_transfer(Id(13), Id(1), Id(2), Amount(50))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::rejected(Id(13), RejectReason::ExceedsCredits)
        );
    }

    #[tokio::test]
    async fn duplicate_ids_and_unknown_accounts() {
        let ledger = ledger_with_accounts(false).await;
        assert!(
            ledger
                .create_account(Id(1), 1, 1, AccountFlags::default())
                .await
                .is_err()
        );
        ledger
            .create_pending_transfer(Id(10), Id(1), Id(2), Amount(5))
            .await
            .unwrap();
        assert_eq!(
            ledger
                .create_pending_transfer(Id(10), Id(1), Id(2), Amount(5))
                .await
                .unwrap_err(),
            LedgerError::rejected(Id(10), RejectReason::Exists)
        );
        assert_eq!(
            ledger
                .create_pending_transfer(Id(11), Id(7), Id(2), Amount(5))
                .await
                .unwrap_err(),
            LedgerError::rejected(Id(11), RejectReason::DebitAccountNotFound)
        );
        assert!(ledger.lookup_accounts(&[Id(7)]).await.unwrap().is_empty());
        assert_eq!(ledger.lookup_transfers(&[Id(10)]).await.unwrap().len(), 1);
    }
}

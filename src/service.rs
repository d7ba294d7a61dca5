use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::domain::{
    AccountFlags, Amount, Authorization, AuthorizationRegistry, BalanceView, Error, Id,
    LedgerGateway, Timestamp,
};
use crate::matcher::PresentmentMatcher;
use crate::runtime::{SagaHandle, execute_activity, start_saga};
use crate::saga::{AuthorizationSaga, HoldOrigin, SagaContext};
use crate::signal::SignalBus;

/// A hold that reached `FREEZED` and is waiting to be settled.
#[derive(Debug)]
pub struct PendingSettlement {
    hold: Authorization,
    credit: Id,
    handle: SagaHandle<bool>,
}

impl PendingSettlement {
    pub fn hold(&self) -> &Authorization {
        &self.hold
    }

    pub fn credit(&self) -> Id {
        self.credit
    }

    /// `true` once captured, `false` once released.
    pub async fn settled(self) -> Result<bool, Error> {
        self.handle.result().await
    }
}

/// Request surface: starts sagas and reports their results.
#[derive(Clone)]
pub struct HoldService {
    ctx: SagaContext,
    matcher: PresentmentMatcher,
}

impl HoldService {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        registry: Arc<dyn AuthorizationRegistry>,
        config: EngineConfig,
    ) -> Self {
        let signals = SignalBus::new();
        let matcher = PresentmentMatcher::new(Arc::clone(&registry), Arc::clone(&signals));
        Self {
            ctx: SagaContext {
                ledger,
                registry,
                signals,
                config: Arc::new(config),
            },
            matcher,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub async fn create_account(&self, id: Id, guarded: bool) -> Result<(), Error> {
        let flags = AccountFlags {
            debits_must_not_exceed_credits: guarded,
        };
        let config = &self.ctx.config;
        let ledger = &*self.ctx.ledger;
        execute_activity(
            "create_account",
            config.query_timeout(),
            &config.retry_policy(),
            move |_| ledger.create_account(id, config.ledger, config.code, flags),
        )
        .await?;
        Ok(())
    }

    /// Posts `amount` from `from` to `to` in one phase.
    pub async fn deposit(&self, from: Id, to: Id, amount: Amount) -> Result<Id, Error> {
        let transfer_id = Id::generate();
        let config = &self.ctx.config;
        let ledger = &*self.ctx.ledger;
        let id = execute_activity(
            "create_transfer",
            config.query_timeout(),
            &config.retry_policy(),
            move |_| ledger.create_transfer(transfer_id, from, to, amount),
        )
        .await?;
        Ok(id)
    }

    /// Starts an authorization saga and returns once its hold is frozen
    /// and matchable, or with the reason it could not be created.
    pub async fn begin_authorization(
        &self,
        debit: Id,
        credit: Id,
        amount: Amount,
    ) -> Result<PendingSettlement, Error> {
        self.spawn_authorization(debit, credit, amount, HoldOrigin::Fresh)
            .await
    }

    /// `StartAuthorization`: resolves to whether the funds were transferred.
    pub async fn start_authorization(
        &self,
        debit: Id,
        credit: Id,
        amount: Amount,
    ) -> Result<bool, Error> {
        self.begin_authorization(debit, credit, amount)
            .await?
            .settled()
            .await
    }

    /// `StartPresentment`: resolves to whether a hold was matched.
    pub async fn start_presentment(&self, debit: Id, amount: Amount) -> Result<bool, Error> {
        let matcher = self.matcher.clone();
        start_saga("present-workflow", move |_| async move {
            Ok(matcher.match_presentment(debit, amount))
        })
        .result()
        .await
    }

    /// `GetBalance`: derived view of a single account.
    pub async fn get_balance(&self, account: Id) -> Result<BalanceView, Error> {
        let ctx = self.ctx.clone();
        start_saga("balance-workflow", move |_| async move {
            let ledger = &*ctx.ledger;
            let ids = [account];
            let ids = &ids;
            let accounts = execute_activity(
                "lookup_accounts",
                ctx.config.query_timeout(),
                &ctx.config.retry_policy(),
                move |_| ledger.lookup_accounts(ids),
            )
            .await?;
            let snapshot = accounts.first().ok_or(Error::NotFound(account))?;
            Ok(BalanceView::aggregate(snapshot))
        })
        .result()
        .await
    }

    /// Adopts every open pending transfer the registry does not know about,
    /// giving each a new saga with what is left of its deadline. Run before
    /// serving requests: a hold still being created would look orphaned.
    pub async fn reconcile(&self) -> Result<Vec<PendingSettlement>, Error> {
        let config = &self.ctx.config;
        let ledger = &*self.ctx.ledger;
        let open = execute_activity(
            "lookup_pending_transfers",
            config.query_timeout(),
            &config.retry_policy(),
            move |_| ledger.lookup_pending_transfers(),
        )
        .await?;

        let now = Timestamp::now();
        let deadline = config.hold_deadline();
        let mut adopted = Vec::new();
        for transfer in open {
            if self.ctx.registry.contains(transfer.id) {
                continue;
            }
            let age = Duration::from_micros(now.0.saturating_sub(transfer.timestamp));
            let remaining = deadline.saturating_sub(age);
            info!(
                hold_id = %transfer.id,
                account = %transfer.debit_account_id,
                amount = %transfer.amount,
                remaining_ms = remaining.as_millis() as u64,
                "reconciling orphaned hold"
            );
            let (debit, credit, amount) = (
                transfer.debit_account_id,
                transfer.credit_account_id,
                transfer.amount,
            );
            let pending = self
                .spawn_authorization(
                    debit,
                    credit,
                    amount,
                    HoldOrigin::Adopted {
                        transfer,
                        remaining,
                    },
                )
                .await?;
            adopted.push(pending);
        }
        Ok(adopted)
    }

    async fn spawn_authorization(
        &self,
        debit: Id,
        credit: Id,
        amount: Amount,
        origin: HoldOrigin,
    ) -> Result<PendingSettlement, Error> {
        let (tx, rx) = oneshot::channel();
        let ctx = self.ctx.clone();
        let handle = start_saga("authorization-workflow", move |saga_id| {
            AuthorizationSaga::new(saga_id, debit, credit, amount, ctx).run(origin, Some(tx))
        });
        debug!(saga_id = handle.id(), account = %debit, amount = %amount, "authorization saga started");

        match rx.await {
            Ok(hold) => Ok(PendingSettlement {
                hold,
                credit,
                handle,
            }),
            // the saga ended before freezing; its result carries the reason
            Err(_) => match handle.result().await {
                Err(e) => Err(e),
                Ok(_) => Err(Error::SagaAborted("saga finished without a hold".to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthorizationRegistry, HoldState, LedgerError, RejectReason};
    use crate::ledger::MemoryLedger;
    use crate::registry::MemoryRegistry;

    struct Harness {
        service: HoldService,
        ledger: Arc<MemoryLedger>,
        registry: Arc<MemoryRegistry>,
    }

    async fn harness(deadline_ms: u64) -> Harness {
        let ledger = Arc::new(MemoryLedger::new(1, 1));
        let registry = Arc::new(MemoryRegistry::new());
        let config = EngineConfig {
            hold_deadline_ms: deadline_ms,
            ..EngineConfig::default()
        };
        let service = HoldService::new(ledger.clone(), registry.clone(), config);
        service.create_account(Id(0xa), true).await.unwrap();
        service.create_account(Id(0xb), false).await.unwrap();
        service.create_account(Id(0xf), false).await.unwrap();
        service.deposit(Id(0xf), Id(0xa), Amount(100)).await.unwrap();
        Harness {
            service,
            ledger,
            registry,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_releases_unmatched_hold() {
        let h = harness(100).await;

        let pending = h
            .service
            .begin_authorization(Id(0xa), Id(0xb), Amount(50))
            .await
            .unwrap();
        let hold_id = pending.hold().id;

        let balance = h.service.get_balance(Id(0xa)).await.unwrap();
        assert_eq!(balance.debits_pending, 50);

        assert!(!pending.settled().await.unwrap());
        assert!(!h.registry.contains(hold_id));
        assert!(h.ledger.lookup_pending_transfers().await.unwrap().is_empty());

        let balance = h.service.get_balance(Id(0xa)).await.unwrap();
        assert_eq!((balance.debits_pending, balance.debits_posted), (0, 0));
        assert_eq!(balance.pure_balance, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn match_before_timeout_settles() {
        let h = harness(100).await;

        let pending = h
            .service
            .begin_authorization(Id(0xa), Id(0xb), Amount(50))
            .await
            .unwrap();
        let hold_id = pending.hold().id;

        assert!(h.service.start_presentment(Id(0xa), Amount(50)).await.unwrap());
        assert!(pending.settled().await.unwrap());
        assert!(!h.registry.contains(hold_id));

        let debit = h.service.get_balance(Id(0xa)).await.unwrap();
        let credit = h.service.get_balance(Id(0xb)).await.unwrap();
        assert_eq!((debit.debits_pending, debit.debits_posted), (0, 50));
        assert_eq!(credit.credits_posted, 50);
        assert_eq!(debit.pure_balance, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_presentments_match_once() {
        let h = harness(100).await;
        let pending = h
            .service
            .begin_authorization(Id(0xa), Id(0xb), Amount(50))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            h.service.start_presentment(Id(0xa), Amount(50)),
            h.service.start_presentment(Id(0xa), Amount(50)),
        );
        let matched = [first.unwrap(), second.unwrap()];
        assert_eq!(matched.iter().filter(|m| **m).count(), 1);
        assert!(pending.settled().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn fifo_across_sagas() {
        let h = harness(1_000).await;
        let first = h
            .service
            .begin_authorization(Id(0xa), Id(0xb), Amount(10))
            .await
            .unwrap();
        let second = h
            .service
            .begin_authorization(Id(0xa), Id(0xb), Amount(10))
            .await
            .unwrap();
        assert!(first.hold().created_at < second.hold().created_at);

        assert!(h.service.start_presentment(Id(0xa), Amount(10)).await.unwrap());
        assert!(first.settled().await.unwrap());
        // the younger hold was left alone and runs out
        assert!(!second.settled().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn insufficient_funds_fail_hold_creation() {
        let h = harness(100).await;

        let err = h
            .service
            .start_authorization(Id(0xa), Id(0xb), Amount(101))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::HoldCreation(LedgerError::Rejected {
                reason: RejectReason::ExceedsCredits,
                ..
            })
        ));
        assert_eq!(h.registry.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn presentment_without_hold_is_negative() {
        let h = harness(100).await;
        assert!(!h.service.start_presentment(Id(0xa), Amount(50)).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let h = harness(100).await;
        let err = h.service.get_balance(Id(0x99)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(id) if id == Id(0x99)));
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_adopts_orphaned_holds() {
        let h = harness(100).await;
        // a pending transfer whose saga was lost
        h.ledger
            .create_pending_transfer(Id(0x77), Id(0xa), Id(0xb), Amount(30))
            .await
            .unwrap();

        let adopted = h.service.reconcile().await.unwrap();
        assert_eq!(adopted.len(), 1);
        assert_eq!(adopted[0].hold().id, Id(0x77));
        assert_eq!(
            h.registry.query(Id(0xa), Amount(30), HoldState::Freezed).len(),
            1
        );
        // nothing more to adopt while it is registered
        assert!(h.service.reconcile().await.unwrap().is_empty());

        assert!(h.service.start_presentment(Id(0xa), Amount(30)).await.unwrap());
        let mut adopted = adopted;
        assert!(adopted.remove(0).settled().await.unwrap());
        assert_eq!(h.service.get_balance(Id(0xa)).await.unwrap().debits_posted, 30);
    }
}

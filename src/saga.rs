use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::domain::{
    Amount, Authorization, AuthorizationRegistry, Error, HoldState, Id, LedgerError,
    LedgerGateway, RejectReason, Timestamp, Transfer,
};
use crate::runtime::execute_activity;
use crate::signal::{Mailbox, SignalBus, channel_key};

/// Collaborators shared by every authorization saga.
#[derive(Clone)]
pub struct SagaContext {
    pub ledger: Arc<dyn LedgerGateway>,
    pub registry: Arc<dyn AuthorizationRegistry>,
    pub signals: Arc<SignalBus>,
    pub config: Arc<EngineConfig>,
}

/// Where the hold a saga settles comes from.
#[derive(Debug, Clone)]
pub enum HoldOrigin {
    /// Reserve funds with a new pending transfer.
    Fresh,
    /// Take over a pending transfer that is already open in the ledger.
    Adopted { transfer: Transfer, remaining: Duration },
}

#[derive(Debug)]
enum Trigger {
    Matched(Authorization),
    Expired,
}

/// One hold's lifecycle: freeze, wait for a match or the deadline, then
/// post or void exactly once.
pub struct AuthorizationSaga {
    saga_id: String,
    debit: Id,
    credit: Id,
    amount: Amount,
    state: HoldState,
    ctx: SagaContext,
}

impl AuthorizationSaga {
    pub fn new(saga_id: String, debit: Id, credit: Id, amount: Amount, ctx: SagaContext) -> Self {
        Self {
            saga_id,
            debit,
            credit,
            amount,
            state: HoldState::Init,
            ctx,
        }
    }

    /// Returns `true` when funds were transferred and `false` when the hold
    /// was released. `on_freezed` fires once the hold is registered and
    /// matchable.
    pub async fn run(
        mut self,
        origin: HoldOrigin,
        on_freezed: Option<oneshot::Sender<Authorization>>,
    ) -> Result<bool, Error> {
        let (hold, deadline) = match origin {
            HoldOrigin::Fresh => {
                self.transition(HoldState::Freezing);
                let hold_id = self.freeze().await?;
                self.transition(HoldState::Freezed);
                let hold =
                    Authorization::freezed(hold_id, self.saga_id.clone(), self.debit, self.amount);
                (hold, self.ctx.config.hold_deadline())
            }
            HoldOrigin::Adopted {
                transfer,
                remaining,
            } => {
                info!(saga_id = %self.saga_id, hold_id = %transfer.id, "adopting open pending transfer");
                self.state = HoldState::Freezed;
                let mut hold = Authorization::freezed(
                    transfer.id,
                    self.saga_id.clone(),
                    self.debit,
                    self.amount,
                );
                hold.created_at = Timestamp(transfer.timestamp);
                (hold, remaining)
            }
        };

        // armed before the hold becomes visible to matchers
        let mut mailbox = self
            .ctx
            .signals
            .arm(&self.saga_id, &channel_key(self.debit));
        self.ctx.registry.insert(hold.clone());
        if let Some(tx) = on_freezed {
            let _ = tx.send(hold.clone());
        }

        match self.wait(&mut mailbox, deadline).await {
            Trigger::Matched(matched) => {
                if matched.id != hold.id {
                    warn!(
                        saga_id = %self.saga_id,
                        hold_id = %hold.id,
                        signalled = %matched.id,
                        "match signal names another hold, settling own hold"
                    );
                }
                self.capture(&hold).await
            }
            Trigger::Expired => self.release(&hold).await,
        }
    }

    /// Waits for whichever comes first. After the timer fires the mailbox is
    /// disarmed; a signal accepted before that still wins.
    async fn wait(&self, mailbox: &mut Mailbox, deadline: Duration) -> Trigger {
        tokio::select! {
            matched = mailbox.recv() => Trigger::Matched(matched),
            _ = tokio::time::sleep(deadline) => match mailbox.disarm() {
                Some(matched) => {
                    info!(saga_id = %self.saga_id, "match accepted as deadline fired");
                    Trigger::Matched(matched)
                }
                None => Trigger::Expired,
            },
        }
    }

    async fn freeze(&self) -> Result<Id, Error> {
        let transfer_id = Id::generate();
        let (debit, credit, amount) = (self.debit, self.credit, self.amount);
        let ledger = &*self.ctx.ledger;
        let config = &self.ctx.config;

        execute_activity(
            "create_pending_transfer",
            config.activity_timeout(),
            &config.retry_policy(),
            move |attempt| async move {
                let result = ledger
                    .create_pending_transfer(transfer_id, debit, credit, amount)
                    .await;
                replayed(result, attempt, transfer_id)
            },
        )
        .await
        .map_err(|e| {
            warn!(saga_id = %self.saga_id, error = %e, "hold creation failed");
            Error::HoldCreation(e)
        })
    }

    async fn capture(&mut self, hold: &Authorization) -> Result<bool, Error> {
        self.transition(HoldState::Matched);
        self.ctx.registry.set_state(hold.id, HoldState::Matched);

        let post_id = Id::generate();
        let (debit, credit, amount, pending_id) = (self.debit, self.credit, self.amount, hold.id);
        let ledger = &*self.ctx.ledger;
        let config = &self.ctx.config;
        let posted = execute_activity(
            "post_pending_transfer",
            config.activity_timeout(),
            &config.retry_policy(),
            move |attempt| async move {
                let result = ledger
                    .post_pending_transfer(post_id, pending_id, debit, credit, amount)
                    .await;
                replayed(result, attempt, ())
            },
        )
        .await;

        if let Err(source) = posted {
            return Err(self.ambiguity(hold, "post", source));
        }
        self.transition(HoldState::Posted);
        self.ctx.registry.delete(hold.id);
        Ok(true)
    }

    async fn release(&mut self, hold: &Authorization) -> Result<bool, Error> {
        self.transition(HoldState::Expired);
        self.ctx.registry.set_state(hold.id, HoldState::Expired);

        let void_id = Id::generate();
        let (debit, credit, amount, pending_id) = (self.debit, self.credit, self.amount, hold.id);
        let ledger = &*self.ctx.ledger;
        let config = &self.ctx.config;
        let voided = execute_activity(
            "void_pending_transfer",
            config.activity_timeout(),
            &config.retry_policy(),
            move |attempt| async move {
                let result = ledger
                    .void_pending_transfer(void_id, pending_id, debit, credit, amount)
                    .await;
                replayed(result, attempt, ())
            },
        )
        .await;

        if let Err(source) = voided {
            return Err(self.ambiguity(hold, "void", source));
        }
        self.transition(HoldState::Voided);
        self.ctx.registry.delete(hold.id);
        Ok(false)
    }

    /// The registry entry is left in place, in its unresolved state.
    fn ambiguity(&self, hold: &Authorization, action: &'static str, source: LedgerError) -> Error {
        error!(
            saga_id = %self.saga_id,
            hold_id = %hold.id,
            account = %self.debit,
            amount = %self.amount,
            state = %self.state,
            action,
            error = %source,
            "settlement outcome unknown, hold needs intervention"
        );
        Error::SettlementAmbiguity {
            hold_id: hold.id,
            saga_id: self.saga_id.clone(),
            action,
            source,
        }
    }

    fn transition(&mut self, next: HoldState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal hold transition {} -> {}",
            self.state,
            next
        );
        info!(
            saga_id = %self.saga_id,
            account = %self.debit,
            amount = %self.amount,
            from = %self.state,
            to = %next,
            "hold transition"
        );
        self.state = next;
    }
}

/// A retried request that finds its own transfer id already committed was
/// applied by an earlier attempt.
fn replayed<T>(result: Result<T, LedgerError>, attempt: usize, value: T) -> Result<T, LedgerError> {
    match result {
        Err(LedgerError::Rejected {
            reason: RejectReason::Exists,
            ..
        }) if attempt > 0 => Ok(value),
        other => other,
    }
}

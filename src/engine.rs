use crate::domain::{
    Amount, Command, Error, Id, Outcome,
    traits::{CommandStream, DeadLetterQueue, OutputRepository},
};
use crate::service::{HoldService, PendingSettlement};

use futures::StreamExt;
use tracing::info;

struct InFlight {
    debit: Id,
    credit: Id,
    amount: Amount,
    pending: PendingSettlement,
}

/// Drives a command stream through the hold service.
///
/// Commands run in stream order. An authorization only blocks until its
/// hold is frozen, so later presentments in the stream can match it; the
/// settlement results are collected once the stream is drained.
pub struct Engine<I, O, D>
where
    I: CommandStream,
    O: OutputRepository,
    D: DeadLetterQueue,
{
    service: HoldService,
    ingestion: I,
    output_repository: O,
    dlq: D,
    in_flight: Vec<InFlight>,
}

impl<I, O, D> Engine<I, O, D>
where
    I: CommandStream,
    O: OutputRepository,
    D: DeadLetterQueue,
{
    pub fn new(service: HoldService, ingestion: I, output_repository: O, dlq: D) -> Self {
        Self {
            service,
            ingestion,
            output_repository,
            dlq,
            in_flight: Vec::new(),
        }
    }

    pub async fn process(&mut self) -> Result<(), Error> {
        let mut res = self.ingestion.stream();

        while let Some(cmd) = res.next().await {
            match cmd {
                Ok(cmd) => {
                    if let Err(e) = self.apply_command(cmd).await {
                        self.dlq.report(&e);
                    }
                }
                Err(e) => self.dlq.report(&e),
            }
        }

        self.settle_in_flight().await;
        Ok(())
    }

    /// Adopts holds left open in the ledger; their results are reported
    /// with the rest of the stream.
    pub async fn reconcile(&mut self) -> Result<(), Error> {
        for pending in self.service.reconcile().await? {
            let hold = pending.hold();
            self.in_flight.push(InFlight {
                debit: hold.account_id,
                credit: pending.credit(),
                amount: hold.amount,
                pending,
            });
        }
        Ok(())
    }

    async fn apply_command(&mut self, cmd: Command) -> Result<(), Error> {
        match cmd {
            Command::Open { account, guarded } => self.service.create_account(account, guarded).await,
            Command::Deposit { from, to, amount } => {
                self.service.deposit(from, to, amount).await?;
                Ok(())
            }
            Command::Authorize {
                debit,
                credit,
                amount,
            } => {
                let pending = self.service.begin_authorization(debit, credit, amount).await?;
                self.in_flight.push(InFlight {
                    debit,
                    credit,
                    amount,
                    pending,
                });
                Ok(())
            }
            Command::Present { debit, amount } => {
                let matched = self.service.start_presentment(debit, amount).await?;
                self.output_repository.record(Outcome::Presentment {
                    debit,
                    amount,
                    matched,
                });
                Ok(())
            }
            Command::Balance { account } => {
                let view = self.service.get_balance(account).await?;
                self.output_repository.record(Outcome::Balance(view));
                Ok(())
            }
        }
    }

    async fn settle_in_flight(&mut self) {
        info!(holds = self.in_flight.len(), "waiting for open holds to settle");
        for held in std::mem::take(&mut self.in_flight) {
            match held.pending.settled().await {
                Ok(settled) => self.output_repository.record(Outcome::Authorization {
                    debit: held.debit,
                    credit: held.credit,
                    amount: held.amount,
                    settled,
                }),
                Err(e) => self.dlq.report(&e),
            }
        }
    }

    pub fn flush(&mut self) {
        self.output_repository.flush();
    }
}

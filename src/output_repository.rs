use std::io::Write;

use crate::domain::{Outcome, OutputRepository};

pub const BALANCE_HEADER: &str = "balance,account,pure_balance,debits_pending,debits_posted,credits_pending,credits_posted,with_freezed_debits,with_freezed_credits,total_debits,total_credits,total_balance";

/// Collects outcomes and writes them as CSV lines on flush.
#[derive(Debug)]
pub struct CsvOutput<W: Write> {
    outcomes: Vec<Outcome>,
    writer: W,
}

impl CsvOutput<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> CsvOutput<W> {
    pub fn new(writer: W) -> Self {
        Self {
            outcomes: Vec::new(),
            writer,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_all(&mut self) -> std::io::Result<()> {
        writeln!(self.writer, "authorization,debit,credit,amount,settled")?;
        writeln!(self.writer, "presentment,debit,amount,matched")?;
        writeln!(self.writer, "{}", BALANCE_HEADER)?;
        for outcome in self.outcomes.drain(..) {
            match outcome {
                Outcome::Authorization {
                    debit,
                    credit,
                    amount,
                    settled,
                } => writeln!(
                    self.writer,
                    "authorization,{},{},{},{}",
                    debit, credit, amount, settled
                )?,
                Outcome::Presentment {
                    debit,
                    amount,
                    matched,
                } => writeln!(self.writer, "presentment,{},{},{}", debit, amount, matched)?,
                Outcome::Balance(view) => writeln!(self.writer, "balance,{}", view)?,
            }
        }
        self.writer.flush()
    }
}

impl<W: Write> OutputRepository for CsvOutput<W> {
    fn record(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    fn flush(&mut self) {
        if let Err(e) = self.write_all() {
            tracing::error!(error = %e, "failed to write output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountFlags, AccountSnapshot, Amount, BalanceView, Id};

    #[test]
    fn writes_outcomes_in_record_order() {
        let mut output = CsvOutput::new(Vec::new());
        let mut snapshot = AccountSnapshot::new(Id(1), 1, 1, AccountFlags::default());
        snapshot.credits_posted = 100;
        snapshot.debits_pending = 50;

        output.record(Outcome::Presentment {
            debit: Id(1),
            amount: Amount(50),
            matched: true,
        });
        output.record(Outcome::Balance(BalanceView::aggregate(&snapshot)));
        output.record(Outcome::Authorization {
            debit: Id(1),
            credit: Id(2),
            amount: Amount(50),
            settled: false,
        });
        output.flush();

        let text = String::from_utf8(output.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().skip(3).collect();
        assert_eq!(
            lines,
            vec![
                "presentment,1,50,true",
                "balance,1,100,50,0,0,100,150,100,50,100,50",
                "authorization,1,2,50,false",
            ]
        );
    }
}

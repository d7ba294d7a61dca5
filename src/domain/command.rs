use crate::domain::{Amount, BalanceView, Id};

/// A request read from the command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Open { account: Id, guarded: bool },
    Deposit { from: Id, to: Id, amount: Amount },
    Authorize { debit: Id, credit: Id, amount: Amount },
    Present { debit: Id, amount: Amount },
    Balance { account: Id },
}

/// Final answer for a request, as written to the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Authorization {
        debit: Id,
        credit: Id,
        amount: Amount,
        settled: bool,
    },
    Presentment {
        debit: Id,
        amount: Amount,
        matched: bool,
    },
    Balance(BalanceView),
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Command::Open { account, guarded } => {
                write!(f, "open,account={},guarded={}", account, guarded)
            }
            Command::Deposit { from, to, amount } => {
                write!(f, "deposit,from={},to={},amount={}", from, to, amount)
            }
            Command::Authorize {
                debit,
                credit,
                amount,
            } => write!(
                f,
                "authorize,debit={},credit={},amount={}",
                debit, credit, amount
            ),
            Command::Present { debit, amount } => {
                write!(f, "present,debit={},amount={}", debit, amount)
            }
            Command::Balance { account } => write!(f, "balance,account={}", account),
        }
    }
}

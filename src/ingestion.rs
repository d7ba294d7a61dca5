use std::io::Read;
use std::pin::Pin;

use futures::stream::{self, Stream};
use serde::Deserialize;

use crate::domain::traits::CommandStream;
use crate::domain::{Amount, Command, Error, Id};

pub struct CsvReader<R: Read> {
    reader: Option<csv::Reader<R>>,
}

impl<R: Read> CsvReader<R> {
    pub fn new(reader: R) -> Self {
        let rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        Self { reader: Some(rdr) }
    }
}

/// Internal shape used only for CSV deserialization. Fields stay raw so
/// that malformed ids and amounts surface as validation errors.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "type")]
    kind: String,
    account: String,
    counterparty: Option<String>,
    amount: Option<String>,
}

fn required<'a>(field: &'a Option<String>, name: &str, kind: &str) -> Result<&'a str, Error> {
    field
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation(format!("{} requires {}", kind, name)))
}

impl TryFrom<CsvRow> for Command {
    type Error = Error;

    fn try_from(row: CsvRow) -> Result<Self, Self::Error> {
        let kind = row.kind.trim().to_ascii_lowercase();
        let account = Id::parse(&row.account)?;

        let command = match kind.as_str() {
            "open" | "open_guarded" => Command::Open {
                account,
                guarded: kind == "open_guarded",
            },
            "deposit" => Command::Deposit {
                from: account,
                to: Id::parse(required(&row.counterparty, "counterparty", &kind)?)?,
                amount: Amount::parse(required(&row.amount, "amount", &kind)?)?,
            },
            "authorize" => Command::Authorize {
                debit: account,
                credit: Id::parse(required(&row.counterparty, "counterparty", &kind)?)?,
                amount: Amount::parse(required(&row.amount, "amount", &kind)?)?,
            },
            "present" => Command::Present {
                debit: account,
                amount: Amount::parse(required(&row.amount, "amount", &kind)?)?,
            },
            "balance" => Command::Balance { account },
            other => {
                return Err(Error::Ingestion(format!(
                    "Invalid command type: {}",
                    other
                )));
            }
        };
        Ok(command)
    }
}

impl<R: Read + Send + 'static> CommandStream for CsvReader<R> {
    type CmdStream = Pin<Box<dyn Stream<Item = Result<Command, Error>> + Send>>;

    fn stream(&mut self) -> Self::CmdStream {
        let reader = match self.reader.take() {
            Some(r) => r,
            // already consumed
            None => return Box::pin(stream::iter(Vec::<Result<Command, Error>>::new())),
        };

        let iter = reader
            .into_deserialize::<CsvRow>()
            .map(|row_res| match row_res {
                Ok(row) => Command::try_from(row),
                Err(e) => Err(Error::Ingestion(format!(
                    "CSV deserialization error: {}",
                    e
                ))),
            });

        Box::pin(stream::iter(iter))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    async fn read(input: &'static str) -> Vec<Result<Command, Error>> {
        CsvReader::new(input.as_bytes()).stream().collect().await
    }

    #[tokio::test]
    async fn parses_every_command() {
        let rows = read(
            "type, account, counterparty, amount\n\
             open, 1,,\n\
             open_guarded, 2,,\n\
             deposit, 1, 2, 100\n\
             authorize, 2, 1, 50\n\
             present, 2,, 50\n\
             balance, 2,,\n",
        )
        .await;

        let commands: Vec<Command> = rows.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            commands,
            vec![
                Command::Open {
                    account: Id(1),
                    guarded: false
                },
                Command::Open {
                    account: Id(2),
                    guarded: true
                },
                Command::Deposit {
                    from: Id(1),
                    to: Id(2),
                    amount: Amount(100)
                },
                Command::Authorize {
                    debit: Id(2),
                    credit: Id(1),
                    amount: Amount(50)
                },
                Command::Present {
                    debit: Id(2),
                    amount: Amount(50)
                },
                Command::Balance { account: Id(2) },
            ]
        );
    }

    #[tokio::test]
    async fn malformed_rows_are_validation_errors() {
        let rows = read(
            "type, account, counterparty, amount\n\
             authorize, 1, 2, -5\n\
             authorize, 1, 2, 1.5\n\
             present, zz,, 5\n\
             present, 1,,\n\
             refund, 1,, 5\n",
        )
        .await;

        assert_eq!(rows.len(), 5);
        assert!(matches!(rows[0], Err(Error::Validation(_))));
        assert!(matches!(rows[1], Err(Error::Validation(_))));
        assert!(matches!(rows[2], Err(Error::Validation(_))));
        assert!(matches!(rows[3], Err(Error::Validation(_))));
        assert!(matches!(rows[4], Err(Error::Ingestion(_))));
    }

    #[tokio::test]
    async fn stream_is_consumed_once() {
        let mut reader = CsvReader::new("type,account\nbalance,1\n".as_bytes());
        assert_eq!(reader.stream().count().await, 1);
        assert_eq!(reader.stream().count().await, 0);
    }
}

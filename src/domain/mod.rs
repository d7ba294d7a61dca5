pub mod account;
pub mod authorization;
pub mod balance;
pub mod command;
pub mod error;
pub mod id;
pub mod money;
pub mod traits;
pub mod transaction;

pub use account::{AccountFlags, AccountSnapshot};
pub use authorization::{Authorization, HoldState, Timestamp};
pub use balance::BalanceView;
pub use command::{Command, Outcome};
pub use error::{Error, LedgerError, RejectReason};
pub use id::Id;
pub use money::Amount;
pub use traits::{AuthorizationRegistry, DeadLetterQueue, LedgerGateway, OutputRepository};
pub use transaction::{Transfer, TransferKind};

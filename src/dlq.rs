use tracing::{error, warn};

use crate::domain::{DeadLetterQueue, Error};

/// Reports failed commands to the log (stderr). Settlement ambiguity is
/// logged at error level; everything else is a rejected request.
#[derive(Default, Debug)]
pub struct LogDLQ {}

impl DeadLetterQueue for LogDLQ {
    fn report(&self, error: &Error) {
        match error {
            Error::SettlementAmbiguity { .. } => {
                error!("DLQ Report - unresolved hold: {}", error)
            }
            _ => warn!("DLQ Report - Error: {}", error),
        }
    }
}

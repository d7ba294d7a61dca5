use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{Amount, AuthorizationRegistry, HoldState, Id};
use crate::signal::{SignalBus, channel_key};

/// Picks the hold a presentment settles and signals its saga.
///
/// The registry is only read here. The matched saga removes its own entry,
/// so a retried presentment can never remove a hold twice.
#[derive(Clone)]
pub struct PresentmentMatcher {
    registry: Arc<dyn AuthorizationRegistry>,
    signals: Arc<SignalBus>,
}

impl PresentmentMatcher {
    pub fn new(registry: Arc<dyn AuthorizationRegistry>, signals: Arc<SignalBus>) -> Self {
        Self { registry, signals }
    }

    /// Signals the oldest `FREEZED` hold for `account`/`amount`.
    ///
    /// Candidates are tried oldest first; one whose saga has already
    /// resolved refuses the signal and the next one is tried. At most one
    /// saga is signalled per call.
    pub fn match_presentment(&self, account: Id, amount: Amount) -> bool {
        let candidates = self.registry.query(account, amount, HoldState::Freezed);
        if candidates.is_empty() {
            debug!(%account, %amount, "no hold to match");
            return false;
        }

        let channel = channel_key(account);
        for candidate in candidates {
            let saga_id = candidate.saga_id.clone();
            let hold_id = candidate.id;
            if self.signals.send(&saga_id, &channel, candidate) {
                info!(%account, %amount, %hold_id, saga_id = %saga_id, "presentment matched");
                return true;
            }
            debug!(%hold_id, saga_id = %saga_id, "candidate already resolved, trying next");
        }
        false
    }
}

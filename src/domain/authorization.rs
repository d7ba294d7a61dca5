use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::{Amount, Id};

/// Lifecycle of a hold. `Posted` and `Voided` are terminal.
///
/// `Init -> Freezing -> Freezed -> Matched -> Posted`
/// `                            \-> Expired -> Voided`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoldState {
    Init,
    Freezing,
    Freezed,
    Matched,
    Expired,
    Posted,
    Voided,
}

impl HoldState {
    pub fn can_transition_to(&self, target: HoldState) -> bool {
        use HoldState::*;
        matches!(
            (self, target),
            (Init, Freezing)
                | (Freezing, Freezed)
                | (Freezed, Matched)
                | (Freezed, Expired)
                | (Matched, Posted)
                | (Expired, Voided)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HoldState::Posted | HoldState::Voided)
    }
}

impl core::fmt::Display for HoldState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            HoldState::Init => "INIT",
            HoldState::Freezing => "FREEZING",
            HoldState::Freezed => "FREEZED",
            HoldState::Matched => "MATCHED",
            HoldState::Expired => "EXPIRED",
            HoldState::Posted => "POSTED",
            HoldState::Voided => "VOIDED",
        };
        f.write_str(s)
    }
}

/// Microseconds since the epoch, strictly increasing within the process.
/// Used only to order candidates, never for correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

impl Timestamp {
    pub fn now() -> Self {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        let prev = LAST_TIMESTAMP
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(wall.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        Self(wall.max(prev + 1))
    }
}

/// An in-flight hold, as indexed by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    /// Id of the pending ledger transfer backing this hold.
    pub id: Id,
    pub saga_id: String,
    pub account_id: Id,
    pub amount: Amount,
    pub state: HoldState,
    pub created_at: Timestamp,
}

impl Authorization {
    pub fn freezed(id: Id, saga_id: String, account_id: Id, amount: Amount) -> Self {
        Self {
            id,
            saga_id,
            account_id,
            amount,
            state: HoldState::Freezed,
            created_at: Timestamp::now(),
        }
    }
}

impl core::fmt::Display for Authorization {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "hold={},saga={},account={},amount={},state={}",
            self.id, self.saga_id, self.account_id, self.amount, self.state
        )
    }
}

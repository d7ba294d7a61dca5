use crate::domain::{AccountSnapshot, Id};

/// Balance derived from a single ledger snapshot. Never stored; recomputed
/// on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceView {
    pub account_id: Id,
    pub pure_balance: i128,
    pub debits_pending: u64,
    pub debits_posted: u64,
    pub credits_pending: u64,
    pub credits_posted: u64,
    pub with_freezed_debits: i128,
    pub with_freezed_credits: i128,
    pub total_debits: i128,
    pub total_credits: i128,
    pub total_balance: i128,
}

impl BalanceView {
    /// Sums of `u64` counters are computed in `i128`, which cannot overflow.
    pub fn aggregate(snapshot: &AccountSnapshot) -> Self {
        let debits_pending = i128::from(snapshot.debits_pending);
        let debits_posted = i128::from(snapshot.debits_posted);
        let credits_pending = i128::from(snapshot.credits_pending);
        let credits_posted = i128::from(snapshot.credits_posted);

        let pure_balance = credits_posted - debits_posted;
        let total_debits = debits_pending + debits_posted;
        let total_credits = credits_pending + credits_posted;

        Self {
            account_id: snapshot.id,
            pure_balance,
            debits_pending: snapshot.debits_pending,
            debits_posted: snapshot.debits_posted,
            credits_pending: snapshot.credits_pending,
            credits_posted: snapshot.credits_posted,
            with_freezed_debits: pure_balance + debits_pending,
            with_freezed_credits: pure_balance + credits_pending,
            total_debits,
            total_credits,
            total_balance: total_credits - total_debits,
        }
    }
}

impl core::fmt::Display for BalanceView {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{},{},{},{}",
            self.account_id,
            self.pure_balance,
            self.debits_pending,
            self.debits_posted,
            self.credits_pending,
            self.credits_posted,
            self.with_freezed_debits,
            self.with_freezed_credits,
            self.total_debits,
            self.total_credits,
            self.total_balance
        )
    }
}

#[cfg(test)]
mod tests {
    use super::BalanceView;
    use crate::domain::{AccountFlags, AccountSnapshot, Id};

    #[test]
    fn derives_all_figures_from_snapshot() {
        let mut snapshot = AccountSnapshot::new(Id(1), 1, 1, AccountFlags::default());
        snapshot.debits_pending = 5;
        snapshot.debits_posted = 10;
        snapshot.credits_pending = 2;
        snapshot.credits_posted = 20;

        let view = BalanceView::aggregate(&snapshot);
        assert_eq!(view.pure_balance, 10);
        assert_eq!(view.with_freezed_debits, 15);
        assert_eq!(view.with_freezed_credits, 12);
        assert_eq!(view.total_debits, 15);
        assert_eq!(view.total_credits, 22);
        assert_eq!(view.total_balance, 7);
        assert_eq!(view.debits_pending, 5);
        assert_eq!(view.credits_posted, 20);
    }

    #[test]
    fn negative_balances_and_extremes() {
        let mut snapshot = AccountSnapshot::new(Id(2), 1, 1, AccountFlags::default());
        snapshot.debits_posted = u64::MAX;
        snapshot.debits_pending = u64::MAX;

        let view = BalanceView::aggregate(&snapshot);
        assert_eq!(view.pure_balance, -i128::from(u64::MAX));
        assert_eq!(view.total_debits, 2 * i128::from(u64::MAX));
        assert_eq!(view.total_balance, -2 * i128::from(u64::MAX));
    }
}

//! Investment lifecycle manager.
//!
//! Opening, maturing and completing investments; ROI claims. The open
//! path and the ROI claim are check-then-act against the ledger, so both
//! run under the per-user lock (see `locks`).

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::core_types::{InvestmentId, UserId};
use crate::guard;
use crate::ledger::compute_available_balance;
use crate::locks::UserLocks;
use crate::plan::PlanRegistry;
use crate::store::{
    Investment, InvestmentStatus, LedgerStore, StoreError, TxType, Withdrawal, WithdrawalKind,
    WithdrawalStatus,
};

#[derive(Debug, Error)]
pub enum InvestError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Plan not found: {0}")]
    PlanNotFound(String),
    #[error("Plan is not active: {0}")]
    PlanInactive(String),
    #[error("Amount out of plan range [{min}, {max}]")]
    AmountOutOfRange { min: Decimal, max: Decimal },
    #[error("An active investment already exists")]
    ActiveInvestmentExists,
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Investment not found: {0}")]
    InvestmentNotFound(InvestmentId),
    #[error("Investment is not completed")]
    NotCompleted,
    #[error("Investment is not active")]
    NotActive,
    #[error("ROI already withdrawn")]
    RoiAlreadyWithdrawn,
    #[error("No ROI available")]
    NoRoiAvailable,
}

pub struct InvestmentService {
    store: Arc<dyn LedgerStore>,
    plans: Arc<PlanRegistry>,
    locks: Arc<UserLocks>,
}

impl InvestmentService {
    pub fn new(store: Arc<dyn LedgerStore>, plans: Arc<PlanRegistry>, locks: Arc<UserLocks>) -> Self {
        Self { store, plans, locks }
    }

    /// Open an investment for a user.
    ///
    /// Checks, in order, each failing alone: plan active, amount in plan
    /// range, no active investment, sufficient available balance. Balance
    /// is read and spent under the user's lock - two concurrent opens
    /// cannot both pass the sufficiency check.
    pub async fn open_investment(
        &self,
        user_id: UserId,
        plan_name: &str,
        amount: Decimal,
    ) -> Result<Investment, InvestError> {
        let plan = self
            .plans
            .get(plan_name)
            .ok_or_else(|| InvestError::PlanNotFound(plan_name.to_string()))?
            .clone();

        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().await;

        if !plan.active {
            return Err(InvestError::PlanInactive(plan.name));
        }
        if amount < plan.min_investment || amount > plan.max_investment {
            return Err(InvestError::AmountOutOfRange {
                min: plan.min_investment,
                max: plan.max_investment,
            });
        }
        if self
            .store
            .active_investment_for_user(user_id)
            .await?
            .is_some()
        {
            return Err(InvestError::ActiveInvestmentExists);
        }

        let balance = compute_available_balance(self.store.as_ref(), user_id).await?;
        if balance.available_balance < amount {
            return Err(InvestError::InsufficientBalance);
        }

        let end_date = Utc::now() + Duration::days(plan.duration_days);
        let investment = Investment::open(user_id, plan.name.clone(), amount, end_date);
        self.store.insert_investment(&investment).await?;

        // Principal is spent now; refresh the cache and upgrade the tier
        // if the plan sits above the user's current one. Never downgrades.
        let mut user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(StoreError::UserNotFound(user_id))?;
        if plan.tier > user.tier {
            info!(user_id, from = %user.tier, to = %plan.tier, "Tier upgraded");
            user.tier = plan.tier;
        }
        user.available_balance =
            compute_available_balance(self.store.as_ref(), user_id).await?.available_balance;
        guard::save_user(self.store.as_ref(), &mut user).await?;

        info!(
            user_id,
            investment_id = %investment.investment_id,
            plan = %plan.name,
            amount = %amount,
            "Investment opened"
        );
        Ok(investment)
    }

    /// Complete an investment (natural maturity or admin force).
    ///
    /// Lands `current_value` exactly on the plan target when the drift has
    /// not already converged it there, then marks the record completed and
    /// pins `end_date` to the completion instant. Completing an
    /// already-completed investment is a no-op.
    pub async fn complete_investment(
        &self,
        investment_id: InvestmentId,
    ) -> Result<Investment, InvestError> {
        let mut inv = self
            .store
            .get_investment(investment_id)
            .await?
            .ok_or(InvestError::InvestmentNotFound(investment_id))?;

        match inv.status {
            InvestmentStatus::Completed => return Ok(inv),
            InvestmentStatus::Cancelled => return Err(InvestError::NotActive),
            InvestmentStatus::Active => {}
        }

        let plan = self
            .plans
            .get(&inv.plan_name)
            .ok_or_else(|| InvestError::PlanNotFound(inv.plan_name.clone()))?;

        let target = plan.target_payout(inv.amount);
        let correction = target - inv.current_value;
        if !correction.is_zero() {
            inv.apply_delta(TxType::Roi, correction, "Maturity adjustment");
        }
        inv.status = InvestmentStatus::Completed;
        inv.end_date = Utc::now();
        self.store.update_investment(&inv).await?;

        info!(
            user_id = inv.user_id,
            investment_id = %inv.investment_id,
            final_value = %inv.current_value,
            "Investment completed"
        );
        Ok(inv)
    }

    /// Claim the ROI of a completed investment into locked balance and
    /// open a pending ROI withdrawal for admin approval.
    ///
    /// One-shot: the `roi_withdrawn` flag guards double invocation. ROI
    /// withdrawals bypass the billing gate and start at `pending`.
    pub async fn withdraw_roi(
        &self,
        investment_id: InvestmentId,
    ) -> Result<(Investment, Withdrawal), InvestError> {
        let inv = self
            .store
            .get_investment(investment_id)
            .await?
            .ok_or(InvestError::InvestmentNotFound(investment_id))?;

        let lock = self.locks.for_user(inv.user_id);
        let _guard = lock.lock().await;

        // Re-read under the lock: a concurrent claim may have won.
        let mut inv = self
            .store
            .get_investment(investment_id)
            .await?
            .ok_or(InvestError::InvestmentNotFound(investment_id))?;

        if inv.status != InvestmentStatus::Completed {
            return Err(InvestError::NotCompleted);
        }
        if inv.roi_withdrawn {
            return Err(InvestError::RoiAlreadyWithdrawn);
        }
        let roi = inv.roi();
        if roi <= Decimal::ZERO {
            return Err(InvestError::NoRoiAvailable);
        }

        inv.roi_withdrawn = true;
        self.store.update_investment(&inv).await?;

        let now = Utc::now();
        let withdrawal = Withdrawal {
            withdrawal_id: crate::core_types::WithdrawalId::new(),
            user_id: inv.user_id,
            amount: roi,
            currency: "USD".to_string(),
            network: "INTERNAL".to_string(),
            wallet_address: String::new(),
            crypto_amount: Decimal::ZERO,
            kind: WithdrawalKind::Roi,
            status: WithdrawalStatus::Pending,
            billing_fee: Decimal::ZERO,
            billing_paid: false,
            billing_paid_at: None,
            processed_by: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_withdrawal(&withdrawal).await?;

        let mut user = self
            .store
            .get_user(inv.user_id)
            .await?
            .ok_or(StoreError::UserNotFound(inv.user_id))?;
        user.locked_balance += roi;
        user.available_balance =
            compute_available_balance(self.store.as_ref(), inv.user_id).await?.available_balance;
        guard::save_user(self.store.as_ref(), &mut user).await?;

        info!(
            user_id = inv.user_id,
            investment_id = %inv.investment_id,
            roi = %roi,
            withdrawal_id = %withdrawal.withdrawal_id,
            "ROI claimed to locked balance"
        );
        Ok((inv, withdrawal))
    }

    /// Cancel an active investment (admin only). Principal stays spent -
    /// the ledger counts principal regardless of investment status.
    pub async fn cancel(&self, investment_id: InvestmentId) -> Result<Investment, InvestError> {
        let mut inv = self
            .store
            .get_investment(investment_id)
            .await?
            .ok_or(InvestError::InvestmentNotFound(investment_id))?;

        if inv.status != InvestmentStatus::Active {
            return Err(InvestError::NotActive);
        }
        inv.status = InvestmentStatus::Cancelled;
        inv.updated_at = Utc::now();
        self.store.update_investment(&inv).await?;

        info!(
            user_id = inv.user_id,
            investment_id = %inv.investment_id,
            "Investment cancelled"
        );
        Ok(inv)
    }

    /// Re-arm a completed investment (admin "continue"): fresh start/end
    /// dates from the plan duration, value keeps drifting from where it is.
    pub async fn continue_investment(
        &self,
        investment_id: InvestmentId,
    ) -> Result<Investment, InvestError> {
        let mut inv = self
            .store
            .get_investment(investment_id)
            .await?
            .ok_or(InvestError::InvestmentNotFound(investment_id))?;

        if inv.status != InvestmentStatus::Completed {
            return Err(InvestError::NotCompleted);
        }
        let plan = self
            .plans
            .get(&inv.plan_name)
            .ok_or_else(|| InvestError::PlanNotFound(inv.plan_name.clone()))?;

        let now = Utc::now();
        inv.status = InvestmentStatus::Active;
        inv.start_date = now;
        inv.end_date = now + Duration::days(plan.duration_days);
        inv.updated_at = now;
        self.store.update_investment(&inv).await?;

        info!(
            user_id = inv.user_id,
            investment_id = %inv.investment_id,
            "Investment continued"
        );
        Ok(inv)
    }

    pub async fn history(&self, user_id: UserId) -> Result<Vec<Investment>, InvestError> {
        Ok(self.store.investments_for_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Deposit, DepositStatus, MemoryStore, UserAccount};
    use crate::core_types::Tier;

    async fn setup(balance: i64) -> (InvestmentService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.create_user(UserAccount::new(1001)).await.unwrap();
        if balance > 0 {
            let mut dep = Deposit::new(1001, Decimal::from(balance), "btc");
            dep.status = DepositStatus::Confirmed;
            store.insert_deposit(&dep).await.unwrap();
        }
        let svc = InvestmentService::new(
            store.clone(),
            Arc::new(PlanRegistry::builtin()),
            Arc::new(UserLocks::new()),
        );
        (svc, store)
    }

    #[tokio::test]
    async fn test_open_happy_path() {
        let (svc, store) = setup(2000).await;

        let inv = svc.open_investment(1001, "Silver", Decimal::from(1500)).await.unwrap();
        assert_eq!(inv.current_value, Decimal::from(1500));
        assert_eq!(inv.status, InvestmentStatus::Active);

        let user = store.get_user(1001).await.unwrap().unwrap();
        assert_eq!(user.available_balance, Decimal::from(500));
        assert_eq!(user.tier, Tier::Silver);
    }

    #[tokio::test]
    async fn test_open_check_order() {
        let (svc, _store) = setup(10_000).await;

        assert!(matches!(
            svc.open_investment(1001, "nope", Decimal::from(100)).await,
            Err(InvestError::PlanNotFound(_))
        ));
        assert!(matches!(
            svc.open_investment(1001, "Silver", Decimal::from(10)).await,
            Err(InvestError::AmountOutOfRange { .. })
        ));

        svc.open_investment(1001, "Silver", Decimal::from(1000)).await.unwrap();
        assert!(matches!(
            svc.open_investment(1001, "Silver", Decimal::from(1000)).await,
            Err(InvestError::ActiveInvestmentExists)
        ));
    }

    #[tokio::test]
    async fn test_open_insufficient_balance() {
        let (svc, _store) = setup(500).await;
        assert!(matches!(
            svc.open_investment(1001, "Silver", Decimal::from(1000)).await,
            Err(InvestError::InsufficientBalance)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_opens_exactly_one_wins() {
        let (svc, _store) = setup(100).await;
        let svc = Arc::new(svc);

        // Starter plan accepts 100; both try to spend the same 100.
        let a = tokio::spawn({
            let svc = svc.clone();
            async move { svc.open_investment(1001, "Starter", Decimal::from(100)).await }
        });
        let b = tokio::spawn({
            let svc = svc.clone();
            async move { svc.open_investment(1001, "Starter", Decimal::from(100)).await }
        });

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        let oks = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(oks, 1, "exactly one concurrent open must succeed");
        // The loser fails on balance or on the now-active investment,
        // depending on interleaving; both are stale-state conflicts.
        let err = if ra.is_err() { ra } else { rb };
        assert!(matches!(
            err,
            Err(InvestError::InsufficientBalance) | Err(InvestError::ActiveInvestmentExists)
        ));
    }

    #[tokio::test]
    async fn test_complete_sets_target_and_is_idempotent() {
        let (svc, _store) = setup(2000).await;
        let inv = svc.open_investment(1001, "Silver", Decimal::from(1000)).await.unwrap();

        let done = svc.complete_investment(inv.investment_id).await.unwrap();
        // Silver: 350% -> 1000 * 4.5
        assert_eq!(done.current_value, Decimal::from(4500));
        assert_eq!(done.status, InvestmentStatus::Completed);

        let again = svc.complete_investment(inv.investment_id).await.unwrap();
        assert_eq!(again.current_value, Decimal::from(4500));
        assert_eq!(again.transactions.len(), done.transactions.len());
    }

    #[tokio::test]
    async fn test_withdraw_roi_once() {
        let (svc, store) = setup(2000).await;
        let inv = svc.open_investment(1001, "Silver", Decimal::from(1000)).await.unwrap();
        svc.complete_investment(inv.investment_id).await.unwrap();

        let (inv, wd) = svc.withdraw_roi(inv.investment_id).await.unwrap();
        assert!(inv.roi_withdrawn);
        assert_eq!(wd.amount, Decimal::from(3500));
        assert_eq!(wd.kind, WithdrawalKind::Roi);
        assert_eq!(wd.status, WithdrawalStatus::Pending);

        let user = store.get_user(1001).await.unwrap().unwrap();
        assert_eq!(user.locked_balance, Decimal::from(3500));
        let available_before = user.available_balance;

        // Second claim fails and moves nothing.
        assert!(matches!(
            svc.withdraw_roi(inv.investment_id).await,
            Err(InvestError::RoiAlreadyWithdrawn)
        ));
        let user = store.get_user(1001).await.unwrap().unwrap();
        assert_eq!(user.locked_balance, Decimal::from(3500));
        assert_eq!(user.available_balance, available_before);
    }

    #[tokio::test]
    async fn test_withdraw_roi_requires_completed_and_positive_roi() {
        let (svc, store) = setup(2000).await;
        let inv = svc.open_investment(1001, "Silver", Decimal::from(1000)).await.unwrap();

        assert!(matches!(
            svc.withdraw_roi(inv.investment_id).await,
            Err(InvestError::NotCompleted)
        ));

        // Complete, then force the value back down to the principal so
        // roi == 0.
        let mut done = svc.complete_investment(inv.investment_id).await.unwrap();
        done.apply_delta(TxType::AdminAdjust, Decimal::from(-3500), "Test clamp");
        store.update_investment(&done).await.unwrap();

        assert!(matches!(
            svc.withdraw_roi(inv.investment_id).await,
            Err(InvestError::NoRoiAvailable)
        ));
    }

    #[tokio::test]
    async fn test_cancel_and_continue() {
        let (svc, _store) = setup(2000).await;
        let inv = svc.open_investment(1001, "Silver", Decimal::from(1000)).await.unwrap();

        let cancelled = svc.cancel(inv.investment_id).await.unwrap();
        assert_eq!(cancelled.status, InvestmentStatus::Cancelled);
        assert!(matches!(
            svc.cancel(inv.investment_id).await,
            Err(InvestError::NotActive)
        ));
        // Cancelled is terminal; completing errors too.
        assert!(matches!(
            svc.complete_investment(inv.investment_id).await,
            Err(InvestError::NotActive)
        ));
    }

    #[tokio::test]
    async fn test_continue_resets_dates() {
        let (svc, _store) = setup(2000).await;
        let inv = svc.open_investment(1001, "Silver", Decimal::from(1000)).await.unwrap();
        let done = svc.complete_investment(inv.investment_id).await.unwrap();

        let continued = svc.continue_investment(done.investment_id).await.unwrap();
        assert_eq!(continued.status, InvestmentStatus::Active);
        assert!(continued.end_date > continued.start_date);
        // Value carries over
        assert_eq!(continued.current_value, Decimal::from(4500));
    }

    #[tokio::test]
    async fn test_tier_never_downgrades() {
        let (svc, store) = setup(60_000).await;

        let inv = svc.open_investment(1001, "Diamond", Decimal::from(50_000)).await.unwrap();
        svc.cancel(inv.investment_id).await.unwrap();
        assert_eq!(store.get_user(1001).await.unwrap().unwrap().tier, Tier::Diamond);

        // 10000 left; Gold plan is below Diamond
        svc.open_investment(1001, "Gold", Decimal::from(5_000)).await.unwrap();
        assert_eq!(store.get_user(1001).await.unwrap().unwrap().tier, Tier::Diamond);
    }
}

//! In-memory ledger store.
//!
//! DashMap-backed, used by the default runtime and by tests. Semantics
//! mirror [`PgStore`]: whole-record replacement on update, append-only
//! audit logs.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Mutex;

use super::{
    BalanceAudit, Deposit, DepositStatus, GainEvent, Investment, InvestmentStatus, LedgerStore,
    StoreError, UserAccount, Withdrawal, WithdrawalKind, WithdrawalStatus,
};
use crate::core_types::{DepositId, InvestmentId, UserId, WithdrawalId};

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<UserId, UserAccount>,
    deposits: DashMap<DepositId, Deposit>,
    investments: DashMap<InvestmentId, Investment>,
    withdrawals: DashMap<WithdrawalId, Withdrawal>,
    audits: Mutex<Vec<BalanceAudit>>,
    gain_events: Mutex<Vec<GainEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_user(&self, user: UserAccount) -> Result<(), StoreError> {
        self.users.insert(user.user_id, user);
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn save_user(&self, user: &UserAccount) -> Result<(), StoreError> {
        if !self.users.contains_key(&user.user_id) {
            return Err(StoreError::UserNotFound(user.user_id));
        }
        self.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn insert_deposit(&self, deposit: &Deposit) -> Result<(), StoreError> {
        self.deposits.insert(deposit.deposit_id, deposit.clone());
        Ok(())
    }

    async fn get_deposit(&self, id: DepositId) -> Result<Option<Deposit>, StoreError> {
        Ok(self.deposits.get(&id).map(|d| d.clone()))
    }

    async fn update_deposit(&self, deposit: &Deposit) -> Result<(), StoreError> {
        if !self.deposits.contains_key(&deposit.deposit_id) {
            return Err(StoreError::NotFound(deposit.deposit_id.to_string()));
        }
        self.deposits.insert(deposit.deposit_id, deposit.clone());
        Ok(())
    }

    async fn deposits_for_user(&self, user_id: UserId) -> Result<Vec<Deposit>, StoreError> {
        let mut out: Vec<Deposit> = self
            .deposits
            .iter()
            .filter(|d| d.user_id == user_id)
            .map(|d| d.clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn insert_investment(&self, inv: &Investment) -> Result<(), StoreError> {
        self.investments.insert(inv.investment_id, inv.clone());
        Ok(())
    }

    async fn get_investment(&self, id: InvestmentId) -> Result<Option<Investment>, StoreError> {
        Ok(self.investments.get(&id).map(|i| i.clone()))
    }

    async fn update_investment(&self, inv: &Investment) -> Result<(), StoreError> {
        if !self.investments.contains_key(&inv.investment_id) {
            return Err(StoreError::NotFound(inv.investment_id.to_string()));
        }
        self.investments.insert(inv.investment_id, inv.clone());
        Ok(())
    }

    async fn active_investment_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<Investment>, StoreError> {
        Ok(self
            .investments
            .iter()
            .find(|i| i.user_id == user_id && i.status == InvestmentStatus::Active)
            .map(|i| i.clone()))
    }

    async fn active_investments(&self) -> Result<Vec<Investment>, StoreError> {
        Ok(self
            .investments
            .iter()
            .filter(|i| i.status == InvestmentStatus::Active)
            .map(|i| i.clone())
            .collect())
    }

    async fn investments_for_user(&self, user_id: UserId) -> Result<Vec<Investment>, StoreError> {
        let mut out: Vec<Investment> = self
            .investments
            .iter()
            .filter(|i| i.user_id == user_id)
            .map(|i| i.clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn insert_withdrawal(&self, wd: &Withdrawal) -> Result<(), StoreError> {
        self.withdrawals.insert(wd.withdrawal_id, wd.clone());
        Ok(())
    }

    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, StoreError> {
        Ok(self.withdrawals.get(&id).map(|w| w.clone()))
    }

    async fn update_withdrawal(&self, wd: &Withdrawal) -> Result<(), StoreError> {
        if !self.withdrawals.contains_key(&wd.withdrawal_id) {
            return Err(StoreError::NotFound(wd.withdrawal_id.to_string()));
        }
        self.withdrawals.insert(wd.withdrawal_id, wd.clone());
        Ok(())
    }

    async fn withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, StoreError> {
        let mut out: Vec<Withdrawal> = self
            .withdrawals
            .iter()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn pending_billing_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Withdrawal>, StoreError> {
        let mut out: Vec<Withdrawal> = self
            .withdrawals
            .iter()
            .filter(|w| {
                w.user_id == user_id
                    && w.kind == WithdrawalKind::Regular
                    && w.status == WithdrawalStatus::PendingBilling
                    && !w.billing_paid
            })
            .map(|w| w.clone())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn confirmed_deposit_sum(&self, user_id: UserId) -> Result<Decimal, StoreError> {
        Ok(self
            .deposits
            .iter()
            .filter(|d| d.user_id == user_id && d.status == DepositStatus::Confirmed)
            .map(|d| d.amount)
            .sum())
    }

    async fn invested_principal_sum(&self, user_id: UserId) -> Result<Decimal, StoreError> {
        // Principal counts regardless of investment status: it is spent
        // the instant it is allocated.
        Ok(self
            .investments
            .iter()
            .filter(|i| i.user_id == user_id)
            .map(|i| i.amount)
            .sum())
    }

    async fn completed_roi_withdrawal_sum(&self, user_id: UserId) -> Result<Decimal, StoreError> {
        Ok(self
            .withdrawals
            .iter()
            .filter(|w| {
                w.user_id == user_id
                    && w.kind == WithdrawalKind::Roi
                    && w.status == WithdrawalStatus::Completed
            })
            .map(|w| w.amount)
            .sum())
    }

    async fn net_admin_adjustments(&self, user_id: UserId) -> Result<Decimal, StoreError> {
        let audits = self
            .audits
            .lock()
            .map_err(|_| StoreError::Corrupt("audit log mutex poisoned".into()))?;
        Ok(audits
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.amount * Decimal::from(a.kind.sign()))
            .sum())
    }

    async fn append_audit(&self, entry: &BalanceAudit) -> Result<(), StoreError> {
        self.audits
            .lock()
            .map_err(|_| StoreError::Corrupt("audit log mutex poisoned".into()))?
            .push(entry.clone());
        Ok(())
    }

    async fn audits_for_user(&self, user_id: UserId) -> Result<Vec<BalanceAudit>, StoreError> {
        let audits = self
            .audits
            .lock()
            .map_err(|_| StoreError::Corrupt("audit log mutex poisoned".into()))?;
        Ok(audits
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn append_gain_event(&self, event: &GainEvent) -> Result<(), StoreError> {
        self.gain_events
            .lock()
            .map_err(|_| StoreError::Corrupt("gain log mutex poisoned".into()))?
            .push(event.clone());
        Ok(())
    }

    async fn gain_events_for_user(&self, user_id: UserId) -> Result<Vec<GainEvent>, StoreError> {
        let events = self
            .gain_events
            .lock()
            .map_err(|_| StoreError::Corrupt("gain log mutex poisoned".into()))?;
        Ok(events
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

//! Deposit service: submission and admin confirmation.
//!
//! A deposit contributes to the ledger exactly once, at the moment it
//! transitions to confirmed. Re-confirming is a no-op.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::core_types::{DepositId, UserId};
use crate::guard;
use crate::locks::UserLocks;
use crate::store::{Deposit, DepositStatus, LedgerStore, StoreError};

#[derive(Debug, Error)]
pub enum DepositError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Deposit not found: {0}")]
    NotFound(DepositId),
    #[error("Deposit already rejected")]
    AlreadyRejected,
}

pub struct DepositService {
    store: Arc<dyn LedgerStore>,
    locks: Arc<UserLocks>,
}

impl DepositService {
    pub fn new(store: Arc<dyn LedgerStore>, locks: Arc<UserLocks>) -> Self {
        Self { store, locks }
    }

    /// Submit a deposit. It stays pending until an admin confirms it and
    /// contributes nothing to the ledger until then.
    pub async fn submit(
        &self,
        user_id: UserId,
        amount: Decimal,
        method: &str,
    ) -> Result<Deposit, DepositError> {
        if amount <= Decimal::ZERO {
            return Err(DepositError::InvalidAmount);
        }
        if self.store.get_user(user_id).await?.is_none() {
            return Err(StoreError::UserNotFound(user_id).into());
        }

        let deposit = Deposit::new(user_id, amount, method);
        self.store.insert_deposit(&deposit).await?;
        info!(
            user_id,
            deposit_id = %deposit.deposit_id,
            amount = %amount,
            "Deposit submitted"
        );
        Ok(deposit)
    }

    /// Confirm a pending deposit (admin action).
    ///
    /// Idempotent: confirming an already-confirmed deposit changes nothing
    /// and returns the record as-is, so a double-click or a replayed admin
    /// request cannot double-credit.
    pub async fn confirm(&self, deposit_id: DepositId) -> Result<Deposit, DepositError> {
        let deposit = self
            .store
            .get_deposit(deposit_id)
            .await?
            .ok_or(DepositError::NotFound(deposit_id))?;

        // The cache refresh read-modify-writes the user record, so it runs
        // under the same per-user lock as the balance-moving services.
        let lock = self.locks.for_user(deposit.user_id);
        let _guard = lock.lock().await;

        let mut deposit = self
            .store
            .get_deposit(deposit_id)
            .await?
            .ok_or(DepositError::NotFound(deposit_id))?;

        match deposit.status {
            DepositStatus::Confirmed => return Ok(deposit),
            DepositStatus::Rejected => return Err(DepositError::AlreadyRejected),
            DepositStatus::Pending => {}
        }

        deposit.status = DepositStatus::Confirmed;
        deposit.confirmed_at = Some(Utc::now());
        self.store.update_deposit(&deposit).await?;

        self.refresh_balance(deposit.user_id).await?;
        info!(
            user_id = deposit.user_id,
            deposit_id = %deposit.deposit_id,
            amount = %deposit.amount,
            "Deposit confirmed"
        );
        Ok(deposit)
    }

    /// Reject a pending deposit (admin action).
    pub async fn reject(&self, deposit_id: DepositId) -> Result<Deposit, DepositError> {
        let deposit = self
            .store
            .get_deposit(deposit_id)
            .await?
            .ok_or(DepositError::NotFound(deposit_id))?;

        let lock = self.locks.for_user(deposit.user_id);
        let _guard = lock.lock().await;

        let mut deposit = self
            .store
            .get_deposit(deposit_id)
            .await?
            .ok_or(DepositError::NotFound(deposit_id))?;

        if deposit.status == DepositStatus::Rejected {
            return Ok(deposit);
        }

        let was_confirmed = deposit.status == DepositStatus::Confirmed;
        deposit.status = DepositStatus::Rejected;
        self.store.update_deposit(&deposit).await?;

        if was_confirmed {
            // Un-crediting a previously confirmed deposit moves the ledger.
            self.refresh_balance(deposit.user_id).await?;
        }
        info!(
            user_id = deposit.user_id,
            deposit_id = %deposit.deposit_id,
            "Deposit rejected"
        );
        Ok(deposit)
    }

    pub async fn history(&self, user_id: UserId) -> Result<Vec<Deposit>, DepositError> {
        Ok(self.store.deposits_for_user(user_id).await?)
    }

    /// Re-derive the cached balance after a ledger-moving transition.
    async fn refresh_balance(&self, user_id: UserId) -> Result<(), DepositError> {
        guard::refresh_cached_balance(self.store.as_ref(), user_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, UserAccount};

    fn service() -> (Arc<DepositService>, Arc<MemoryStore>, Arc<UserLocks>) {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(UserLocks::new());
        let svc = Arc::new(DepositService::new(store.clone(), locks.clone()));
        (svc, store, locks)
    }

    #[tokio::test]
    async fn test_submit_then_confirm_credits_once() {
        let (svc, store, _locks) = service();
        store.create_user(UserAccount::new(1001)).await.unwrap();

        let dep = svc.submit(1001, Decimal::from(1000), "btc").await.unwrap();
        // Pending: not in the ledger yet
        assert_eq!(
            store.confirmed_deposit_sum(1001).await.unwrap(),
            Decimal::ZERO
        );

        svc.confirm(dep.deposit_id).await.unwrap();
        assert_eq!(
            store.confirmed_deposit_sum(1001).await.unwrap(),
            Decimal::from(1000)
        );
        let user = store.get_user(1001).await.unwrap().unwrap();
        assert_eq!(user.available_balance, Decimal::from(1000));

        // Re-confirm: no-op, no double credit
        svc.confirm(dep.deposit_id).await.unwrap();
        assert_eq!(
            store.confirmed_deposit_sum(1001).await.unwrap(),
            Decimal::from(1000)
        );
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let (svc, store, _locks) = service();
        store.create_user(UserAccount::new(1001)).await.unwrap();

        assert!(matches!(
            svc.submit(1001, Decimal::ZERO, "btc").await,
            Err(DepositError::InvalidAmount)
        ));
        assert!(matches!(
            svc.submit(1001, Decimal::from(-5), "btc").await,
            Err(DepositError::InvalidAmount)
        ));
        assert!(matches!(
            svc.submit(404, Decimal::from(10), "btc").await,
            Err(DepositError::Store(StoreError::UserNotFound(404)))
        ));
    }

    #[tokio::test]
    async fn test_reject_confirmed_uncredits() {
        let (svc, store, _locks) = service();
        store.create_user(UserAccount::new(1001)).await.unwrap();

        let dep = svc.submit(1001, Decimal::from(300), "eth").await.unwrap();
        svc.confirm(dep.deposit_id).await.unwrap();
        svc.reject(dep.deposit_id).await.unwrap();

        let user = store.get_user(1001).await.unwrap().unwrap();
        assert_eq!(user.available_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_confirm_serializes_with_locked_balance_writers() {
        let (svc, store, locks) = service();
        store.create_user(UserAccount::new(1001)).await.unwrap();
        let dep = svc.submit(1001, Decimal::from(1000), "btc").await.unwrap();

        // Another service holds the user lock while it moves locked_balance.
        let lock = locks.for_user(1001);
        let held = lock.lock().await;
        let task = tokio::spawn({
            let svc = svc.clone();
            async move { svc.confirm(dep.deposit_id).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!task.is_finished(), "confirm must wait for the user lock");

        let mut user = store.get_user(1001).await.unwrap().unwrap();
        user.locked_balance = Decimal::from(3500);
        store.save_user(&user).await.unwrap();
        drop(held);

        task.await.unwrap().unwrap();

        // Confirm re-read the record after the lock released: the locked
        // amount survives its save and the cache picks up the deposit.
        let user = store.get_user(1001).await.unwrap().unwrap();
        assert_eq!(user.locked_balance, Decimal::from(3500));
        assert_eq!(user.available_balance, Decimal::from(1000));
    }
}

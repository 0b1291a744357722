//! Admin balance surface: out-of-band adjustments and account bootstrap.
//!
//! Adjustments never touch the cached balance directly. They append an
//! immutable audit entry (the `net_admin_adjustments` ledger term) and
//! re-derive the cache from the formula.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::core_types::{AuditId, UserId};
use crate::guard;
use crate::ledger::compute_available_balance;
use crate::locks::UserLocks;
use crate::store::{AuditKind, BalanceAudit, LedgerStore, StoreError, UserAccount};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Adjustment kind must be admin_add or admin_subtract")]
    InvalidKind,
    #[error("User already exists: {0}")]
    UserExists(UserId),
}

pub struct AdminService {
    store: Arc<dyn LedgerStore>,
    locks: Arc<UserLocks>,
}

impl AdminService {
    pub fn new(store: Arc<dyn LedgerStore>, locks: Arc<UserLocks>) -> Self {
        Self { store, locks }
    }

    pub async fn create_user(&self, user_id: UserId) -> Result<UserAccount, AdminError> {
        if self.store.get_user(user_id).await?.is_some() {
            return Err(AdminError::UserExists(user_id));
        }
        let user = UserAccount::new(user_id);
        self.store.create_user(user.clone()).await?;
        info!(user_id, "User account created");
        Ok(user)
    }

    /// Credit or debit a user out-of-band. `kind` must be one of the two
    /// admin kinds; `amount` is always positive, the kind carries the sign.
    pub async fn adjust_balance(
        &self,
        user_id: UserId,
        kind: AuditKind,
        amount: Decimal,
        actor: &str,
        note: Option<String>,
    ) -> Result<BalanceAudit, AdminError> {
        if amount <= Decimal::ZERO {
            return Err(AdminError::InvalidAmount);
        }
        if !matches!(kind, AuditKind::AdminAdd | AuditKind::AdminSubtract) {
            return Err(AdminError::InvalidKind);
        }

        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().await;

        let before = compute_available_balance(self.store.as_ref(), user_id)
            .await?
            .available_balance;
        let signed = amount * Decimal::from(kind.sign());

        let entry = BalanceAudit {
            audit_id: AuditId::new(),
            user_id,
            kind,
            amount,
            previous_balance: before,
            new_balance: before + signed,
            actor: actor.to_string(),
            note,
            created_at: Utc::now(),
        };
        self.store.append_audit(&entry).await?;
        guard::refresh_cached_balance(self.store.as_ref(), user_id).await?;

        info!(
            user_id,
            kind = ?kind,
            amount = %amount,
            actor,
            "Balance adjusted"
        );
        Ok(entry)
    }

    pub async fn audit_history(&self, user_id: UserId) -> Result<Vec<BalanceAudit>, AdminError> {
        Ok(self.store.audits_for_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> (AdminService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            AdminService::new(store.clone(), Arc::new(UserLocks::new())),
            store,
        )
    }

    #[tokio::test]
    async fn test_create_user_once() {
        let (svc, _store) = service();
        let user = svc.create_user(1001).await.unwrap();
        assert_eq!(user.available_balance, Decimal::ZERO);
        assert!(matches!(
            svc.create_user(1001).await,
            Err(AdminError::UserExists(1001))
        ));
    }

    #[tokio::test]
    async fn test_adjust_add_then_subtract() {
        let (svc, store) = service();
        svc.create_user(1001).await.unwrap();

        let entry = svc
            .adjust_balance(1001, AuditKind::AdminAdd, Decimal::from(500), "admin:7", None)
            .await
            .unwrap();
        assert_eq!(entry.previous_balance, Decimal::ZERO);
        assert_eq!(entry.new_balance, Decimal::from(500));

        svc.adjust_balance(
            1001,
            AuditKind::AdminSubtract,
            Decimal::from(120),
            "admin:7",
            Some("chargeback".to_string()),
        )
        .await
        .unwrap();

        let user = store.get_user(1001).await.unwrap().unwrap();
        assert_eq!(user.available_balance, Decimal::from(380));
        assert_eq!(svc.audit_history(1001).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_adjust_validation() {
        let (svc, _store) = service();
        svc.create_user(1001).await.unwrap();

        assert!(matches!(
            svc.adjust_balance(1001, AuditKind::AdminAdd, Decimal::ZERO, "a", None).await,
            Err(AdminError::InvalidAmount)
        ));
        assert!(matches!(
            svc.adjust_balance(1001, AuditKind::Correction, Decimal::ONE, "a", None).await,
            Err(AdminError::InvalidKind)
        ));
        assert!(matches!(
            svc.adjust_balance(404, AuditKind::AdminAdd, Decimal::ONE, "a", None).await,
            Err(AdminError::Store(StoreError::UserNotFound(404)))
        ));
    }
}

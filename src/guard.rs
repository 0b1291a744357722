//! Balance consistency guard.
//!
//! Save-time safety net over the ledger: before a balance-bearing user
//! save, recompute the available balance from the underlying collections
//! and, when the cached value has drifted past tolerance, overwrite it and
//! append a correction audit entry. Self-repair is silent to the user -
//! the audit trail is for operators.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::core_types::AuditId;
use crate::ledger::compute_available_balance;
use crate::store::{AuditKind, BalanceAudit, LedgerStore, UserAccount};

/// Maximum tolerated drift between cached and recomputed balance.
pub const TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

/// Reconcile the cached `available_balance` against the ledger formula.
///
/// Returns true when a correction was applied. Never fails: any store
/// error during recomputation or audit logging is logged and swallowed so
/// the caller's save proceeds with the value it had.
pub async fn reconcile(store: &dyn LedgerStore, user: &mut UserAccount) -> bool {
    let computed = match compute_available_balance(store, user.user_id).await {
        Ok(breakdown) => breakdown.available_balance,
        Err(e) => {
            warn!(user_id = user.user_id, error = %e, "Consistency guard: recompute failed, skipping");
            return false;
        }
    };

    let cached = user.available_balance;
    let diff = (cached - computed).abs();
    if diff <= TOLERANCE {
        debug!(user_id = user.user_id, balance = %computed, "Consistency guard: in tolerance");
        return false;
    }

    warn!(
        user_id = user.user_id,
        cached = %cached,
        computed = %computed,
        diff = %diff,
        "Consistency guard: balance drift corrected"
    );
    user.available_balance = computed;

    let entry = BalanceAudit {
        audit_id: AuditId::new(),
        user_id: user.user_id,
        kind: AuditKind::Correction,
        amount: diff,
        previous_balance: cached,
        new_balance: computed,
        actor: "consistency-guard".to_string(),
        note: Some("auto-corrected cached balance against ledger".to_string()),
        created_at: Utc::now(),
    };
    if let Err(e) = store.append_audit(&entry).await {
        // Audit is best-effort: the correction itself already happened.
        warn!(user_id = user.user_id, error = %e, "Consistency guard: audit write failed");
    }

    true
}

/// Save a user record through the guard.
///
/// The write path for every balance-bearing save: callers that moved the
/// ledger first set `available_balance` from the formula (so the guard
/// stays quiet), callers that drifted get corrected here.
pub async fn save_user(
    store: &dyn LedgerStore,
    user: &mut UserAccount,
) -> Result<(), crate::store::StoreError> {
    reconcile(store, user).await;
    store.save_user(user).await
}

/// Reload a user, re-derive the cached balance from the ledger and
/// persist. Convenience for operations that only moved collection records
/// and have no other user fields to touch.
pub async fn refresh_cached_balance(
    store: &dyn LedgerStore,
    user_id: crate::core_types::UserId,
) -> Result<UserAccount, crate::store::StoreError> {
    let mut user = store
        .get_user(user_id)
        .await?
        .ok_or(crate::store::StoreError::UserNotFound(user_id))?;
    let breakdown = compute_available_balance(store, user_id).await?;
    user.available_balance = breakdown.available_balance;
    save_user(store, &mut user).await?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Deposit, DepositStatus, MemoryStore};

    #[tokio::test]
    async fn test_in_tolerance_untouched() {
        let store = MemoryStore::new();
        store.create_user(UserAccount::new(1001)).await.unwrap();

        let mut dep = Deposit::new(1001, Decimal::from(100), "btc");
        dep.status = DepositStatus::Confirmed;
        store.insert_deposit(&dep).await.unwrap();

        let mut user = store.get_user(1001).await.unwrap().unwrap();
        user.available_balance = Decimal::new(10001, 2); // 100.01, within 0.01

        assert!(!reconcile(&store, &mut user).await);
        assert_eq!(user.available_balance, Decimal::new(10001, 2));
        assert!(store.audits_for_user(1001).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drift_corrected_and_audited() {
        let store = MemoryStore::new();
        store.create_user(UserAccount::new(1001)).await.unwrap();

        let mut dep = Deposit::new(1001, Decimal::from(100), "btc");
        dep.status = DepositStatus::Confirmed;
        store.insert_deposit(&dep).await.unwrap();

        let mut user = store.get_user(1001).await.unwrap().unwrap();
        user.available_balance = Decimal::from(175); // drifted

        assert!(reconcile(&store, &mut user).await);
        assert_eq!(user.available_balance, Decimal::from(100));

        let audits = store.audits_for_user(1001).await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].kind, AuditKind::Correction);
        assert_eq!(audits[0].previous_balance, Decimal::from(175));
        assert_eq!(audits[0].new_balance, Decimal::from(100));
        assert_eq!(audits[0].amount, Decimal::from(75));
    }

    #[tokio::test]
    async fn test_unknown_user_never_errors() {
        let store = MemoryStore::new();
        let mut user = UserAccount::new(404); // not in store
        user.available_balance = Decimal::from(50);

        // Guard swallows the recompute failure and leaves the value alone.
        assert!(!reconcile(&store, &mut user).await);
        assert_eq!(user.available_balance, Decimal::from(50));
    }
}

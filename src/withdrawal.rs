//! Withdrawal/billing gate.
//!
//! Two-phase flow for regular withdrawals: the request opens in
//! `pending_billing` with a fee quote and moves nothing; paying the fee
//! deducts it from the available balance and advances the record to
//! `pending`, where an admin resolves it. ROI withdrawals (created by the
//! investment service) skip the gate and start at `pending`.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::BillingConfig;
use crate::core_types::{AuditId, UserId, WithdrawalId};
use crate::guard;
use crate::ledger::compute_available_balance;
use crate::locks::UserLocks;
use crate::money::{percent_of, round2};
use crate::rates::{RateProvider, usd_to_crypto};
use crate::store::{
    AuditKind, BalanceAudit, LedgerStore, StoreError, UserAccount, Withdrawal, WithdrawalKind,
    WithdrawalStatus,
};

#[derive(Debug, Error)]
pub enum WithdrawError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Withdrawal PIN not set")]
    PinNotSet,
    #[error("Invalid withdrawal PIN")]
    InvalidPin,
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Withdrawal not found: {0}")]
    NotFound(WithdrawalId),
    #[error("Withdrawal is not awaiting billing")]
    NotAwaitingBilling,
    #[error("No outstanding billing fees")]
    NothingToPay,
    #[error("Withdrawal cannot be resolved from status {0}")]
    NotResolvable(WithdrawalStatus),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Where an admin-completed withdrawal's amount is credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutDestination {
    Available,
    Locked,
}

/// Quote returned by a withdrawal request: the record plus what the user
/// must pay, and where, to unlock admin review.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WithdrawalQuote {
    pub withdrawal: Withdrawal,
    pub billing_fee: Decimal,
    pub fee_wallet: Option<String>,
}

pub struct WithdrawalService {
    store: Arc<dyn LedgerStore>,
    rates: Arc<dyn RateProvider>,
    locks: Arc<UserLocks>,
    billing: BillingConfig,
}

impl WithdrawalService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        rates: Arc<dyn RateProvider>,
        locks: Arc<UserLocks>,
        billing: BillingConfig,
    ) -> Self {
        Self {
            store,
            rates,
            locks,
            billing,
        }
    }

    /// Set (or replace) a user's withdrawal PIN.
    ///
    /// Writes the whole user record, so it runs under the per-user lock
    /// like every other user-record writer.
    pub async fn set_pin(&self, user_id: UserId, pin: &str) -> Result<(), WithdrawError> {
        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().await;

        let mut user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(StoreError::UserNotFound(user_id))?;

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(pin.as_bytes(), &salt)
            .map_err(|e| WithdrawError::Internal(format!("PIN hashing failed: {}", e)))?
            .to_string();

        user.pin_hash = Some(hash);
        user.updated_at = Utc::now();
        guard::save_user(self.store.as_ref(), &mut user).await?;
        info!(user_id, "Withdrawal PIN set");
        Ok(())
    }

    fn verify_pin(&self, user: &UserAccount, pin: &str) -> Result<(), WithdrawError> {
        let hash_str = user.pin_hash.as_deref().ok_or(WithdrawError::PinNotSet)?;
        let parsed = PasswordHash::new(hash_str)
            .map_err(|e| WithdrawError::Internal(format!("Stored PIN hash invalid: {}", e)))?;
        Argon2::default()
            .verify_password(pin.as_bytes(), &parsed)
            .map_err(|_| WithdrawError::InvalidPin)
    }

    /// Open a regular withdrawal in `pending_billing`.
    ///
    /// Validates the PIN and the available balance, converts the USD
    /// amount to the payout crypto (live rate, static fallback) and quotes
    /// the billing fee. Nothing is deducted here.
    pub async fn request_withdrawal(
        &self,
        user_id: UserId,
        amount: Decimal,
        currency: &str,
        network: &str,
        wallet_address: &str,
        pin: &str,
    ) -> Result<WithdrawalQuote, WithdrawError> {
        if amount <= Decimal::ZERO {
            return Err(WithdrawError::InvalidAmount);
        }
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(StoreError::UserNotFound(user_id))?;
        self.verify_pin(&user, pin)?;

        let balance = compute_available_balance(self.store.as_ref(), user_id).await?;
        if balance.available_balance < amount {
            return Err(WithdrawError::InsufficientBalance);
        }

        let crypto_amount = usd_to_crypto(self.rates.as_ref(), amount, currency)
            .await
            .ok_or_else(|| WithdrawError::UnsupportedCurrency(currency.to_string()))?;
        let billing_fee = round2(percent_of(amount, Decimal::from(self.billing.fee_percent)));

        let now = Utc::now();
        let withdrawal = Withdrawal {
            withdrawal_id: WithdrawalId::new(),
            user_id,
            amount,
            currency: currency.to_uppercase(),
            network: network.to_uppercase(),
            wallet_address: wallet_address.to_string(),
            crypto_amount,
            kind: WithdrawalKind::Regular,
            status: WithdrawalStatus::PendingBilling,
            billing_fee,
            billing_paid: false,
            billing_paid_at: None,
            processed_by: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_withdrawal(&withdrawal).await?;

        let fee_wallet = self
            .billing
            .fee_wallets
            .get(&withdrawal.network)
            .cloned();
        if fee_wallet.is_none() {
            warn!(network = %withdrawal.network, "No fee wallet configured for network");
        }

        info!(
            user_id,
            withdrawal_id = %withdrawal.withdrawal_id,
            amount = %amount,
            fee = %billing_fee,
            "Withdrawal requested, awaiting billing"
        );
        Ok(WithdrawalQuote {
            billing_fee,
            fee_wallet,
            withdrawal,
        })
    }

    /// Pay the billing fee of one withdrawal: deducts the fee from the
    /// available balance and advances the record to `pending`.
    pub async fn pay_billing(
        &self,
        withdrawal_id: WithdrawalId,
        pin: &str,
    ) -> Result<Withdrawal, WithdrawError> {
        let wd = self
            .store
            .get_withdrawal(withdrawal_id)
            .await?
            .ok_or(WithdrawError::NotFound(withdrawal_id))?;

        let lock = self.locks.for_user(wd.user_id);
        let _guard = lock.lock().await;

        let wd = self
            .store
            .get_withdrawal(withdrawal_id)
            .await?
            .ok_or(WithdrawError::NotFound(withdrawal_id))?;
        if wd.status != WithdrawalStatus::PendingBilling || wd.billing_paid {
            return Err(WithdrawError::NotAwaitingBilling);
        }

        let user = self
            .store
            .get_user(wd.user_id)
            .await?
            .ok_or(StoreError::UserNotFound(wd.user_id))?;
        self.verify_pin(&user, pin)?;

        let balance = compute_available_balance(self.store.as_ref(), wd.user_id).await?;
        if balance.available_balance < wd.billing_fee {
            return Err(WithdrawError::InsufficientBalance);
        }

        let paid = self.settle_fee(wd, balance.available_balance).await?;
        guard::refresh_cached_balance(self.store.as_ref(), paid.user_id).await?;
        Ok(paid)
    }

    /// Pay every outstanding billing fee of a user in one shot.
    ///
    /// All-or-nothing against the combined total: either the balance
    /// covers every fee and all withdrawals advance, or nothing changes.
    pub async fn pay_all_billing(
        &self,
        user_id: UserId,
        pin: &str,
    ) -> Result<Vec<Withdrawal>, WithdrawError> {
        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().await;

        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(StoreError::UserNotFound(user_id))?;
        self.verify_pin(&user, pin)?;

        let outstanding = self.store.pending_billing_for_user(user_id).await?;
        if outstanding.is_empty() {
            return Err(WithdrawError::NothingToPay);
        }

        let total: Decimal = outstanding.iter().map(|w| w.billing_fee).sum();
        let mut running = compute_available_balance(self.store.as_ref(), user_id)
            .await?
            .available_balance;
        if running < total {
            return Err(WithdrawError::InsufficientBalance);
        }

        let mut paid = Vec::with_capacity(outstanding.len());
        for wd in outstanding {
            let settled = match self.settle_fee(wd, running).await {
                Ok(settled) => settled,
                Err(e) => {
                    // Fees settled so far stay settled; reconcile the cache
                    // for them and surface the partial state.
                    warn!(
                        user_id,
                        settled = paid.len(),
                        error = %e,
                        "Bulk billing payment stopped partway"
                    );
                    guard::refresh_cached_balance(self.store.as_ref(), user_id).await?;
                    return Err(e);
                }
            };
            running -= settled.billing_fee;
            paid.push(settled);
        }
        guard::refresh_cached_balance(self.store.as_ref(), user_id).await?;
        info!(user_id, count = paid.len(), total = %total, "All billing fees paid");
        Ok(paid)
    }

    /// Deduct one fee: audit entry plus the status advance. Caller has
    /// already verified the PIN, the balance and the status, and holds the
    /// user lock.
    async fn settle_fee(
        &self,
        mut wd: Withdrawal,
        balance_before: Decimal,
    ) -> Result<Withdrawal, WithdrawError> {
        let now = Utc::now();
        self.store
            .append_audit(&BalanceAudit {
                audit_id: AuditId::new(),
                user_id: wd.user_id,
                kind: AuditKind::BillingFee,
                amount: wd.billing_fee,
                previous_balance: balance_before,
                new_balance: balance_before - wd.billing_fee,
                actor: format!("user:{}", wd.user_id),
                note: Some(format!("billing fee for withdrawal {}", wd.withdrawal_id)),
                created_at: now,
            })
            .await?;

        wd.billing_paid = true;
        wd.billing_paid_at = Some(now);
        wd.status = WithdrawalStatus::Pending;
        wd.updated_at = now;
        self.store.update_withdrawal(&wd).await?;

        info!(
            user_id = wd.user_id,
            withdrawal_id = %wd.withdrawal_id,
            fee = %wd.billing_fee,
            "Billing fee paid, withdrawal pending approval"
        );
        Ok(wd)
    }

    /// Admin resolution of a `pending` (or `processing`) withdrawal.
    ///
    /// Completion credits the chosen destination for regular withdrawals;
    /// a completed ROI withdrawal releases its locked amount and the
    /// ledger formula credits the available balance. Rejection or failure
    /// of an ROI withdrawal unlocks the amount back to available.
    pub async fn admin_resolve(
        &self,
        withdrawal_id: WithdrawalId,
        status: WithdrawalStatus,
        destination: PayoutDestination,
        actor: &str,
    ) -> Result<Withdrawal, WithdrawError> {
        let wd = self
            .store
            .get_withdrawal(withdrawal_id)
            .await?
            .ok_or(WithdrawError::NotFound(withdrawal_id))?;

        let lock = self.locks.for_user(wd.user_id);
        let _guard = lock.lock().await;

        let mut wd = self
            .store
            .get_withdrawal(withdrawal_id)
            .await?
            .ok_or(WithdrawError::NotFound(withdrawal_id))?;

        if !matches!(
            wd.status,
            WithdrawalStatus::Pending | WithdrawalStatus::Processing
        ) {
            return Err(WithdrawError::NotResolvable(wd.status));
        }
        if !matches!(
            status,
            WithdrawalStatus::Processing
                | WithdrawalStatus::Completed
                | WithdrawalStatus::Rejected
                | WithdrawalStatus::Failed
        ) {
            return Err(WithdrawError::NotResolvable(status));
        }

        let now = Utc::now();
        let mut user = self
            .store
            .get_user(wd.user_id)
            .await?
            .ok_or(StoreError::UserNotFound(wd.user_id))?;

        wd.status = status;
        wd.updated_at = now;
        if status.is_terminal() {
            wd.processed_by = Some(actor.to_string());
            wd.processed_at = Some(now);
        }
        // The status write goes first so the ledger sums below see it.
        self.store.update_withdrawal(&wd).await?;

        match (wd.kind, status) {
            (WithdrawalKind::Roi, WithdrawalStatus::Completed) => {
                // Claimed ROI leaves the lock; the completed-roi ledger
                // term now carries the amount into available.
                user.locked_balance -= wd.amount;
            }
            (WithdrawalKind::Roi, WithdrawalStatus::Rejected | WithdrawalStatus::Failed) => {
                user.locked_balance -= wd.amount;
                self.credit_available(&wd, actor, "roi withdrawal returned to balance")
                    .await?;
            }
            (WithdrawalKind::Regular, WithdrawalStatus::Completed) => match destination {
                PayoutDestination::Available => {
                    self.credit_available(&wd, actor, "withdrawal completed to balance")
                        .await?;
                }
                PayoutDestination::Locked => {
                    user.locked_balance += wd.amount;
                }
            },
            _ => {}
        }

        user.available_balance = compute_available_balance(self.store.as_ref(), wd.user_id)
            .await?
            .available_balance;
        user.updated_at = now;
        guard::save_user(self.store.as_ref(), &mut user).await?;

        info!(
            user_id = wd.user_id,
            withdrawal_id = %wd.withdrawal_id,
            status = %status,
            actor,
            "Withdrawal resolved"
        );
        Ok(wd)
    }

    async fn credit_available(
        &self,
        wd: &Withdrawal,
        actor: &str,
        note: &str,
    ) -> Result<(), WithdrawError> {
        let before = compute_available_balance(self.store.as_ref(), wd.user_id)
            .await?
            .available_balance;
        self.store
            .append_audit(&BalanceAudit {
                audit_id: AuditId::new(),
                user_id: wd.user_id,
                kind: AuditKind::WithdrawalCredit,
                amount: wd.amount,
                previous_balance: before,
                new_balance: before + wd.amount,
                actor: actor.to_string(),
                note: Some(format!("{} ({})", note, wd.withdrawal_id)),
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    pub async fn history(&self, user_id: UserId) -> Result<Vec<Withdrawal>, WithdrawError> {
        Ok(self.store.withdrawals_for_user(user_id).await?)
    }

    pub async fn outstanding_billing(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Withdrawal>, WithdrawError> {
        Ok(self.store.pending_billing_for_user(user_id).await?)
    }
}

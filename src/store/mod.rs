//! Ledger store: record types and the persistence trait.
//!
//! Ground truth lives in five collections (users, deposits, investments,
//! withdrawals, balance audit). The cached `available_balance` on the user
//! record is strictly a cache - the ledger reader recomputes it from the
//! collections and the consistency guard reconciles it on every save.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core_types::{AuditId, DepositId, InvestmentId, Tier, UserId, WithdrawalId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("User not found: {0}")]
    UserNotFound(UserId),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

// ============================================================================
// User account
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: UserId,
    /// Cached spendable balance. Reconciled by the consistency guard;
    /// the ledger reader is the authority.
    pub available_balance: Decimal,
    /// ROI claimed from a completed investment but not yet approved.
    pub locked_balance: Decimal,
    pub tier: Tier,
    /// Argon2 hash of the withdrawal PIN. None until the user sets one.
    pub pin_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            available_balance: Decimal::ZERO,
            locked_balance: Decimal::ZERO,
            tier: Tier::Starter,
            pin_hash: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Deposits
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum DepositStatus {
    Pending = 1,
    Confirmed = 2,
    Rejected = 3,
}

impl DepositStatus {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(DepositStatus::Pending),
            2 => Some(DepositStatus::Confirmed),
            3 => Some(DepositStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub deposit_id: DepositId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub method: String,
    pub status: DepositStatus,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Deposit {
    pub fn new(user_id: UserId, amount: Decimal, method: impl Into<String>) -> Self {
        Self {
            deposit_id: DepositId::new(),
            user_id,
            amount,
            method: method.into(),
            status: DepositStatus::Pending,
            confirmed_at: None,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Investments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum InvestmentStatus {
    Active = 1,
    Completed = 2,
    Cancelled = 3,
}

impl InvestmentStatus {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(InvestmentStatus::Active),
            2 => Some(InvestmentStatus::Completed),
            3 => Some(InvestmentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvestmentStatus::Completed | InvestmentStatus::Cancelled)
    }
}

impl fmt::Display for InvestmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvestmentStatus::Active => write!(f, "active"),
            InvestmentStatus::Completed => write!(f, "completed"),
            InvestmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Deposit,
    Roi,
    Gain,
    Loss,
    AdminAdjust,
}

/// One entry in an investment's append-only transaction list.
///
/// Every change to `current_value` MUST be explained by exactly one of
/// these - there is no other mutation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentTx {
    pub tx_type: TxType,
    /// Signed delta applied to `current_value` (the opening deposit entry
    /// carries the principal).
    pub amount: Decimal,
    pub description: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    pub investment_id: InvestmentId,
    pub user_id: UserId,
    pub plan_name: String,
    /// Principal - immutable once set.
    pub amount: Decimal,
    pub current_value: Decimal,
    pub status: InvestmentStatus,
    pub roi_withdrawn: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Append-only audit of every value change.
    pub transactions: Vec<InvestmentTx>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Investment {
    /// Open a new investment: `current_value` starts at the principal and
    /// the opening `deposit` transaction is appended.
    pub fn open(
        user_id: UserId,
        plan_name: impl Into<String>,
        amount: Decimal,
        end_date: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        let mut inv = Self {
            investment_id: InvestmentId::new(),
            user_id,
            plan_name: plan_name.into(),
            amount,
            current_value: Decimal::ZERO,
            status: InvestmentStatus::Active,
            roi_withdrawn: false,
            start_date: now,
            end_date,
            transactions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        inv.apply_delta(TxType::Deposit, amount, "Initial investment");
        inv
    }

    /// The one mutation path for `current_value`: apply a signed delta and
    /// record the transaction that explains it.
    pub fn apply_delta(&mut self, tx_type: TxType, delta: Decimal, description: impl Into<String>) {
        let now = Utc::now();
        self.current_value += delta;
        self.transactions.push(InvestmentTx {
            tx_type,
            amount: delta,
            description: description.into(),
            at: now,
        });
        self.updated_at = now;
    }

    /// Unrealized ROI: `current_value - principal`.
    pub fn roi(&self) -> Decimal {
        self.current_value - self.amount
    }

    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.start_date).num_minutes()
    }
}

// ============================================================================
// Withdrawals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum WithdrawalKind {
    Regular = 1,
    Roi = 2,
}

impl WithdrawalKind {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(WithdrawalKind::Regular),
            2 => Some(WithdrawalKind::Roi),
            _ => None,
        }
    }
}

/// Withdrawal FSM states.
///
/// Regular flow: PendingBilling -> Pending -> {Completed | Rejected},
/// with Processing/Failed as admin-set intermediates. ROI withdrawals
/// start directly at Pending (the fee gate applies to regular only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum WithdrawalStatus {
    PendingBilling = 1,
    Pending = 2,
    Processing = 3,
    Completed = 4,
    Rejected = 5,
    Failed = 6,
}

impl WithdrawalStatus {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(WithdrawalStatus::PendingBilling),
            2 => Some(WithdrawalStatus::Pending),
            3 => Some(WithdrawalStatus::Processing),
            4 => Some(WithdrawalStatus::Completed),
            5 => Some(WithdrawalStatus::Rejected),
            6 => Some(WithdrawalStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Completed | WithdrawalStatus::Rejected | WithdrawalStatus::Failed
        )
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WithdrawalStatus::PendingBilling => "pending_billing",
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Rejected => "rejected",
            WithdrawalStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub withdrawal_id: WithdrawalId,
    pub user_id: UserId,
    /// Requested amount, USD-denominated.
    pub amount: Decimal,
    pub currency: String,
    pub network: String,
    pub wallet_address: String,
    /// `amount` converted to the payout crypto at request time.
    pub crypto_amount: Decimal,
    pub kind: WithdrawalKind,
    pub status: WithdrawalStatus,
    pub billing_fee: Decimal,
    pub billing_paid: bool,
    pub billing_paid_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Balance audit
// ============================================================================

/// Audit entry kinds. Every out-of-band balance movement is one of these;
/// the signed sum of the formula-bearing kinds is the ledger's
/// `net_admin_adjustments` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum AuditKind {
    AdminAdd = 1,
    AdminSubtract = 2,
    /// Billing fee deducted when a withdrawal's fee gate is paid.
    BillingFee = 3,
    /// Admin completed a withdrawal to the available destination.
    WithdrawalCredit = 4,
    /// Consistency-guard self-repair (not part of the ledger formula).
    Correction = 5,
}

impl AuditKind {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(AuditKind::AdminAdd),
            2 => Some(AuditKind::AdminSubtract),
            3 => Some(AuditKind::BillingFee),
            4 => Some(AuditKind::WithdrawalCredit),
            5 => Some(AuditKind::Correction),
            _ => None,
        }
    }

    /// Sign of this kind in the ledger formula: +1, -1 or 0 (excluded).
    pub fn sign(&self) -> i64 {
        match self {
            AuditKind::AdminAdd | AuditKind::WithdrawalCredit => 1,
            AuditKind::AdminSubtract | AuditKind::BillingFee => -1,
            AuditKind::Correction => 0,
        }
    }
}

/// Immutable audit entry for every out-of-band balance change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceAudit {
    pub audit_id: AuditId,
    pub user_id: UserId,
    pub kind: AuditKind,
    pub amount: Decimal,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
    pub actor: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable per-tick gain/loss event, the user-facing drift history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GainEvent {
    pub user_id: UserId,
    pub investment_id: InvestmentId,
    /// Signed delta applied to the investment's current value.
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Store trait
// ============================================================================

/// Persistence seam for the ledger.
///
/// Two implementations: [`MemoryStore`] (DashMap, default runtime and
/// tests) and [`PgStore`] (PostgreSQL via sqlx). Cross-record atomicity is
/// provided above this trait by the services' per-user serialization.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // --- users ---
    async fn create_user(&self, user: UserAccount) -> Result<(), StoreError>;
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserAccount>, StoreError>;
    /// Persist a user record. Callers mutating balance-bearing fields must
    /// run the consistency guard first (see `guard::reconcile`).
    async fn save_user(&self, user: &UserAccount) -> Result<(), StoreError>;

    // --- deposits ---
    async fn insert_deposit(&self, deposit: &Deposit) -> Result<(), StoreError>;
    async fn get_deposit(&self, id: DepositId) -> Result<Option<Deposit>, StoreError>;
    async fn update_deposit(&self, deposit: &Deposit) -> Result<(), StoreError>;
    async fn deposits_for_user(&self, user_id: UserId) -> Result<Vec<Deposit>, StoreError>;

    // --- investments ---
    async fn insert_investment(&self, inv: &Investment) -> Result<(), StoreError>;
    async fn get_investment(&self, id: InvestmentId) -> Result<Option<Investment>, StoreError>;
    async fn update_investment(&self, inv: &Investment) -> Result<(), StoreError>;
    async fn active_investment_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<Investment>, StoreError>;
    /// All active investments, for the simulator batch.
    async fn active_investments(&self) -> Result<Vec<Investment>, StoreError>;
    async fn investments_for_user(&self, user_id: UserId) -> Result<Vec<Investment>, StoreError>;

    // --- withdrawals ---
    async fn insert_withdrawal(&self, wd: &Withdrawal) -> Result<(), StoreError>;
    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, StoreError>;
    async fn update_withdrawal(&self, wd: &Withdrawal) -> Result<(), StoreError>;
    async fn withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, StoreError>;
    /// Unpaid regular withdrawals still gated on their billing fee.
    async fn pending_billing_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Withdrawal>, StoreError>;

    // --- ledger sums (the four formula terms) ---
    async fn confirmed_deposit_sum(&self, user_id: UserId) -> Result<Decimal, StoreError>;
    async fn invested_principal_sum(&self, user_id: UserId) -> Result<Decimal, StoreError>;
    async fn completed_roi_withdrawal_sum(&self, user_id: UserId) -> Result<Decimal, StoreError>;
    async fn net_admin_adjustments(&self, user_id: UserId) -> Result<Decimal, StoreError>;

    // --- audit (append-only, fire-and-forget for callers) ---
    async fn append_audit(&self, entry: &BalanceAudit) -> Result<(), StoreError>;
    async fn audits_for_user(&self, user_id: UserId) -> Result<Vec<BalanceAudit>, StoreError>;
    async fn append_gain_event(&self, event: &GainEvent) -> Result<(), StoreError>;
    async fn gain_events_for_user(&self, user_id: UserId) -> Result<Vec<GainEvent>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_id_roundtrip() {
        for id in 1..=6 {
            let s = WithdrawalStatus::from_id(id).unwrap();
            assert_eq!(s.id(), id);
        }
        assert_eq!(WithdrawalStatus::from_id(0), None);
        assert_eq!(WithdrawalStatus::from_id(7), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(WithdrawalStatus::Completed.is_terminal());
        assert!(WithdrawalStatus::Rejected.is_terminal());
        assert!(WithdrawalStatus::Failed.is_terminal());
        assert!(!WithdrawalStatus::Pending.is_terminal());
        assert!(!WithdrawalStatus::PendingBilling.is_terminal());
        assert!(InvestmentStatus::Completed.is_terminal());
        assert!(!InvestmentStatus::Active.is_terminal());
    }

    #[test]
    fn test_investment_open_appends_deposit_tx() {
        let inv = Investment::open(1001, "Silver", Decimal::from(500), Utc::now());
        assert_eq!(inv.current_value, Decimal::from(500));
        assert_eq!(inv.amount, Decimal::from(500));
        assert_eq!(inv.transactions.len(), 1);
        assert_eq!(inv.transactions[0].tx_type, TxType::Deposit);
        assert_eq!(inv.transactions[0].amount, Decimal::from(500));
        assert_eq!(inv.status, InvestmentStatus::Active);
        assert!(!inv.roi_withdrawn);
    }

    #[test]
    fn test_apply_delta_is_audited() {
        let mut inv = Investment::open(1001, "Silver", Decimal::from(500), Utc::now());
        inv.apply_delta(TxType::Roi, Decimal::from(25), "Gain");
        inv.apply_delta(TxType::Roi, Decimal::from(-10), "Loss");

        assert_eq!(inv.current_value, Decimal::from(515));
        // Sum of transaction deltas always equals current_value
        let sum: Decimal = inv.transactions.iter().map(|t| t.amount).sum();
        assert_eq!(sum, inv.current_value);
    }

    #[test]
    fn test_roi() {
        let mut inv = Investment::open(1001, "Silver", Decimal::from(500), Utc::now());
        assert_eq!(inv.roi(), Decimal::ZERO);
        inv.apply_delta(TxType::Roi, Decimal::from(100), "Gain");
        assert_eq!(inv.roi(), Decimal::from(100));
    }
}

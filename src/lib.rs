//! YieldCore - Investment Ledger & ROI Engine
//!
//! Deposits, fixed-term plan investments, a periodic ROI drift simulator
//! and fee-gated withdrawals, all reconciled against one derived-balance
//! formula.
//!
//! # Modules
//!
//! - [`core_types`] - Identifier newtypes and the account tier order
//! - [`money`] - Decimal helpers (rounding, basis points, target payout)
//! - [`plan`] - Investment plan registry
//! - [`store`] - Record types and the `LedgerStore` persistence trait
//! - [`ledger`] - Available-balance computation from first principles
//! - [`guard`] - Save-time balance consistency guard
//! - [`locks`] - Per-user operation serialization
//! - [`deposit`] - Deposit submission and confirmation
//! - [`investment`] - Investment lifecycle manager
//! - [`simulator`] - Periodic ROI drift batch
//! - [`withdrawal`] - Two-phase withdrawal/billing gate
//! - [`rates`] - USD/crypto rate lookup with static fallback
//! - [`admin`] - Out-of-band balance adjustments
//! - [`gateway`] - HTTP API

pub mod core_types;

pub mod config;
pub mod logging;
pub mod money;

pub mod admin;
pub mod deposit;
pub mod gateway;
pub mod guard;
pub mod investment;
pub mod ledger;
pub mod locks;
pub mod plan;
pub mod rates;
pub mod simulator;
pub mod store;
pub mod withdrawal;

// Convenient re-exports at crate root
pub use core_types::{AuditId, DepositId, InvestmentId, Tier, UserId, WithdrawalId};
pub use ledger::{BalanceBreakdown, compute_available_balance};
pub use plan::{Plan, PlanRegistry};
pub use store::{
    Deposit, DepositStatus, Investment, InvestmentStatus, LedgerStore, MemoryStore, PgStore,
    UserAccount, Withdrawal, WithdrawalKind, WithdrawalStatus,
};

//! Decimal money helpers.
//!
//! All currency amounts flow through `rust_decimal::Decimal` - never binary
//! floats. Sums accumulate at full precision; rounding to 2 places happens
//! only at the output edge (API responses, cached balance fields).

use rust_decimal::Decimal;

/// Basis points in one whole unit (1% = 100 bp).
pub const BP_SCALE: i64 = 10_000;

/// Round a currency amount to 2 decimal places (banker's rounding is NOT
/// used - the reference platform rounds half away from zero).
#[inline]
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// Apply a signed basis-point fraction to a principal.
///
/// `apply_bp(1000, 250)` = 1000 * 0.0250 = 25. Exact in Decimal: no float
/// round-trip.
#[inline]
pub fn apply_bp(principal: Decimal, bp: i64) -> Decimal {
    principal * Decimal::new(bp, 4)
}

/// Percentage of an amount, e.g. `percent_of(500, 20)` = 100.
///
/// `percent` is a plan-level ROI percent or fee percent; exact Decimal math.
#[inline]
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    amount * percent / Decimal::ONE_HUNDRED
}

/// Target payout for a principal at a total ROI percent:
/// `principal * (1 + roi_percent / 100)`.
#[inline]
pub fn target_payout(principal: Decimal, roi_percent: Decimal) -> Decimal {
    principal + percent_of(principal, roi_percent)
}

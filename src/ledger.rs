//! Ledger reader.
//!
//! Computes a user's available balance from first principles:
//!
//! ```text
//! available = confirmed_deposits - invested_principal
//!           + completed_roi_withdrawals + net_admin_adjustments
//! ```
//!
//! Read-only over the store, safe to call concurrently and repeatedly.
//! This is the authority; the `available_balance` field on the user record
//! is a cache of this value.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::core_types::UserId;
use crate::money::round2;
use crate::store::{LedgerStore, StoreError};

/// The four formula terms plus the combined result.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceBreakdown {
    /// Sum of confirmed deposits.
    pub deposit_balance: Decimal,
    /// Sum of investment principal, all statuses - principal is spent the
    /// instant it is allocated, independent of the investment's outcome.
    pub total_invested: Decimal,
    /// Sum of completed ROI-kind withdrawals.
    pub total_confirmed_roi: Decimal,
    /// Signed sum of admin add/subtract adjustments.
    pub net_admin_adjustments: Decimal,
    /// Combined, rounded to 2 places.
    pub available_balance: Decimal,
}

/// Compute the available balance for a user.
///
/// Errors with [`StoreError::UserNotFound`] when the id does not resolve;
/// existence is checked here so callers get a specific error rather than
/// an all-zero breakdown for a typo'd id.
pub async fn compute_available_balance(
    store: &dyn LedgerStore,
    user_id: UserId,
) -> Result<BalanceBreakdown, StoreError> {
    if store.get_user(user_id).await?.is_none() {
        return Err(StoreError::UserNotFound(user_id));
    }

    let deposit_balance = store.confirmed_deposit_sum(user_id).await?;
    let total_invested = store.invested_principal_sum(user_id).await?;
    let total_confirmed_roi = store.completed_roi_withdrawal_sum(user_id).await?;
    let net_admin_adjustments = store.net_admin_adjustments(user_id).await?;

    // Full precision through the sum, rounding only at the edge.
    let available_balance = round2(
        deposit_balance - total_invested + total_confirmed_roi + net_admin_adjustments,
    );

    Ok(BalanceBreakdown {
        deposit_balance,
        total_invested,
        total_confirmed_roi,
        net_admin_adjustments,
        available_balance,
    })
}

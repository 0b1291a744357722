//! HTTP handlers.
//!
//! Thin layer: parse, delegate to a service, wrap in the response
//! envelope. All balance math lives below.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::core_types::{DepositId, InvestmentId, UserId, WithdrawalId};
use crate::ledger::compute_available_balance;
use crate::plan::Plan;
use crate::store::{
    BalanceAudit, Deposit, GainEvent, Investment, StoreError, Withdrawal,
};
use crate::withdrawal::WithdrawalQuote;

use super::state::AppState;
use super::types::{
    AdminAdjustRequest, AdminResolveRequest, ApiResponse, ApiResult, BalanceData,
    CreateUserRequest, OpenInvestmentRequest, PinRequest, RequestWithdrawalRequest,
    SubmitDepositRequest, error_codes, reject,
};

pub async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("ok"))
}

pub async fn list_plans(State(state): State<AppState>) -> ApiResult<Vec<Plan>> {
    let mut plans: Vec<Plan> = state.plans.all().cloned().collect();
    plans.sort_by_key(|p| p.tier);
    Ok(Json(ApiResponse::success(plans)))
}

// ============================================================================
// Users / balances
// ============================================================================

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<UserId> {
    let user = state.admin.create_user(req.user_id).await?;
    Ok(Json(ApiResponse::success(user.user_id)))
}

pub async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<BalanceData> {
    let user = state
        .store
        .get_user(user_id)
        .await?
        .ok_or(StoreError::UserNotFound(user_id))?;
    let breakdown = compute_available_balance(state.store.as_ref(), user_id).await?;

    Ok(Json(ApiResponse::success(BalanceData {
        user_id,
        deposit_balance: breakdown.deposit_balance,
        total_invested: breakdown.total_invested,
        total_confirmed_roi: breakdown.total_confirmed_roi,
        net_admin_adjustments: breakdown.net_admin_adjustments,
        available_balance: breakdown.available_balance,
        locked_balance: user.locked_balance,
        tier: user.tier.to_string(),
    })))
}

pub async fn set_pin(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<PinRequest>,
) -> ApiResult<()> {
    state.withdrawals.set_pin(user_id, &req.pin).await?;
    Ok(Json(ApiResponse::success(())))
}

// ============================================================================
// Deposits
// ============================================================================

pub async fn submit_deposit(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<SubmitDepositRequest>,
) -> ApiResult<Deposit> {
    let deposit = state
        .deposits
        .submit(user_id, req.amount, &req.method)
        .await?;
    Ok(Json(ApiResponse::success(deposit)))
}

pub async fn deposit_history(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Vec<Deposit>> {
    Ok(Json(ApiResponse::success(
        state.deposits.history(user_id).await?,
    )))
}

pub async fn confirm_deposit(
    State(state): State<AppState>,
    Path(deposit_id): Path<String>,
) -> ApiResult<Deposit> {
    let id = parse_id::<DepositId>(&deposit_id)?;
    Ok(Json(ApiResponse::success(state.deposits.confirm(id).await?)))
}

pub async fn reject_deposit(
    State(state): State<AppState>,
    Path(deposit_id): Path<String>,
) -> ApiResult<Deposit> {
    let id = parse_id::<DepositId>(&deposit_id)?;
    Ok(Json(ApiResponse::success(state.deposits.reject(id).await?)))
}

// ============================================================================
// Investments
// ============================================================================

pub async fn open_investment(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<OpenInvestmentRequest>,
) -> ApiResult<Investment> {
    let investment = state
        .investments
        .open_investment(user_id, &req.plan, req.amount)
        .await?;
    Ok(Json(ApiResponse::success(investment)))
}

pub async fn investment_history(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Vec<Investment>> {
    Ok(Json(ApiResponse::success(
        state.investments.history(user_id).await?,
    )))
}

pub async fn withdraw_roi(
    State(state): State<AppState>,
    Path(investment_id): Path<String>,
) -> ApiResult<Withdrawal> {
    let id = parse_id::<InvestmentId>(&investment_id)?;
    let (_, withdrawal) = state.investments.withdraw_roi(id).await?;
    Ok(Json(ApiResponse::success(withdrawal)))
}

pub async fn complete_investment(
    State(state): State<AppState>,
    Path(investment_id): Path<String>,
) -> ApiResult<Investment> {
    let id = parse_id::<InvestmentId>(&investment_id)?;
    Ok(Json(ApiResponse::success(
        state.investments.complete_investment(id).await?,
    )))
}

pub async fn cancel_investment(
    State(state): State<AppState>,
    Path(investment_id): Path<String>,
) -> ApiResult<Investment> {
    let id = parse_id::<InvestmentId>(&investment_id)?;
    Ok(Json(ApiResponse::success(
        state.investments.cancel(id).await?,
    )))
}

pub async fn continue_investment(
    State(state): State<AppState>,
    Path(investment_id): Path<String>,
) -> ApiResult<Investment> {
    let id = parse_id::<InvestmentId>(&investment_id)?;
    Ok(Json(ApiResponse::success(
        state.investments.continue_investment(id).await?,
    )))
}

pub async fn gain_history(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Vec<GainEvent>> {
    Ok(Json(ApiResponse::success(
        state.store.gain_events_for_user(user_id).await?,
    )))
}

// ============================================================================
// Withdrawals
// ============================================================================

pub async fn request_withdrawal(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<RequestWithdrawalRequest>,
) -> ApiResult<WithdrawalQuote> {
    let quote = state
        .withdrawals
        .request_withdrawal(
            user_id,
            req.amount,
            &req.currency,
            &req.network,
            &req.wallet_address,
            &req.pin,
        )
        .await?;
    Ok(Json(ApiResponse::success(quote)))
}

pub async fn pay_billing(
    State(state): State<AppState>,
    Path(withdrawal_id): Path<String>,
    Json(req): Json<PinRequest>,
) -> ApiResult<Withdrawal> {
    let id = parse_id::<WithdrawalId>(&withdrawal_id)?;
    Ok(Json(ApiResponse::success(
        state.withdrawals.pay_billing(id, &req.pin).await?,
    )))
}

pub async fn pay_all_billing(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<PinRequest>,
) -> ApiResult<Vec<Withdrawal>> {
    Ok(Json(ApiResponse::success(
        state.withdrawals.pay_all_billing(user_id, &req.pin).await?,
    )))
}

pub async fn withdrawal_history(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Vec<Withdrawal>> {
    Ok(Json(ApiResponse::success(
        state.withdrawals.history(user_id).await?,
    )))
}

pub async fn outstanding_billing(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Vec<Withdrawal>> {
    Ok(Json(ApiResponse::success(
        state.withdrawals.outstanding_billing(user_id).await?,
    )))
}

// ============================================================================
// Admin
// ============================================================================

pub async fn admin_resolve_withdrawal(
    State(state): State<AppState>,
    Path(withdrawal_id): Path<String>,
    Json(req): Json<AdminResolveRequest>,
) -> ApiResult<Withdrawal> {
    let id = parse_id::<WithdrawalId>(&withdrawal_id)?;
    Ok(Json(ApiResponse::success(
        state
            .withdrawals
            .admin_resolve(id, req.status, req.destination, &req.actor)
            .await?,
    )))
}

pub async fn admin_adjust_balance(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(req): Json<AdminAdjustRequest>,
) -> ApiResult<BalanceAudit> {
    Ok(Json(ApiResponse::success(
        state
            .admin
            .adjust_balance(user_id, req.kind, req.amount, &req.actor, req.note)
            .await?,
    )))
}

pub async fn audit_history(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Vec<BalanceAudit>> {
    Ok(Json(ApiResponse::success(
        state.admin.audit_history(user_id).await?,
    )))
}

fn parse_id<T: std::str::FromStr>(raw: &str) -> Result<T, super::types::ApiRejection> {
    raw.parse().map_err(|_| {
        reject(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_PARAMETER,
            format!("invalid id: {}", raw),
        )
    })
}

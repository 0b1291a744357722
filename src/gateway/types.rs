//! Gateway request/response types and the unified response envelope.

use axum::Json;
use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::admin::AdminError;
use crate::deposit::DepositError;
use crate::investment::InvestError;
use crate::store::{AuditKind, StoreError, WithdrawalStatus};
use crate::withdrawal::{PayoutDestination, WithdrawError};

/// Unified API response wrapper.
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or absent (error)
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_BALANCE: i32 = 1002;
    pub const INVALID_PIN: i32 = 1003;
    pub const PIN_NOT_SET: i32 = 1004;
    pub const UNSUPPORTED_CURRENCY: i32 = 1005;

    // State conflicts (3xxx)
    pub const ACTIVE_INVESTMENT_EXISTS: i32 = 3001;
    pub const PLAN_INACTIVE: i32 = 3002;
    pub const AMOUNT_OUT_OF_RANGE: i32 = 3003;
    pub const ROI_ALREADY_WITHDRAWN: i32 = 3004;
    pub const NO_ROI_AVAILABLE: i32 = 3005;
    pub const INVALID_STATE: i32 = 3006;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4001;
    pub const USER_EXISTS: i32 = 4002;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
}

/// Handler result alias: success envelope or (status, error envelope).
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiRejection>;

pub type ApiRejection = (StatusCode, Json<ApiResponse<()>>);

pub fn reject(status: StatusCode, code: i32, msg: impl Into<String>) -> ApiRejection {
    (status, Json(ApiResponse::<()>::error(code, msg)))
}

fn map_store_error(e: &StoreError) -> ApiRejection {
    match e {
        StoreError::UserNotFound(_) | StoreError::NotFound(_) => {
            reject(StatusCode::NOT_FOUND, error_codes::NOT_FOUND, e.to_string())
        }
        StoreError::Database(_) | StoreError::Corrupt(_) => reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            "internal error",
        ),
    }
}

impl From<StoreError> for ApiRejection {
    fn from(e: StoreError) -> Self {
        map_store_error(&e)
    }
}

impl From<DepositError> for ApiRejection {
    fn from(e: DepositError) -> Self {
        use DepositError::*;
        match &e {
            Store(inner) => map_store_error(inner),
            InvalidAmount => reject(
                StatusCode::BAD_REQUEST,
                error_codes::INVALID_PARAMETER,
                e.to_string(),
            ),
            NotFound(_) => reject(StatusCode::NOT_FOUND, error_codes::NOT_FOUND, e.to_string()),
            AlreadyRejected => reject(
                StatusCode::CONFLICT,
                error_codes::INVALID_STATE,
                e.to_string(),
            ),
        }
    }
}

impl From<InvestError> for ApiRejection {
    fn from(e: InvestError) -> Self {
        use InvestError::*;
        let (status, code) = match &e {
            Store(inner) => return map_store_error(inner),
            PlanNotFound(_) | InvestmentNotFound(_) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            PlanInactive(_) => (StatusCode::CONFLICT, error_codes::PLAN_INACTIVE),
            AmountOutOfRange { .. } => (StatusCode::BAD_REQUEST, error_codes::AMOUNT_OUT_OF_RANGE),
            ActiveInvestmentExists => (StatusCode::CONFLICT, error_codes::ACTIVE_INVESTMENT_EXISTS),
            InsufficientBalance => (StatusCode::BAD_REQUEST, error_codes::INSUFFICIENT_BALANCE),
            NotCompleted | NotActive => (StatusCode::CONFLICT, error_codes::INVALID_STATE),
            RoiAlreadyWithdrawn => (StatusCode::CONFLICT, error_codes::ROI_ALREADY_WITHDRAWN),
            NoRoiAvailable => (StatusCode::CONFLICT, error_codes::NO_ROI_AVAILABLE),
        };
        reject(status, code, e.to_string())
    }
}

impl From<WithdrawError> for ApiRejection {
    fn from(e: WithdrawError) -> Self {
        use WithdrawError::*;
        let (status, code) = match &e {
            Store(inner) => return map_store_error(inner),
            InvalidAmount => (StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER),
            PinNotSet => (StatusCode::BAD_REQUEST, error_codes::PIN_NOT_SET),
            InvalidPin => (StatusCode::UNAUTHORIZED, error_codes::INVALID_PIN),
            UnsupportedCurrency(_) => (StatusCode::BAD_REQUEST, error_codes::UNSUPPORTED_CURRENCY),
            InsufficientBalance => (StatusCode::BAD_REQUEST, error_codes::INSUFFICIENT_BALANCE),
            NotFound(_) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            NotAwaitingBilling | NothingToPay | NotResolvable(_) => {
                (StatusCode::CONFLICT, error_codes::INVALID_STATE)
            }
            Internal(_) => {
                return reject(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_codes::INTERNAL_ERROR,
                    "internal error",
                );
            }
        };
        reject(status, code, e.to_string())
    }
}

impl From<AdminError> for ApiRejection {
    fn from(e: AdminError) -> Self {
        use AdminError::*;
        let (status, code) = match &e {
            Store(inner) => return map_store_error(inner),
            InvalidAmount | InvalidKind => (StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER),
            UserExists(_) => (StatusCode::CONFLICT, error_codes::USER_EXISTS),
        };
        reject(status, code, e.to_string())
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitDepositRequest {
    pub amount: Decimal,
    pub method: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenInvestmentRequest {
    pub plan: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RequestWithdrawalRequest {
    pub amount: Decimal,
    pub currency: String,
    pub network: String,
    pub wallet_address: String,
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminResolveRequest {
    pub status: WithdrawalStatus,
    #[serde(default = "default_destination")]
    pub destination: PayoutDestination,
    pub actor: String,
}

fn default_destination() -> PayoutDestination {
    PayoutDestination::Available
}

#[derive(Debug, Deserialize)]
pub struct AdminAdjustRequest {
    pub kind: AuditKind,
    pub amount: Decimal,
    pub actor: String,
    #[serde(default)]
    pub note: Option<String>,
}

// ============================================================================
// Response data
// ============================================================================

#[derive(Debug, Serialize)]
pub struct BalanceData {
    pub user_id: i64,
    pub deposit_balance: Decimal,
    pub total_invested: Decimal,
    pub total_confirmed_roi: Decimal,
    pub net_admin_adjustments: Decimal,
    pub available_balance: Decimal,
    pub locked_balance: Decimal,
    pub tier: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let resp = ApiResponse::success(42);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["msg"], "ok");
        assert_eq!(json["data"], 42);
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let resp = ApiResponse::<()>::error(error_codes::NOT_FOUND, "nope");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["code"], 4001);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_resolve_request_parses_enums() {
        let req: AdminResolveRequest = serde_json::from_str(
            r#"{"status": "completed", "destination": "locked", "actor": "admin:7"}"#,
        )
        .unwrap();
        assert_eq!(req.status, WithdrawalStatus::Completed);
        assert_eq!(req.destination, PayoutDestination::Locked);

        let req: AdminResolveRequest =
            serde_json::from_str(r#"{"status": "rejected", "actor": "admin:7"}"#).unwrap();
        assert_eq!(req.destination, PayoutDestination::Available);
    }
}

//! HTTP gateway: router assembly and the serve loop.

pub mod handlers;
pub mod state;
pub mod types;

pub use state::AppState;
pub use types::{ApiResponse, error_codes};

use axum::Router;
use axum::routing::{get, post};
use tracing::info;

use crate::config::GatewayConfig;

pub fn router(state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/users", post(handlers::create_user))
        .route("/users/{user_id}/balance", get(handlers::get_balance))
        .route("/users/{user_id}/pin", post(handlers::set_pin))
        .route("/users/{user_id}/deposits", post(handlers::submit_deposit))
        .route("/users/{user_id}/deposits", get(handlers::deposit_history))
        .route("/users/{user_id}/investments", post(handlers::open_investment))
        .route("/users/{user_id}/investments", get(handlers::investment_history))
        .route("/users/{user_id}/gains", get(handlers::gain_history))
        .route("/users/{user_id}/withdrawals", post(handlers::request_withdrawal))
        .route("/users/{user_id}/withdrawals", get(handlers::withdrawal_history))
        .route("/users/{user_id}/billing", get(handlers::outstanding_billing))
        .route("/users/{user_id}/billing/pay-all", post(handlers::pay_all_billing))
        .route("/investments/{investment_id}/withdraw-roi", post(handlers::withdraw_roi))
        .route("/withdrawals/{withdrawal_id}/pay-billing", post(handlers::pay_billing))
        .route("/plans", get(handlers::list_plans));

    let admin_routes = Router::new()
        .route("/deposits/{deposit_id}/confirm", post(handlers::confirm_deposit))
        .route("/deposits/{deposit_id}/reject", post(handlers::reject_deposit))
        .route("/investments/{investment_id}/complete", post(handlers::complete_investment))
        .route("/investments/{investment_id}/cancel", post(handlers::cancel_investment))
        .route("/investments/{investment_id}/continue", post(handlers::continue_investment))
        .route("/withdrawals/{withdrawal_id}/resolve", post(handlers::admin_resolve_withdrawal))
        .route("/users/{user_id}/adjust", post(handlers::admin_adjust_balance))
        .route("/users/{user_id}/audits", get(handlers::audit_history));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .nest("/api/v1", user_routes)
        .nest("/api/v1/admin", admin_routes)
        .with_state(state)
}

pub async fn serve(config: &GatewayConfig, state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr, "Gateway listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

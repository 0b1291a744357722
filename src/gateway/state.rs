//! Shared gateway state.

use std::sync::Arc;

use crate::admin::AdminService;
use crate::config::AppConfig;
use crate::deposit::DepositService;
use crate::investment::InvestmentService;
use crate::locks::UserLocks;
use crate::plan::PlanRegistry;
use crate::rates::LiveRates;
use crate::store::LedgerStore;
use crate::withdrawal::WithdrawalService;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub plans: Arc<PlanRegistry>,
    pub deposits: Arc<DepositService>,
    pub investments: Arc<InvestmentService>,
    pub withdrawals: Arc<WithdrawalService>,
    pub admin: Arc<AdminService>,
}

impl AppState {
    /// Wire all services over one store and one per-user lock map.
    pub fn new(store: Arc<dyn LedgerStore>, plans: Arc<PlanRegistry>, config: &AppConfig) -> Self {
        let locks = Arc::new(UserLocks::new());
        let rates = Arc::new(LiveRates::new(&config.rates));

        Self {
            deposits: Arc::new(DepositService::new(store.clone(), locks.clone())),
            investments: Arc::new(InvestmentService::new(
                store.clone(),
                plans.clone(),
                locks.clone(),
            )),
            withdrawals: Arc::new(WithdrawalService::new(
                store.clone(),
                rates,
                locks.clone(),
                config.billing.clone(),
            )),
            admin: Arc::new(AdminService::new(store.clone(), locks)),
            store,
            plans,
        }
    }
}

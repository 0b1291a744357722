//! End-to-end flows over the in-memory store: deposit, invest, drift,
//! claim ROI, fee-gated withdrawal, admin resolution.

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::Arc;

use yieldcore::admin::AdminService;
use yieldcore::config::{BillingConfig, SimulatorConfig};
use yieldcore::deposit::DepositService;
use yieldcore::investment::{InvestError, InvestmentService};
use yieldcore::ledger::compute_available_balance;
use yieldcore::locks::UserLocks;
use yieldcore::plan::{Plan, PlanRegistry};
use yieldcore::rates::StaticRates;
use yieldcore::simulator::RoiSimulator;
use yieldcore::store::{LedgerStore, MemoryStore};
use yieldcore::withdrawal::{PayoutDestination, WithdrawalService};
use yieldcore::{Tier, UserId, WithdrawalKind, WithdrawalStatus};

const PIN: &str = "2468";

struct Stack {
    store: Arc<MemoryStore>,
    deposits: DepositService,
    investments: InvestmentService,
    withdrawals: WithdrawalService,
    admin: AdminService,
    simulator: RoiSimulator,
}

fn stack(plans: PlanRegistry) -> Stack {
    let store = Arc::new(MemoryStore::new());
    let plans = Arc::new(plans);
    let locks = Arc::new(UserLocks::new());

    Stack {
        deposits: DepositService::new(store.clone(), locks.clone()),
        investments: InvestmentService::new(store.clone(), plans.clone(), locks.clone()),
        withdrawals: WithdrawalService::new(
            store.clone(),
            Arc::new(StaticRates),
            locks.clone(),
            BillingConfig::default(),
        ),
        admin: AdminService::new(store.clone(), locks),
        simulator: RoiSimulator::new(store.clone(), plans, SimulatorConfig::default()),
        store,
    }
}

fn fixed20_registry() -> PlanRegistry {
    PlanRegistry::new(vec![Plan {
        name: "Fixed20".to_string(),
        tier: Tier::Starter,
        roi_percent: Decimal::from(20),
        duration_days: 10,
        min_investment: Decimal::from(100),
        max_investment: Decimal::from(10_000),
        active: true,
    }])
}

async fn fund(stack: &Stack, user_id: UserId, amount: i64) {
    stack.admin.create_user(user_id).await.unwrap();
    let dep = stack
        .deposits
        .submit(user_id, Decimal::from(amount), "btc")
        .await
        .unwrap();
    stack.deposits.confirm(dep.deposit_id).await.unwrap();
}

/// Warp an investment to `minutes_left` before its scheduled maturity.
async fn warp(store: &MemoryStore, inv_id: yieldcore::InvestmentId, total_minutes: i64, minutes_left: i64) {
    let mut inv = store.get_investment(inv_id).await.unwrap().unwrap();
    let now = Utc::now();
    inv.start_date = now - Duration::minutes(total_minutes - minutes_left);
    inv.end_date = now + Duration::minutes(minutes_left);
    store.update_investment(&inv).await.unwrap();
}

#[tokio::test]
async fn test_end_to_end_invest_and_claim_roi() {
    let s = stack(fixed20_registry());
    fund(&s, 1001, 1000).await;

    let inv = s
        .investments
        .open_investment(1001, "Fixed20", Decimal::from(500))
        .await
        .unwrap();

    // Principal spent the instant it is allocated
    let balance = compute_available_balance(s.store.as_ref(), 1001).await.unwrap();
    assert_eq!(balance.available_balance, Decimal::from(500));

    // Drift for a few cycles, then warp to maturity and run the tick.
    for _ in 0..5 {
        s.simulator.tick().await;
    }
    warp(&s.store, inv.investment_id, 10 * 24 * 60, 0).await;
    s.simulator.tick().await;

    let done = s.store.get_investment(inv.investment_id).await.unwrap().unwrap();
    assert_eq!(done.status, yieldcore::InvestmentStatus::Completed);
    // 500 * (1 + 20/100) = 600 exactly, regardless of prior drift
    assert_eq!(done.current_value, Decimal::from(600));

    let (done, wd) = s.investments.withdraw_roi(inv.investment_id).await.unwrap();
    assert!(done.roi_withdrawn);
    assert_eq!(wd.amount, Decimal::from(100));
    assert_eq!(wd.kind, WithdrawalKind::Roi);
    assert_eq!(wd.status, WithdrawalStatus::Pending);

    let user = s.store.get_user(1001).await.unwrap().unwrap();
    assert_eq!(user.locked_balance, Decimal::from(100));
    assert_eq!(user.available_balance, Decimal::from(500));

    // Approval releases the lock and the ledger credits available.
    s.withdrawals
        .admin_resolve(
            wd.withdrawal_id,
            WithdrawalStatus::Completed,
            PayoutDestination::Available,
            "admin:1",
        )
        .await
        .unwrap();
    let user = s.store.get_user(1001).await.unwrap().unwrap();
    assert_eq!(user.locked_balance, Decimal::ZERO);
    assert_eq!(user.available_balance, Decimal::from(600));
}

#[tokio::test]
async fn test_billing_gate_scenario() {
    let s = stack(fixed20_registry());
    fund(&s, 1001, 1000).await;
    s.withdrawals.set_pin(1001, PIN).await.unwrap();

    let quote = s
        .withdrawals
        .request_withdrawal(1001, Decimal::from(200), "BTC", "BTC", "bc1qdest", PIN)
        .await
        .unwrap();
    assert_eq!(quote.withdrawal.status, WithdrawalStatus::PendingBilling);
    assert_eq!(quote.billing_fee, Decimal::from(40));

    // Nothing deducted until the fee is paid
    let user = s.store.get_user(1001).await.unwrap().unwrap();
    assert_eq!(user.available_balance, Decimal::from(1000));

    let wd = s
        .withdrawals
        .pay_billing(quote.withdrawal.withdrawal_id, PIN)
        .await
        .unwrap();
    assert_eq!(wd.status, WithdrawalStatus::Pending);
    let user = s.store.get_user(1001).await.unwrap().unwrap();
    assert_eq!(user.available_balance, Decimal::from(960));

    // Completion credits the amount (200), not amount + fee
    s.withdrawals
        .admin_resolve(
            wd.withdrawal_id,
            WithdrawalStatus::Completed,
            PayoutDestination::Available,
            "admin:1",
        )
        .await
        .unwrap();
    let user = s.store.get_user(1001).await.unwrap().unwrap();
    assert_eq!(user.available_balance, Decimal::from(1160));
}

#[tokio::test]
async fn test_concurrent_opens_single_winner() {
    let s = Arc::new(stack(fixed20_registry()));
    fund(&s, 1001, 100).await;

    let a = tokio::spawn({
        let s = s.clone();
        async move {
            s.investments
                .open_investment(1001, "Fixed20", Decimal::from(100))
                .await
        }
    });
    let b = tokio::spawn({
        let s = s.clone();
        async move {
            s.investments
                .open_investment(1001, "Fixed20", Decimal::from(100))
                .await
        }
    });

    let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
    assert_eq!(
        [&ra, &rb].iter().filter(|r| r.is_ok()).count(),
        1,
        "exactly one open must win the same 100"
    );
    let loser = if ra.is_err() { ra } else { rb };
    assert!(matches!(
        loser,
        Err(InvestError::InsufficientBalance) | Err(InvestError::ActiveInvestmentExists)
    ));

    // The winner spent everything; the ledger shows zero either way.
    let balance = compute_available_balance(s.store.as_ref(), 1001).await.unwrap();
    assert_eq!(balance.available_balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_ledger_reader_is_pure() {
    let s = stack(fixed20_registry());
    fund(&s, 1001, 750).await;
    s.investments
        .open_investment(1001, "Fixed20", Decimal::from(200))
        .await
        .unwrap();

    let first = compute_available_balance(s.store.as_ref(), 1001).await.unwrap();
    let second = compute_available_balance(s.store.as_ref(), 1001).await.unwrap();
    assert_eq!(first.available_balance, second.available_balance);
    assert_eq!(first.deposit_balance, second.deposit_balance);
    assert_eq!(first.total_invested, second.total_invested);
}

/// Random operation sequences never produce an admin-visible regular
/// withdrawal whose fee is unpaid.
#[tokio::test]
async fn test_billing_gate_ordering_property() {
    let s = stack(fixed20_registry());
    fund(&s, 1001, 100_000).await;
    s.withdrawals.set_pin(1001, PIN).await.unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        match rng.gen_range(0..3) {
            0 => {
                let amount = Decimal::from(rng.gen_range(10..500));
                let _ = s
                    .withdrawals
                    .request_withdrawal(1001, amount, "USDT", "TRX", "Tdest", PIN)
                    .await;
            }
            1 => {
                let all = s.store.withdrawals_for_user(1001).await.unwrap();
                if !all.is_empty() {
                    let wd = &all[rng.gen_range(0..all.len())];
                    let _ = s.withdrawals.pay_billing(wd.withdrawal_id, PIN).await;
                }
            }
            _ => {
                let all = s.store.withdrawals_for_user(1001).await.unwrap();
                if !all.is_empty() {
                    let wd = &all[rng.gen_range(0..all.len())];
                    let status = if rng.gen_bool(0.5) {
                        WithdrawalStatus::Completed
                    } else {
                        WithdrawalStatus::Rejected
                    };
                    let _ = s
                        .withdrawals
                        .admin_resolve(wd.withdrawal_id, status, PayoutDestination::Available, "admin:1")
                        .await;
                }
            }
        }

        for wd in s.store.withdrawals_for_user(1001).await.unwrap() {
            if wd.kind == WithdrawalKind::Regular && wd.status != WithdrawalStatus::PendingBilling {
                assert!(
                    wd.billing_paid,
                    "withdrawal {} reached {} with unpaid fee",
                    wd.withdrawal_id, wd.status
                );
            }
        }
    }
}

/// The cached balance always reconciles to the formula after every flow.
#[tokio::test]
async fn test_cache_reconciles_through_full_flow() {
    let s = stack(fixed20_registry());
    fund(&s, 1001, 5_000).await;
    s.withdrawals.set_pin(1001, PIN).await.unwrap();

    let check = |store: Arc<MemoryStore>| async move {
        let user = store.get_user(1001).await.unwrap().unwrap();
        let computed = compute_available_balance(store.as_ref(), 1001)
            .await
            .unwrap()
            .available_balance;
        assert_eq!(user.available_balance, computed);
    };

    let inv = s
        .investments
        .open_investment(1001, "Fixed20", Decimal::from(1000))
        .await
        .unwrap();
    check(s.store.clone()).await;

    s.admin
        .adjust_balance(
            1001,
            yieldcore::store::AuditKind::AdminAdd,
            Decimal::from(250),
            "admin:1",
            None,
        )
        .await
        .unwrap();
    check(s.store.clone()).await;

    s.investments.complete_investment(inv.investment_id).await.unwrap();
    s.investments.withdraw_roi(inv.investment_id).await.unwrap();
    check(s.store.clone()).await;

    let quote = s
        .withdrawals
        .request_withdrawal(1001, Decimal::from(300), "ETH", "ETH", "0xdest", PIN)
        .await
        .unwrap();
    s.withdrawals
        .pay_billing(quote.withdrawal.withdrawal_id, PIN)
        .await
        .unwrap();
    check(s.store.clone()).await;
}

//! ROI drift simulator.
//!
//! Periodic batch over every active investment: apply a bounded random
//! perturbation to `current_value`, expressed in basis points of the
//! principal, and guarantee the value lands exactly on the plan target by
//! maturity. Each investment updates independently; one bad record never
//! halts the batch.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SimulatorConfig;
use crate::money::apply_bp;
use crate::plan::PlanRegistry;
use crate::store::{GainEvent, Investment, InvestmentStatus, LedgerStore, StoreError, TxType};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Plan not found: {0}")]
    PlanNotFound(String),
}

pub struct RoiSimulator {
    store: Arc<dyn LedgerStore>,
    plans: Arc<PlanRegistry>,
    cfg: SimulatorConfig,
}

impl RoiSimulator {
    pub fn new(store: Arc<dyn LedgerStore>, plans: Arc<PlanRegistry>, cfg: SimulatorConfig) -> Self {
        Self { store, plans, cfg }
    }

    /// Spawn the periodic batch loop. Fire-and-forget: never awaited by a
    /// request path.
    pub fn spawn(self: Arc<Self>) {
        let period = std::time::Duration::from_secs(self.cfg.tick_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        });
    }

    /// One batch run over all active investments. Per-investment failures
    /// are logged and skipped.
    pub async fn tick(&self) {
        let batch = match self.store.active_investments().await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "ROI batch: failed to list active investments");
                return;
            }
        };
        if batch.is_empty() {
            return;
        }

        debug!(count = batch.len(), "ROI batch start");
        let mut rng = StdRng::from_entropy();
        let mut updated = 0usize;
        for inv in batch {
            let id = inv.investment_id;
            match self.drift_one(inv, &mut rng).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(investment_id = %id, error = %e, "ROI batch: skipping investment");
                }
            }
        }
        info!(updated, "ROI batch done");
    }

    /// Drift a single investment. Returns true when the record changed.
    async fn drift_one(&self, mut inv: Investment, rng: &mut StdRng) -> Result<bool, SimError> {
        let plan = self
            .plans
            .get(&inv.plan_name)
            .ok_or_else(|| SimError::PlanNotFound(inv.plan_name.clone()))?;

        let now = Utc::now();
        let minutes_left = plan.duration_minutes() - inv.elapsed_minutes(now);
        let target = plan.target_payout(inv.amount);

        let delta = if minutes_left > self.cfg.convergence_threshold_minutes {
            apply_bp(inv.amount, self.draw_bp(rng))
        } else if self.cfg.force_convergence && inv.current_value < target {
            // Forced correction: land exactly on target.
            target - inv.current_value
        } else {
            // At or above target inside the convergence window: leave it.
            Decimal::ZERO
        };

        let matured = minutes_left <= 0;
        if delta.is_zero() && !matured {
            return Ok(false);
        }

        if !delta.is_zero() {
            let description = if delta > Decimal::ZERO { "Gain" } else { "Loss" };
            inv.apply_delta(TxType::Roi, delta, description);

            let event = GainEvent {
                user_id: inv.user_id,
                investment_id: inv.investment_id,
                amount: delta,
                description: description.to_string(),
                created_at: now,
            };
            if let Err(e) = self.store.append_gain_event(&event).await {
                // History is best-effort; the investment update still lands.
                warn!(investment_id = %inv.investment_id, error = %e, "Gain event write failed");
            }
        }

        if matured {
            inv.status = InvestmentStatus::Completed;
            inv.end_date = now;
            info!(
                investment_id = %inv.investment_id,
                user_id = inv.user_id,
                final_value = %inv.current_value,
                "Investment matured"
            );
        }

        self.store.update_investment(&inv).await?;
        Ok(true)
    }

    /// Draw a perturbation in basis points of principal. Never zero: an
    /// exactly-zero draw becomes a nudge so the walk never visibly stalls.
    fn draw_bp(&self, rng: &mut StdRng) -> i64 {
        let bp = rng.gen_range(self.cfg.loss_bp..=self.cfg.gain_bp);
        if bp != 0 {
            bp
        } else if rng.gen_bool(0.5) {
            self.cfg.nudge_bp
        } else {
            -self.cfg.nudge_bp
        }
    }
}

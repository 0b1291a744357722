//! Plan registry.
//!
//! A plan is a fixed-duration, fixed-total-ROI tier an investment is
//! allocated against. The registry is read-only after startup: the
//! simulator and the lifecycle manager both resolve plans by name.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core_types::Tier;

/// A single investment plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub tier: Tier,
    /// Total ROI over the full duration, in percent (e.g. 350 = 350%).
    pub roi_percent: Decimal,
    pub duration_days: i64,
    pub min_investment: Decimal,
    pub max_investment: Decimal,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Plan {
    /// Scheduled lifetime of an investment under this plan, in minutes.
    pub fn duration_minutes(&self) -> i64 {
        self.duration_days * 24 * 60
    }

    /// Target payout for a principal: `principal * (1 + roi_percent/100)`.
    pub fn target_payout(&self, principal: Decimal) -> Decimal {
        crate::money::target_payout(principal, self.roi_percent)
    }
}

/// Name -> plan lookup. Keys are lowercased so lookups are case-insensitive.
#[derive(Debug, Clone)]
pub struct PlanRegistry {
    plans: HashMap<String, Plan>,
}

impl PlanRegistry {
    pub fn new(plans: Vec<Plan>) -> Self {
        let plans = plans
            .into_iter()
            .map(|p| (p.name.to_lowercase(), p))
            .collect();
        Self { plans }
    }

    /// The built-in five-tier table. Config may override it entirely.
    pub fn builtin() -> Self {
        let mk = |name: &str, tier, roi: i64, days, min: i64, max: i64| Plan {
            name: name.to_string(),
            tier,
            roi_percent: Decimal::from(roi),
            duration_days: days,
            min_investment: Decimal::from(min),
            max_investment: Decimal::from(max),
            active: true,
        };

        Self::new(vec![
            mk("Starter", Tier::Starter, 200, 5, 100, 999),
            mk("Silver", Tier::Silver, 350, 7, 1_000, 4_999),
            mk("Gold", Tier::Gold, 450, 10, 5_000, 19_999),
            mk("Platinum", Tier::Platinum, 550, 14, 20_000, 49_999),
            mk("Diamond", Tier::Diamond, 700, 21, 50_000, 1_000_000),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&Plan> {
        self.plans.get(&name.to_lowercase())
    }

    pub fn all(&self) -> impl Iterator<Item = &Plan> {
        self.plans.values()
    }
}

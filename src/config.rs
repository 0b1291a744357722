use serde::{Deserialize, Serialize};
use std::fs;

use crate::plan::Plan;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    /// Plan table override. Empty -> built-in five-tier table.
    #[serde(default)]
    pub plans: Vec<Plan>,
    /// PostgreSQL connection URL for the ledger store. None -> in-memory.
    #[serde(default)]
    pub postgres_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
        }
    }
}

/// ROI drift simulator cadence and perturbation policy.
///
/// The reference distribution is asymmetric (skewed toward gains,
/// -2%..+4% of principal). It is policy, not a constant: all bounds are
/// expressed in basis points of principal and configurable.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SimulatorConfig {
    /// Seconds between batch runs.
    pub tick_secs: u64,
    /// Lower bound of the random draw, basis points (negative = loss).
    pub loss_bp: i64,
    /// Upper bound of the random draw, basis points.
    pub gain_bp: i64,
    /// Forced nudge when the draw lands on exactly zero, basis points.
    pub nudge_bp: i64,
    /// Minutes-to-maturity at or below which convergence is forced.
    pub convergence_threshold_minutes: i64,
    /// Whether to force `current_value` onto the plan target at the
    /// threshold. Disabling leaves the walk unforced (testing/backoffice).
    pub force_convergence: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_secs: 300,
            loss_bp: -200,
            gain_bp: 400,
            nudge_bp: 100,
            convergence_threshold_minutes: 5,
            force_convergence: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RatesConfig {
    /// Price endpoint; `{symbol}` is substituted with the asset symbol.
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            url: "https://api.coingecko.com/api/v3/simple/price?ids={symbol}&vs_currencies=usd"
                .to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BillingConfig {
    /// Billing fee as a percent of the requested withdrawal amount.
    pub fee_percent: u32,
    /// Wallet the user pays the fee to, per network.
    pub fee_wallets: std::collections::HashMap<String, String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        let mut fee_wallets = std::collections::HashMap::new();
        fee_wallets.insert("BTC".to_string(), "bc1q-fee-wallet-placeholder".to_string());
        fee_wallets.insert("ETH".to_string(), "0xfee0000000000000000000000000000000000000".to_string());
        fee_wallets.insert("TRX".to_string(), "TFeeWalletPlaceholder000000000000".to_string());
        Self {
            fee_percent: 20,
            fee_wallets,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: yieldcore.log
use_json: false
rotation: daily
gateway:
  host: 127.0.0.1
  port: 8090
"#;
        let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.simulator.tick_secs, 300);
        assert_eq!(cfg.simulator.loss_bp, -200);
        assert_eq!(cfg.simulator.gain_bp, 400);
        assert_eq!(cfg.billing.fee_percent, 20);
        assert!(cfg.plans.is_empty());
        assert!(cfg.postgres_url.is_none());
    }

    #[test]
    fn test_simulator_policy_override() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: yieldcore.log
use_json: false
rotation: never
gateway:
  host: 127.0.0.1
  port: 8090
simulator:
  tick_secs: 60
  loss_bp: -300
  gain_bp: 300
  nudge_bp: 50
  convergence_threshold_minutes: 10
  force_convergence: false
"#;
        let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.simulator.loss_bp, -300);
        assert!(!cfg.simulator.force_convergence);
    }
}

//! YieldCore service entry point.
//!
//! Wires config, logging, the ledger store (PostgreSQL when configured,
//! in-memory otherwise), the ROI drift simulator and the HTTP gateway.

use std::sync::Arc;

use yieldcore::config::AppConfig;
use yieldcore::gateway::{self, AppState};
use yieldcore::plan::PlanRegistry;
use yieldcore::simulator::RoiSimulator;
use yieldcore::store::{LedgerStore, MemoryStore, PgStore};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _log_guard = yieldcore::logging::init_logging(&config);

    tracing::info!(
        env,
        git_hash = env!("GIT_HASH"),
        "Starting YieldCore ledger engine"
    );

    let store: Arc<dyn LedgerStore> = match &config.postgres_url {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            store.init_schema().await?;
            tracing::info!("Ledger store: PostgreSQL");
            Arc::new(store)
        }
        None => {
            tracing::info!("Ledger store: in-memory");
            Arc::new(MemoryStore::new())
        }
    };

    let plans = if config.plans.is_empty() {
        Arc::new(PlanRegistry::builtin())
    } else {
        Arc::new(PlanRegistry::new(config.plans.clone()))
    };

    let state = AppState::new(store.clone(), plans.clone(), &config);

    let simulator = Arc::new(RoiSimulator::new(
        store,
        plans,
        config.simulator.clone(),
    ));
    simulator.spawn();
    tracing::info!(
        tick_secs = config.simulator.tick_secs,
        "ROI drift simulator scheduled"
    );

    let mut gateway_config = config.gateway.clone();
    if let Some(port) = get_port_override() {
        gateway_config.port = port;
    }
    gateway::serve(&gateway_config, state).await
}

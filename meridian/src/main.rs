//! Meridian Accrual Node
//!
//! Main entry point for the accrual service. Wires the ledger store, the
//! engines, the background schedulers, and the administrative HTTP surface.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use lib_economy::{
    BalanceReconciler, CommissionEngine, DistributionEngine, RankBonusEngine, ReferralGraph,
    SubscriptionDirectory,
};
use lib_ledger::LedgerStore;

use meridian::adapters::{SqliteDirectory, SqliteGraph, TracingNotifier};
use meridian::config::{CliArgs, ServiceConfig};
use meridian::scheduler::{DistributionService, RankBonusService};
use meridian::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_cli_args();

    let filter = env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = ServiceConfig::load(args.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let store = LedgerStore::open(&config.database_path).await?;

    let params = Arc::new(config.economy.clone());
    let directory: Arc<dyn SubscriptionDirectory> = Arc::new(SqliteDirectory::new(store.clone()));
    let graph: Arc<dyn ReferralGraph> = Arc::new(SqliteGraph::new(store.clone()));
    let notifier = Arc::new(TracingNotifier);

    let commission = CommissionEngine::new(
        store.clone(),
        Arc::clone(&directory),
        Arc::clone(&graph),
        Arc::clone(&params),
    );
    let distribution = DistributionEngine::new(
        store.clone(),
        Arc::clone(&directory),
        commission,
        notifier.clone(),
        Arc::clone(&params),
        config.distribution.concurrency,
    );
    let reconciler = BalanceReconciler::new(
        store.clone(),
        notifier.clone(),
        params.reconcile_epsilon,
    );
    let rank = RankBonusEngine::new(
        store.clone(),
        Arc::clone(&graph),
        notifier,
        Arc::clone(&params),
    );

    let distribution_service = DistributionService::new(
        Arc::new(distribution.clone()),
        config.distribution.clone(),
    );
    distribution_service.start().await;

    let rank_service = RankBonusService::new(Arc::new(rank.clone()), config.rank_bonus.clone());
    rank_service.start().await;

    let state = AppState {
        store,
        directory,
        distribution,
        reconciler,
        rank,
    };
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("admin surface listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Parse command-line arguments
fn parse_cli_args() -> CliArgs {
    let args: Vec<String> = env::args().collect();

    let mut config = None;
    let mut listen = None;
    let mut database = None;
    let mut log_level = "info".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--listen" => {
                if i + 1 < args.len() {
                    if let Ok(addr) = args[i + 1].parse::<SocketAddr>() {
                        listen = Some(addr);
                    }
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--database" => {
                if i + 1 < args.len() {
                    database = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--log-level" => {
                if i + 1 < args.len() {
                    log_level = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    CliArgs {
        config,
        listen,
        database,
        log_level,
    }
}

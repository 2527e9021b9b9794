//! Background batch schedulers.
//!
//! Periodic tasks that keep the daily accrual and the monthly rank run
//! current without operator action. Every underlying write is idempotent,
//! so a tick that races a manual trigger (or another node's tick for the
//! same date) is harmless: the loser observes skips.

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use lib_economy::{DistributionEngine, RankBonusEngine};

use crate::config::{DistributionScheduleConfig, RankBonusScheduleConfig};

/// Periodically runs the daily distribution for the current UTC date
pub struct DistributionService {
    engine: Arc<DistributionEngine>,
    config: DistributionScheduleConfig,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl DistributionService {
    pub fn new(engine: Arc<DistributionEngine>, config: DistributionScheduleConfig) -> Self {
        Self {
            engine,
            config,
            handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Start the background loop
    pub async fn start(&self) {
        if !self.config.enabled {
            info!("distribution scheduler disabled");
            return;
        }
        if self.handle.read().await.is_some() {
            warn!("distribution scheduler already running");
            return;
        }

        let engine = Arc::clone(&self.engine);
        let period = Duration::from_secs(self.config.check_interval_seconds);
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let today = chrono::Utc::now().date_naive();
                match engine.run(today).await {
                    Ok(report) => {
                        if report.created > 0 || report.failed > 0 {
                            info!(
                                date = %today,
                                created = report.created,
                                skipped = report.skipped,
                                failed = report.failed,
                                "scheduled distribution tick"
                            );
                        }
                    }
                    Err(e) => error!(date = %today, "scheduled distribution failed: {e}"),
                }
            }
        });

        *self.handle.write().await = Some(task);
        info!(
            interval_seconds = self.config.check_interval_seconds,
            "distribution scheduler started"
        );
    }

    /// Stop the background loop
    pub async fn stop(&self) {
        if let Some(task) = self.handle.write().await.take() {
            task.abort();
            info!("distribution scheduler stopped");
        }
    }

    /// Whether the loop is currently running
    pub async fn is_running(&self) -> bool {
        self.handle.read().await.is_some()
    }
}

/// Periodically evaluates rank bonuses for the current UTC month
pub struct RankBonusService {
    engine: Arc<RankBonusEngine>,
    config: RankBonusScheduleConfig,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl RankBonusService {
    pub fn new(engine: Arc<RankBonusEngine>, config: RankBonusScheduleConfig) -> Self {
        Self {
            engine,
            config,
            handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Start the background loop
    pub async fn start(&self) {
        if !self.config.enabled {
            info!("rank bonus scheduler disabled");
            return;
        }
        if self.handle.read().await.is_some() {
            warn!("rank bonus scheduler already running");
            return;
        }

        let engine = Arc::clone(&self.engine);
        let period = Duration::from_secs(self.config.check_interval_seconds);
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let month = chrono::Utc::now().format("%Y-%m").to_string();
                match engine.evaluate_all(&month).await {
                    Ok(report) => {
                        if report.paid > 0 || report.failed > 0 {
                            info!(
                                month = %month,
                                evaluated = report.evaluated,
                                paid = report.paid,
                                failed = report.failed,
                                "scheduled rank bonus tick"
                            );
                        }
                    }
                    Err(e) => error!(month = %month, "scheduled rank bonus run failed: {e}"),
                }
            }
        });

        *self.handle.write().await = Some(task);
        info!(
            interval_seconds = self.config.check_interval_seconds,
            "rank bonus scheduler started"
        );
    }

    /// Stop the background loop
    pub async fn stop(&self) {
        if let Some(task) = self.handle.write().await.take() {
            task.abort();
            info!("rank bonus scheduler stopped");
        }
    }

    /// Whether the loop is currently running
    pub async fn is_running(&self) -> bool {
        self.handle.read().await.is_some()
    }
}

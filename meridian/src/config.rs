//! Service configuration.
//!
//! A single TOML file deserialized into typed sections with defaults, plus
//! CLI overrides. The economy section is the versioned business-parameter
//! snapshot handed to the engines; it is validated once here so a run never
//! starts against inconsistent tables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use lib_economy::EconomyParams;

/// Command line arguments
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub listen: Option<SocketAddr>,
    pub database: Option<PathBuf>,
    pub log_level: String,
}

/// Daily distribution scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionScheduleConfig {
    /// Whether the background daily run is active
    pub enabled: bool,
    /// How often to check (seconds); re-runs are free thanks to idempotency
    pub check_interval_seconds: u64,
    /// Bounded worker pool size for per-subscription processing
    pub concurrency: usize,
}

impl Default for DistributionScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 3_600,
            concurrency: 8,
        }
    }
}

/// Monthly rank bonus scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankBonusScheduleConfig {
    /// Whether the background monthly run is active
    pub enabled: bool,
    /// How often to check (seconds)
    pub check_interval_seconds: u64,
}

impl Default for RankBonusScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 86_400,
        }
    }
}

/// Complete node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Administrative HTTP listen address
    pub listen_addr: SocketAddr,
    /// Ledger database file
    pub database_path: PathBuf,
    pub distribution: DistributionScheduleConfig,
    pub rank_bonus: RankBonusScheduleConfig,
    /// Versioned business parameters for the engines
    pub economy: EconomyParams,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8430".parse().expect("static listen addr"),
            database_path: PathBuf::from("meridian.db"),
            distribution: DistributionScheduleConfig::default(),
            rank_bonus: RankBonusScheduleConfig::default(),
            economy: EconomyParams::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file, or defaults when absent
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };

        config.validate()?;
        tracing::info!(
            economy_version = config.economy.version,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Apply CLI argument overrides
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(listen) = args.listen {
            self.listen_addr = listen;
        }
        if let Some(database) = &args.database {
            self.database_path = database.clone();
        }
    }

    fn validate(&self) -> Result<()> {
        self.economy
            .validate()
            .context("economy configuration invalid")?;
        if self.distribution.check_interval_seconds == 0 {
            anyhow::bail!("distribution check interval must be non-zero");
        }
        if self.rank_bonus.check_interval_seconds == 0 {
            anyhow::bail!("rank bonus check interval must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass_validation() {
        ServiceConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            listen_addr = "0.0.0.0:9000"

            [distribution]
            concurrency = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.distribution.concurrency, 2);
        assert!(config.distribution.enabled);
        assert_eq!(config.economy.commission_base_value, 440_000);
    }

    #[test]
    fn test_economy_overrides_from_toml() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [economy]
            commission_base_value = 500000
            rates = [1000, 500]

            [economy.allocations.starter]
            yearly_tokens = 365000000
            commission_depth = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.economy.commission_base_value, 500_000);
        assert_eq!(config.economy.rates.max_level(), 2);
        assert_eq!(
            config
                .economy
                .allocations
                .daily_amount(&lib_types::Tier::new("starter")),
            Some(1_000_000)
        );
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = ServiceConfig::default();
        config.apply_cli_overrides(&CliArgs {
            listen: Some("127.0.0.1:1234".parse().unwrap()),
            database: Some(PathBuf::from("/tmp/test.db")),
            ..Default::default()
        });
        assert_eq!(config.listen_addr, "127.0.0.1:1234".parse().unwrap());
        assert_eq!(config.database_path, PathBuf::from("/tmp/test.db"));
    }
}

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};
use tracing::debug;

use super::agreement::DEFAULT_INTEREST_RATE;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the ledger gateway.
    pub url: String,
    /// Address of the agreement contract.
    pub contract: String,
    /// Address of the payment token contract.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_retries")]
    pub retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_retries() -> usize {
    2
}

fn default_retry_delay_ms() -> u64 {
    250
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    /// `getAmountOwed(id)` plus `getInterestOwed(principalEstimate)`.
    #[default]
    Split,
    /// The combined `getTotalOwed(id)`.
    Total,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub estimate_interval_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub interest_interval_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub reconcile_interval_ms: u64,
    #[serde(default)]
    pub reconcile_mode: ReconcileMode,
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            estimate_interval_ms: default_interval_ms(),
            interest_interval_ms: default_interval_ms(),
            reconcile_interval_ms: default_interval_ms(),
            reconcile_mode: ReconcileMode::default(),
        }
    }
}

impl PollingConfig {
    pub fn estimate_interval(&self) -> Duration {
        Duration::from_millis(self.estimate_interval_ms.max(1))
    }

    pub fn interest_interval(&self) -> Duration {
        Duration::from_millis(self.interest_interval_ms.max(1))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DisplayConfig {
    #[serde(default = "default_principal_digits")]
    pub principal_digits: u32,
    #[serde(default = "default_interest_digits")]
    pub interest_digits: u32,
}

fn default_principal_digits() -> u32 {
    5
}

fn default_interest_digits() -> u32 {
    10
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            principal_digits: default_principal_digits(),
            interest_digits: default_interest_digits(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub ledger: LedgerConfig,
    /// Wallet account used as the default sender.
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default = "default_from_block")]
    pub from_block: u64,
    #[serde(default = "default_interest_rate")]
    pub interest_rate: f64,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

fn default_from_block() -> u64 {
    1
}

fn default_interest_rate() -> f64 {
    DEFAULT_INTEREST_RATE
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "accrue", "accrue")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.validate()?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.interest_rate.is_finite() || self.interest_rate < 0.0 {
            anyhow::bail!(
                "interest_rate must be a non-negative number, got {}",
                self.interest_rate
            );
        }
        if self.ledger.url.trim().is_empty() {
            anyhow::bail!("ledger.url must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization_with_defaults() {
        let yaml_str = r#"
ledger:
  url: "http://localhost:8545"
  contract: "0xabc"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.ledger.url, "http://localhost:8545");
        assert_eq!(config.ledger.contract, "0xabc");
        assert!(config.ledger.token.is_none());
        assert_eq!(config.ledger.retries, 2);
        assert_eq!(config.ledger.retry_delay_ms, 250);
        assert!(config.account.is_none());
        assert_eq!(config.from_block, 1);
        assert_eq!(config.interest_rate, 0.04);
        assert_eq!(config.polling.estimate_interval(), Duration::from_secs(1));
        assert_eq!(config.polling.interest_interval(), Duration::from_secs(1));
        assert_eq!(config.polling.reconcile_interval(), Duration::from_secs(1));
        assert_eq!(config.polling.reconcile_mode, ReconcileMode::Split);
        assert_eq!(config.display.principal_digits, 5);
        assert_eq!(config.display.interest_digits, 10);
    }

    #[test]
    fn test_config_deserialization_full() {
        let yaml_str = r#"
ledger:
  url: "http://example.com/rpc"
  contract: "0xagreements"
  token: "0xdai"
  retries: 0
  retry_delay_ms: 10
account: "0xpayor"
from_block: 4200
interest_rate: 0.05
polling:
  estimate_interval_ms: 250
  reconcile_interval_ms: 5000
  reconcile_mode: total
display:
  principal_digits: 2
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(config.ledger.token.as_deref(), Some("0xdai"));
        assert_eq!(config.ledger.retries, 0);
        assert_eq!(config.account.as_deref(), Some("0xpayor"));
        assert_eq!(config.from_block, 4200);
        assert_eq!(config.interest_rate, 0.05);
        assert_eq!(config.polling.estimate_interval(), Duration::from_millis(250));
        assert_eq!(config.polling.interest_interval(), Duration::from_secs(1));
        assert_eq!(config.polling.reconcile_interval(), Duration::from_secs(5));
        assert_eq!(config.polling.reconcile_mode, ReconcileMode::Total);
        assert_eq!(config.display.principal_digits, 2);
        assert_eq!(config.display.interest_digits, 10);
    }

    #[test]
    fn test_load_rejects_negative_interest_rate() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "ledger:\n  url: http://localhost\n  contract: '0x1'\ninterest_rate: -0.1\n",
        )
        .unwrap();

        let err = AppConfig::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("interest_rate"));
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = AppConfig::load_from_path("/nonexistent/accrue.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/accrue.yaml"));
    }
}

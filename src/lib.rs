pub mod cli;
pub mod core;
pub mod engine;
pub mod loader;
pub mod poller;
pub mod providers;
pub mod store;
pub mod submit;

use crate::cli::watch::WatchTarget;
use crate::core::agreement::DEFAULT_INTEREST_RATE;
use crate::core::config::{AppConfig, DisplayConfig};
use crate::engine::Engine;
use crate::submit::NewAgreement;
use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Show every agreement found in the ledger history.
    List,
    /// Watch all agreements, or only `ids`, until interrupted or until
    /// `duration` elapses.
    Watch {
        ids: Vec<String>,
        duration: Option<Duration>,
    },
    /// Offline projection, no ledger access.
    Estimate {
        annual_amount: u128,
        interest_rate: Option<f64>,
        checkpoints: Vec<f64>,
    },
    Create(NewAgreement),
    Supply {
        agreement_id: String,
        amount: u128,
    },
    Withdraw {
        agreement_id: String,
    },
}

fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

fn connect(config_path: Option<&str>) -> Result<(AppConfig, Engine)> {
    let config = load_config(config_path)?;
    let engine = Engine::from_config(&config)?;
    Ok((config, engine))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("accrue starting...");

    match command {
        AppCommand::Estimate {
            annual_amount,
            interest_rate,
            checkpoints,
        } => {
            // the estimate works without a config file
            let display = match config_path {
                Some(path) => AppConfig::load_from_path(path)?.display,
                None => DisplayConfig::default(),
            };
            cli::estimate::run(
                annual_amount,
                interest_rate.unwrap_or(DEFAULT_INTEREST_RATE),
                &checkpoints,
                &display,
            )
        }
        AppCommand::List => {
            let (_, engine) = connect(config_path)?;
            cli::list::run(&engine).await
        }
        AppCommand::Watch { ids, duration } => {
            let (config, engine) = connect(config_path)?;
            let target = if ids.is_empty() {
                WatchTarget::All
            } else {
                WatchTarget::Ids(ids)
            };
            cli::watch::run(
                &engine,
                target,
                &config.display,
                config.polling.estimate_interval(),
                duration,
            )
            .await
        }
        AppCommand::Create(terms) => {
            let (_, engine) = connect(config_path)?;
            cli::actions::create(&engine, terms).await
        }
        AppCommand::Supply {
            agreement_id,
            amount,
        } => {
            let (_, engine) = connect(config_path)?;
            cli::actions::supply(&engine, &agreement_id, amount).await
        }
        AppCommand::Withdraw { agreement_id } => {
            let (_, engine) = connect(config_path)?;
            cli::actions::withdraw(&engine, &agreement_id).await
        }
    }
}

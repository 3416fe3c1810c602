use accrue::core::log::init_logging;
use accrue::core::units::{SECONDS_IN_DAY, SECONDS_IN_YEAR, parse_token_amount};
use accrue::submit::NewAgreement;
use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::time::Duration;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// List agreements recorded on the ledger
    List,
    /// Live accrual estimates reconciled against the ledger
    Watch {
        /// Agreement ids to watch; all known agreements when omitted
        ids: Vec<String>,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Project accrual for given terms without touching the ledger
    Estimate {
        /// Annual amount in whole tokens
        annual: String,
        /// Annual interest rate, e.g. 0.04
        #[arg(short, long)]
        rate: Option<f64>,
        /// Elapsed seconds to project at; may be repeated
        #[arg(long = "at")]
        at: Vec<f64>,
    },
    /// Create a new agreement from the configured account
    Create {
        receiver: String,
        /// Annual amount in whole tokens
        annual: String,
        /// Content reference for the agreement's documentation
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Fund an agreement
    Supply {
        agreement_id: String,
        /// Amount in whole tokens
        amount: String,
    },
    /// Withdraw accrued funds as the receiver
    Withdraw { agreement_id: String },
}

impl TryFrom<Commands> for accrue::AppCommand {
    type Error = anyhow::Error;

    fn try_from(cmd: Commands) -> Result<accrue::AppCommand> {
        let command = match cmd {
            Commands::List => accrue::AppCommand::List,
            Commands::Watch { ids, duration } => accrue::AppCommand::Watch {
                ids,
                duration: duration.map(Duration::from_secs),
            },
            Commands::Estimate { annual, rate, at } => accrue::AppCommand::Estimate {
                annual_amount: parse_token_amount(&annual)?,
                interest_rate: rate,
                checkpoints: if at.is_empty() {
                    vec![10.0, SECONDS_IN_DAY, 30.0 * SECONDS_IN_DAY, SECONDS_IN_YEAR]
                } else {
                    at
                },
            },
            Commands::Create {
                receiver,
                annual,
                description,
            } => accrue::AppCommand::Create(NewAgreement {
                receiver,
                annual_amount: parse_token_amount(&annual)?,
                description,
            }),
            Commands::Supply {
                agreement_id,
                amount,
            } => accrue::AppCommand::Supply {
                agreement_id,
                amount: parse_token_amount(&amount)?,
            },
            Commands::Withdraw { agreement_id } => accrue::AppCommand::Withdraw { agreement_id },
            Commands::Setup => anyhow::bail!("Setup command should be handled separately"),
        };
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => accrue::cli::setup::setup_at_path(path),
            None => accrue::cli::setup::setup(),
        },
        Some(cmd) => match accrue::AppCommand::try_from(cmd) {
            Ok(command) => accrue::run_command(command, cli.config_path.as_deref()).await,
            Err(e) => Err(e),
        },
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

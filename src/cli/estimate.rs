use anyhow::{Result, bail};
use comfy_table::Cell;
use rust_decimal::Decimal;

use super::ui;
use crate::core::accrual;
use crate::core::config::DisplayConfig;
use crate::core::units::{SECONDS_IN_DAY, amount_to_display, float_amount_to_display};

/// Offline projection for a set of terms.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub elapsed_seconds: f64,
    /// Unrounded linear accrual, in whole tokens.
    pub principal: Decimal,
    /// Compounded annuity value, in whole tokens.
    pub compounded: Decimal,
}

pub fn estimate(annual_amount: u128, interest_rate: f64, elapsed_seconds: f64) -> Result<Estimate> {
    if !interest_rate.is_finite() || interest_rate < 0.0 {
        bail!("Interest rate must be a non-negative number, got {interest_rate}");
    }
    if !elapsed_seconds.is_finite() || elapsed_seconds < 0.0 {
        bail!("Elapsed time must be a non-negative number, got {elapsed_seconds}");
    }
    let annual = annual_amount as f64;
    Ok(Estimate {
        elapsed_seconds,
        principal: float_amount_to_display(accrual::linear_accrual(annual, elapsed_seconds)),
        compounded: amount_to_display(accrual::accrued_interest_units(
            annual,
            interest_rate,
            elapsed_seconds,
        )),
    })
}

fn describe_elapsed(seconds: f64) -> String {
    if seconds >= SECONDS_IN_DAY {
        format!("{seconds}s ({:.2} days)", seconds / SECONDS_IN_DAY)
    } else {
        format!("{seconds}s")
    }
}

pub fn render_estimates(estimates: &[Estimate], display: &DisplayConfig) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Elapsed"),
        ui::header_cell("Accrued"),
        ui::header_cell("Compounded"),
    ]);
    for estimate in estimates {
        table.add_row(vec![
            Cell::new(describe_elapsed(estimate.elapsed_seconds)),
            ui::amount_cell(estimate.principal, display.principal_digits),
            ui::amount_cell(estimate.compounded, display.interest_digits),
        ]);
    }
    table.to_string()
}

/// Prints projections at each of `checkpoints` seconds after the start.
pub fn run(
    annual_amount: u128,
    interest_rate: f64,
    checkpoints: &[f64],
    display: &DisplayConfig,
) -> Result<()> {
    let estimates = checkpoints
        .iter()
        .map(|&secs| estimate(annual_amount, interest_rate, secs))
        .collect::<Result<Vec<_>>>()?;

    println!(
        "{} {}\n",
        ui::style_text("Estimate", ui::StyleType::Title),
        ui::style_text(
            &format!(
                "{} tokens per year at {:.2}%",
                amount_to_display(annual_amount),
                interest_rate * 100.0
            ),
            ui::StyleType::Subtle
        )
    );
    println!("{}", render_estimates(&estimates, display));
    Ok(())
}

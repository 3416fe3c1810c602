//! Continuous accrual math.
//!
//! All functions here are pure and never fail. Negative elapsed time or
//! negative rates are rejected by the caller (see
//! [`Agreement::validate`](super::agreement::Agreement::validate)) before
//! these run.
//!
//! Two rounding policies coexist on purpose: `*_units` functions round to
//! the nearest integer smallest unit and are the values compared against
//! ledger figures; the unrounded functions are for display only.

use super::units::SECONDS_IN_YEAR;

/// Converts an annual figure (amount or rate) to its per-second equivalent.
pub fn per_second(annual: f64) -> f64 {
    annual / SECONDS_IN_YEAR
}

/// Unrounded linear accrual of `annual_amount` over `elapsed_seconds`.
pub fn linear_accrual(annual_amount: f64, elapsed_seconds: f64) -> f64 {
    per_second(annual_amount) * elapsed_seconds
}

/// Linear accrual rounded to the nearest smallest unit.
pub fn linear_accrual_units(annual_amount: f64, elapsed_seconds: f64) -> u128 {
    round_units(linear_accrual(annual_amount, elapsed_seconds))
}

/// Future value of a continuously compounded annuity:
/// `P * (e^(R*T) - 1) / (e^R - 1)`, where `P` is the payment per second,
/// `R` the interest rate per second and `T` the elapsed seconds.
///
/// `R == 0` is a removable singularity whose limit is `P * T`. Rates small
/// enough for `e^R - 1` to vanish in `f64` take the same limit.
pub fn annuity_due(payment: f64, rate: f64, elapsed_seconds: f64) -> f64 {
    let denominator = rate.exp_m1();
    if rate == 0.0 || denominator == 0.0 {
        return payment * elapsed_seconds;
    }
    payment * (rate * elapsed_seconds).exp_m1() / denominator
}

/// Compounded accrual for an agreement's terms, rounded to the nearest
/// smallest unit.
pub fn accrued_interest_units(
    annual_amount: f64,
    interest_rate: f64,
    elapsed_seconds: f64,
) -> u128 {
    round_units(annuity_due(
        per_second(annual_amount),
        per_second(interest_rate),
        elapsed_seconds,
    ))
}

fn round_units(value: f64) -> u128 {
    if !value.is_finite() {
        return 0;
    }
    // negatives saturate to 0
    value.round() as u128
}

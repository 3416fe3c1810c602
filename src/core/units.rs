//! Conversions between ledger timestamps/amounts and computation or display
//! scalars.
//!
//! Raw amounts are integers in the token's smallest unit (10^-18 of a token).
//! Display conversion is exact while the raw amount fits a 96-bit decimal
//! mantissa (about 7.9 * 10^28 raw units, i.e. 79 billion tokens). Larger
//! amounts go through `f64` and keep only ~15-17 significant digits; that
//! loss is accepted for display and never fed back into ledger comparisons.

use anyhow::{Context, Result, anyhow};
use chrono::DateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use super::clock::Clock;

pub const TOKEN_DECIMALS: u32 = 18;
pub const TOKEN_BASE: f64 = 1e18;
pub const SECONDS_IN_DAY: f64 = 86_400.0;
/// 365.25 days.
pub const SECONDS_IN_YEAR: f64 = 31_557_600.0;

/// Absolute distance in seconds between a Unix-seconds start date and `now`.
pub fn elapsed_seconds(start_date: u64, now_unix: f64) -> f64 {
    (now_unix - start_date as f64).abs()
}

/// Seconds elapsed since `start_date` (Unix seconds, not milliseconds)
/// according to `clock`.
pub fn seconds_since(start_date: u64, clock: &dyn Clock) -> f64 {
    elapsed_seconds(start_date, clock.unix_seconds())
}

/// Parses a raw smallest-unit amount given as decimal digits or a `0x` hex
/// string.
pub fn parse_raw_amount(raw: &str) -> Result<u128> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        if hex.is_empty() {
            return Ok(0);
        }
        return u128::from_str_radix(hex, 16)
            .with_context(|| format!("Invalid hex amount: {raw}"));
    }
    raw.parse::<u128>()
        .with_context(|| format!("Invalid raw amount: {raw}"))
}

/// Converts a whole-token decimal such as `"100000"` or `"0.5"` into raw
/// smallest units.
pub fn parse_token_amount(tokens: &str) -> Result<u128> {
    let value: Decimal = tokens
        .trim()
        .parse()
        .with_context(|| format!("Invalid token amount: {tokens}"))?;
    if value.is_sign_negative() {
        return Err(anyhow!("Token amount must not be negative: {tokens}"));
    }
    let scale = Decimal::from_i128_with_scale(10_i128.pow(TOKEN_DECIMALS), 0);
    value
        .checked_mul(scale)
        .and_then(|raw| raw.trunc().to_u128())
        .ok_or_else(|| anyhow!("Token amount out of range: {tokens}"))
}

/// Exact display conversion of a raw integer amount.
pub fn amount_to_display(raw: u128) -> Decimal {
    i128::try_from(raw)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, TOKEN_DECIMALS).ok())
        .map(|d| d.normalize())
        .unwrap_or_else(|| float_amount_to_display(raw as f64))
}

/// Display conversion for floating raw amounts (unrounded estimates and
/// amounts too large for an exact decimal).
pub fn float_amount_to_display(raw: f64) -> Decimal {
    if !raw.is_finite() || raw <= 0.0 {
        return Decimal::ZERO;
    }
    Decimal::from_f64(raw / TOKEN_BASE).unwrap_or_default()
}

/// Converts a raw amount string to whole tokens. Missing, empty or zero input
/// yields zero instead of an error.
pub fn to_display_amount<A: AsRef<str>>(raw: Option<A>) -> Decimal {
    let Some(raw) = raw else {
        return Decimal::ZERO;
    };
    let raw = raw.as_ref().trim();
    if raw.is_empty() {
        return Decimal::ZERO;
    }
    match parse_raw_amount(raw) {
        Ok(units) => amount_to_display(units),
        // uint256 values beyond u128 or exponent notation
        Err(_) => raw
            .parse::<f64>()
            .map_or(Decimal::ZERO, float_amount_to_display),
    }
}

/// Formats a token amount with exactly `fraction_digits` decimals and
/// thousands separators.
pub fn format_amount(amount: Decimal, fraction_digits: u32) -> String {
    let rounded = amount.round_dp(fraction_digits);
    let text = format!("{:.*}", fraction_digits as usize, rounded);
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None => format!("{sign}{grouped}"),
    }
}

pub fn format_start_date(start_date: u64) -> String {
    i64::try_from(start_date)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| start_date.to_string())
}

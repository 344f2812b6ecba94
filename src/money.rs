//! SGD amounts are `Decimal` throughout; ratios handed to display code are
//! `f64` and never clamped.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Result, TrackerError};

/// `amount / target`, or 0 when there is no positive target. May exceed 1.0.
pub fn progress_toward(amount: Decimal, target: Option<Decimal>) -> f64 {
    match target {
        Some(target) if target > Decimal::ZERO => (amount / target).to_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Whole percent of `total`, truncated. 0 without a positive total.
pub fn percentage_of(amount: Decimal, total: Option<Decimal>) -> i64 {
    match total {
        Some(total) if total > Decimal::ZERO => {
            (amount * Decimal::ONE_HUNDRED / total).trunc().to_i64().unwrap_or(0)
        }
        _ => 0,
    }
}

/// What is still needed to reach `target`, never negative.
pub fn remaining(amount: Decimal, target: Option<Decimal>) -> Decimal {
    target
        .map(|target| (target - amount).max(Decimal::ZERO))
        .unwrap_or(Decimal::ZERO)
}

pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// "$1,234.56"
pub fn format_sgd(amount: Decimal) -> String {
    let cents = round_cents(amount);
    let sign = if cents.is_sign_negative() && !cents.is_zero() { "-" } else { "" };
    let plain = format!("{:.2}", cents.abs());
    let (whole, frac) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{sign}${grouped}.{frac}")
}

/// Parses a user-entered amount such as "12.5", "$1,200" or " 0.49 ".
/// Rejects anything that is not strictly positive; rounds to cents.
pub fn parse_amount(text: &str) -> Result<Decimal> {
    let cleaned: String = text
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let value = Decimal::from_str(&cleaned)
        .map_err(|e| TrackerError::Invalid(format!("'{text}' is not an amount: {e}")))?;
    if value <= Decimal::ZERO {
        return Err(TrackerError::Invalid(format!("amount must be positive, got '{text}'")));
    }
    Ok(round_cents(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_progress_is_unclamped() {
        assert_eq!(progress_toward(dec!(750), Some(dec!(500))), 1.5);
        assert_eq!(progress_toward(dec!(1200), Some(dec!(1200))), 1.0);
    }

    #[test]
    fn test_progress_without_target_is_zero() {
        assert_eq!(progress_toward(dec!(750), None), 0.0);
        assert_eq!(progress_toward(dec!(750), Some(Decimal::ZERO)), 0.0);
        assert_eq!(progress_toward(dec!(750), Some(dec!(-10))), 0.0);
    }

    #[test]
    fn test_percentage_truncates() {
        assert_eq!(percentage_of(dec!(1150), Some(dec!(1200))), 95);
        assert_eq!(percentage_of(dec!(1700), Some(dec!(1000))), 170);
        assert_eq!(percentage_of(dec!(5), None), 0);
    }

    #[test]
    fn test_remaining_never_negative() {
        assert_eq!(remaining(dec!(300), Some(dec!(800))), dec!(500));
        assert_eq!(remaining(dec!(900), Some(dec!(800))), Decimal::ZERO);
        assert_eq!(remaining(dec!(900), None), Decimal::ZERO);
    }

    #[test]
    fn test_format_sgd() {
        assert_eq!(format_sgd(dec!(0)), "$0.00");
        assert_eq!(format_sgd(dec!(30.99)), "$30.99");
        assert_eq!(format_sgd(dec!(1234.5)), "$1,234.50");
        assert_eq!(format_sgd(dec!(1234567.005)), "$1,234,567.01");
        assert_eq!(format_sgd(dec!(-42)), "-$42.00");
        assert_eq!(format_sgd(dec!(100)), "$100.00");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("12.5").unwrap(), dec!(12.50));
        assert_eq!(parse_amount(" $1,200 ").unwrap(), dec!(1200));
        assert_eq!(parse_amount("0.495").unwrap(), dec!(0.50));
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("-3").is_err());
        assert!(parse_amount("abc").is_err());
    }
}

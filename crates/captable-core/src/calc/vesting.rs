//! Cliff-then-linear vesting.

use std::collections::BTreeMap;

use crate::formula::{EvalError, Expr};

pub const EVALUATION_DATE: &str = "evaluation_date";
pub const GRANT_DATE: &str = "grant_date";
pub const DAYS_ELAPSED: &str = "days_elapsed";
pub const CLIFF_DAYS: &str = "cliff_days";
pub const VESTING_DAYS: &str = "vesting_days";
pub const TOTAL_GRANTED: &str = "total_granted";
pub const VESTED_FRACTION: &str = "vested_fraction";
pub const VESTED_SHARES: &str = "vested_shares";

pub fn days_elapsed() -> Expr {
    Expr::var(EVALUATION_DATE) - Expr::var(GRANT_DATE)
}

/// `MIN(1, MAX(0, (days - cliff) / period))`. With a zero period the grant
/// vests in full once the cliff has passed.
///
/// The period counts from the cliff, so the fraction reaches 1.0 after
/// `cliff + period` days, not after `period` days.
pub fn vested_fraction(zero_period: bool) -> Expr {
    let days = Expr::var(DAYS_ELAPSED);
    let cliff = Expr::var(CLIFF_DAYS);
    if zero_period {
        return Expr::if_(days.ge(cliff), 1.0, 0.0);
    }
    Expr::min(vec![
        Expr::num(1.0),
        Expr::max(vec![
            Expr::num(0.0),
            Expr::div(days - cliff, Expr::var(VESTING_DAYS)),
        ]),
    ])
}

pub fn vested_shares() -> Expr {
    Expr::round(Expr::var(TOTAL_GRANTED) * Expr::var(VESTED_FRACTION), 0)
}

pub fn unvested_shares() -> Expr {
    Expr::var(TOTAL_GRANTED) - Expr::var(VESTED_SHARES)
}

/// Vested fraction after `days_elapsed` days.
pub fn fraction_at(days_elapsed: f64, cliff_days: u32, vesting_days: u32) -> Result<f64, EvalError> {
    let env: BTreeMap<String, f64> = [
        (DAYS_ELAPSED.to_string(), days_elapsed),
        (CLIFF_DAYS.to_string(), f64::from(cliff_days)),
        (VESTING_DAYS.to_string(), f64::from(vesting_days)),
    ]
    .into_iter()
    .collect();
    vested_fraction(vesting_days == 0).eval(&env)
}

//! Treasury stock method for options and warrants.
//!
//! In-the-money instruments are assumed exercised, and the exercise proceeds
//! buy back shares at the current price. Only the difference dilutes.

use std::collections::BTreeMap;

use crate::formula::{EvalError, Expr};

pub const CURRENT_PPS: &str = "current_pps";
pub const STRIKE_PRICE: &str = "strike_price";
pub const SHARES: &str = "shares";
pub const ITM_SHARES: &str = "itm_shares";
pub const EXERCISE_PROCEEDS: &str = "exercise_proceeds";
pub const REPURCHASED_SHARES: &str = "repurchased_shares";

/// `IF(current_pps > strike, shares, 0)`
pub fn itm_shares() -> Expr {
    Expr::if_(
        Expr::var(CURRENT_PPS).gt(Expr::var(STRIKE_PRICE)),
        Expr::var(SHARES),
        0.0,
    )
}

pub fn exercise_proceeds() -> Expr {
    Expr::var(ITM_SHARES) * Expr::var(STRIKE_PRICE)
}

/// Whole shares the proceeds buy back at the current price.
pub fn repurchased_shares() -> Expr {
    Expr::round(Expr::div(Expr::var(EXERCISE_PROCEEDS), Expr::var(CURRENT_PPS)), 0)
}

pub fn net_dilution() -> Expr {
    Expr::var(ITM_SHARES) - Expr::var(REPURCHASED_SHARES)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsmOutcome {
    pub itm_shares: f64,
    pub exercise_proceeds: f64,
    pub repurchased_shares: f64,
    pub net_dilution: f64,
}

/// Run the method numerically through the same expressions the ledger uses.
pub fn evaluate(shares: f64, strike_price: f64, current_pps: f64) -> Result<TsmOutcome, EvalError> {
    let mut env: BTreeMap<String, f64> = BTreeMap::new();
    env.insert(SHARES.to_string(), shares);
    env.insert(STRIKE_PRICE.to_string(), strike_price);
    env.insert(CURRENT_PPS.to_string(), current_pps);

    let itm = itm_shares().eval(&env)?;
    env.insert(ITM_SHARES.to_string(), itm);
    let proceeds = exercise_proceeds().eval(&env)?;
    env.insert(EXERCISE_PROCEEDS.to_string(), proceeds);
    let repurchased = repurchased_shares().eval(&env)?;
    env.insert(REPURCHASED_SHARES.to_string(), repurchased);
    let net = net_dilution().eval(&env)?;

    Ok(TsmOutcome {
        itm_shares: itm,
        exercise_proceeds: proceeds,
        repurchased_shares: repurchased,
        net_dilution: net,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_the_money_options_dilute_net_of_buyback() {
        let out = evaluate(100_000.0, 0.5, 2.0).unwrap();
        assert_eq!(out.itm_shares, 100_000.0);
        assert_eq!(out.exercise_proceeds, 50_000.0);
        assert_eq!(out.repurchased_shares, 25_000.0);
        assert_eq!(out.net_dilution, 75_000.0);
    }

    #[test]
    fn at_or_out_of_the_money_options_do_not_dilute() {
        assert_eq!(evaluate(100_000.0, 2.0, 2.0).unwrap().net_dilution, 0.0);
        assert_eq!(evaluate(100_000.0, 3.0, 2.0).unwrap().net_dilution, 0.0);
    }

    #[test]
    fn buyback_rounds_to_whole_shares() {
        let out = evaluate(1_000.0, 1.0, 3.0).unwrap();
        assert_eq!(out.repurchased_shares, 333.0);
        assert_eq!(out.net_dilution, 667.0);
    }

    #[test]
    fn zero_price_is_guarded() {
        let out = evaluate(100_000.0, 0.0, 0.0).unwrap();
        assert_eq!(out.net_dilution, 0.0);
    }

    #[test]
    fn renders_ledger_formulas() {
        assert_eq!(
            itm_shares().render(),
            "IF({current_pps}>{strike_price},{shares},0)"
        );
        assert_eq!(
            repurchased_shares().render(),
            "ROUND(IFERROR({exercise_proceeds}/{current_pps},0),0)"
        );
    }
}

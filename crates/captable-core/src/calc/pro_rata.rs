//! Pro-rata participation in a round.
//!
//! Participants top up to an effective ownership of the post-round total
//! `T`. Because their new shares are part of `T`, it is solved in closed
//! form: non-participants keep `pre + base − Σcurrent` shares, which is
//! `1 − Σeff` of the total.

use std::collections::BTreeMap;

use crate::calc::{column_total, vars, ColumnDef, RowCell};
use crate::document::{ProRataExercise, ProRataParticipation, ProRataRights};
use crate::formula::{EvalError, Expr, OutputStyle};
use crate::GenerationError;

pub const BASE_SHARES: &str = "base_shares";
pub const POST_ROUND_SHARES: &str = "post_round_shares";

pub const HOLDER: ColumnDef = ColumnDef::new("holder", "Holder", OutputStyle::Plain);
pub const CLASS: ColumnDef = ColumnDef::new("class", "Class", OutputStyle::Plain);
const RIGHTS: ColumnDef = ColumnDef::new("rights", "Rights", OutputStyle::Plain);
const EXERCISE: ColumnDef = ColumnDef::new("exercise", "Exercise", OutputStyle::Plain);
pub const CURRENT_SHARES: ColumnDef =
    ColumnDef::new("current_shares", "Current Shares", OutputStyle::Shares);
const PRIOR_OWNERSHIP: ColumnDef =
    ColumnDef::new("prior_ownership", "Prior Ownership %", OutputStyle::Percent);
const TARGET: ColumnDef = ColumnDef::new("target", "Target %", OutputStyle::Percent);
const CAP: ColumnDef = ColumnDef::new("cap", "Cap %", OutputStyle::Percent);
pub const EFFECTIVE: ColumnDef = ColumnDef::new("effective", "Effective %", OutputStyle::Percent);
pub const NEW_SHARES: ColumnDef = ColumnDef::new("new_shares", "New Shares", OutputStyle::Shares);

pub fn columns() -> Vec<ColumnDef> {
    vec![
        HOLDER,
        CLASS,
        RIGHTS,
        EXERCISE,
        CURRENT_SHARES,
        PRIOR_OWNERSHIP,
        TARGET,
        CAP,
        EFFECTIVE,
        NEW_SHARES,
    ]
}

/// Whether the participation produces an allocation row at all.
pub fn participates(participation: &ProRataParticipation) -> bool {
    participation.rights != ProRataRights::None
}

pub fn validate(round: &str, participation: &ProRataParticipation) -> Result<(), GenerationError> {
    let context = || format!("pro-rata for `{}` in round `{round}`", participation.holder);
    let fraction = |field: &str, value: Option<f64>| match value {
        Some(x) if !(0.0..1.0).contains(&x) => Err(GenerationError::invalid(
            context(),
            format!("{field} must be in [0, 1)"),
        )),
        _ => Ok(()),
    };
    fraction("super_pro_rata_percentage", participation.super_pro_rata_percentage)?;
    fraction("partial_percentage", participation.partial_percentage)?;
    if matches!(participation.partial_amount, Some(x) if !x.is_finite() || x < 0.0) {
        return Err(GenerationError::invalid(
            context(),
            "partial_amount must not be negative",
        ));
    }

    if participation.rights == ProRataRights::Super
        && participation.super_pro_rata_percentage.is_none()
    {
        return Err(GenerationError::missing(
            Some(round),
            Some(&participation.holder),
            "super_pro_rata_percentage",
        ));
    }
    if participation.exercise == ProRataExercise::Partial
        && participation.partial_amount.is_none()
        && participation.partial_percentage.is_none()
    {
        return Err(GenerationError::missing(
            Some(round),
            Some(&participation.holder),
            "partial_amount",
        ));
    }
    Ok(())
}

/// Cells for one participant, aligned with [`columns`].
pub fn row(participation: &ProRataParticipation, class: &str) -> Vec<RowCell> {
    let target = match participation.rights {
        ProRataRights::Super => participation
            .super_pro_rata_percentage
            .map_or(RowCell::Empty, RowCell::Number),
        _ => RowCell::Empty,
    };
    let amount_share = |amount: f64| Expr::div(amount, Expr::var(vars::POST_MONEY));
    let cap = match participation.exercise {
        ProRataExercise::Full => RowCell::Empty,
        ProRataExercise::Partial => {
            match (participation.partial_percentage, participation.partial_amount) {
                (Some(pct), Some(amount)) => {
                    RowCell::Formula(Expr::min(vec![Expr::num(pct), amount_share(amount)]))
                }
                (Some(pct), None) => RowCell::Number(pct),
                (None, Some(amount)) => RowCell::Formula(amount_share(amount)),
                (None, None) => RowCell::Empty,
            }
        }
    };

    vec![
        RowCell::Text(participation.holder.clone()),
        RowCell::Text(class.to_string()),
        RowCell::Text(participation.rights.label().to_string()),
        RowCell::Text(participation.exercise.label().to_string()),
        RowCell::HolderSharesBeforeRound,
        RowCell::Formula(Expr::div(
            Expr::var(CURRENT_SHARES.key),
            Expr::var(vars::PRE_SHARES),
        )),
        target,
        cap,
        RowCell::Formula(effective(participation)),
        RowCell::Formula(Expr::round(
            Expr::var(EFFECTIVE.key) * Expr::var(POST_ROUND_SHARES) - Expr::var(CURRENT_SHARES.key),
            0,
        )),
    ]
}

fn effective(participation: &ProRataParticipation) -> Expr {
    let applicable = match participation.rights {
        ProRataRights::Super => Expr::var(TARGET.key),
        ProRataRights::Standard | ProRataRights::None => Expr::var(PRIOR_OWNERSHIP.key),
    };
    match participation.exercise {
        ProRataExercise::Full => applicable,
        ProRataExercise::Partial => Expr::min(vec![applicable, Expr::var(CAP.key)]),
    }
}

/// `T = (pre + base − Σcurrent) / (1 − Σeff)`
pub fn post_round_shares() -> Expr {
    Expr::div(
        Expr::var(vars::PRE_SHARES) + Expr::var(BASE_SHARES)
            - Expr::sum(vec![Expr::var(&column_total(CURRENT_SHARES.key))]),
        Expr::num(1.0) - Expr::sum(vec![Expr::var(&column_total(EFFECTIVE.key))]),
    )
}

/// Numeric allocation for one round.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub post_round_shares: f64,
    pub new_shares: Vec<f64>,
}

/// Evaluate the allocation for `participants` given as
/// `(participation, current_shares)`.
pub fn allocate(
    pre_shares: f64,
    base_shares: f64,
    post_money: f64,
    participants: &[(&ProRataParticipation, f64)],
) -> Result<Allocation, EvalError> {
    let round_env: BTreeMap<String, f64> = [
        (vars::PRE_SHARES.to_string(), pre_shares),
        (BASE_SHARES.to_string(), base_shares),
        (vars::POST_MONEY.to_string(), post_money),
    ]
    .into_iter()
    .collect();

    // Every column up to Effective % only depends on its own row.
    let mut rows: Vec<(Vec<RowCell>, BTreeMap<String, f64>)> = Vec::new();
    let mut total_current = 0.0;
    let mut total_effective = 0.0;
    for (participation, current) in participants {
        let cells = row(participation, "");
        let mut env = round_env.clone();
        for (col, cell) in columns().iter().zip(&cells) {
            if col.key == NEW_SHARES.key {
                break;
            }
            let value = match cell {
                RowCell::Number(x) => *x,
                RowCell::Formula(expr) => expr.eval(&env)?,
                RowCell::HolderSharesBeforeRound => *current,
                RowCell::Empty | RowCell::Text(_) => 0.0,
            };
            env.insert(col.key.to_string(), value);
        }
        total_current += current;
        total_effective += env.get(EFFECTIVE.key).copied().unwrap_or(0.0);
        rows.push((cells, env));
    }

    let mut totals = round_env;
    totals.insert(column_total(CURRENT_SHARES.key), total_current);
    totals.insert(column_total(EFFECTIVE.key), total_effective);
    let post = post_round_shares().eval(&totals)?;

    let mut new_shares = Vec::with_capacity(rows.len());
    for (cells, mut env) in rows {
        env.insert(POST_ROUND_SHARES.to_string(), post);
        let value = match cells.last() {
            Some(RowCell::Formula(expr)) => expr.eval(&env)?,
            _ => 0.0,
        };
        new_shares.push(value);
    }

    Ok(Allocation {
        post_round_shares: post,
        new_shares,
    })
}

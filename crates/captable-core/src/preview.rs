//! Numeric preview of a cap table.
//!
//! The preview evaluates the expression trees the workbook formulas are
//! rendered from, so its numbers match what a spreadsheet application
//! computes on open. Generation runs it to reject negative share counts
//! before anything is laid out.

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::calc::{column_total, pro_rata, vars, RoundValue, RowCell, Strategy};
use crate::dates::excel_serial;
use crate::document::{CapTable, Round};
use crate::formula::EvalError;
use crate::generate::check;
use crate::GenerationError;

/// Shares computed for one instrument or pro-rata allocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuedShares {
    pub id: String,
    pub holder: String,
    pub shares: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundPreview {
    pub name: String,
    pub pre_round_shares: f64,
    pub pre_money_valuation: f64,
    pub post_money_valuation: f64,
    pub price_per_share: f64,
    pub investment: f64,
    pub base_shares: f64,
    pub pro_rata_shares: f64,
    pub shares_issued: f64,
    pub instruments: Vec<IssuedShares>,
    pub pro_rata: Vec<IssuedShares>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub holder: String,
    pub shares: f64,
    pub ownership: f64,
}

/// Share counts after every round, as the workbook will compute them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub founding_shares: f64,
    pub rounds: Vec<RoundPreview>,
    /// Holdings after the last round, in holder order.
    pub holdings: Vec<Holding>,
    pub total_shares: f64,
}

impl Preview {
    /// Check `doc` and compute its preview.
    pub fn compute(doc: &CapTable) -> Result<Self, GenerationError> {
        let strategies = check(doc)?;
        Self::compute_checked(doc, &strategies)
    }

    /// Compute the preview of a document that already passed the input
    /// checks. `strategies` has one entry per round.
    pub(crate) fn compute_checked(
        doc: &CapTable,
        strategies: &[Strategy],
    ) -> Result<Self, GenerationError> {
        let mut holdings: BTreeMap<String, f64> = BTreeMap::new();
        let mut founding_shares = 0.0;
        for instrument in doc.instruments.iter().filter(|i| i.round.is_none()) {
            let quantity = instrument.initial_quantity.unwrap_or(0.0);
            *holdings.entry(instrument.holder.clone()).or_default() += quantity;
            founding_shares += quantity;
        }

        let mut rounds: Vec<RoundPreview> = Vec::with_capacity(doc.rounds.len());
        let mut pre_round_shares = founding_shares;
        for (round, strategy) in doc.rounds.iter().zip(strategies) {
            let qualifying_pps = round
                .qualifying_round
                .as_deref()
                .and_then(|name| rounds.iter().find(|r| r.name == name))
                .map(|r| r.price_per_share);
            let preview = preview_round(
                doc,
                round,
                *strategy,
                pre_round_shares,
                qualifying_pps,
                &holdings,
            )?;

            for issued in preview.instruments.iter().chain(&preview.pro_rata) {
                if issued.shares < 0.0 {
                    return Err(GenerationError::NegativeShares {
                        round: round.name.clone(),
                        holder: issued.holder.clone(),
                        shares: issued.shares,
                    });
                }
            }
            for issued in preview.instruments.iter().chain(&preview.pro_rata) {
                *holdings.entry(issued.holder.clone()).or_default() += issued.shares;
            }
            debug!(
                "preview: round `{}` issues {} shares on {} pre-round",
                round.name, preview.shares_issued, preview.pre_round_shares
            );
            pre_round_shares = preview.pre_round_shares + preview.shares_issued;
            rounds.push(preview);
        }

        let total_shares: f64 = holdings.values().sum();
        let holdings = doc
            .holders
            .iter()
            .map(|holder| {
                let shares = holdings.get(holder.name.as_str()).copied().unwrap_or(0.0);
                let ownership = if total_shares == 0.0 {
                    0.0
                } else {
                    shares / total_shares
                };
                Holding {
                    holder: holder.name.clone(),
                    shares,
                    ownership,
                }
            })
            .collect();

        Ok(Self {
            founding_shares,
            rounds,
            holdings,
            total_shares,
        })
    }

    pub fn round(&self, name: &str) -> Option<&RoundPreview> {
        self.rounds.iter().find(|r| r.name == name)
    }

    pub fn holding(&self, holder: &str) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.holder == holder)
    }
}

fn preview_round(
    doc: &CapTable,
    round: &Round,
    strategy: Strategy,
    pre_round_shares: f64,
    qualifying_pps: Option<f64>,
    holdings: &BTreeMap<String, f64>,
) -> Result<RoundPreview, GenerationError> {
    let mut env: BTreeMap<String, f64> = BTreeMap::new();
    env.insert(vars::PRE_SHARES.to_string(), pre_round_shares);
    env.insert(vars::ROUND_DATE.to_string(), excel_serial(round.date));
    if let Some(pps) = qualifying_pps {
        env.insert(vars::QUALIFYING_PPS.to_string(), pps);
    }

    let values = strategy.round_values(round);
    let header = [
        (vars::PRE_MONEY, &values.pre_money),
        (vars::POST_MONEY, &values.post_money),
        (vars::PPS, &values.pps),
    ];
    // Literals first, then whatever formula only needs them. Formulas over
    // the round table's column totals wait until the rows are known.
    for (name, value) in header {
        match value {
            RoundValue::Empty => {
                env.insert(name.to_string(), 0.0);
            }
            RoundValue::Literal(x) => {
                env.insert(name.to_string(), *x);
            }
            RoundValue::Formula(_) => {}
        }
    }
    for (name, value) in header {
        if let RoundValue::Formula(expr) = value {
            match expr.eval(&env) {
                Ok(x) => {
                    env.insert(name.to_string(), x);
                }
                Err(EvalError::UnboundPlaceholder(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    let instruments: Vec<_> = doc.round_instruments(&round.name).collect();
    let columns = strategy.columns();
    let mut rows = Vec::with_capacity(instruments.len());
    for (key, instrument) in &instruments {
        rows.push(strategy.row(round, key, instrument)?);
    }

    // Column by column, so a later column may use an earlier column's total.
    let mut row_envs: Vec<BTreeMap<String, f64>> = vec![BTreeMap::new(); rows.len()];
    for (position, column) in columns.iter().enumerate() {
        let mut total = 0.0;
        for (row, ((_, instrument), cells)) in instruments.iter().zip(&rows).enumerate() {
            let mut scope = env.clone();
            scope.extend(row_envs[row].iter().map(|(k, v)| (k.clone(), *v)));
            let value = match cells.get(position) {
                Some(RowCell::Number(x)) => *x,
                Some(RowCell::Formula(expr)) => expr.eval(&scope)?,
                Some(RowCell::HolderSharesBeforeRound) => {
                    holdings.get(instrument.holder.as_str()).copied().unwrap_or(0.0)
                }
                Some(RowCell::Empty | RowCell::Text(_)) | None => 0.0,
            };
            row_envs[row].insert(column.key.to_string(), value);
            total += value;
        }
        env.insert(column_total(column.key), total);
    }

    for (name, value) in header {
        if let RoundValue::Formula(expr) = value {
            let x = expr.eval(&env)?;
            env.insert(name.to_string(), x);
        }
    }
    let value = |name: &str| env.get(name).copied().unwrap_or(0.0);

    let issued: Vec<IssuedShares> = instruments
        .iter()
        .zip(&row_envs)
        .map(|((key, instrument), row)| IssuedShares {
            id: key.clone(),
            holder: instrument.holder.clone(),
            shares: row.get("shares").copied().unwrap_or(0.0),
        })
        .collect();
    let base_shares: f64 = issued.iter().map(|i| i.shares).sum();
    let investment = if strategy.has_investment() {
        value(&column_total("investment"))
    } else {
        instruments.iter().map(|(_, i)| i.invested()).sum()
    };

    let participants: Vec<_> = round
        .pro_rata
        .iter()
        .filter(|p| pro_rata::participates(p))
        .map(|p| (p, holdings.get(p.holder.as_str()).copied().unwrap_or(0.0)))
        .collect();
    let allocated = if participants.is_empty() {
        Vec::new()
    } else {
        let allocation = pro_rata::allocate(
            pre_round_shares,
            base_shares,
            value(vars::POST_MONEY),
            &participants,
        )?;
        participants
            .iter()
            .zip(allocation.new_shares)
            .map(|((participation, _), shares)| IssuedShares {
                id: format!("{}/pro-rata/{}", round.name, participation.holder),
                holder: participation.holder.clone(),
                shares,
            })
            .collect()
    };
    let pro_rata_shares: f64 = allocated.iter().map(|a| a.shares).sum();

    Ok(RoundPreview {
        name: round.name.clone(),
        pre_round_shares,
        pre_money_valuation: value(vars::PRE_MONEY),
        post_money_valuation: value(vars::POST_MONEY),
        price_per_share: value(vars::PPS),
        investment,
        base_shares,
        pro_rata_shares,
        shares_issued: base_shares + pro_rata_shares,
        instruments: issued,
        pro_rata: allocated,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn doc(rounds: serde_json::Value, instruments: serde_json::Value) -> CapTable {
        serde_json::from_value(json!({
            "company": {"name": "Acme", "incorporation_date": "2020-01-01"},
            "holders": [
                {"name": "Founder", "type": "founder"},
                {"name": "Angel", "type": "investor"},
                {"name": "Fund I", "type": "investor"}
            ],
            "classes": [
                {"name": "Common", "type": "common"},
                {"name": "Preferred", "type": "preferred"}
            ],
            "instruments": instruments,
            "rounds": rounds
        }))
        .unwrap()
    }

    #[test]
    fn post_money_round_dilutes_founders() {
        let doc = doc(
            json!([{
                "name": "Series A",
                "date": "2023-06-01",
                "calculation_type": "valuation_based",
                "post_money_valuation": 50000000.0
            }]),
            json!([
                {"holder": "Founder", "class": "Common", "initial_quantity": 8000000.0},
                {"holder": "Fund I", "class": "Preferred", "round": "Series A", "investment_amount": 10000000.0}
            ]),
        );
        let preview = Preview::compute(&doc).unwrap();
        let round = preview.round("Series A").unwrap();
        assert_eq!(round.pre_round_shares, 8_000_000.0);
        assert_eq!(round.pre_money_valuation, 40_000_000.0);
        assert_eq!(round.price_per_share, 5.0);
        assert_eq!(round.shares_issued, 2_000_000.0);
        assert_eq!(preview.holding("Fund I").unwrap().ownership, 0.2);
        assert_eq!(preview.total_shares, 10_000_000.0);
    }

    #[test]
    fn pre_round_shares_chain_across_rounds() {
        let doc = doc(
            json!([
                {
                    "name": "Seed",
                    "date": "2021-01-01",
                    "calculation_type": "fixed_shares",
                    "price_per_share": 1.0
                },
                {
                    "name": "Series A",
                    "date": "2022-01-01",
                    "calculation_type": "valuation_based",
                    "pre_money_valuation": 40000000.0
                }
            ]),
            json!([
                {"holder": "Founder", "class": "Common", "initial_quantity": 8000000.0},
                {"holder": "Angel", "class": "Preferred", "round": "Seed", "initial_quantity": 2000000.0},
                {"holder": "Fund I", "class": "Preferred", "round": "Series A", "investment_amount": 10000000.0}
            ]),
        );
        let preview = Preview::compute(&doc).unwrap();
        assert_eq!(preview.founding_shares, 8_000_000.0);
        let series_a = preview.round("Series A").unwrap();
        assert_eq!(series_a.pre_round_shares, 10_000_000.0);
        assert_eq!(series_a.price_per_share, 4.0);
        assert_eq!(series_a.instruments[0].shares, 2_000_000.0);
        assert_eq!(series_a.post_money_valuation, 50_000_000.0);
    }

    #[test]
    fn negative_target_shares_are_reported() {
        let doc = doc(
            json!([{
                "name": "Top Up",
                "date": "2022-01-01",
                "calculation_type": "target_percentage"
            }]),
            json!([
                {"holder": "Founder", "class": "Common", "initial_quantity": 5000000.0},
                {"holder": "Angel", "class": "Common", "initial_quantity": 5000000.0},
                {"holder": "Angel", "class": "Common", "round": "Top Up", "target_percentage": 0.1}
            ]),
        );
        let err = Preview::compute(&doc).unwrap_err();
        match err {
            GenerationError::NegativeShares { round, holder, shares } => {
                assert_eq!(round, "Top Up");
                assert_eq!(holder, "Angel");
                assert!(shares < 0.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn report_serializes() {
        let doc = doc(json!([]), json!([
            {"holder": "Founder", "class": "Common", "initial_quantity": 100.0}
        ]));
        let preview = Preview::compute(&doc).unwrap();
        let value = serde_json::to_value(&preview).unwrap();
        assert_eq!(value["founding_shares"], json!(100.0));
        assert_eq!(value["holdings"][0]["ownership"], json!(1.0));
    }
}

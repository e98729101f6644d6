use crate::calc::{column_total, vars, ColumnDef, RoundValue, RoundValues, RowCell};
use crate::dates::excel_serial;
use crate::document::{
    CalculationType, ConvertibleTerms, Instrument, InterestType, Round, ValuationBasis,
    ValuationCapType,
};
use crate::formula::{Expr, OutputStyle};
use crate::GenerationError;

/// How a round turns instruments into shares. One variant per
/// [`CalculationType`]; valuation rounds carry their resolved basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    FixedShares,
    TargetPercentage,
    Valuation(ValuationBasis),
    Convertible(ConversionKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    Note,
    Safe,
}

/// An input a strategy cannot work without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Round(&'static str),
    /// At least one of two round fields.
    RoundEither(&'static str, &'static str),
    Instrument(&'static str),
}

const SHARES: ColumnDef = ColumnDef::new("shares", "Shares", OutputStyle::Shares);
const TARGET: ColumnDef = ColumnDef::new("target", "Target %", OutputStyle::Percent);
const CURRENT_SHARES: ColumnDef =
    ColumnDef::new("current_shares", "Current Shares", OutputStyle::Shares);
const INVESTMENT: ColumnDef = ColumnDef::new("investment", "Investment", OutputStyle::Currency);
const INTEREST: ColumnDef = ColumnDef::new("interest", "Interest", OutputStyle::Currency);
const OWNERSHIP: ColumnDef = ColumnDef::new("ownership", "Ownership %", OutputStyle::Percent);
const CONVERSION_AMOUNT: ColumnDef =
    ColumnDef::new("conversion_amount", "Conversion Amount", OutputStyle::Currency);
const DISCOUNT: ColumnDef = ColumnDef::new("discount", "Discount", OutputStyle::Percent);
const VALUATION_CAP: ColumnDef =
    ColumnDef::new("valuation_cap", "Valuation Cap", OutputStyle::Currency);
const CAP_BASIS: ColumnDef = ColumnDef::new("cap_basis", "Cap Basis", OutputStyle::Plain);
const DISCOUNTED_PRICE: ColumnDef =
    ColumnDef::new("discounted_price", "Discounted Price", OutputStyle::Price);
const CAP_PRICE: ColumnDef = ColumnDef::new("cap_price", "Cap Price", OutputStyle::Price);
const CONVERSION_PRICE: ColumnDef =
    ColumnDef::new("conversion_price", "Conversion Price", OutputStyle::Price);

fn v(name: &str) -> Expr {
    Expr::var(name)
}

impl Strategy {
    /// Pick the strategy for `round`. A valuation round uses its explicit
    /// basis, else pre-money when a pre-money valuation is given, else
    /// post-money.
    pub fn for_round(round: &Round) -> Self {
        match round.calculation_type {
            CalculationType::FixedShares => Strategy::FixedShares,
            CalculationType::TargetPercentage => Strategy::TargetPercentage,
            CalculationType::ValuationBased => {
                let basis = round.valuation_basis.unwrap_or_else(|| {
                    if round.pre_money_valuation.is_some() {
                        ValuationBasis::PreMoney
                    } else {
                        ValuationBasis::PostMoney
                    }
                });
                Strategy::Valuation(basis)
            }
            CalculationType::Convertible => Strategy::Convertible(ConversionKind::Note),
            CalculationType::Safe => Strategy::Convertible(ConversionKind::Safe),
        }
    }

    pub fn required_fields(&self) -> &'static [Requirement] {
        match self {
            Strategy::FixedShares => &[Requirement::Instrument("initial_quantity")],
            Strategy::TargetPercentage => &[Requirement::Instrument("target_percentage")],
            Strategy::Valuation(ValuationBasis::PreMoney) => &[
                Requirement::Round("pre_money_valuation"),
                Requirement::Instrument("investment_amount"),
            ],
            Strategy::Valuation(ValuationBasis::PostMoney) => &[
                Requirement::Round("post_money_valuation"),
                Requirement::Instrument("investment_amount"),
            ],
            Strategy::Convertible(_) => &[
                Requirement::RoundEither("price_per_share", "qualifying_round"),
                Requirement::Instrument("convertible"),
            ],
        }
    }

    /// Check the round (when `instrument` is `None`) or one of its
    /// instruments against the strategy's requirements and value ranges.
    pub fn validate(
        &self,
        round: &Round,
        instrument: Option<(&str, &Instrument)>,
    ) -> Result<(), GenerationError> {
        let round_name = round.name.as_str();
        match instrument {
            None => {
                for req in self.required_fields() {
                    match *req {
                        Requirement::Round(field) if !round_has(round, field) => {
                            return Err(GenerationError::missing(Some(round_name), None, field));
                        }
                        Requirement::RoundEither(a, b)
                            if !round_has(round, a) && !round_has(round, b) =>
                        {
                            return Err(GenerationError::missing(Some(round_name), None, a));
                        }
                        _ => {}
                    }
                }
                let money = [
                    ("pre_money_valuation", round.pre_money_valuation),
                    ("post_money_valuation", round.post_money_valuation),
                    ("price_per_share", round.price_per_share),
                ];
                for (field, value) in money {
                    if matches!(value, Some(x) if !x.is_finite() || x <= 0.0) {
                        return Err(GenerationError::invalid(
                            format!("round `{round_name}`"),
                            format!("{field} must be positive"),
                        ));
                    }
                }
                Ok(())
            }
            Some((key, inst)) => {
                for req in self.required_fields() {
                    if let Requirement::Instrument(field) = *req {
                        if !instrument_has(inst, field) {
                            return Err(GenerationError::missing(
                                Some(round_name),
                                Some(key),
                                field,
                            ));
                        }
                    }
                }
                let context = || format!("instrument `{key}` in round `{round_name}`");
                if let Some(t) = inst.target_percentage {
                    if !(0.0..1.0).contains(&t) {
                        return Err(GenerationError::invalid(
                            context(),
                            "target_percentage must be in [0, 1)",
                        ));
                    }
                }
                for (field, value) in [
                    ("investment_amount", inst.investment_amount),
                    ("accrued_interest", inst.accrued_interest),
                    ("initial_quantity", inst.initial_quantity),
                ] {
                    if matches!(value, Some(x) if !x.is_finite() || x < 0.0) {
                        return Err(GenerationError::invalid(
                            context(),
                            format!("{field} must not be negative"),
                        ));
                    }
                }
                if let (Strategy::Convertible(_), Some(terms)) = (self, &inst.convertible) {
                    validate_convertible(terms)
                        .map_err(|reason| GenerationError::invalid(context(), reason))?;
                }
                Ok(())
            }
        }
    }

    /// Strategy-specific columns of the round table, after ID, Holder and
    /// Class.
    pub fn columns(&self) -> Vec<ColumnDef> {
        match self {
            Strategy::FixedShares => vec![SHARES],
            Strategy::TargetPercentage => vec![TARGET, CURRENT_SHARES, SHARES],
            Strategy::Valuation(ValuationBasis::PreMoney) => vec![INVESTMENT, INTEREST, SHARES],
            Strategy::Valuation(ValuationBasis::PostMoney) => {
                vec![INVESTMENT, INTEREST, OWNERSHIP, SHARES]
            }
            Strategy::Convertible(_) => vec![
                INVESTMENT,
                INTEREST,
                CONVERSION_AMOUNT,
                DISCOUNT,
                VALUATION_CAP,
                CAP_BASIS,
                DISCOUNTED_PRICE,
                CAP_PRICE,
                CONVERSION_PRICE,
                SHARES,
            ],
        }
    }

    /// Cells for one instrument, aligned with [`Strategy::columns`].
    /// Assumes [`Strategy::validate`] passed for the instrument.
    pub fn row(
        &self,
        round: &Round,
        key: &str,
        instrument: &Instrument,
    ) -> Result<Vec<RowCell>, GenerationError> {
        let missing = |field| GenerationError::missing(Some(&round.name), Some(key), field);
        match self {
            Strategy::FixedShares => {
                let quantity = instrument
                    .initial_quantity
                    .ok_or_else(|| missing("initial_quantity"))?;
                Ok(vec![RowCell::Number(quantity)])
            }
            Strategy::TargetPercentage => {
                let target = instrument
                    .target_percentage
                    .ok_or_else(|| missing("target_percentage"))?;
                // ROUND(t*pre/(1-t) - current)
                let t = v(TARGET.key);
                let shares = Expr::round(
                    Expr::div(t.clone() * v(vars::PRE_SHARES), Expr::num(1.0) - t)
                        - v(CURRENT_SHARES.key),
                    0,
                );
                Ok(vec![
                    RowCell::Number(target),
                    RowCell::HolderSharesBeforeRound,
                    RowCell::Formula(shares),
                ])
            }
            Strategy::Valuation(basis) => {
                let investment = instrument
                    .investment_amount
                    .ok_or_else(|| missing("investment_amount"))?;
                let amount = v(INVESTMENT.key) + v(INTEREST.key);
                let mut cells = vec![
                    RowCell::Number(investment),
                    RowCell::Number(instrument.accrued_interest.unwrap_or(0.0)),
                ];
                match basis {
                    ValuationBasis::PreMoney => {
                        let shares = Expr::round(
                            Expr::div(
                                amount.clone() * v(vars::PRE_SHARES),
                                v(vars::PRE_MONEY) + amount,
                            ),
                            0,
                        );
                        cells.push(RowCell::Formula(shares));
                    }
                    ValuationBasis::PostMoney => {
                        let ownership = Expr::div(amount, v(vars::POST_MONEY));
                        let own = v(OWNERSHIP.key);
                        let shares = Expr::round(
                            Expr::div(v(vars::PRE_SHARES) * own.clone(), Expr::num(1.0) - own),
                            0,
                        );
                        cells.push(RowCell::Formula(ownership));
                        cells.push(RowCell::Formula(shares));
                    }
                }
                Ok(cells)
            }
            Strategy::Convertible(kind) => {
                let terms = instrument
                    .convertible
                    .as_ref()
                    .ok_or_else(|| missing("convertible"))?;
                convertible_row(*kind, round, key, instrument, terms)
            }
        }
    }

    /// Header values of the round section.
    pub fn round_values(&self, round: &Round) -> RoundValues {
        let literal_or_empty = |value: Option<f64>| match value {
            Some(x) => RoundValue::Literal(x),
            None => RoundValue::Empty,
        };
        let invested = || {
            Expr::sum(vec![v(&column_total(INVESTMENT.key))])
                + Expr::sum(vec![v(&column_total(INTEREST.key))])
        };
        let implied_pps = || RoundValue::Formula(Expr::div(v(vars::PRE_MONEY), v(vars::PRE_SHARES)));

        match self {
            Strategy::FixedShares | Strategy::TargetPercentage => RoundValues {
                pre_money: literal_or_empty(round.pre_money_valuation),
                post_money: literal_or_empty(round.post_money_valuation),
                pps: match (round.price_per_share, round.pre_money_valuation) {
                    (Some(pps), _) => RoundValue::Literal(pps),
                    (None, Some(_)) => implied_pps(),
                    (None, None) => RoundValue::Literal(0.0),
                },
            },
            Strategy::Valuation(ValuationBasis::PreMoney) => RoundValues {
                pre_money: literal_or_empty(round.pre_money_valuation),
                post_money: RoundValue::Formula(v(vars::PRE_MONEY) + invested()),
                pps: implied_pps(),
            },
            Strategy::Valuation(ValuationBasis::PostMoney) => RoundValues {
                pre_money: RoundValue::Formula(v(vars::POST_MONEY) - invested()),
                post_money: literal_or_empty(round.post_money_valuation),
                pps: implied_pps(),
            },
            Strategy::Convertible(_) => RoundValues {
                pre_money: literal_or_empty(round.pre_money_valuation),
                post_money: literal_or_empty(round.post_money_valuation),
                pps: match round.price_per_share {
                    Some(pps) => RoundValue::Literal(pps),
                    None => RoundValue::Formula(v(vars::QUALIFYING_PPS)),
                },
            },
        }
    }

    /// Whether the round table has an Investment column.
    pub fn has_investment(&self) -> bool {
        !matches!(self, Strategy::FixedShares | Strategy::TargetPercentage)
    }
}

fn convertible_row(
    kind: ConversionKind,
    round: &Round,
    key: &str,
    instrument: &Instrument,
    terms: &ConvertibleTerms,
) -> Result<Vec<RowCell>, GenerationError> {
    let interest = match kind {
        ConversionKind::Safe => RowCell::Number(0.0),
        ConversionKind::Note => match (instrument.accrued_interest, terms.interest_rate) {
            (Some(accrued), _) => RowCell::Number(accrued),
            (None, Some(rate)) => {
                let start = terms.interest_start_date.ok_or_else(|| {
                    GenerationError::missing(Some(&round.name), Some(key), "interest_start_date")
                })?;
                RowCell::Formula(interest_expr(terms.interest_type, rate, excel_serial(start)))
            }
            (None, None) => RowCell::Number(0.0),
        },
    };

    let pre = v(vars::PRE_SHARES);
    let cap_price = terms.valuation_cap.map(|_| {
        let cap = v(VALUATION_CAP.key);
        let numerator = match terms.valuation_cap_type {
            ValuationCapType::PreConversion => cap,
            ValuationCapType::PostConversionOwn => cap - v(CONVERSION_AMOUNT.key),
            ValuationCapType::PostConversionTotal => {
                cap - Expr::sum(vec![v(&column_total(CONVERSION_AMOUNT.key))])
            }
        };
        Expr::div(numerator, pre)
    });
    let discounted_price = terms
        .discount_rate
        .map(|_| v(vars::PPS) * (Expr::num(1.0) - v(DISCOUNT.key)));
    let conversion_price = match (&discounted_price, &cap_price) {
        (Some(_), Some(_)) => Expr::min(vec![v(DISCOUNTED_PRICE.key), v(CAP_PRICE.key)]),
        (Some(_), None) => v(DISCOUNTED_PRICE.key),
        (None, Some(_)) => v(CAP_PRICE.key),
        (None, None) => v(vars::PPS),
    };
    let shares = Expr::round(
        Expr::div(v(CONVERSION_AMOUNT.key), v(CONVERSION_PRICE.key)),
        0,
    );

    let optional_number = |value: Option<f64>| value.map_or(RowCell::Empty, RowCell::Number);
    let optional_formula = |expr: Option<Expr>| expr.map_or(RowCell::Empty, RowCell::Formula);

    Ok(vec![
        RowCell::Number(terms.investment_amount),
        interest,
        RowCell::Formula(v(INVESTMENT.key) + v(INTEREST.key)),
        optional_number(terms.discount_rate),
        optional_number(terms.valuation_cap),
        match terms.valuation_cap {
            Some(_) => RowCell::Text(terms.valuation_cap_type.label().to_string()),
            None => RowCell::Empty,
        },
        optional_formula(discounted_price),
        optional_formula(cap_price),
        RowCell::Formula(conversion_price),
        RowCell::Formula(shares),
    ])
}

/// Interest accrued between `start_serial` and the round date.
fn interest_expr(interest_type: InterestType, rate: f64, start_serial: f64) -> Expr {
    let days = Expr::max(vec![Expr::num(0.0), v(vars::ROUND_DATE) - start_serial]);
    let years = Expr::div(days, 365.0);
    match interest_type {
        InterestType::Simple => v(INVESTMENT.key) * rate * years,
        InterestType::Compound => {
            v(INVESTMENT.key) * ((Expr::num(1.0) + rate).pow(years) - 1.0)
        }
    }
}

fn validate_convertible(terms: &ConvertibleTerms) -> Result<(), String> {
    if !terms.investment_amount.is_finite() || terms.investment_amount < 0.0 {
        return Err("convertible investment_amount must not be negative".to_string());
    }
    if let Some(d) = terms.discount_rate {
        if !(0.0..1.0).contains(&d) {
            return Err("discount_rate must be in [0, 1)".to_string());
        }
    }
    if let Some(cap) = terms.valuation_cap {
        if !cap.is_finite() || cap <= 0.0 {
            return Err("valuation_cap must be positive".to_string());
        }
    }
    if let Some(rate) = terms.interest_rate {
        if !rate.is_finite() || rate < 0.0 {
            return Err("interest_rate must not be negative".to_string());
        }
    }
    Ok(())
}

fn round_has(round: &Round, field: &str) -> bool {
    match field {
        "pre_money_valuation" => round.pre_money_valuation.is_some(),
        "post_money_valuation" => round.post_money_valuation.is_some(),
        "price_per_share" => round.price_per_share.is_some(),
        "qualifying_round" => round.qualifying_round.is_some(),
        _ => false,
    }
}

fn instrument_has(instrument: &Instrument, field: &str) -> bool {
    match field {
        "initial_quantity" => instrument.initial_quantity.is_some(),
        "target_percentage" => instrument.target_percentage.is_some(),
        "investment_amount" => instrument.investment_amount.is_some(),
        "convertible" => instrument.convertible.is_some(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::document::CalculationType;

    fn round(calculation_type: CalculationType) -> Round {
        Round {
            name: "Series A".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            calculation_type,
            valuation_basis: None,
            pre_money_valuation: None,
            post_money_valuation: None,
            price_per_share: None,
            qualifying_round: None,
            pro_rata: Vec::new(),
        }
    }

    /// Evaluate a row column by column, the way the workbook fills it in.
    fn eval_row(
        strategy: &Strategy,
        cells: &[RowCell],
        round_env: &[(&str, f64)],
    ) -> BTreeMap<String, f64> {
        let mut env: BTreeMap<String, f64> =
            round_env.iter().map(|(k, x)| (k.to_string(), *x)).collect();
        for (col, cell) in strategy.columns().iter().zip(cells) {
            let value = match cell {
                RowCell::Number(x) => *x,
                RowCell::Formula(e) => e.eval(&env).unwrap(),
                RowCell::Empty | RowCell::Text(_) => 0.0,
                RowCell::HolderSharesBeforeRound => env["current_shares"],
            };
            env.insert(col.key.to_string(), value);
            env.insert(column_total(col.key), value);
        }
        env
    }

    #[test]
    fn basis_inference() {
        let mut r = round(CalculationType::ValuationBased);
        assert_eq!(
            Strategy::for_round(&r),
            Strategy::Valuation(ValuationBasis::PostMoney)
        );
        r.pre_money_valuation = Some(1.0);
        assert_eq!(
            Strategy::for_round(&r),
            Strategy::Valuation(ValuationBasis::PreMoney)
        );
        r.valuation_basis = Some(ValuationBasis::PostMoney);
        assert_eq!(
            Strategy::for_round(&r),
            Strategy::Valuation(ValuationBasis::PostMoney)
        );
    }

    #[test]
    fn valuation_round_without_money_is_missing_input() {
        let r = round(CalculationType::ValuationBased);
        let err = Strategy::for_round(&r).validate(&r, None).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::MissingCalculationInput { ref round, field: "post_money_valuation", .. }
                if round.as_deref() == Some("Series A")
        ));
    }

    #[test]
    fn fixed_shares_is_the_literal_quantity() {
        let r = round(CalculationType::FixedShares);
        let inst = Instrument {
            initial_quantity: Some(123_456.0),
            ..Instrument::default()
        };
        let cells = Strategy::FixedShares.row(&r, "#1", &inst).unwrap();
        assert_eq!(cells, vec![RowCell::Number(123_456.0)]);
    }

    #[test]
    fn pre_money_shares() {
        let mut r = round(CalculationType::ValuationBased);
        r.pre_money_valuation = Some(40_000_000.0);
        let strategy = Strategy::for_round(&r);
        let inst = Instrument {
            investment_amount: Some(10_000_000.0),
            ..Instrument::default()
        };
        let cells = strategy.row(&r, "#1", &inst).unwrap();
        let env = eval_row(
            &strategy,
            &cells,
            &[("pre_shares", 10_000_000.0), ("pre_money", 40_000_000.0)],
        );
        assert_eq!(env["shares"], 2_000_000.0);
    }

    #[test]
    fn post_money_shares() {
        let mut r = round(CalculationType::ValuationBased);
        r.post_money_valuation = Some(50_000_000.0);
        let strategy = Strategy::for_round(&r);
        let inst = Instrument {
            investment_amount: Some(10_000_000.0),
            ..Instrument::default()
        };
        let cells = strategy.row(&r, "#1", &inst).unwrap();
        let env = eval_row(
            &strategy,
            &cells,
            &[("pre_shares", 10_000_000.0), ("post_money", 50_000_000.0)],
        );
        assert_eq!(env["ownership"], 0.2);
        assert_eq!(env["shares"], 2_500_000.0);
    }

    #[test]
    fn target_percentage_shares() {
        let r = round(CalculationType::TargetPercentage);
        let inst = Instrument {
            target_percentage: Some(0.2),
            ..Instrument::default()
        };
        let strategy = Strategy::TargetPercentage;
        let cells = strategy.row(&r, "#1", &inst).unwrap();
        let env = eval_row(
            &strategy,
            &cells,
            &[("pre_shares", 8_000_000.0), ("current_shares", 500_000.0)],
        );
        assert_eq!(env["shares"], 1_500_000.0);
    }

    #[test]
    fn convertible_conversion_prices() {
        let mut r = round(CalculationType::Safe);
        r.price_per_share = Some(2.0);
        let inst = Instrument {
            convertible: Some(ConvertibleTerms {
                investment_amount: 500_000.0,
                discount_rate: Some(0.2),
                valuation_cap: Some(5_000_000.0),
                valuation_cap_type: ValuationCapType::PreConversion,
                interest_rate: None,
                interest_start_date: None,
                interest_type: InterestType::Simple,
            }),
            ..Instrument::default()
        };
        let strategy = Strategy::for_round(&r);
        let cells = strategy.row(&r, "#1", &inst).unwrap();
        let env = eval_row(&strategy, &cells, &[("pre_shares", 10_000_000.0), ("pps", 2.0)]);
        assert_eq!(env["discounted_price"], 1.6);
        assert_eq!(env["cap_price"], 0.5);
        assert_eq!(env["conversion_price"], 0.5);
        assert_eq!(env["shares"], 1_000_000.0);
    }

    #[test]
    fn post_conversion_caps_subtract_conversion_amounts() {
        let mut r = round(CalculationType::Safe);
        r.price_per_share = Some(2.0);
        let inst = Instrument {
            convertible: Some(ConvertibleTerms {
                investment_amount: 1_000_000.0,
                discount_rate: None,
                valuation_cap: Some(10_000_000.0),
                valuation_cap_type: ValuationCapType::PostConversionOwn,
                interest_rate: None,
                interest_start_date: None,
                interest_type: InterestType::Simple,
            }),
            ..Instrument::default()
        };
        let strategy = Strategy::for_round(&r);
        let cells = strategy.row(&r, "#1", &inst).unwrap();
        let env = eval_row(&strategy, &cells, &[("pre_shares", 9_000_000.0), ("pps", 2.0)]);
        // The holder ends with exactly amount / cap of the post-conversion total.
        assert_eq!(env["cap_price"], 1.0);
        assert_eq!(env["shares"], 1_000_000.0);
        assert_eq!(env["shares"] / (9_000_000.0 + env["shares"]), 0.1);
    }

    #[test]
    fn note_interest_accrues_to_the_round_date() {
        let mut r = round(CalculationType::Convertible);
        r.price_per_share = Some(1.0);
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let inst = Instrument {
            convertible: Some(ConvertibleTerms {
                investment_amount: 100_000.0,
                discount_rate: None,
                valuation_cap: None,
                valuation_cap_type: ValuationCapType::PreConversion,
                interest_rate: Some(0.1),
                interest_start_date: Some(start),
                interest_type: InterestType::Simple,
            }),
            ..Instrument::default()
        };
        let strategy = Strategy::for_round(&r);
        let cells = strategy.row(&r, "#1", &inst).unwrap();
        let env = eval_row(
            &strategy,
            &cells,
            &[
                ("pre_shares", 1_000_000.0),
                ("pps", 1.0),
                ("round_date", excel_serial(start) + 365.0),
            ],
        );
        assert!((env["interest"] - 10_000.0).abs() < 1e-6);
        assert_eq!(env["shares"], 110_000.0);
    }

    #[test]
    fn note_interest_requires_a_start_date() {
        let mut r = round(CalculationType::Convertible);
        r.price_per_share = Some(1.0);
        let inst = Instrument {
            convertible: Some(ConvertibleTerms {
                investment_amount: 100_000.0,
                discount_rate: None,
                valuation_cap: None,
                valuation_cap_type: ValuationCapType::PreConversion,
                interest_rate: Some(0.1),
                interest_start_date: None,
                interest_type: InterestType::Compound,
            }),
            ..Instrument::default()
        };
        let err = Strategy::for_round(&r).row(&r, "N-1", &inst).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::MissingCalculationInput { field: "interest_start_date", .. }
        ));
    }

    #[test]
    fn rows_align_with_columns() {
        let mut r = round(CalculationType::Safe);
        r.qualifying_round = Some("Seed".to_string());
        let inst = Instrument {
            convertible: Some(ConvertibleTerms {
                investment_amount: 1.0,
                discount_rate: None,
                valuation_cap: None,
                valuation_cap_type: ValuationCapType::PreConversion,
                interest_rate: None,
                interest_start_date: None,
                interest_type: InterestType::Simple,
            }),
            ..Instrument::default()
        };
        let strategy = Strategy::for_round(&r);
        assert_eq!(
            strategy.row(&r, "#1", &inst).unwrap().len(),
            strategy.columns().len()
        );
        assert_eq!(
            strategy.round_values(&r).pps,
            RoundValue::Formula(Expr::var(vars::QUALIFYING_PPS))
        );
    }
}

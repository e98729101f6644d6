//! Input checks run before anything is laid out.
//!
//! The document is assumed schema-valid; these checks cover what a schema
//! cannot express: per-strategy required inputs, cross-round references and
//! dangling names. Every failure names the round, instrument or holder.

use std::collections::BTreeSet;

use log::warn;

use crate::calc::{pro_rata, ConversionKind, Strategy};
use crate::document::{AntiDilution, CapTable, ParticipationType, ProRataExercise};
use crate::GenerationError;

/// Check `doc` and pick one strategy per round, in round order.
pub(crate) fn check(doc: &CapTable) -> Result<Vec<Strategy>, GenerationError> {
    check_references(doc)?;

    let mut seen = BTreeSet::new();
    for round in &doc.rounds {
        if !seen.insert(round.name.as_str()) {
            return Err(GenerationError::invalid(
                format!("round `{}`", round.name),
                "round names must be unique",
            ));
        }
    }
    for pair in doc.rounds.windows(2) {
        if pair[1].date < pair[0].date {
            warn!(
                "round `{}` is dated before `{}`; rounds are sequenced in document order",
                pair[1].name, pair[0].name
            );
        }
    }

    let mut strategies = Vec::with_capacity(doc.rounds.len());
    for (index, round) in doc.rounds.iter().enumerate() {
        let strategy = Strategy::for_round(round);
        strategy.validate(round, None)?;

        if let Some(qualifying) = &round.qualifying_round {
            let position = doc.round_index(qualifying).ok_or_else(|| {
                GenerationError::unknown("round", qualifying, format!("round `{}`", round.name))
            })?;
            if position >= index {
                return Err(GenerationError::CircularRoundReference {
                    round: round.name.clone(),
                    qualifying_round: qualifying.clone(),
                });
            }
            if !doc.rounds[position].is_priced() {
                return Err(GenerationError::invalid(
                    format!("round `{}`", round.name),
                    format!("qualifying round `{qualifying}` sets no price per share"),
                ));
            }
        }

        for (key, instrument) in doc.round_instruments(&round.name) {
            strategy.validate(round, Some((&key, instrument)))?;
            if strategy == Strategy::Convertible(ConversionKind::Safe) {
                let has_interest = instrument.accrued_interest.is_some()
                    || instrument
                        .convertible
                        .as_ref()
                        .is_some_and(|c| c.interest_rate.is_some());
                if has_interest {
                    warn!("SAFE `{key}` in round `{}` carries interest fields; SAFEs accrue no interest", round.name);
                }
            }
        }

        for participation in &round.pro_rata {
            pro_rata::validate(&round.name, participation)?;
            if participation.exercise == ProRataExercise::Partial
                && participation.partial_amount.is_some()
                && !round.has_post_money()
            {
                return Err(GenerationError::missing(
                    Some(&round.name),
                    Some(&participation.holder),
                    "post_money_valuation",
                ));
            }
        }
        strategies.push(strategy);
    }

    for (index, instrument) in doc.instruments.iter().enumerate() {
        let key = instrument.key(index);
        let class_type = doc
            .class(&instrument.class)
            .map(|c| c.class_type)
            .ok_or_else(|| GenerationError::unknown("class", &instrument.class, format!("instrument `{key}`")))?;
        if class_type.is_dilutive_security() && instrument.strike_price.is_none() {
            return Err(GenerationError::missing(
                instrument.round.as_deref(),
                Some(&key),
                "strike_price",
            ));
        }
        if instrument.round.is_none() {
            match instrument.initial_quantity {
                None => return Err(GenerationError::missing(None, Some(&key), "initial_quantity")),
                Some(q) if !q.is_finite() || q < 0.0 => {
                    return Err(GenerationError::invalid(
                        format!("instrument `{key}`"),
                        "initial_quantity must not be negative",
                    ))
                }
                Some(_) => {}
            }
        }
        if matches!(instrument.strike_price, Some(p) if !p.is_finite() || p < 0.0) {
            return Err(GenerationError::invalid(
                format!("instrument `{key}`"),
                "strike_price must not be negative",
            ));
        }
    }

    for terms in &doc.terms {
        if terms.anti_dilution != AntiDilution::None {
            warn!(
                "terms `{}` record {} anti-dilution; no adjustment is modelled",
                terms.name,
                terms.anti_dilution.label()
            );
        }
        if !terms.liquidation_multiple.is_finite() || terms.liquidation_multiple < 0.0 {
            return Err(GenerationError::invalid(
                format!("terms `{}`", terms.name),
                "liquidation_multiple must not be negative",
            ));
        }
        if terms.participation_type == ParticipationType::CappedParticipating
            && terms.participation_cap.is_none()
        {
            return Err(GenerationError::invalid(
                format!("terms `{}`", terms.name),
                "capped participation needs a participation_cap",
            ));
        }
    }

    for scenario in &doc.waterfall_scenarios {
        if !scenario.exit_value.is_finite() || scenario.exit_value < 0.0 {
            return Err(GenerationError::invalid(
                format!("waterfall scenario `{}`", scenario.name),
                "exit_value must not be negative",
            ));
        }
    }

    Ok(strategies)
}

/// Every holder, class, terms package and round a document names must
/// exist.
fn check_references(doc: &CapTable) -> Result<(), GenerationError> {
    for class in &doc.classes {
        if let Some(terms) = &class.terms {
            if doc.terms_package(terms).is_none() {
                return Err(GenerationError::unknown(
                    "terms",
                    terms,
                    format!("class `{}`", class.name),
                ));
            }
        }
    }
    for (index, instrument) in doc.instruments.iter().enumerate() {
        let referenced_by = || format!("instrument `{}`", instrument.key(index));
        if doc.holder(&instrument.holder).is_none() {
            return Err(GenerationError::unknown("holder", &instrument.holder, referenced_by()));
        }
        if doc.class(&instrument.class).is_none() {
            return Err(GenerationError::unknown("class", &instrument.class, referenced_by()));
        }
        if let Some(round) = &instrument.round {
            if doc.round_index(round).is_none() {
                return Err(GenerationError::unknown("round", round, referenced_by()));
            }
        }
    }
    for round in &doc.rounds {
        for participation in &round.pro_rata {
            let referenced_by = || format!("pro-rata participation in round `{}`", round.name);
            if doc.holder(&participation.holder).is_none() {
                return Err(GenerationError::unknown(
                    "holder",
                    &participation.holder,
                    referenced_by(),
                ));
            }
            if let Some(class) = &participation.class {
                if doc.class(class).is_none() {
                    return Err(GenerationError::unknown("class", class, referenced_by()));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(rounds: serde_json::Value, instruments: serde_json::Value) -> CapTable {
        serde_json::from_value(json!({
            "company": {"name": "Acme", "incorporation_date": "2020-01-01"},
            "holders": [
                {"name": "Founder", "type": "founder"},
                {"name": "Fund I", "type": "investor"}
            ],
            "classes": [
                {"name": "Common", "type": "common"},
                {"name": "Series A", "type": "preferred"},
                {"name": "Note", "type": "convertible_note"}
            ],
            "terms": [],
            "instruments": instruments,
            "rounds": rounds
        }))
        .unwrap()
    }

    #[test]
    fn valuation_round_needs_a_valuation() {
        let doc = doc(
            json!([{"name": "Series A", "date": "2022-01-01", "calculation_type": "valuation_based"}]),
            json!([]),
        );
        let err = check(&doc).unwrap_err();
        assert!(
            matches!(
                &err,
                GenerationError::MissingCalculationInput { round: Some(r), field: "post_money_valuation", .. }
                    if r == "Series A"
            ),
            "{err:?}"
        );
    }

    #[test]
    fn qualifying_round_must_come_first() {
        let doc = doc(
            json!([
                {"name": "Bridge", "date": "2021-01-01", "calculation_type": "convertible",
                 "qualifying_round": "Series A"},
                {"name": "Series A", "date": "2022-01-01", "calculation_type": "valuation_based",
                 "pre_money_valuation": 40000000.0}
            ]),
            json!([]),
        );
        assert!(matches!(
            check(&doc).unwrap_err(),
            GenerationError::CircularRoundReference { .. }
        ));
    }

    #[test]
    fn dangling_names_are_reported() {
        let doc = doc(
            json!([]),
            json!([{"holder": "Nobody", "class": "Common", "initial_quantity": 1.0}]),
        );
        assert!(matches!(
            check(&doc).unwrap_err(),
            GenerationError::UnknownEntity { kind: "holder", .. }
        ));
    }

    #[test]
    fn founding_instruments_need_a_quantity() {
        let doc = doc(json!([]), json!([{"id": "F-1", "holder": "Founder", "class": "Common"}]));
        assert!(matches!(
            check(&doc).unwrap_err(),
            GenerationError::MissingCalculationInput { field: "initial_quantity", .. }
        ));
    }

    #[test]
    fn valid_document_yields_one_strategy_per_round() {
        let doc = doc(
            json!([{"name": "Series A", "date": "2022-01-01", "calculation_type": "valuation_based",
                    "pre_money_valuation": 40000000.0}]),
            json!([
                {"holder": "Founder", "class": "Common", "initial_quantity": 10000000.0},
                {"holder": "Fund I", "class": "Series A", "round": "Series A",
                 "investment_amount": 10000000.0}
            ]),
        );
        let strategies = check(&doc).unwrap();
        assert_eq!(strategies, vec![Strategy::Valuation(crate::document::ValuationBasis::PreMoney)]);
    }
}

//! Liquidation waterfall.
//!
//! Preference classes are paid in seniority order, each from what the more
//! senior classes left over. Whatever remains is shared by the classes
//! without terms in proportion to fully diluted ownership.

use std::collections::BTreeMap;

use crate::document::{CapTable, ParticipationType, SecurityClass, TermsPackage};
use crate::formula::{EvalError, Expr};
use crate::GenerationError;

/// Seniority convention: rank 1 is paid before rank 2.
pub const LOWER_RANK_IS_MORE_SENIOR: bool = true;

pub const EXIT_VALUE: &str = "exit_value";
pub const SHARES: &str = "shares";
pub const INVESTMENT: &str = "investment";
pub const ORIGINAL_ISSUE_PRICE: &str = "original_issue_price";
pub const LIQUIDATION_MULTIPLE: &str = "liquidation_multiple";
pub const PARTICIPATION_CAP: &str = "participation_cap";
pub const OWNERSHIP: &str = "ownership";
pub const LIQUIDATION_PREFERENCE: &str = "liquidation_preference";
pub const REMAINING_BEFORE: &str = "remaining_before";
pub const PAYOUT: &str = "payout";
pub const RESIDUAL: &str = "residual";
pub const SHARE_OF_POOL: &str = "share_of_pool";
pub const TOTAL_OWNERSHIP: &str = "total_ownership";

#[derive(Debug, Clone, Copy)]
pub struct PreferenceClass<'a> {
    pub class: &'a SecurityClass,
    pub terms: &'a TermsPackage,
}

/// Classes with terms, most senior first. Equal ranks keep document order.
pub fn preference_stack(doc: &CapTable) -> Result<Vec<PreferenceClass<'_>>, GenerationError> {
    let mut stack = Vec::new();
    for class in &doc.classes {
        let Some(terms_name) = &class.terms else {
            continue;
        };
        let terms = doc.terms_package(terms_name).ok_or_else(|| {
            GenerationError::unknown("terms", terms_name, format!("class `{}`", class.name))
        })?;
        stack.push(PreferenceClass { class, terms });
    }
    stack.sort_by(|a, b| {
        let order = a.terms.seniority_rank.cmp(&b.terms.seniority_rank);
        if LOWER_RANK_IS_MORE_SENIOR {
            order
        } else {
            order.reverse()
        }
    });
    Ok(stack)
}

/// Classes without terms; they share the residual.
pub fn common_classes(doc: &CapTable) -> Vec<&SecurityClass> {
    doc.classes.iter().filter(|c| c.terms.is_none()).collect()
}

pub fn original_issue_price() -> Expr {
    Expr::div(Expr::var(INVESTMENT), Expr::var(SHARES))
}

pub fn liquidation_preference() -> Expr {
    Expr::var(SHARES) * Expr::var(ORIGINAL_ISSUE_PRICE) * Expr::var(LIQUIDATION_MULTIPLE)
}

/// Payout of one preference class, never more than what is left.
pub fn payout(participation: ParticipationType) -> Expr {
    let rem = || Expr::var(REMAINING_BEFORE);
    let lp = || Expr::var(LIQUIDATION_PREFERENCE);
    let own = || Expr::var(OWNERSHIP);
    match participation {
        ParticipationType::NonParticipating => Expr::min(vec![
            rem(),
            Expr::max(vec![lp(), Expr::var(EXIT_VALUE) * own()]),
        ]),
        ParticipationType::Participating => Expr::min(vec![rem(), lp() + own() * rem()]),
        ParticipationType::CappedParticipating => Expr::min(vec![
            rem(),
            lp() + own() * rem(),
            Expr::var(PARTICIPATION_CAP) * lp(),
        ]),
    }
}

pub fn remaining_after() -> Expr {
    Expr::var(REMAINING_BEFORE) - Expr::var(PAYOUT)
}

pub fn share_of_pool() -> Expr {
    Expr::div(
        Expr::var(OWNERSHIP),
        Expr::sum(vec![Expr::var(TOTAL_OWNERSHIP)]),
    )
}

pub fn common_payout() -> Expr {
    Expr::var(RESIDUAL) * Expr::var(SHARE_OF_POOL)
}

/// Inputs of one preference class for a numeric run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreferenceInput {
    pub participation: ParticipationType,
    pub shares: f64,
    pub investment: f64,
    pub liquidation_multiple: f64,
    pub participation_cap: f64,
    pub ownership: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub preference: Vec<f64>,
    pub common: Vec<f64>,
    pub residual: f64,
    pub unallocated: f64,
}

/// Distribute `exit_value` through the same expressions the Waterfall sheet
/// renders. `common_ownership` holds the fully diluted ownership of each
/// class without terms.
pub fn distribute(
    exit_value: f64,
    preferences: &[PreferenceInput],
    common_ownership: &[f64],
) -> Result<Distribution, EvalError> {
    let mut remaining = exit_value;
    let mut preference = Vec::with_capacity(preferences.len());
    for input in preferences {
        let mut env: BTreeMap<String, f64> = BTreeMap::new();
        env.insert(EXIT_VALUE.to_string(), exit_value);
        env.insert(SHARES.to_string(), input.shares);
        env.insert(INVESTMENT.to_string(), input.investment);
        env.insert(LIQUIDATION_MULTIPLE.to_string(), input.liquidation_multiple);
        env.insert(PARTICIPATION_CAP.to_string(), input.participation_cap);
        env.insert(OWNERSHIP.to_string(), input.ownership);
        env.insert(REMAINING_BEFORE.to_string(), remaining);

        let oip = original_issue_price().eval(&env)?;
        env.insert(ORIGINAL_ISSUE_PRICE.to_string(), oip);
        let lp = liquidation_preference().eval(&env)?;
        env.insert(LIQUIDATION_PREFERENCE.to_string(), lp);
        let paid = payout(input.participation).eval(&env)?;
        env.insert(PAYOUT.to_string(), paid);
        remaining = remaining_after().eval(&env)?;
        preference.push(paid);
    }

    let residual = remaining;
    let total_ownership: f64 = common_ownership.iter().sum();
    let mut common = Vec::with_capacity(common_ownership.len());
    for ownership in common_ownership {
        let mut env: BTreeMap<String, f64> = BTreeMap::new();
        env.insert(OWNERSHIP.to_string(), *ownership);
        env.insert(TOTAL_OWNERSHIP.to_string(), total_ownership);
        env.insert(RESIDUAL.to_string(), residual);
        let share = share_of_pool().eval(&env)?;
        env.insert(SHARE_OF_POOL.to_string(), share);
        common.push(common_payout().eval(&env)?);
    }

    let distributed: f64 = preference.iter().chain(common.iter()).sum();
    Ok(Distribution {
        preference,
        common,
        residual,
        unallocated: exit_value - distributed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{AntiDilution, ClassType, Company};
    use chrono::NaiveDate;

    fn non_participating(shares: f64, investment: f64, ownership: f64) -> PreferenceInput {
        PreferenceInput {
            participation: ParticipationType::NonParticipating,
            shares,
            investment,
            liquidation_multiple: 1.0,
            participation_cap: 0.0,
            ownership,
        }
    }

    #[test]
    fn one_x_non_participating_takes_its_preference() {
        let pref = non_participating(2_000_000.0, 2_000_000.0, 0.2);
        let out = distribute(5_000_000.0, &[pref], &[0.8]).unwrap();
        assert_eq!(out.preference, vec![2_000_000.0]);
        assert_eq!(out.common, vec![3_000_000.0]);
        assert_eq!(out.unallocated, 0.0);
    }

    #[test]
    fn non_participating_converts_when_better() {
        let pref = non_participating(2_000_000.0, 2_000_000.0, 0.2);
        let out = distribute(50_000_000.0, &[pref], &[0.8]).unwrap();
        assert_eq!(out.preference, vec![10_000_000.0]);
        assert_eq!(out.common, vec![40_000_000.0]);
    }

    #[test]
    fn payouts_never_exceed_remaining_proceeds() {
        let senior = non_participating(1_000_000.0, 4_000_000.0, 0.1);
        let junior = non_participating(1_000_000.0, 4_000_000.0, 0.1);
        let out = distribute(5_000_000.0, &[senior, junior], &[0.8]).unwrap();
        assert_eq!(out.preference, vec![4_000_000.0, 1_000_000.0]);
        assert_eq!(out.residual, 0.0);
        assert_eq!(out.common, vec![0.0]);
    }

    #[test]
    fn capped_participation_stops_at_the_cap() {
        let pref = PreferenceInput {
            participation: ParticipationType::CappedParticipating,
            shares: 1_000_000.0,
            investment: 1_000_000.0,
            liquidation_multiple: 1.0,
            participation_cap: 2.0,
            ownership: 0.5,
        };
        let out = distribute(10_000_000.0, &[pref], &[0.5]).unwrap();
        assert_eq!(out.preference, vec![2_000_000.0]);
        assert_eq!(out.common, vec![8_000_000.0]);
    }

    fn class(name: &str, terms: Option<&str>) -> SecurityClass {
        SecurityClass {
            name: name.to_string(),
            class_type: ClassType::Preferred,
            terms: terms.map(str::to_string),
            conversion_ratio: 1.0,
        }
    }

    fn terms(name: &str, rank: i64) -> TermsPackage {
        TermsPackage {
            name: name.to_string(),
            liquidation_multiple: 1.0,
            participation_type: ParticipationType::NonParticipating,
            participation_cap: None,
            seniority_rank: rank,
            anti_dilution: AntiDilution::None,
        }
    }

    #[test]
    fn rank_one_is_paid_before_rank_two() {
        let doc = CapTable {
            company: Company {
                name: "Acme".to_string(),
                incorporation_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                evaluation_date: None,
                current_price_per_share: None,
            },
            holders: Vec::new(),
            classes: vec![
                class("Series A", Some("A Terms")),
                class("Common", None),
                class("Series B", Some("B Terms")),
                class("Series B-2", Some("B Terms")),
            ],
            terms: vec![terms("A Terms", 2), terms("B Terms", 1)],
            instruments: Vec::new(),
            rounds: Vec::new(),
            waterfall_scenarios: Vec::new(),
        };
        let order: Vec<&str> = preference_stack(&doc)
            .unwrap()
            .iter()
            .map(|p| p.class.name.as_str())
            .collect();
        assert_eq!(order, vec!["Series B", "Series B-2", "Series A"]);
        let commons: Vec<&str> = common_classes(&doc).iter().map(|c| c.name.as_str()).collect();
        assert_eq!(commons, vec!["Common"]);
    }

    #[test]
    fn unknown_terms_are_reported() {
        let doc = CapTable {
            company: Company {
                name: "Acme".to_string(),
                incorporation_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                evaluation_date: None,
                current_price_per_share: None,
            },
            holders: Vec::new(),
            classes: vec![class("Series A", Some("Missing"))],
            terms: Vec::new(),
            instruments: Vec::new(),
            rounds: Vec::new(),
            waterfall_scenarios: Vec::new(),
        };
        assert!(matches!(
            preference_stack(&doc).unwrap_err(),
            GenerationError::UnknownEntity { kind: "terms", .. }
        ));
    }
}

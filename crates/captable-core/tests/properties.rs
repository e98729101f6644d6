use captable_core::calc::tsm;
use captable_core::calc::vesting::fraction_at;
use captable_core::calc::waterfall::{distribute, PreferenceInput};
use captable_core::{generate_to_vec, CapTable, GenerateOptions, ParticipationType, Preview};
use proptest::prelude::*;
use serde_json::json;

/// One priced round: (pre-money, investment, post-money basis?).
fn round_strategy() -> impl Strategy<Value = (f64, f64, bool)> {
    (1_000_000u32..500_000_000, 50_000u32..50_000_000, any::<bool>())
        .prop_map(|(pre, inv, post)| (f64::from(pre), f64::from(inv), post))
}

fn priced_rounds(founding: f64, rounds: &[(f64, f64, bool)]) -> CapTable {
    let mut instruments = vec![json!({
        "holder": "Founder",
        "class": "Common",
        "initial_quantity": founding
    })];
    let mut round_docs = Vec::new();
    for (idx, (pre, investment, post_basis)) in rounds.iter().enumerate() {
        let name = format!("Round {}", idx + 1);
        let mut round = json!({
            "name": name,
            "date": format!("{}-01-01", 2020 + idx),
            "calculation_type": "valuation_based"
        });
        if *post_basis {
            round["valuation_basis"] = json!("post_money");
            round["post_money_valuation"] = json!(pre + investment);
        } else {
            round["valuation_basis"] = json!("pre_money");
            round["pre_money_valuation"] = json!(pre);
        }
        round_docs.push(round);
        instruments.push(json!({
            "holder": if idx % 2 == 0 { "Fund I" } else { "Fund II" },
            "class": "Preferred",
            "round": name,
            "investment_amount": investment
        }));
    }
    serde_json::from_value(json!({
        "company": {"name": "Prop Co", "incorporation_date": "2019-01-01"},
        "holders": [
            {"name": "Founder", "type": "founder"},
            {"name": "Fund I", "type": "investor"},
            {"name": "Fund II", "type": "investor"}
        ],
        "classes": [
            {"name": "Common", "type": "common"},
            {"name": "Preferred", "type": "preferred"}
        ],
        "instruments": instruments,
        "rounds": round_docs
    }))
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 0,
        .. ProptestConfig::default()
    })]

    #[test]
    fn priced_rounds_chain_and_never_go_negative(
        founding in 1_000_000u32..50_000_000,
        rounds in proptest::collection::vec(round_strategy(), 1..4),
    ) {
        let doc = priced_rounds(f64::from(founding), &rounds);
        let preview = Preview::compute(&doc).unwrap();

        let mut expected_pre = f64::from(founding);
        for round in &preview.rounds {
            prop_assert_eq!(round.pre_round_shares, expected_pre);
            prop_assert!(round.shares_issued >= 0.0);
            prop_assert_eq!(round.shares_issued.fract(), 0.0);
            expected_pre = round.pre_round_shares + round.shares_issued;
        }
        let tolerance = 1e-9 * expected_pre.max(1.0);
        prop_assert!((preview.total_shares - expected_pre).abs() <= tolerance);
    }

    #[test]
    fn waterfall_never_distributes_more_than_the_exit(
        exit in 0u32..1_000_000_000,
        classes in proptest::collection::vec(
            (0u8..3, 1u32..10_000_000, 0u32..50_000_000, 1u8..4, 0.0f64..0.5),
            0..4,
        ),
        common in proptest::collection::vec(0.0f64..1.0, 0..3),
    ) {
        let preferences: Vec<PreferenceInput> = classes
            .iter()
            .map(|(kind, shares, investment, multiple, ownership)| PreferenceInput {
                participation: match kind {
                    0 => ParticipationType::NonParticipating,
                    1 => ParticipationType::Participating,
                    _ => ParticipationType::CappedParticipating,
                },
                shares: f64::from(*shares),
                investment: f64::from(*investment),
                liquidation_multiple: f64::from(*multiple),
                participation_cap: 3.0,
                ownership: *ownership,
            })
            .collect();
        let exit = f64::from(exit);
        let out = distribute(exit, &preferences, &common).unwrap();

        let tolerance = 1e-6 * exit.max(1.0);
        prop_assert!(out.preference.iter().all(|p| *p >= 0.0));
        prop_assert!(out.common.iter().all(|p| *p >= 0.0));
        prop_assert!(out.unallocated >= -tolerance);
        prop_assert!(out.residual <= exit + tolerance);
    }

    #[test]
    fn vested_fraction_is_monotone_and_bounded(
        cliff in 0u32..730,
        period in 0u32..2_000,
        a in 0u32..5_000,
        b in 0u32..5_000,
    ) {
        let (early, late) = if a <= b { (a, b) } else { (b, a) };
        let early = fraction_at(f64::from(early), cliff, period).unwrap();
        let late = fraction_at(f64::from(late), cliff, period).unwrap();
        prop_assert!((0.0..=1.0).contains(&early));
        prop_assert!((0.0..=1.0).contains(&late));
        prop_assert!(early <= late);
    }

    #[test]
    fn treasury_stock_dilution_stays_within_the_grant(
        shares in 0u32..10_000_000,
        strike_cents in 0u32..1_000,
        pps_cents in 0u32..1_000,
    ) {
        let shares = f64::from(shares);
        let strike = f64::from(strike_cents) / 100.0;
        let pps = f64::from(pps_cents) / 100.0;
        let out = tsm::evaluate(shares, strike, pps).unwrap();

        prop_assert!(out.net_dilution >= 0.0);
        prop_assert!(out.net_dilution <= shares);
        if strike >= pps {
            prop_assert_eq!(out.net_dilution, 0.0);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 8,
        max_shrink_iters: 0,
        .. ProptestConfig::default()
    })]

    #[test]
    fn generation_is_deterministic(
        founding in 1_000_000u32..50_000_000,
        rounds in proptest::collection::vec(round_strategy(), 0..3),
    ) {
        let doc = priced_rounds(f64::from(founding), &rounds);
        let options = GenerateOptions::default();
        let first = generate_to_vec(&doc, &options).unwrap();
        let second = generate_to_vec(&doc, &options).unwrap();
        prop_assert!(first == second);
    }
}

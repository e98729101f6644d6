use std::io::{Cursor, Read};

use captable_core::{
    generate, generate_to_path, generate_to_vec, CapTable, GenerateOptions, GenerationError,
    Preview, SheetKind,
};
use captable_model::{CellRef, CellValue, Range, Workbook, Worksheet};
use pretty_assertions::assert_eq;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

fn acme() -> CapTable {
    serde_json::from_str(include_str!("fixtures/acme.json")).unwrap()
}

fn defined_cell<'a>(workbook: &'a Workbook, name: &str) -> (&'a Worksheet, CellRef) {
    let name = workbook
        .defined_name(name)
        .unwrap_or_else(|| panic!("missing defined name {name}"));
    let (sheet, cell) = name.refers_to.rsplit_once('!').unwrap();
    let sheet = workbook.sheet_by_name(sheet.trim_matches('\'')).unwrap();
    (sheet, CellRef::from_a1(cell).unwrap())
}

fn named_formula(workbook: &Workbook, name: &str) -> String {
    let (sheet, cell) = defined_cell(workbook, name);
    sheet
        .formula(cell)
        .unwrap_or_else(|| panic!("{name} holds no formula"))
        .trim_start_matches('=')
        .to_string()
}

fn table_column(workbook: &Workbook, table_name: &str, column: &str) -> Vec<CellValue> {
    let (sheet, table) = workbook.find_table(table_name).unwrap();
    let col = table.range.start.col + table.column_index(column).unwrap();
    (table.range.start.row + 1..=table.range.end.row)
        .map(|row| sheet.value(CellRef::new(row, col)))
        .collect()
}

fn zip_parts(bytes: &[u8]) -> Vec<(String, String)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut parts = Vec::new();
    for idx in 0..archive.len() {
        let mut file = archive.by_index(idx).unwrap();
        let mut xml = String::new();
        file.read_to_string(&mut xml).unwrap();
        parts.push((file.name().to_string(), xml));
    }
    parts
}

#[test]
fn output_is_byte_identical_across_runs() {
    let doc = acme();
    let options = GenerateOptions::default();
    let a = generate_to_vec(&doc, &options).unwrap();
    let b = generate_to_vec(&doc, &options).unwrap();
    assert_eq!(a, b);
}

#[test]
fn every_round_exports_its_values_as_names() {
    let workbook = generate(&acme(), &GenerateOptions::default()).unwrap();
    for round in ["Seed", "Series_A", "Bridge"] {
        for suffix in [
            "Date",
            "PreMoney",
            "PostMoney",
            "PreRoundShares",
            "PPS",
            "Investment",
            "BaseShares",
            "ProRataShares",
            "SharesIssued",
        ] {
            let name = format!("{round}_{suffix}");
            assert!(workbook.defined_name(&name).is_some(), "missing {name}");
        }
    }
    for name in [
        "Exit_Base_Value",
        "Exit_Downside_Value",
        "Series_A_ProRataPostShares",
        "CompanyName",
        "EvaluationDate",
        "CurrentPPS",
        "FullyDilutedShares",
    ] {
        assert!(workbook.defined_name(name).is_some(), "missing {name}");
    }
}

#[test]
fn pre_round_shares_chain_through_names() {
    let workbook = generate(&acme(), &GenerateOptions::default()).unwrap();
    assert_eq!(
        named_formula(&workbook, "Seed_PreRoundShares"),
        "ROUND(SUMIF(tblLedger[Round Order],0,tblLedger[Initial Quantity]),0)"
    );
    assert_eq!(
        named_formula(&workbook, "Series_A_PreRoundShares"),
        "ROUND(Seed_PreRoundShares+Seed_SharesIssued,0)"
    );
    assert_eq!(
        named_formula(&workbook, "Bridge_PreRoundShares"),
        "ROUND(Series_A_PreRoundShares+Series_A_SharesIssued,0)"
    );
    assert_eq!(
        named_formula(&workbook, "Series_A_SharesIssued"),
        "ROUND(Series_A_BaseShares+Series_A_ProRataShares,0)"
    );
}

#[test]
fn safe_converts_at_the_qualifying_round_price() {
    let workbook = generate(&acme(), &GenerateOptions::default()).unwrap();
    assert_eq!(named_formula(&workbook, "Bridge_PPS"), "Series_A_PPS");
    assert_eq!(
        named_formula(&workbook, "CurrentPPS"),
        "Series_A_PPS",
        "the last priced round sets the current price"
    );
}

#[test]
fn senior_preferences_are_listed_first() {
    let workbook = generate(&acme(), &GenerateOptions::default()).unwrap();
    let classes = table_column(&workbook, "tblWaterfall_Base_Pref", "Class");
    assert_eq!(
        classes,
        vec![
            CellValue::String("Series A Preferred".to_string()),
            CellValue::String("Series Seed Preferred".to_string()),
        ]
    );
}

#[test]
fn pro_rata_allocations_reach_the_ledger() {
    let workbook = generate(&acme(), &GenerateOptions::default()).unwrap();
    let ids = table_column(&workbook, "tblLedger", "ID");
    assert_eq!(
        ids.last(),
        Some(&CellValue::String("Series A/pro-rata/Seed Fund".to_string()))
    );
    let holders = table_column(&workbook, "tblProRata_Series_A", "Holder");
    assert_eq!(holders, vec![CellValue::String("Seed Fund".to_string())]);
}

#[test]
fn progression_sums_each_round_over_its_instrument_block() {
    let workbook = generate(&acme(), &GenerateOptions::default()).unwrap();
    let progression = workbook.sheet_by_name("Cap Table Progression").unwrap();
    let (_, table) = workbook.find_table("tblProgression").unwrap();

    for (round, slug) in [("Seed", "Seed"), ("Series A", "Series_A"), ("Bridge", "Bridge")] {
        let (rounds, block) = workbook.find_table(&format!("tblRound_{slug}")).unwrap();
        let block_column = |header: &str| {
            let col = block.range.start.col + block.column_index(header).unwrap();
            let cells = Range::new(
                CellRef::new(block.range.start.row + 1, col),
                CellRef::new(block.range.end.row, col),
            );
            format!("{}!{}", rounds.name, cells.to_a1_absolute())
        };
        let expected = format!(
            "SUMIF({},tblProgression[[#This Row],[Holder]],{})",
            block_column("Holder"),
            block_column("Shares")
        );

        let col = table.range.start.col + table.column_index(&format!("After {round}")).unwrap();
        for row in table.range.start.row + 1..=table.range.end.row {
            let formula = progression.formula(CellRef::new(row, col)).unwrap();
            assert!(formula.contains(&expected), "{round}: {formula}");
        }
    }
}

#[test]
fn uniform_table_columns_carry_a_calculated_formula() {
    let workbook = generate(&acme(), &GenerateOptions::default()).unwrap();
    let (_, table) = workbook.find_table("tblProgression").unwrap();
    let column = |header: &str| &table.columns[table.column_index(header).unwrap() as usize];

    assert_eq!(column("Holder").calculated_formula, None);
    let type_formula = column("Type").calculated_formula.as_deref().unwrap();
    assert!(type_formula.contains("tblProgression[[#This Row],[Holder]]"), "{type_formula}");
}

#[test]
fn package_has_tables_names_and_calc_settings() {
    let bytes = generate_to_vec(&acme(), &GenerateOptions::default()).unwrap();
    let parts = zip_parts(&bytes);

    let mut tables: Vec<String> = parts
        .iter()
        .filter(|(name, _)| name.starts_with("xl/tables/"))
        .map(|(_, xml)| {
            let doc = roxmltree::Document::parse(xml).unwrap();
            doc.root_element().attribute("name").unwrap().to_string()
        })
        .collect();
    tables.sort();
    assert_eq!(
        tables,
        vec![
            "tblClasses",
            "tblHolders",
            "tblLedger",
            "tblProRata_Series_A",
            "tblProgression",
            "tblRoundSummary",
            "tblRound_Bridge",
            "tblRound_Seed",
            "tblRound_Series_A",
            "tblTerms",
            "tblVesting",
            "tblWaterfall_Base_Common",
            "tblWaterfall_Base_Pref",
            "tblWaterfall_Downside_Common",
            "tblWaterfall_Downside_Pref",
        ]
    );

    let (_, workbook_xml) = parts
        .iter()
        .find(|(name, _)| name == "xl/workbook.xml")
        .unwrap();
    let doc = roxmltree::Document::parse(workbook_xml).unwrap();
    let calc_pr = doc
        .descendants()
        .find(|n| n.has_tag_name((NS_MAIN, "calcPr")))
        .unwrap();
    assert_eq!(calc_pr.attribute("fullCalcOnLoad"), Some("1"));
    let sheets: Vec<&str> = doc
        .descendants()
        .filter(|n| n.has_tag_name((NS_MAIN, "sheet")))
        .filter_map(|n| n.attribute("name"))
        .collect();
    let expected: Vec<&str> = SheetKind::DEFAULT_PRESENTATION_ORDER
        .iter()
        .map(|k| k.title())
        .collect();
    assert_eq!(sheets, expected);
}

#[test]
fn formula_cells_carry_no_cached_values() {
    let bytes = generate_to_vec(&acme(), &GenerateOptions::default()).unwrap();
    let mut formulas = 0;
    for (name, xml) in zip_parts(&bytes) {
        if !name.starts_with("xl/worksheets/sheet") {
            continue;
        }
        let doc = roxmltree::Document::parse(&xml).unwrap();
        for cell in doc.descendants().filter(|n| n.has_tag_name((NS_MAIN, "c"))) {
            let Some(f) = cell.children().find(|n| n.has_tag_name((NS_MAIN, "f"))) else {
                continue;
            };
            formulas += 1;
            let text = f.text().unwrap_or_default();
            assert!(!text.is_empty(), "{name} {:?}", cell.attribute("r"));
            assert!(!text.contains("#REF!"), "{name}: {text}");
            assert!(cell.children().all(|n| !n.has_tag_name((NS_MAIN, "v"))));
        }
    }
    assert!(formulas > 100, "only {formulas} formulas written");
}

#[test]
fn failed_generation_leaves_no_file() {
    let mut doc = acme();
    let safe = doc
        .instruments
        .iter_mut()
        .find(|i| i.id.as_deref() == Some("SAFE-1"))
        .unwrap();
    safe.convertible = None;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("acme.xlsx");
    let err = generate_to_path(&doc, &GenerateOptions::default(), &path).unwrap_err();
    match err {
        GenerationError::MissingCalculationInput {
            round,
            instrument,
            field,
        } => {
            assert_eq!(round.as_deref(), Some("Bridge"));
            assert_eq!(instrument.as_deref(), Some("SAFE-1"));
            assert_eq!(field, "convertible");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn generate_to_path_writes_the_package() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("acme.xlsx");
    generate_to_path(&acme(), &GenerateOptions::default(), &path).unwrap();
    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(
        on_disk,
        generate_to_vec(&acme(), &GenerateOptions::default()).unwrap()
    );
}

#[test]
fn dangling_holder_is_an_unknown_entity() {
    let mut doc = acme();
    doc.instruments[0].holder = "Mallory".to_string();
    let err = generate(&doc, &GenerateOptions::default()).unwrap_err();
    assert!(
        matches!(
            &err,
            GenerationError::UnknownEntity { kind: "holder", name, .. } if name == "Mallory"
        ),
        "{err}"
    );
}

#[test]
fn qualifying_round_must_precede_the_conversion() {
    let mut doc = acme();
    doc.rounds[2].qualifying_round = Some("Bridge".to_string());
    let err = generate(&doc, &GenerateOptions::default()).unwrap_err();
    assert!(
        matches!(err, GenerationError::CircularRoundReference { .. }),
        "{err}"
    );
}

#[test]
fn duplicate_presentation_entries_are_rejected() {
    let options = GenerateOptions {
        presentation_order: Some(vec![SheetKind::Ledger, SheetKind::Ledger]),
        ..GenerateOptions::default()
    };
    let err = generate(&acme(), &options).unwrap_err();
    assert!(matches!(err, GenerationError::InvalidOptions(_)), "{err}");
}

#[test]
fn preview_follows_the_round_chain() {
    let preview = Preview::compute(&acme()).unwrap();
    assert_eq!(preview.founding_shares, 10_500_000.0);

    let seed = preview.round("Seed").unwrap();
    assert_eq!(seed.shares_issued, 2_000_000.0);

    let series_a = preview.round("Series A").unwrap();
    assert_eq!(series_a.pre_round_shares, 12_500_000.0);
    assert_eq!(series_a.price_per_share, 2.88);
    assert_eq!(series_a.post_money_valuation, 44_000_000.0);
    assert_eq!(series_a.pro_rata.len(), 1);
    assert!(series_a.pro_rata_shares > 0.0);

    let bridge = preview.round("Bridge").unwrap();
    assert_eq!(
        bridge.pre_round_shares,
        series_a.pre_round_shares + series_a.shares_issued
    );
    assert_eq!(bridge.price_per_share, series_a.price_per_share);

    let owned: f64 = preview.holdings.iter().map(|h| h.ownership).sum();
    assert!((owned - 1.0).abs() < 1e-9);
}

//! Workbook generation.
//!
//! A call runs in fixed steps: input checks, a numeric preview that rejects
//! negative share counts, layout registration by every sheet, cell writing
//! against the sealed layout, then finalization (defined names, tables,
//! calculation settings and tab order). Any error aborts the call before a
//! byte is written.

mod checks;
mod context;
pub mod options;
mod sheets;
mod writer;

use std::collections::BTreeMap;
use std::path::Path;

use captable_model::{CellRef, Table, Workbook, WorkbookError, Worksheet, WorksheetId};
use log::debug;

use crate::document::CapTable;
use crate::layout::LayoutMap;
use crate::preview::Preview;
use crate::GenerationError;

use self::context::GenerationContext;
use self::options::{GenerateOptions, SheetKind};
use self::writer::{SheetWriter, StyleSet};

pub(crate) use self::checks::check;

/// Build the workbook model for `doc`.
pub fn generate(doc: &CapTable, options: &GenerateOptions) -> Result<Workbook, GenerationError> {
    options.validate()?;
    let strategies = check(doc)?;
    Preview::compute_checked(doc, &strategies)?;

    let ctx = GenerationContext::new(doc, options, &strategies)?;
    let sheets = sheets::in_write_order(&ctx)?;

    let mut layout = LayoutMap::new();
    for sheet in &sheets {
        sheet.register(&mut layout)?;
    }
    layout.seal();
    debug!(
        "layout sealed: {} named ranges, {} tables",
        layout.named_ranges().count(),
        layout.tables().count()
    );

    let mut workbook = Workbook::new();
    let styles = StyleSet::new(&mut workbook);
    let mut ids: BTreeMap<SheetKind, WorksheetId> = BTreeMap::new();
    for sheet in &sheets {
        let kind = sheet.kind();
        let id = workbook.add_sheet(kind.title())?;
        let worksheet = workbook
            .sheet_mut(id)
            .ok_or(WorkbookError::SheetNotFound(id))?;
        let mut out = SheetWriter::new(worksheet, &layout, &styles);
        sheet.write(&mut out)?;
        debug!("wrote sheet {}", kind.title());
        ids.insert(kind, id);
    }

    finalize(&mut workbook, &layout, options, &ids)?;
    Ok(workbook)
}

/// Generate and serialize to `.xlsx` bytes.
pub fn generate_to_vec(
    doc: &CapTable,
    options: &GenerateOptions,
) -> Result<Vec<u8>, GenerationError> {
    let workbook = generate(doc, options)?;
    Ok(captable_xlsx::write_workbook_to_vec(&workbook)?)
}

/// Generate and write to `path`. The file only appears once the whole
/// package has been written.
#[cfg(not(target_arch = "wasm32"))]
pub fn generate_to_path(
    doc: &CapTable,
    options: &GenerateOptions,
    path: impl AsRef<Path>,
) -> Result<(), GenerationError> {
    let workbook = generate(doc, options)?;
    captable_xlsx::write_workbook(&workbook, path)?;
    Ok(())
}

fn finalize(
    workbook: &mut Workbook,
    layout: &LayoutMap,
    options: &GenerateOptions,
    ids: &BTreeMap<SheetKind, WorksheetId>,
) -> Result<(), GenerationError> {
    for entry in layout.named_ranges() {
        workbook.define_name(&entry.name, &entry.refers_to())?;
    }

    let sheet_id = |title: &str| {
        ids.iter()
            .find(|(kind, _)| kind.title() == title)
            .map(|(_, id)| *id)
            .ok_or_else(|| {
                GenerationError::GenerationOrder(format!("no sheet named `{title}` was written"))
            })
    };
    // Tables in name order keep table part numbering stable.
    let mut tables: Vec<_> = layout.tables().collect();
    tables.sort_by(|a, b| a.table_name.cmp(&b.table_name));
    for entry in tables {
        let id = sheet_id(&entry.sheet)?;
        let mut table = Table::new(
            &entry.table_name,
            entry.origin(),
            &entry.columns,
            entry.data_rows,
            &options.table_style,
        )
        .map_err(|source| WorkbookError::InvalidTable {
            name: entry.table_name.clone(),
            source,
        })?;
        let sheet = workbook.sheet(id).ok_or(WorkbookError::SheetNotFound(id))?;
        let calculated: Vec<Option<String>> = (0..table.columns.len() as u32)
            .map(|index| shared_formula(sheet, table.column_cells(index)))
            .collect();
        for (column, formula) in table.columns.iter_mut().zip(calculated) {
            column.calculated_formula = formula;
        }
        workbook.add_table(id, table)?;
    }

    workbook.full_calc_on_load = options.force_full_calc;

    let order = options
        .sheet_order()
        .into_iter()
        .map(|kind| sheet_id(kind.title()))
        .collect::<Result<Vec<_>, _>>()?;
    workbook.reorder_sheets(&order)?;
    Ok(())
}

/// The formula every one of `cells` holds, when they all hold the same one.
fn shared_formula(sheet: &Worksheet, mut cells: impl Iterator<Item = CellRef>) -> Option<String> {
    let first = sheet.formula(cells.next()?)?;
    cells
        .all(|at| sheet.formula(at) == Some(first))
        .then(|| first.to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn seed_doc() -> CapTable {
        serde_json::from_value(json!({
            "company": {
                "name": "Acme",
                "incorporation_date": "2020-01-01",
                "evaluation_date": "2024-01-01"
            },
            "holders": [
                {"name": "Founder", "type": "founder"},
                {"name": "Fund I", "type": "investor"}
            ],
            "classes": [
                {"name": "Common", "type": "common"},
                {"name": "Series A Preferred", "type": "preferred", "terms": "Standard"}
            ],
            "terms": [
                {
                    "name": "Standard",
                    "participation_type": "non_participating",
                    "seniority_rank": 1
                }
            ],
            "instruments": [
                {"id": "F-1", "holder": "Founder", "class": "Common", "initial_quantity": 10000000.0},
                {
                    "id": "A-1",
                    "holder": "Fund I",
                    "class": "Series A Preferred",
                    "round": "Series A",
                    "investment_amount": 10000000.0
                }
            ],
            "rounds": [
                {
                    "name": "Series A",
                    "date": "2023-06-01",
                    "calculation_type": "valuation_based",
                    "valuation_basis": "post_money",
                    "post_money_valuation": 50000000.0
                }
            ],
            "waterfall_scenarios": [{"name": "Base", "exit_value": 100000000.0}]
        }))
        .unwrap()
    }

    #[test]
    fn sheets_follow_the_presentation_order() {
        let workbook = generate(&seed_doc(), &GenerateOptions::default()).unwrap();
        let titles: Vec<&str> = workbook.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            titles,
            SheetKind::DEFAULT_PRESENTATION_ORDER
                .iter()
                .map(|k| k.title())
                .collect::<Vec<_>>()
        );
        assert!(workbook.full_calc_on_load);
    }

    #[test]
    fn round_values_are_exported_as_names() {
        let workbook = generate(&seed_doc(), &GenerateOptions::default()).unwrap();
        let pps = workbook.defined_name("Series_A_PPS").unwrap();
        assert_eq!(pps.refers_to, "Rounds!$B$8");
        assert!(workbook.defined_name("Exit_Base_Value").is_some());
    }

    #[test]
    fn round_shares_reference_round_names() {
        let workbook = generate(&seed_doc(), &GenerateOptions::default()).unwrap();
        let (sheet, table) = workbook.find_table("tblRound_Series_A").unwrap();
        let shares_col = table.column_index("Shares").unwrap();
        let first_row = table.range.start.row + 1;
        let cell = CellRef::new(first_row, table.range.start.col + shares_col);
        let formula = sheet.formula(cell).unwrap();
        assert_eq!(
            formula,
            "ROUND(IFERROR(Series_A_PreRoundShares*tblRound_Series_A[[#This Row],[Ownership %]]/(1-tblRound_Series_A[[#This Row],[Ownership %]]),0),0)"
        );
        // One instrument, so every data row shares the formula.
        assert_eq!(
            table.columns[shares_col as usize].calculated_formula.as_deref(),
            Some(formula)
        );
    }

    #[test]
    fn missing_inputs_fail_before_any_output() {
        let mut doc = seed_doc();
        doc.rounds[0].post_money_valuation = None;
        let err = generate(&doc, &GenerateOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::MissingCalculationInput { field: "post_money_valuation", .. }
        ));
    }

    #[test]
    fn custom_order_moves_masters_first() {
        let options = GenerateOptions {
            presentation_order: Some(vec![SheetKind::Holders, SheetKind::Summary]),
            ..GenerateOptions::default()
        };
        let workbook = generate(&seed_doc(), &options).unwrap();
        assert_eq!(workbook.sheets[0].name, "Holders");
        assert_eq!(workbook.sheets[1].name, "Summary");
        assert_eq!(workbook.sheets[2].name, "Ledger");
    }
}
